// ── Conflict validator ──
//
// Runs over the whole ingress batch before anything is generated. A
// port belongs either to exactly one four-layer rule or to a set of
// seven-layer rules of one protocol with distinct (domain, path) pairs.
// The first violation fails the batch.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crate::model::{Ingress, OrdinalRange, Protocol};

/// A rule that cannot coexist with the rules validated before it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Ingress {namespace}/{name}: {message}")]
pub struct Conflict {
    pub namespace: String,
    pub name: String,
    pub message: String,
}

#[derive(Default)]
struct PortMap {
    layer4: HashMap<u16, Protocol>,
    layer7: HashMap<u16, (Protocol, HashSet<(String, String)>)>,
}

impl PortMap {
    fn claim_layer4(&mut self, protocol: Protocol, port: u16) -> Result<(), String> {
        if port == 0 {
            return Err(format!("{protocol} rule has no load balancer port"));
        }
        if let Some(existing) = self.layer4.get(&port) {
            return Err(format!("port {port} is already used by a {existing} rule"));
        }
        if let Some((existing, _)) = self.layer7.get(&port) {
            return Err(format!("port {port} is already used by {existing} rules"));
        }
        self.layer4.insert(port, protocol);
        Ok(())
    }

    fn claim_layer7(
        &mut self,
        protocol: Protocol,
        port: u16,
        host: &str,
        path: &str,
    ) -> Result<(), String> {
        if port == 0 {
            return Err(format!("{protocol} rule has no load balancer port"));
        }
        if let Some(existing) = self.layer4.get(&port) {
            return Err(format!("port {port} is already used by a {existing} rule"));
        }
        let (existing, routes) = self
            .layer7
            .entry(port)
            .or_insert_with(|| (protocol, HashSet::new()));
        if *existing != protocol {
            return Err(format!("port {port} is already used by {existing} rules"));
        }
        if !routes.insert((host.to_owned(), path.to_owned())) {
            return Err(format!("port {port} already routes {host}{path}"));
        }
        Ok(())
    }
}

fn stateful_ports(range: &OrdinalRange) -> Result<Vec<u16>, String> {
    if range.start_port == 0 {
        return Err("stateful rule has no start port".into());
    }
    if range.start_index > range.end_index {
        return Err(format!(
            "stateful rule start index {} is after end index {}",
            range.start_index, range.end_index
        ));
    }
    range
        .ports()
        .map(|ports| ports.into_iter().map(|(_, port)| port).collect())
        .ok_or_else(|| {
            format!(
                "stateful rule ports from {} overflow for indexes {}..={}",
                range.start_port, range.start_index, range.end_index
            )
        })
}

fn check(ports: &mut PortMap, ingress: &Ingress) -> Result<(), String> {
    let spec = &ingress.spec;
    for (protocol, rules) in [(Protocol::Tcp, &spec.tcp), (Protocol::Udp, &spec.udp)] {
        for rule in rules {
            ports.claim_layer4(protocol, rule.clb_port)?;
        }
    }
    for (protocol, rules) in [(Protocol::Http, &spec.http), (Protocol::Https, &spec.https)] {
        for rule in rules {
            ports.claim_layer7(protocol, rule.clb_port, &rule.host, &rule.path)?;
        }
    }

    let stateful = &spec.statefulset;
    for (protocol, rules) in [(Protocol::Tcp, &stateful.tcp), (Protocol::Udp, &stateful.udp)] {
        for rule in rules {
            for port in stateful_ports(&rule.range)? {
                ports.claim_layer4(protocol, port)?;
            }
        }
    }
    let layer7 = [(Protocol::Http, &stateful.http), (Protocol::Https, &stateful.https)];
    for (protocol, rules) in layer7 {
        for rule in rules {
            for port in stateful_ports(&rule.range)? {
                ports.claim_layer7(protocol, port, &rule.host, &rule.path)?;
            }
        }
    }
    Ok(())
}

/// Check the whole batch, failing on the first conflicting ingress.
pub fn validate(ingresses: &[Ingress]) -> Result<(), Conflict> {
    let mut ports = PortMap::default();
    for ingress in ingresses {
        check(&mut ports, ingress).map_err(|message| Conflict {
            namespace: ingress.namespace.clone(),
            name: ingress.name.clone(),
            message,
        })?;
    }
    Ok(())
}
