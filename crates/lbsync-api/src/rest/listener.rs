// Query API listener and forwarding-rule endpoints
//
// Four-layer (TCP/UDP) and seven-layer (HTTP/HTTPS) listeners use
// distinct create/modify actions. Rules only exist on seven-layer
// listeners and are addressed by their `locationId`.

use tracing::debug;

use crate::error::Error;
use crate::rest::client::{Params, RestClient};
use crate::rest::models::{
    CreateListenersResponse, HealthParams, Listener, ListenerRequest, ListenerSet,
    RuleRequest, SslParams,
};
use crate::task::Created;

fn push_health(params: &mut Params, prefix: &str, health: &HealthParams, layer7: bool) {
    params.insert(format!("{prefix}healthSwitch"), u8::from(health.switch));
    params.insert(format!("{prefix}intervalTime"), health.interval);
    params.insert(format!("{prefix}healthNum"), health.healthy);
    params.insert(format!("{prefix}unhealthNum"), health.unhealthy);
    if layer7 {
        params.insert(format!("{prefix}httpCode"), health.http_code);
        params.insert(format!("{prefix}httpCheckPath"), &health.http_check_path);
    } else {
        params.insert(format!("{prefix}timeOut"), health.timeout);
    }
}

fn push_ssl(params: &mut Params, prefix: &str, ssl: &SslParams) {
    params.insert(format!("{prefix}SSLMode"), &ssl.mode);
    params.insert_opt(format!("{prefix}certId"), ssl.cert_id.as_deref());
    params.insert_opt(format!("{prefix}certCaId"), ssl.cert_ca_id.as_deref());
    params.insert_opt(format!("{prefix}certName"), ssl.cert_name.as_deref());
    params.insert_opt(format!("{prefix}certKey"), ssl.cert_key.as_deref());
    params.insert_opt(format!("{prefix}certContent"), ssl.cert_content.as_deref());
    params.insert_opt(format!("{prefix}certCaName"), ssl.cert_ca_name.as_deref());
    params.insert_opt(
        format!("{prefix}certCaContent"),
        ssl.cert_ca_content.as_deref(),
    );
}

fn first_listener_id(
    action: &'static str,
    resp: CreateListenersResponse,
) -> Result<Created, Error> {
    let id = resp
        .listener_ids
        .into_iter()
        .next()
        .ok_or(Error::MissingField {
            action,
            field: "listenerIds",
        })?;
    Ok(Created {
        id,
        task_id: resp.request_id.map(|id| id.to_string()),
    })
}

impl RestClient {
    // ── Listeners ────────────────────────────────────────────────────

    /// Create a TCP or UDP listener.
    ///
    /// Action: `CreateForwardLBFourthLayerListeners`
    pub async fn create_4layer_listener(
        &self,
        lb_id: &str,
        listener: &ListenerRequest,
    ) -> Result<Created, Error> {
        const ACTION: &str = "CreateForwardLBFourthLayerListeners";
        debug!(lb_id, port = listener.port, "creating 4-layer listener");
        let mut params = Params::new().set("loadBalancerId", lb_id);
        let p = "listeners.0.";
        params.insert(format!("{p}listenerName"), &listener.name);
        params.insert(format!("{p}loadBalancerPort"), listener.port);
        params.insert(format!("{p}protocol"), listener.protocol);
        params.insert(format!("{p}sessionExpire"), listener.session_expire);
        params.insert(format!("{p}scheduler"), &listener.scheduler);
        push_health(&mut params, p, &listener.health, false);

        let resp = self.call(ACTION, params).await?;
        first_listener_id(ACTION, resp)
    }

    /// Create an HTTP or HTTPS listener. Rules are added separately.
    ///
    /// Action: `CreateForwardLBSeventhLayerListeners`
    pub async fn create_7layer_listener(
        &self,
        lb_id: &str,
        listener: &ListenerRequest,
    ) -> Result<Created, Error> {
        const ACTION: &str = "CreateForwardLBSeventhLayerListeners";
        debug!(lb_id, port = listener.port, "creating 7-layer listener");
        let mut params = Params::new().set("loadBalancerId", lb_id);
        let p = "listeners.0.";
        params.insert(format!("{p}listenerName"), &listener.name);
        params.insert(format!("{p}loadBalancerPort"), listener.port);
        params.insert(format!("{p}protocol"), listener.protocol);
        if let Some(ssl) = &listener.ssl {
            push_ssl(&mut params, p, ssl);
        }

        let resp = self.call(ACTION, params).await?;
        first_listener_id(ACTION, resp)
    }

    /// List the listeners of a load balancer, optionally narrowed to one
    /// listener id or one port.
    ///
    /// Action: `DescribeForwardLBListeners`
    pub async fn describe_listeners(
        &self,
        lb_id: &str,
        listener_id: Option<&str>,
        port: Option<u16>,
    ) -> Result<Vec<Listener>, Error> {
        debug!(lb_id, ?listener_id, ?port, "describing listeners");
        let mut params = Params::new().set("loadBalancerId", lb_id);
        params.insert_opt("listenerIds.0", listener_id);
        params.insert_opt("loadBalancerPort", port);
        let resp: ListenerSet = self.call("DescribeForwardLBListeners", params).await?;
        Ok(resp.listener_set)
    }

    /// Delete a listener and everything bound to it.
    ///
    /// Action: `DeleteForwardLBListener`
    pub async fn delete_listener(
        &self,
        lb_id: &str,
        listener_id: &str,
    ) -> Result<Option<String>, Error> {
        debug!(lb_id, listener_id, "deleting listener");
        let params = Params::new()
            .set("loadBalancerId", lb_id)
            .set("listenerId", listener_id);
        self.call_task("DeleteForwardLBListener", params).await
    }

    /// Modify session, scheduling and health-check attributes of a
    /// four-layer listener.
    ///
    /// Action: `ModifyForwardFourthListener`
    pub async fn modify_4layer_listener(
        &self,
        lb_id: &str,
        listener_id: &str,
        listener: &ListenerRequest,
    ) -> Result<Option<String>, Error> {
        debug!(lb_id, listener_id, "modifying 4-layer listener");
        let mut params = Params::new()
            .set("loadBalancerId", lb_id)
            .set("listenerId", listener_id)
            .set("listenerName", &listener.name)
            .set("sessionExpire", listener.session_expire)
            .set("scheduler", &listener.scheduler);
        push_health(&mut params, "", &listener.health, false);
        self.call_task("ModifyForwardFourthListener", params).await
    }

    /// Modify the name and certificates of a seven-layer listener.
    ///
    /// Action: `ModifyForwardSeventhListener`
    pub async fn modify_7layer_listener(
        &self,
        lb_id: &str,
        listener_id: &str,
        listener: &ListenerRequest,
    ) -> Result<Option<String>, Error> {
        debug!(lb_id, listener_id, "modifying 7-layer listener");
        let mut params = Params::new()
            .set("loadBalancerId", lb_id)
            .set("listenerId", listener_id)
            .set("listenerName", &listener.name);
        if let Some(ssl) = &listener.ssl {
            push_ssl(&mut params, "", ssl);
        }
        self.call_task("ModifyForwardSeventhListener", params).await
    }

    // ── Rules ────────────────────────────────────────────────────────

    /// Create forwarding rules on a seven-layer listener.
    ///
    /// Action: `CreateForwardLBListenerRules`
    pub async fn create_rules(
        &self,
        lb_id: &str,
        listener_id: &str,
        rules: &[RuleRequest],
    ) -> Result<Option<String>, Error> {
        debug!(lb_id, listener_id, count = rules.len(), "creating rules");
        let mut params = Params::new()
            .set("loadBalancerId", lb_id)
            .set("listenerId", listener_id);
        for (i, rule) in rules.iter().enumerate() {
            let p = format!("rules.{i}.");
            params.insert(format!("{p}domain"), &rule.domain);
            params.insert(format!("{p}url"), &rule.url);
            params.insert(format!("{p}sessionExpire"), rule.session_expire);
            params.insert(format!("{p}scheduler"), &rule.scheduler);
            push_health(&mut params, &p, &rule.health, true);
        }
        self.call_task("CreateForwardLBListenerRules", params).await
    }

    /// Modify the health-check, session and scheduling attributes of a rule.
    ///
    /// Action: `ModifyLoadBalancerRulesProbe`
    pub async fn modify_rule(
        &self,
        lb_id: &str,
        listener_id: &str,
        location_id: &str,
        rule: &RuleRequest,
    ) -> Result<Option<String>, Error> {
        debug!(lb_id, listener_id, location_id, "modifying rule");
        let mut params = Params::new()
            .set("loadBalancerId", lb_id)
            .set("listenerId", listener_id)
            .set("locationId", location_id)
            .set("sessionExpire", rule.session_expire)
            .set("scheduler", &rule.scheduler);
        push_health(&mut params, "", &rule.health, true);
        self.call_task("ModifyLoadBalancerRulesProbe", params).await
    }

    /// Delete rules by location id.
    ///
    /// Action: `DeleteForwardLBListenerRules`
    pub async fn delete_rules(
        &self,
        lb_id: &str,
        listener_id: &str,
        location_ids: &[&str],
    ) -> Result<Option<String>, Error> {
        debug!(lb_id, listener_id, ?location_ids, "deleting rules");
        let mut params = Params::new()
            .set("loadBalancerId", lb_id)
            .set("listenerId", listener_id);
        for (i, id) in location_ids.iter().enumerate() {
            params.insert(format!("locationIds.{i}"), id);
        }
        self.call_task("DeleteForwardLBListenerRules", params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer7_health_carries_http_fields() {
        let health = HealthParams {
            switch: true,
            http_code: 31,
            http_check_path: "/healthz".into(),
            ..HealthParams::default()
        };
        let mut params = Params::new();
        push_health(&mut params, "rules.0.", &health, true);
        assert_eq!(params.get("rules.0.healthSwitch"), Some("1"));
        assert_eq!(params.get("rules.0.httpCheckPath"), Some("/healthz"));
        assert_eq!(params.get("rules.0.timeOut"), None);

        let mut params = Params::new();
        push_health(&mut params, "", &health, false);
        assert_eq!(params.get("httpCheckPath"), None);
        assert_eq!(params.get("timeOut"), Some("0"));
    }
}
