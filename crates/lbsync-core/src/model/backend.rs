// ── Backends and backend diffing ──
//
// A backend's identity is its address (`ip`, `port`). Weight is an
// attribute: a weight-only change is never an add/delete pair, it is
// reported separately by `weight_updates`.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Weight assigned to backends that don't specify one.
pub const DEFAULT_WEIGHT: u32 = 10;

/// One address registered behind a listener or rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Backend {
    pub ip: String,
    pub port: u16,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    DEFAULT_WEIGHT
}

impl Backend {
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
            weight: DEFAULT_WEIGHT,
        }
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    /// Diff identity: address only.
    pub fn key(&self) -> (&str, u16) {
        (&self.ip, self.port)
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// Backends to register and deregister, kept apart so each side can be
/// applied (and chunked) as its own cloud operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendDiff {
    pub add: Vec<Backend>,
    pub del: Vec<Backend>,
}

impl BackendDiff {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.del.is_empty()
    }
}

/// Entries of `from` whose address is absent from `other`, deduplicated
/// by address, in `from` order.
fn missing_from<'a>(from: &'a [Backend], other: &[Backend]) -> Vec<Backend> {
    let other: HashSet<(&str, u16)> = other.iter().map(Backend::key).collect();
    let mut seen: HashSet<(&'a str, u16)> = HashSet::new();
    from.iter()
        .filter(|b| !other.contains(&b.key()) && seen.insert(b.key()))
        .cloned()
        .collect()
}

/// Symmetric difference of two backend lists keyed by address.
///
/// `add` holds what `new` has and `old` lacks; `del` the reverse.
pub fn diff_backends(old: &[Backend], new: &[Backend]) -> BackendDiff {
    BackendDiff {
        add: missing_from(new, old),
        del: missing_from(old, new),
    }
}

/// Backends present in both lists whose weight changed, carrying the new weight.
pub fn weight_updates(old: &[Backend], new: &[Backend]) -> Vec<Backend> {
    let old: HashMap<(&str, u16), u32> = old.iter().map(|b| (b.key(), b.weight)).collect();
    let mut seen = HashSet::new();
    new.iter()
        .filter(|b| {
            old.get(&b.key())
                .is_some_and(|&weight| weight != b.weight)
                && seen.insert(b.key())
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn b(ip: &str, port: u16) -> Backend {
        Backend::new(ip, port)
    }

    fn keys(list: &[Backend]) -> HashSet<(String, u16)> {
        list.iter().map(|b| (b.ip.clone(), b.port)).collect()
    }

    #[test]
    fn diff_is_symmetric() {
        let a = vec![b("10.0.0.1", 80), b("10.0.0.2", 80), b("10.0.0.3", 80)];
        let c = vec![b("10.0.0.2", 80), b("10.0.0.4", 80)];

        let forward = diff_backends(&a, &c);
        let backward = diff_backends(&c, &a);
        assert_eq!(forward.add, backward.del);
        assert_eq!(forward.del, backward.add);
    }

    #[test]
    fn applying_diff_reproduces_target() {
        let a = vec![b("10.0.0.1", 80), b("10.0.0.2", 80), b("10.0.0.3", 81)];
        let c = vec![b("10.0.0.3", 81), b("10.0.0.9", 80), b("10.0.0.1", 80)];

        let diff = diff_backends(&a, &c);
        let mut applied: Vec<Backend> = a
            .iter()
            .filter(|x| !diff.del.iter().any(|d| d.key() == x.key()))
            .cloned()
            .collect();
        applied.extend(diff.add);
        assert_eq!(keys(&applied), keys(&c));
    }

    #[test]
    fn same_address_different_port_is_distinct() {
        let diff = diff_backends(&[b("10.0.0.1", 80)], &[b("10.0.0.1", 81)]);
        assert_eq!(diff.add, vec![b("10.0.0.1", 81)]);
        assert_eq!(diff.del, vec![b("10.0.0.1", 80)]);
    }

    #[test]
    fn duplicates_are_reported_once() {
        let diff = diff_backends(&[], &[b("10.0.0.1", 80), b("10.0.0.1", 80)]);
        assert_eq!(diff.add.len(), 1);
    }

    #[test]
    fn weight_change_is_not_an_add_or_delete() {
        let old = vec![b("10.0.0.1", 80)];
        let new = vec![b("10.0.0.1", 80).with_weight(50)];
        assert!(diff_backends(&old, &new).is_empty());
        assert_eq!(weight_updates(&old, &new), new);
    }

    #[test]
    fn identical_lists_have_no_updates() {
        let list = vec![b("10.0.0.1", 80), b("10.0.0.2", 80)];
        assert!(diff_backends(&list, &list).is_empty());
        assert!(weight_updates(&list, &list).is_empty());
    }
}
