// ── Seven-layer forwarding rules ──
//
// Rules are matched by `(domain, url)`; the cloud-assigned id is
// carried along but never used for diffing.

use std::collections::{HashMap, HashSet};

use super::target_group::TargetGroup;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    /// Cloud-assigned location id; absent on freshly generated rules.
    pub id: Option<String>,
    pub domain: String,
    pub url: String,
    pub target_group: TargetGroup,
}

impl Rule {
    pub fn key(&self) -> (&str, &str) {
        (&self.domain, &self.url)
    }

    /// Same key and an equal target group (attributes and backends).
    pub fn is_equal(&self, other: &Self) -> bool {
        self.key() == other.key() && self.target_group.is_equal(&other.target_group)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleDiff {
    pub add: Vec<Rule>,
    pub del: Vec<Rule>,
}

impl RuleDiff {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.del.is_empty()
    }
}

fn missing_from<'a>(from: &'a [Rule], other: &[Rule]) -> Vec<Rule> {
    let other: HashSet<(&str, &str)> = other.iter().map(Rule::key).collect();
    let mut seen: HashSet<(&'a str, &'a str)> = HashSet::new();
    from.iter()
        .filter(|r| !other.contains(&r.key()) && seen.insert(r.key()))
        .cloned()
        .collect()
}

/// Rules to create (`add`) and remove (`del`), keyed by `(domain, url)`.
pub fn diff_rules(old: &[Rule], new: &[Rule]) -> RuleDiff {
    RuleDiff {
        add: missing_from(new, old),
        del: missing_from(old, new),
    }
}

/// `(old, new)` pairs for rules present on both sides that differ.
pub fn update_rules(old: &[Rule], new: &[Rule]) -> Vec<(Rule, Rule)> {
    let by_key: HashMap<(&str, &str), &Rule> = old.iter().map(|r| (r.key(), r)).collect();
    new.iter()
        .filter_map(|n| {
            let o = by_key.get(&n.key())?;
            (!o.is_equal(n)).then(|| ((*o).clone(), n.clone()))
        })
        .collect()
}
