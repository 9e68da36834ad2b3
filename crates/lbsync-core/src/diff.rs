// ── Listener diff ──
//
// Set differences over listener lists keyed by `namespace/name`. Backend
// and rule diffs live with their model types.

use std::collections::{HashMap, HashSet};

use crate::model::CloudListener;

/// Listeners to delete (cached but no longer desired) and to add
/// (desired but not cached).
pub fn diff_listeners(
    old: &[CloudListener],
    new: &[CloudListener],
) -> (Vec<CloudListener>, Vec<CloudListener>) {
    let old_keys: HashSet<String> = old.iter().map(CloudListener::key).collect();
    let new_keys: HashSet<String> = new.iter().map(CloudListener::key).collect();

    let del = old
        .iter()
        .filter(|l| !new_keys.contains(&l.key()))
        .cloned()
        .collect();
    let add = new
        .iter()
        .filter(|l| !old_keys.contains(&l.key()))
        .cloned()
        .collect();
    (del, add)
}

/// Listeners present on both sides that differ, as parallel lists of
/// the cached and desired versions.
pub fn update_listeners(
    old: &[CloudListener],
    new: &[CloudListener],
) -> (Vec<CloudListener>, Vec<CloudListener>) {
    let by_key: HashMap<String, &CloudListener> = old.iter().map(|l| (l.key(), l)).collect();
    new.iter()
        .filter_map(|n| {
            let o = by_key.get(&n.key())?;
            (!o.is_equal(n)).then(|| ((*o).clone(), n.clone()))
        })
        .unzip()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::{Backend, Forwarding, Protocol, TargetGroup};

    fn listener(port: u16, backends: &[&str]) -> CloudListener {
        let mut tg = TargetGroup::new("default-svc-80", Protocol::Tcp, port);
        tg.backends = backends.iter().map(|ip| Backend::new(*ip, 8080)).collect();
        CloudListener {
            namespace: "kube-system".into(),
            name: format!("edge-{port}"),
            listener_id: None,
            load_balancer_id: "lb-1".into(),
            protocol: Protocol::Tcp,
            listen_port: port,
            tls: None,
            forwarding: Forwarding::TargetGroup(tg),
        }
    }

    fn ports(listeners: &[CloudListener]) -> Vec<u16> {
        listeners.iter().map(|l| l.listen_port).collect()
    }

    #[test]
    fn identical_sets_produce_nothing() {
        let set = vec![listener(80, &["10.0.0.1"]), listener(9000, &[])];
        let (del, add) = diff_listeners(&set, &set);
        assert!(del.is_empty() && add.is_empty());
        let (old, new) = update_listeners(&set, &set);
        assert!(old.is_empty() && new.is_empty());
    }

    #[test]
    fn adds_and_deletes_by_key() {
        let old = vec![listener(80, &[]), listener(9000, &[])];
        let new = vec![listener(9000, &[]), listener(9001, &[])];
        let (del, add) = diff_listeners(&old, &new);
        assert_eq!(ports(&del), vec![80]);
        assert_eq!(ports(&add), vec![9001]);
    }

    #[test]
    fn changed_listener_is_an_update_not_an_add() {
        let mut cached = listener(9000, &["10.0.0.1", "10.0.0.2"]);
        cached.listener_id = Some("lbl-1".into());
        let desired = listener(9000, &["10.0.0.1"]);

        let (del, add) = diff_listeners(&[cached.clone()], &[desired.clone()]);
        assert!(del.is_empty() && add.is_empty());

        let (old, new) = update_listeners(&[cached], &[desired]);
        assert_eq!(old.len(), 1);
        assert_eq!(old[0].listener_id.as_deref(), Some("lbl-1"));
        assert_eq!(new[0].backend_count(), 1);
    }
}
