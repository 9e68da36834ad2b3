// ── Listener store ──
//
// The previous cycle's listeners as acknowledged by the cloud, keyed by
// `namespace/name`. Read once at the start of a cycle and replaced once
// at the end.

mod collection;

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use self::collection::Collection;
use crate::model::CloudListener;

fn listener_order(listener: &CloudListener) -> (u16, String) {
    (listener.listen_port, listener.key())
}

/// In-memory cache of reconciled listeners.
pub struct ListenerStore {
    listeners: Collection<CloudListener>,
    last_cycle: watch::Sender<Option<DateTime<Utc>>>,
}

impl Default for ListenerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ListenerStore {
    pub fn new() -> Self {
        let (last_cycle, _) = watch::channel(None);
        Self {
            listeners: Collection::new(listener_order),
            last_cycle,
        }
    }

    /// Cached listeners sorted by port.
    pub fn listeners(&self) -> Vec<CloudListener> {
        self.listeners
            .snapshot()
            .iter()
            .map(|l| (**l).clone())
            .collect()
    }

    pub fn get(&self, key: &str) -> Option<Arc<CloudListener>> {
        self.listeners.get(key)
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the cached set: upsert everything given, then drop keys
    /// that were not given.
    pub fn replace_all(&self, listeners: Vec<CloudListener>) {
        let incoming: HashSet<String> = listeners.iter().map(CloudListener::key).collect();
        for listener in listeners {
            self.listeners.upsert(listener.key(), listener);
        }
        for key in self.listeners.keys() {
            if !incoming.contains(&key) {
                self.listeners.remove(&key);
            }
        }
    }

    /// Record the end of a reconciliation cycle.
    pub fn mark_cycle(&self) {
        let now = Utc::now();
        self.last_cycle.send_modify(|t| *t = Some(now));
    }

    pub fn last_cycle(&self) -> Option<DateTime<Utc>> {
        *self.last_cycle.borrow()
    }

    pub fn subscribe_last_cycle(&self) -> watch::Receiver<Option<DateTime<Utc>>> {
        self.last_cycle.subscribe()
    }
}
