// ── Reactive listener collection ──
//
// Concurrent keyed storage with a sorted snapshot that is rebuilt on
// every mutation.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;

/// A keyed collection whose full contents can be observed.
///
/// Uses `DashMap` for concurrent lookups and a `watch` channel carrying
/// the sorted snapshot.
pub(crate) struct Collection<T: Clone + Send + Sync + 'static> {
    by_key: DashMap<String, Arc<T>>,

    /// Snapshot sorted by key, rebuilt on mutation.
    snapshot: watch::Sender<Arc<Vec<Arc<T>>>>,

    /// Orders the snapshot.
    sort_key: fn(&T) -> (u16, String),
}

impl<T: Clone + Send + Sync + 'static> Collection<T> {
    pub(crate) fn new(sort_key: fn(&T) -> (u16, String)) -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));

        Self {
            by_key: DashMap::new(),
            snapshot,
            sort_key,
        }
    }

    /// Insert or replace an entity. Returns `true` if the key was new.
    pub(crate) fn upsert(&self, key: String, entity: T) -> bool {
        let is_new = self.by_key.insert(key, Arc::new(entity)).is_none();
        self.rebuild_snapshot();
        is_new
    }

    /// Remove an entity by key. Returns the removed entity if it existed.
    pub(crate) fn remove(&self, key: &str) -> Option<Arc<T>> {
        let removed = self.by_key.remove(key).map(|(_, v)| v);
        if removed.is_some() {
            self.rebuild_snapshot();
        }
        removed
    }

    pub(crate) fn get(&self, key: &str) -> Option<Arc<T>> {
        self.by_key.get(key).map(|r| Arc::clone(r.value()))
    }

    pub(crate) fn snapshot(&self) -> Arc<Vec<Arc<T>>> {
        self.snapshot.borrow().clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_key.len()
    }

    pub(crate) fn keys(&self) -> Vec<String> {
        self.by_key.iter().map(|r| r.key().clone()).collect()
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn rebuild_snapshot(&self) {
        let mut values: Vec<Arc<T>> = self.by_key.iter().map(|r| Arc::clone(r.value())).collect();
        values.sort_by_key(|v| (self.sort_key)(v));
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[allow(clippy::ptr_arg)]
    fn by_len(s: &String) -> (u16, String) {
        (u16::try_from(s.len()).unwrap(), s.clone())
    }

    #[test]
    fn upsert_reports_new_keys() {
        let col: Collection<String> = Collection::new(by_len);
        assert!(col.upsert("a".into(), "x".into()));
        assert!(!col.upsert("a".into(), "y".into()));
        assert_eq!(*col.get("a").unwrap(), "y");
        assert_eq!(col.len(), 1);
    }

    #[test]
    fn snapshot_is_sorted() {
        let col: Collection<String> = Collection::new(by_len);
        col.upsert("k1".into(), "ccc".into());
        col.upsert("k2".into(), "a".into());
        col.upsert("k3".into(), "bb".into());
        let snap: Vec<String> = col.snapshot().iter().map(|s| (**s).clone()).collect();
        assert_eq!(snap, vec!["a", "bb", "ccc"]);
    }

    #[test]
    fn remove_updates_snapshot() {
        let col: Collection<String> = Collection::new(by_len);
        col.upsert("a".into(), "x".into());
        let before = col.snapshot();
        assert_eq!(*col.remove("a").unwrap(), "x");
        assert!(col.remove("a").is_none());
        assert_eq!(before.len(), 1);
        assert!(col.snapshot().is_empty());
        assert_eq!(col.len(), 0);
    }
}
