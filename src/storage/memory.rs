// src/storage/memory.rs
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use std::collections::HashMap;
use crate::models::server::ServerRecord;

/// Latest known record per server ID for one kind.
///
/// Entries are only ever inserted or overwritten, never removed.
pub struct Registry<R: ServerRecord> {
    servers: DashMap<u64, R>,
}

impl<R: ServerRecord> Registry<R> {
    pub fn new() -> Self {
        Self {
            servers: DashMap::new(),
        }
    }

    /// Stores a record fetched from the catalog.
    ///
    /// If the local copy was probed more recently than the catalog row, the
    /// probe-owned fields of the local copy survive so `updated` never goes
    /// backwards.
    pub fn upsert(&self, incoming: R) {
        let mut merged = incoming;
        match self.servers.entry(merged.id()) {
            Entry::Occupied(mut slot) => {
                if slot.get().updated() > merged.updated() {
                    merged.absorb_probe(slot.get());
                }
                slot.insert(merged);
            }
            Entry::Vacant(slot) => {
                slot.insert(merged);
            }
        }
    }

    /// Writes the probe-owned fields of `probed` onto the stored record.
    pub fn apply_probe(&self, probed: &R) -> bool {
        match self.servers.get_mut(&probed.id()) {
            Some(mut current) => {
                if probed.updated() >= current.updated() {
                    current.absorb_probe(probed);
                }
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: u64) -> Option<R> {
        self.servers.get(&id).map(|r| r.value().clone())
    }

    /// Picks the record with the smallest rank, lowest ID first on ties.
    pub fn stalest_by<F>(&self, rank: F) -> Option<R>
    where
        F: Fn(&R) -> DateTime<Utc>,
    {
        self.servers
            .iter()
            .min_by_key(|r| (rank(r.value()), *r.key()))
            .map(|r| r.value().clone())
    }

    /// Deep copies of the requested records, in the order of `ids`.
    pub fn snapshot(&self, ids: &[u64]) -> Vec<R> {
        ids.iter().filter_map(|id| self.get(*id)).collect()
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

impl<R: ServerRecord> Default for Registry<R> {
    fn default() -> Self {
        Self::new()
    }
}

/// An ID captured by a flush, together with the mark it was captured at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirtyEntry {
    pub id: u64,
    pub generation: u64,
}

#[derive(Default)]
struct DirtyState {
    entries: HashMap<u64, u64>,
    next_generation: u64,
}

/// IDs changed since the last fully successful upload.
///
/// Every `mark` stamps the ID with a fresh generation. `clear_flushed` only
/// drops an ID whose generation still matches the snapshot, so IDs marked
/// again while an upload was in flight stay pending.
#[derive(Default)]
pub struct DirtySet {
    state: Mutex<DirtyState>,
}

impl DirtySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&self, id: u64) {
        let mut state = self.state.lock();
        state.next_generation += 1;
        let generation = state.next_generation;
        state.entries.insert(id, generation);
    }

    /// Pending entries ordered by ID.
    pub fn snapshot(&self) -> Vec<DirtyEntry> {
        let state = self.state.lock();
        let mut entries: Vec<DirtyEntry> = state
            .entries
            .iter()
            .map(|(id, generation)| DirtyEntry { id: *id, generation: *generation })
            .collect();
        entries.sort_unstable_by_key(|e| e.id);
        entries
    }

    pub fn clear_flushed(&self, flushed: &[DirtyEntry]) -> usize {
        let mut state = self.state.lock();
        let mut cleared = 0;
        for entry in flushed {
            if state.entries.get(&entry.id) == Some(&entry.generation) {
                state.entries.remove(&entry.id);
                cleared += 1;
            }
        }
        cleared
    }

    #[cfg(test)]
    pub fn contains(&self, id: u64) -> bool {
        self.state.lock().entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::server::{fixtures, MinecraftServer};

    #[test]
    fn test_upsert_overwrites_catalog_fields() {
        let registry = Registry::new();
        registry.upsert(fixtures::minecraft(1, 0));

        let mut refreshed = fixtures::minecraft(1, 10);
        refreshed.port = 25566;
        registry.upsert(refreshed);

        let stored = registry.get(1).unwrap();
        assert_eq!(stored.port, 25566);
        assert_eq!(stored.updated, fixtures::at(10));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_upsert_keeps_newer_probe_state() {
        let registry = Registry::new();
        let mut probed = fixtures::minecraft(1, 100);
        probed.online = false;
        probed.players = 0;
        registry.upsert(probed);

        let mut stale_row = fixtures::minecraft(1, 50);
        stale_row.votes = serde_json::json!(8);
        registry.upsert(stale_row);

        let stored = registry.get(1).unwrap();
        assert!(!stored.online);
        assert_eq!(stored.updated, fixtures::at(100));
        assert_eq!(stored.votes, serde_json::json!(8));
    }

    #[test]
    fn test_stalest_prefers_oldest_then_lowest_id() {
        let registry: Registry<MinecraftServer> = Registry::new();
        assert!(registry.stalest_by(|r| r.updated).is_none());

        registry.upsert(fixtures::minecraft(3, 20));
        registry.upsert(fixtures::minecraft(2, 10));
        registry.upsert(fixtures::minecraft(1, 10));

        assert_eq!(registry.stalest_by(|r| r.updated).unwrap().id, 1);
    }

    #[test]
    fn test_apply_probe_ignores_unknown_ids() {
        let registry: Registry<MinecraftServer> = Registry::new();
        assert!(!registry.apply_probe(&fixtures::minecraft(5, 0)));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_dirty_snapshot_is_sorted() {
        let dirty = DirtySet::new();
        dirty.mark(9);
        dirty.mark(2);
        dirty.mark(5);

        let ids: Vec<u64> = dirty.snapshot().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![2, 5, 9]);
    }

    #[test]
    fn test_clear_keeps_ids_marked_after_snapshot() {
        let dirty = DirtySet::new();
        dirty.mark(1);
        dirty.mark(2);
        let snapshot = dirty.snapshot();

        dirty.mark(2);
        dirty.mark(3);

        assert_eq!(dirty.clear_flushed(&snapshot), 1);
        assert!(!dirty.contains(1));
        assert!(dirty.contains(2));
        assert!(dirty.contains(3));
    }
}
