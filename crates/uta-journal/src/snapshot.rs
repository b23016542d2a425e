//! The `SnapshotStore` backend trait and its in-memory implementation.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use uta_core::{SeqNr, TimeValue};

use crate::JournalResult;

// ── SnapshotMeta ──────────────────────────────────────────────────────────────

/// Metadata stored alongside every snapshot blob.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    /// Sequence number of the last event included in the snapshot.
    pub seq_nr: SeqNr,
    /// Simulation time at which the snapshot was taken.
    pub timestamp: TimeValue,
}

// ── SnapshotStore ─────────────────────────────────────────────────────────────

/// Per-entity store of state snapshots.
///
/// A store may retain several snapshots per key at once: the runtime saves a
/// new one first and schedules deletion of the older generation only after
/// the save succeeded, so there is always at least one durable snapshot.
pub trait SnapshotStore: Send + Sync {
    /// Durably store one state blob tagged with `meta`.
    fn save(&self, key: &str, meta: SnapshotMeta, state: &[u8]) -> JournalResult<()>;

    /// The snapshot with the highest sequence number, if any.
    fn latest(&self, key: &str) -> JournalResult<Option<(SnapshotMeta, Vec<u8>)>>;

    /// Delete every snapshot with sequence number strictly below
    /// `older_than`.  Deleting snapshots that do not exist is a no-op, so
    /// a missed deletion is retried for free on the next rotation.
    fn delete(&self, key: &str, older_than: SeqNr) -> JournalResult<()>;
}

// ── MemorySnapshots ───────────────────────────────────────────────────────────

/// Heap-backed snapshot store for tests and throwaway runs.
#[derive(Default)]
pub struct MemorySnapshots {
    snaps: Mutex<HashMap<String, BTreeMap<SeqNr, (SnapshotMeta, Vec<u8>)>>>,
}

impl MemorySnapshots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of retained snapshots for `key` (test helper).
    pub fn count(&self, key: &str) -> usize {
        let snaps = self.snaps.lock().expect("snapshot lock poisoned");
        snaps.get(key).map_or(0, BTreeMap::len)
    }
}

impl SnapshotStore for MemorySnapshots {
    fn save(&self, key: &str, meta: SnapshotMeta, state: &[u8]) -> JournalResult<()> {
        let mut snaps = self.snaps.lock().expect("snapshot lock poisoned");
        snaps
            .entry(key.to_owned())
            .or_default()
            .insert(meta.seq_nr, (meta, state.to_vec()));
        Ok(())
    }

    fn latest(&self, key: &str) -> JournalResult<Option<(SnapshotMeta, Vec<u8>)>> {
        let snaps = self.snaps.lock().expect("snapshot lock poisoned");
        Ok(snaps
            .get(key)
            .and_then(|by_seq| by_seq.last_key_value())
            .map(|(_, entry)| entry.clone()))
    }

    fn delete(&self, key: &str, older_than: SeqNr) -> JournalResult<()> {
        let mut snaps = self.snaps.lock().expect("snapshot lock poisoned");
        if let Some(by_seq) = snaps.get_mut(key) {
            *by_seq = by_seq.split_off(&older_than);
        }
        Ok(())
    }
}
