//! The `EventJournal` backend trait and its in-memory implementation.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Mutex;

use uta_core::SeqNr;

use crate::{JournalError, JournalResult};

// ── EventJournal ──────────────────────────────────────────────────────────────

/// Append-only per-entity event log.
///
/// Implementations must make `append` atomic and durable before returning:
/// once an append returns `Ok`, the event is visible to every later
/// `replay`, including after a process restart (for durable backends).
/// Conversely a failed append must never surface in a replay.
pub trait EventJournal: Send + Sync {
    /// Append one serialized event and return its assigned sequence number.
    ///
    /// Sequence numbers per key are dense and monotonic, starting at 1.
    fn append(&self, key: &str, payload: &[u8]) -> JournalResult<SeqNr>;

    /// All events with sequence number strictly greater than `after`,
    /// in append order.
    fn replay(&self, key: &str, after: SeqNr) -> JournalResult<Vec<(SeqNr, Vec<u8>)>>;

    /// Drop events with sequence number `<= up_to` (superseded by a
    /// snapshot).  Later events keep their sequence numbers.
    fn truncate(&self, key: &str, up_to: SeqNr) -> JournalResult<()>;

    /// The highest assigned sequence number for `key` (`SeqNr::ZERO` if the
    /// log is empty or the key is unknown).
    fn last_seq(&self, key: &str) -> JournalResult<SeqNr>;
}

// ── MemoryJournal ─────────────────────────────────────────────────────────────

/// Per-key log state: retained payloads plus the sequence number of the
/// first retained entry (entries before it were truncated away).
#[derive(Default)]
struct MemoryLog {
    /// Sequence number of `entries[0]` minus one; equivalently, how many
    /// events have been truncated or appended before the retained window.
    base: u64,
    entries: VecDeque<Vec<u8>>,
}

impl MemoryLog {
    fn last_seq(&self) -> SeqNr {
        SeqNr(self.base + self.entries.len() as u64)
    }
}

/// Heap-backed journal for tests and throwaway runs.
///
/// Durability scope is the process lifetime; within it the journal upholds
/// the same sequencing contract as the file backend.
#[derive(Default)]
pub struct MemoryJournal {
    logs: Mutex<HashMap<String, MemoryLog>>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventJournal for MemoryJournal {
    fn append(&self, key: &str, payload: &[u8]) -> JournalResult<SeqNr> {
        let mut logs = self.logs.lock().expect("journal lock poisoned");
        let log = logs.entry(key.to_owned()).or_default();
        log.entries.push_back(payload.to_vec());
        Ok(log.last_seq())
    }

    fn replay(&self, key: &str, after: SeqNr) -> JournalResult<Vec<(SeqNr, Vec<u8>)>> {
        let logs = self.logs.lock().expect("journal lock poisoned");
        let Some(log) = logs.get(key) else {
            return Ok(vec![]);
        };
        Ok(log
            .entries
            .iter()
            .enumerate()
            .map(|(i, payload)| (SeqNr(log.base + i as u64 + 1), payload.clone()))
            .filter(|(seq, _)| *seq > after)
            .collect())
    }

    fn truncate(&self, key: &str, up_to: SeqNr) -> JournalResult<()> {
        let mut logs = self.logs.lock().expect("journal lock poisoned");
        let Some(log) = logs.get_mut(key) else {
            return Ok(());
        };
        while log.base < up_to.0 {
            if log.entries.pop_front().is_none() {
                // A truncation bound above the last assigned seq means the
                // caller holds a snapshot this journal never produced.
                return Err(JournalError::Corrupt {
                    key:    key.to_owned(),
                    detail: format!("truncate to {up_to} beyond last seq {}", log.last_seq()),
                });
            }
            log.base += 1;
        }
        Ok(())
    }

    fn last_seq(&self, key: &str) -> JournalResult<SeqNr> {
        let logs = self.logs.lock().expect("journal lock poisoned");
        Ok(logs.get(key).map(MemoryLog::last_seq).unwrap_or(SeqNr::ZERO))
    }
}
