//! `uta-journal` — append-only event logs and snapshot storage.
//!
//! Every persistent entity owns one event log and at most a handful of
//! snapshots, all keyed by the entity's persistence key
//! (`"<EntityKind>Actor-<id>"`).  The runtime serializes events before they
//! reach this crate, so both backends deal in opaque byte payloads and know
//! nothing about the domain.
//!
//! # Crate layout
//!
//! | Module       | Contents                                                |
//! |--------------|---------------------------------------------------------|
//! | [`journal`]  | `EventJournal` trait, `MemoryJournal`                   |
//! | [`snapshot`] | `SnapshotStore` trait, `SnapshotMeta`, `MemorySnapshots`|
//! | [`file`]     | `FileJournal`, `FileSnapshots` (length-prefixed frames) |
//! | [`error`]    | `JournalError`, `JournalResult<T>`                      |
//!
//! # Guarantees
//!
//! - Sequence numbers per key are dense and monotonic, starting at 1.
//! - A failed append is never visible to later replays (the file backend
//!   discards torn tail frames when a log is opened).
//! - Concurrent appends for *different* keys never interfere; appends for
//!   the same key are serialized by the backend.

pub mod error;
pub mod file;
pub mod journal;
pub mod snapshot;

#[cfg(test)]
mod tests;

pub use error::{JournalError, JournalResult};
pub use file::{FileJournal, FileSnapshots};
pub use journal::{EventJournal, MemoryJournal};
pub use snapshot::{MemorySnapshots, SnapshotMeta, SnapshotStore};
