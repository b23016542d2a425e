//! `uta-runtime` — the reliable persistent-actor layer.
//!
//! Hosts every entity as one tokio task with a private mailbox, which gives
//! the per-entity serialization the domain layer's decide/apply contract
//! requires while different entities run freely in parallel on the shared
//! worker pool.
//!
//! # Crate layout
//!
//! | Module       | Contents                                               |
//! |--------------|--------------------------------------------------------|
//! | [`shard`]    | Stable entity→shard→node assignment (FNV-1a)           |
//! | [`entity`]   | The per-entity command/recovery loop                   |
//! | [`node`]     | `Cluster`, `Node`, find-or-spawn registry, injection   |
//! | [`time`]     | The `timeMessage` broadcast topic and clock driver     |
//! | [`error`]    | `RuntimeError`, `RuntimeResult<T>`                     |
//!
//! # The command loop, in one paragraph
//!
//! For every incoming `Request(delivery_id, command)` the entity first acks
//! receipt, then drops the command if the dedup filter has seen it, then
//! journals `NoDuplicate` and the decision's domain events **in order,
//! each durable before it is applied**, and only then executes outbound
//! effects.  Reliable sends are journaled (`OutboundRecorded`) before the
//! wire sees them and retried on a timer until the matching ack journals
//! `OutboundConfirmed`.  Recovery is the same `apply` path fed from the
//! snapshot and the journal, with effects suppressed; commands that arrive
//! during recovery wait in the mailbox.

pub mod entity;
pub mod error;
pub mod node;
pub mod shard;
pub mod time;


pub use error::{RuntimeError, RuntimeResult};
pub use node::{Cluster, Node, Services};
pub use shard::{shard_of, ShardTopology};
pub use time::TimeBroadcaster;
