//! `uta-core` — foundational types for the `rust_uta` urban traffic actor
//! network.
//!
//! This crate is a dependency of every other `uta-*` crate.  It intentionally
//! has no `uta-*` dependencies and minimal external ones (only `serde` and
//! `thiserror`).
//!
//! # What lives here
//!
//! | Module      | Contents                                               |
//! |-------------|--------------------------------------------------------|
//! | [`ids`]     | `EntityId`, `EntityKind`, `DeliveryId`, `SeqNr`, `NodeName` |
//! | [`time`]    | `TimeValue`, `SimClock`                                |
//! | [`config`]  | `NodeConfig`, `RetryConfig`                            |
//! | [`error`]   | `CoreError`, `CoreResult`                              |
//!
//! Unlike a pure in-memory simulation core, every type here derives `serde`
//! unconditionally: IDs, times and configuration all end up inside journaled
//! events and snapshots, so serializability is not optional.

pub mod config;
pub mod error;
pub mod ids;
pub mod time;

#[cfg(test)]
mod tests;

// ── Re-exports ────────────────────────────────────────────────────────────────

pub use config::{NodeConfig, RetryConfig};
pub use error::{CoreError, CoreResult};
pub use ids::{DeliveryId, EntityId, EntityKind, NodeName, SeqNr};
pub use time::{SimClock, TimeValue};
