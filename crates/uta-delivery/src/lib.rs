//! `uta-delivery` — the two halves of at-least-once messaging.
//!
//! Reliable delivery between entities is built from a sender-side
//! [`DeliveryTracker`] (assign a strictly increasing `DeliveryId`, retry
//! until acknowledged) and a receiver-side [`DedupFilter`] (per-sender
//! high-water mark; anything at or below it already happened).
//!
//! Both are plain state machines: no timers, no I/O, no async.  The caller
//! passes the current time into every method that needs one, which is what
//! keeps retry scheduling unit-testable with synthetic clocks.  The runtime
//! crate owns the actual tokio timers and journaling.
//!
//! # Crate layout
//!
//! | Module      | Contents                                       |
//! |-------------|------------------------------------------------|
//! | [`tracker`] | `DeliveryTracker`, `PendingSend`, `DeliveryState` |
//! | [`dedup`]   | `DedupFilter`                                  |
//! | [`backoff`] | `BackoffPolicy`                                |

pub mod backoff;
pub mod dedup;
pub mod tracker;

#[cfg(test)]
mod tests;

pub use backoff::BackoffPolicy;
pub use dedup::DedupFilter;
pub use tracker::{DeliveryState, DeliveryTracker, PendingSend};
