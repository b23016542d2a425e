//! Top-level node configuration.
//!
//! Typically loaded from a JSON file by the application crate and passed to
//! the cluster builder.  Every field has a default so a test can spin up a
//! node with `NodeConfig::default()` and override only what it cares about.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ── RetryConfig ───────────────────────────────────────────────────────────────

/// Redelivery policy for unacknowledged reliable sends.
///
/// The n-th retry fires `min(base_ms * 2^n, cap_ms)` milliseconds after the
/// previous attempt, plus up to `jitter_ms` of random spread so retry storms
/// from many entities don't align.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Delay before the first retry, in milliseconds.
    pub base_ms: u64,

    /// Upper bound on the backoff delay, in milliseconds.
    pub cap_ms: u64,

    /// Random spread added to every delay, in milliseconds.
    pub jitter_ms: u64,

    /// Attempts after which the delivery is logged and dropped.
    /// `0` retries forever.
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_ms:      200,
            cap_ms:       10_000,
            jitter_ms:    50,
            max_attempts: 0,
        }
    }
}

// ── NodeConfig ────────────────────────────────────────────────────────────────

/// Configuration for one hosting process (which may run several logical
/// cluster nodes in tests).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Number of logical cluster nodes hosted by this process.
    pub node_count: usize,

    /// Number of shards the entity ID space is partitioned into.  Must not
    /// change across restarts of the same journal directory.
    pub shard_count: u32,

    /// Seconds between `SaveSnapshot` self-messages.
    pub snapshot_interval_secs: u64,

    /// Redelivery policy for reliable sends.
    pub retry: RetryConfig,

    /// Real milliseconds between time-broadcast ticks.
    pub tick_period_ms: u64,

    /// Total ticks to broadcast before the clock driver stops.
    /// `0` means run until shut down.
    pub total_ticks: u64,

    /// Master RNG seed (retry jitter).  The same seed produces the same
    /// jitter sequence.
    pub seed: u64,

    /// WebSocket visualization bind address.
    pub ws_bind: String,

    /// Directory for file-backed journals and snapshots.  `None` keeps all
    /// persistence in memory (tests, throwaway runs).
    pub journal_dir: Option<PathBuf>,

    /// `true` to fsync every journal append before reporting it durable.
    pub sync_writes: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_count:             1,
            shard_count:            16,
            snapshot_interval_secs: 10,
            retry:                  RetryConfig::default(),
            tick_period_ms:         1_000,
            total_ticks:            0,
            seed:                   0,
            ws_bind:                "0.0.0.0:6696".to_owned(),
            journal_dir:            None,
            sync_writes:            false,
        }
    }
}
