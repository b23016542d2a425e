//! Simulation time model.
//!
//! # Design
//!
//! Time is a monotonically increasing `TimeValue` counter published by the
//! time broadcaster.  Entities never read a wall clock; the only time they
//! observe is the tick stream, which makes wake-up decisions replayable.
//! The mapping to wall-clock time lives in `SimClock` and is used for log
//! formatting only:
//!
//!   wall_time = start_unix_secs + tick * tick_period_ms / 1000
//!
//! Using an integer tick as the canonical unit keeps all sleep/wake
//! arithmetic exact and comparisons O(1).

use std::fmt;

use serde::{Deserialize, Serialize};

// ── TimeValue ─────────────────────────────────────────────────────────────────

/// An absolute simulation time, in ticks since the run started.
///
/// Stored as `u64`; at one tick per millisecond a `u64` outlasts any
/// conceivable run.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default,
         Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeValue(pub u64);

impl TimeValue {
    pub const ZERO: TimeValue = TimeValue(0);

    /// The time `n` ticks after `self`.
    #[inline]
    pub fn offset(self, n: u64) -> TimeValue {
        TimeValue(self.0 + n)
    }

    /// Ticks elapsed from `earlier` to `self`, saturating at zero.
    #[inline]
    pub fn since(self, earlier: TimeValue) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl std::ops::Add<u64> for TimeValue {
    type Output = TimeValue;
    #[inline]
    fn add(self, rhs: u64) -> TimeValue {
        TimeValue(self.0 + rhs)
    }
}

impl fmt::Display for TimeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

// ── SimClock ──────────────────────────────────────────────────────────────────

/// Converts between tick counts and wall-clock seconds, for logging.
///
/// `SimClock` is cheap to copy and holds no heap data.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimClock {
    /// Unix timestamp (seconds since epoch) of tick 0.
    pub start_unix_secs: i64,
    /// How many real milliseconds one tick represents.
    pub tick_period_ms: u64,
    /// The current tick, advanced by [`SimClock::advance`].
    pub current: TimeValue,
}

impl SimClock {
    pub fn new(start_unix_secs: i64, tick_period_ms: u64) -> Self {
        Self {
            start_unix_secs,
            tick_period_ms,
            current: TimeValue::ZERO,
        }
    }

    /// Advance the clock by one tick and return the new time.
    #[inline]
    pub fn advance(&mut self) -> TimeValue {
        self.current = TimeValue(self.current.0 + 1);
        self.current
    }

    /// Elapsed simulated seconds since tick 0.
    #[inline]
    pub fn elapsed_secs(&self) -> i64 {
        (self.current.0 * self.tick_period_ms / 1_000) as i64
    }

    /// Current Unix timestamp corresponding to `current`.
    #[inline]
    pub fn current_unix_secs(&self) -> i64 {
        self.start_unix_secs + self.elapsed_secs()
    }
}

impl fmt::Display for SimClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (+{}s)", self.current, self.elapsed_secs())
    }
}
