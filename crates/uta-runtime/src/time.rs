//! The `timeMessage` broadcast topic.
//!
//! Every entity subscribes at startup and receives monotonic `TimeValue`
//! ticks.  A `tokio::sync::broadcast` channel stands in for the original
//! publish/subscribe topic: subscription is the acknowledgement, and a
//! subscriber that falls behind observes a lag error and simply picks up at
//! the newest tick — ticks are idempotent, so skipping some is safe.

use tokio::sync::broadcast;
use tracing::{debug, info};
use uta_core::{NodeConfig, TimeValue};

/// Capacity of the tick channel; laggards skip ahead, so small is fine.
const TICK_BUFFER: usize = 64;

/// Publishes simulation time to every subscribed entity.
#[derive(Clone)]
pub struct TimeBroadcaster {
    tx: broadcast::Sender<TimeValue>,
}

impl Default for TimeBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeBroadcaster {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(TICK_BUFFER);
        Self { tx }
    }

    /// Subscribe; the returned receiver yields every future tick.
    pub fn subscribe(&self) -> broadcast::Receiver<TimeValue> {
        self.tx.subscribe()
    }

    /// Publish one tick.  Returns how many subscribers saw it.
    pub fn publish(&self, tick: TimeValue) -> usize {
        // An error only means there are no subscribers right now.
        self.tx.send(tick).unwrap_or(0)
    }

    /// Drive the clock: one tick every `config.tick_period_ms`, stopping
    /// after `config.total_ticks` (or never, when that is zero).
    pub async fn drive(&self, config: &NodeConfig) {
        let period = std::time::Duration::from_millis(config.tick_period_ms.max(1));
        let mut interval = tokio::time::interval(period);
        let mut now = TimeValue::ZERO;
        info!(period_ms = config.tick_period_ms, "time broadcast started");
        loop {
            interval.tick().await;
            now = now.offset(1);
            let listeners = self.publish(now);
            debug!(%now, listeners, "tick");
            if config.total_ticks != 0 && now.0 >= config.total_ticks {
                info!(%now, "time broadcast finished");
                return;
            }
        }
    }
}
