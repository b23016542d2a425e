//! Receiver-side duplicate suppression.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uta_core::{DeliveryId, EntityId};

/// Per-sender high-water mark of accepted delivery IDs.
///
/// A message is new iff its `DeliveryId` is strictly greater than the mark
/// recorded for its sender (`ZERO` for unknown senders).  The map is
/// monotonic: [`record`][Self::record] never lowers a mark, so replaying
/// journaled `NoDuplicate` events in any order converges to the same filter.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupFilter {
    highest: BTreeMap<EntityId, DeliveryId>,
}

impl DedupFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` if `(sender, id)` has not been accepted before.
    pub fn is_new(&self, sender: &EntityId, id: DeliveryId) -> bool {
        id > self.high_water(sender)
    }

    /// Record an accepted delivery.  Lower-than-recorded IDs are ignored,
    /// which is what makes the filter monotonic.
    pub fn record(&mut self, sender: &EntityId, id: DeliveryId) {
        let mark = self.highest.entry(sender.clone()).or_insert(DeliveryId::ZERO);
        if id > *mark {
            *mark = id;
        }
    }

    /// The highest accepted ID for `sender` (`ZERO` if none).
    pub fn high_water(&self, sender: &EntityId) -> DeliveryId {
        self.highest.get(sender).copied().unwrap_or(DeliveryId::ZERO)
    }

    /// Number of senders with a recorded mark.
    pub fn sender_count(&self) -> usize {
        self.highest.len()
    }
}
