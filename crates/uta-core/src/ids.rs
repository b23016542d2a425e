//! Entity identity and typed counter wrappers.
//!
//! Every entity in the network is addressed by a stable string ID whose
//! *first character* encodes its kind: `R` road, `L` lane, `C` crossroad,
//! `P` pedestrian crossing, `B` bus stop, `T` tram stop, `Z` zone.  Any
//! other first character falls into the mobile namespace (scenario files use
//! `V-…` for vehicles and `M-…` for pedestrians; both are mobiles).
//!
//! The kind tag is authoritative for dispatch: routing, spawning and journal
//! keying all derive the kind from the ID and never store it separately.
//!
//! `DeliveryId` and `SeqNr` are zero-cost `u64` wrappers so that delivery
//! tracking and journal sequencing cannot be mixed up at compile time.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ── EntityKind ────────────────────────────────────────────────────────────────

/// The kind of an entity, derived from the first character of its ID.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub enum EntityKind {
    Road,
    Lane,
    Crossroad,
    PedestrianCrossing,
    BusStop,
    TramStop,
    Zone,
    /// Anything outside the static tag space: pedestrians, cars, buses, trams.
    Mobile,
}

impl EntityKind {
    /// Map an ID's first character to its kind.
    ///
    /// The seven static tags are fixed; every other character is the mobile
    /// namespace.
    pub fn from_tag(tag: char) -> EntityKind {
        match tag {
            'R' => EntityKind::Road,
            'L' => EntityKind::Lane,
            'C' => EntityKind::Crossroad,
            'P' => EntityKind::PedestrianCrossing,
            'B' => EntityKind::BusStop,
            'T' => EntityKind::TramStop,
            'Z' => EntityKind::Zone,
            _   => EntityKind::Mobile,
        }
    }

    /// `true` for the seven static map-feature kinds.
    #[inline]
    pub fn is_immovable(self) -> bool {
        !matches!(self, EntityKind::Mobile)
    }

    /// `true` for pedestrians, cars, buses and trams.
    #[inline]
    pub fn is_mobile(self) -> bool {
        matches!(self, EntityKind::Mobile)
    }

    /// Stable label used in persistence keys and log output.
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Road               => "Road",
            EntityKind::Lane               => "Lane",
            EntityKind::Crossroad          => "Crossroad",
            EntityKind::PedestrianCrossing => "PedestrianCrossing",
            EntityKind::BusStop            => "BusStop",
            EntityKind::TramStop           => "TramStop",
            EntityKind::Zone               => "Zone",
            EntityKind::Mobile             => "Mobile",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── EntityId ──────────────────────────────────────────────────────────────────

/// A stable, kind-tagged entity identifier.
///
/// Construct via [`EntityId::new`], which rejects empty strings — the kind
/// tag lives in the first character, so an empty ID has no kind.  The inner
/// string is immutable after construction.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Validate and wrap an ID string.
    pub fn new(id: impl Into<String>) -> Result<EntityId, CoreError> {
        let id = id.into();
        if id.is_empty() {
            return Err(CoreError::EmptyEntityId);
        }
        Ok(EntityId(id))
    }

    /// The kind encoded in the first character.
    pub fn kind(&self) -> EntityKind {
        // new() guarantees at least one character.
        EntityKind::from_tag(self.0.chars().next().unwrap_or('\0'))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The key under which this entity's journal and snapshots are stored:
    /// `"<EntityKind>Actor-<id>"`.
    pub fn persistence_key(&self) -> String {
        format!("{}Actor-{}", self.kind(), self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ── Typed counters ────────────────────────────────────────────────────────────

/// Generate a typed wrapper around a `u64` counter.
macro_rules! typed_counter {
    ($(#[$attr:meta])* $vis:vis struct $name:ident;) => {
        $(#[$attr])*
        #[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Default,
                 Serialize, Deserialize)]
        #[serde(transparent)]
        $vis struct $name(pub u64);

        impl $name {
            pub const ZERO: $name = $name(0);

            /// The next value in the sequence.
            #[inline]
            pub fn next(self) -> $name {
                $name(self.0 + 1)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

typed_counter! {
    /// Strictly increasing per-sender tag on reliable messages.  `ZERO` means
    /// "nothing accepted yet"; the first assigned ID is 1.
    pub struct DeliveryId;
}

typed_counter! {
    /// Per-entity journal sequence number.  Dense and monotonic: the first
    /// journaled event gets 1, with no gaps thereafter.
    pub struct SeqNr;
}

// ── NodeName ──────────────────────────────────────────────────────────────────

/// Logical cluster node identifier (`node-0`, `node-1`, …).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeName(pub String);

impl NodeName {
    /// Conventional name for the node hosting shard index `idx`.
    pub fn for_index(idx: usize) -> NodeName {
        NodeName(format!("node-{idx}"))
    }
}

impl fmt::Display for NodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
