//! The traversal cursor: position, look-ahead/behind, segment transitions.

use serde::{Deserialize, Serialize};

use crate::{Route, RouteError, RouteResult, SegmentTag, Step};

/// How many steps the scanning window reaches behind and ahead of the
/// cursor.  Domain logic coordinates with the entities two steps back
/// through three steps forward.
const WINDOW_BEHIND: isize = 2;
const WINDOW_AHEAD: isize = 3;

// ── Advanced ──────────────────────────────────────────────────────────────────

/// Result of one cursor advancement.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Advanced {
    /// Moved to the next index within the same segment.
    Stepped,
    /// Overran the segment end and wrapped to index 0 of `now_on` — the
    /// following segment for triples, the same segment for singles.
    Wrapped { now_on: SegmentTag },
}

// ── Traversal ─────────────────────────────────────────────────────────────────

/// A mobile's cursor over its route.
///
/// Invariant (holds between any two public calls): the tag names a segment
/// of the route and `0 <= index < len(segment)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Traversal {
    route: Route,
    tag:   SegmentTag,
    index: usize,
}

impl Traversal {
    /// Start a traversal at the first step of the route's first segment.
    pub fn new(route: Route) -> Traversal {
        let tag = route.initial_tag();
        Traversal { route, tag, index: 0 }
    }

    /// Start a traversal at an explicit position (spawn mid-route, tests).
    pub fn with_position(route: Route, tag: SegmentTag, index: usize) -> RouteResult<Traversal> {
        let len = route.segment(tag)?.len();
        if index >= len {
            return Err(RouteError::IndexOutOfBounds { tag, index, len });
        }
        Ok(Traversal { route, tag, index })
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn tag(&self) -> SegmentTag {
        self.tag
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Length of the segment the cursor is currently on.
    pub fn segment_len(&self) -> usize {
        self.seg().len()
    }

    /// The current segment's steps.  Total because the constructors only
    /// ever pair a tag with a route shape that has it.
    fn seg(&self) -> &[Step] {
        self.route.segment(self.tag).expect("tag matches route shape by construction")
    }

    // ── Lookups ───────────────────────────────────────────────────────────

    /// The step under the cursor.
    pub fn current_step(&self) -> &Step {
        &self.seg()[self.index]
    }

    /// The step at signed logical `offset` from the cursor.
    ///
    /// Positive offsets wrap modulo the cycle length.  Negative logical
    /// targets use the preserved partial wrap `target = total_len + offset`
    /// (see the crate docs); offsets below `-total_len` have no defined
    /// target and return `None`.
    pub fn step_at(&self, offset: isize) -> Option<&Step> {
        let len = self.route.total_len() as isize;
        if len == 0 {
            return None;
        }
        let base = self.route.base_of(self.tag).ok()? as isize;
        let target = base + self.index as isize + offset;
        let target = if target < 0 { len + offset } else { target % len };
        if target < 0 {
            return None;
        }
        self.route.logical_step(target as usize)
    }

    /// The step behind the cursor.
    ///
    /// At `index == 0` this is the last step of the previous segment (for
    /// triples) or of the same segment (for singles); otherwise it is the
    /// step at `index - 1`.
    pub fn previous_step(&self) -> &Step {
        if self.index > 0 {
            return &self.seg()[self.index - 1];
        }
        let prev = self
            .route
            .segment(self.tag.prev())
            .expect("tag matches route shape by construction");
        &prev[prev.len() - 1]
    }

    /// The six-step scanning window at offsets `-2, -1, 0, +1, +2, +3`.
    ///
    /// Slots whose offset has no defined target (routes shorter than the
    /// window) are `None`.
    pub fn step_sequence(&self) -> [Option<&Step>; 6] {
        let mut window = [None; 6];
        for (slot, offset) in (-WINDOW_BEHIND..=WINDOW_AHEAD).enumerate() {
            window[slot] = self.step_at(offset);
        }
        window
    }

    // ── Advancement ───────────────────────────────────────────────────────

    /// Move the cursor one step forward, wrapping into the next segment on
    /// overrun.  The struct invariant holds on return.
    pub fn advance(&mut self) -> Advanced {
        self.index += 1;
        if self.index < self.segment_len() {
            return Advanced::Stepped;
        }
        self.tag = self.tag.next();
        self.index = 0;
        Advanced::Wrapped { now_on: self.tag }
    }
}
