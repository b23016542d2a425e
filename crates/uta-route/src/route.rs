//! Route descriptors: the cyclic triple and the cyclic single.

use serde::{Deserialize, Serialize};

use crate::{RouteError, RouteResult, Step};

// ── SegmentTag ────────────────────────────────────────────────────────────────

/// Names one segment of a route.
///
/// The tag is what a traversal cursor stores instead of a segment
/// reference; "which segment am I on" becomes a tag match.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum SegmentTag {
    HouseToWork,
    WorkToFun,
    FunToHome,
    /// The only segment of a single-segment (bus/tram) route.
    Single,
}

impl SegmentTag {
    /// The segment entered when this one's end is overrun.
    pub fn next(self) -> SegmentTag {
        match self {
            SegmentTag::HouseToWork => SegmentTag::WorkToFun,
            SegmentTag::WorkToFun   => SegmentTag::FunToHome,
            SegmentTag::FunToHome   => SegmentTag::HouseToWork,
            SegmentTag::Single      => SegmentTag::Single,
        }
    }

    /// The segment that precedes this one in the cycle.
    pub fn prev(self) -> SegmentTag {
        match self {
            SegmentTag::HouseToWork => SegmentTag::FunToHome,
            SegmentTag::WorkToFun   => SegmentTag::HouseToWork,
            SegmentTag::FunToHome   => SegmentTag::WorkToFun,
            SegmentTag::Single      => SegmentTag::Single,
        }
    }
}

// ── Route ─────────────────────────────────────────────────────────────────────

/// A mobile's complete route descriptor.
///
/// Exactly one shape is ever set per mobile (the enum is total), which is
/// what makes the "no route" defect branch of index-overrun handling
/// unrepresentable: empty segments are rejected here, at construction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Route {
    /// Pedestrian/car: three segments traversed cyclically in order.
    Triple {
        house_to_work: Vec<Step>,
        work_to_fun:   Vec<Step>,
        fun_to_home:   Vec<Step>,
    },
    /// Bus/tram: one cyclic segment.
    Single { steps: Vec<Step> },
}

impl Route {
    /// Build a cyclic-triple route, validating every step.
    pub fn triple(
        house_to_work: Vec<Step>,
        work_to_fun:   Vec<Step>,
        fun_to_home:   Vec<Step>,
    ) -> RouteResult<Route> {
        for (tag, seg) in [
            (SegmentTag::HouseToWork, &house_to_work),
            (SegmentTag::WorkToFun, &work_to_fun),
            (SegmentTag::FunToHome, &fun_to_home),
        ] {
            validate_segment(tag, seg)?;
        }
        Ok(Route::Triple { house_to_work, work_to_fun, fun_to_home })
    }

    /// Build a cyclic-single route, validating every step.
    pub fn single(steps: Vec<Step>) -> RouteResult<Route> {
        validate_segment(SegmentTag::Single, &steps)?;
        Ok(Route::Single { steps })
    }

    /// The tag a fresh traversal of this route starts on.
    pub fn initial_tag(&self) -> SegmentTag {
        match self {
            Route::Triple { .. } => SegmentTag::HouseToWork,
            Route::Single { .. } => SegmentTag::Single,
        }
    }

    /// The steps of the named segment, or an error if `tag` does not belong
    /// to this route shape.
    pub fn segment(&self, tag: SegmentTag) -> RouteResult<&[Step]> {
        match (self, tag) {
            (Route::Triple { house_to_work, .. }, SegmentTag::HouseToWork) => Ok(house_to_work),
            (Route::Triple { work_to_fun, .. }, SegmentTag::WorkToFun)     => Ok(work_to_fun),
            (Route::Triple { fun_to_home, .. }, SegmentTag::FunToHome)     => Ok(fun_to_home),
            (Route::Single { steps }, SegmentTag::Single)                  => Ok(steps),
            _ => Err(RouteError::TagMismatch { tag }),
        }
    }

    /// Sum of all segment lengths — the cycle length `L`.
    pub fn total_len(&self) -> usize {
        match self {
            Route::Triple { house_to_work, work_to_fun, fun_to_home } => {
                house_to_work.len() + work_to_fun.len() + fun_to_home.len()
            }
            Route::Single { steps } => steps.len(),
        }
    }

    /// Logical offset of the named segment's first step within the
    /// concatenated cycle (the prefix sum of earlier segment lengths).
    pub fn base_of(&self, tag: SegmentTag) -> RouteResult<usize> {
        match (self, tag) {
            (Route::Triple { .. }, SegmentTag::HouseToWork) => Ok(0),
            (Route::Triple { house_to_work, .. }, SegmentTag::WorkToFun) => {
                Ok(house_to_work.len())
            }
            (Route::Triple { house_to_work, work_to_fun, .. }, SegmentTag::FunToHome) => {
                Ok(house_to_work.len() + work_to_fun.len())
            }
            (Route::Single { .. }, SegmentTag::Single) => Ok(0),
            _ => Err(RouteError::TagMismatch { tag }),
        }
    }

    /// The step at logical position `pos` of the concatenated cycle.
    ///
    /// `None` when `pos >= total_len()`.
    pub fn logical_step(&self, pos: usize) -> Option<&Step> {
        match self {
            Route::Triple { house_to_work, work_to_fun, fun_to_home } => {
                let mut pos = pos;
                for seg in [house_to_work, work_to_fun, fun_to_home] {
                    if pos < seg.len() {
                        return Some(&seg[pos]);
                    }
                    pos -= seg.len();
                }
                None
            }
            Route::Single { steps } => steps.get(pos),
        }
    }
}

fn validate_segment(tag: SegmentTag, steps: &[Step]) -> RouteResult<()> {
    if steps.is_empty() {
        return Err(RouteError::EmptySegment(tag));
    }
    for step in steps {
        step.validate()?;
    }
    Ok(())
}
