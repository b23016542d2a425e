use thiserror::Error;

use crate::SegmentTag;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("route segment {0:?} must not be empty")]
    EmptySegment(SegmentTag),

    #[error("segment tag {tag:?} does not belong to this route shape")]
    TagMismatch { tag: SegmentTag },

    #[error("index {index} out of bounds for segment {tag:?} of length {len}")]
    IndexOutOfBounds { tag: SegmentTag, index: usize, len: usize },

    #[error("step entity {id} has kind {actual} where {expected} is required")]
    StepKindMismatch { id: String, expected: &'static str, actual: String },
}

pub type RouteResult<T> = Result<T, RouteError>;
