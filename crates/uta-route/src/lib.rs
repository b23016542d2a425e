//! `uta-route` — composite cyclic routes and the traversal cursor.
//!
//! # Cycle model
//!
//! Pedestrians and cars carry a **triple** route: three segments
//! (house→work, work→fun, fun→home) traversed cyclically in that order.
//! Buses and trams carry a **single** cyclic segment.  A mobile's position
//! is a `(segment tag, index)` cursor; all comparisons against "the current
//! segment" are tag matches, never reference identity.
//!
//! # Crate layout
//!
//! | Module        | Contents                                        |
//! |---------------|-------------------------------------------------|
//! | [`step`]      | `Step` — kind-tagged waypoint                   |
//! | [`route`]     | `Route`, `SegmentTag`                           |
//! | [`traversal`] | `Traversal` — cursor, look-ahead, wrap-around   |
//! | [`error`]     | `RouteError`, `RouteResult<T>`                  |
//!
//! # Wrap-around semantics
//!
//! [`Traversal::step_at`] preserves the reference behavior for negative
//! logical targets exactly: when `base + index + offset` is negative, the
//! target becomes `total_len + offset` — a *partial* wrap that is only a
//! true modular wrap when the cursor sits at the very start of the cycle.
//! It is well-defined for `-total_len <= offset < 0`, and every caller in
//! this workspace stays within `-2..=+3` (the scanning window).  Do not
//! "fix" this to a double-mod wrap; tests pin the preserved formula.

pub mod error;
pub mod route;
pub mod step;
pub mod traversal;

#[cfg(test)]
mod tests;

pub use error::{RouteError, RouteResult};
pub use route::{Route, SegmentTag};
pub use step::Step;
pub use traversal::{Advanced, Traversal};
