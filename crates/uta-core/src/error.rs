//! Framework error type.
//!
//! Sub-crates define their own error enums and either convert into
//! `CoreError` via `From` impls or wrap it as one variant.  Both patterns
//! are acceptable; prefer whichever keeps error sites clean.

use thiserror::Error;

use crate::EntityId;

/// The top-level error type for `uta-core` and a common base for sub-crates.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("entity ID must not be empty")]
    EmptyEntityId,

    #[error("entity {0} not found")]
    EntityNotFound(EntityId),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Shorthand result type for all `uta-*` crates.
pub type CoreResult<T> = Result<T, CoreError>;
