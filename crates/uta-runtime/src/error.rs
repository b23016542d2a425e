use thiserror::Error;
use uta_journal::JournalError;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("journal error: {0}")]
    Journal(#[from] JournalError),

    #[error("event codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("recovery failed for {key}: {detail}")]
    Recovery { key: String, detail: String },
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
