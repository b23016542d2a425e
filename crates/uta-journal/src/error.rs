use thiserror::Error;

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt journal for {key}: {detail}")]
    Corrupt { key: String, detail: String },
}

pub type JournalResult<T> = Result<T, JournalError>;
