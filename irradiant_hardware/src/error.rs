use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("device timeout")]
    Timeout,
    #[error("output task did not complete before the deadline")]
    DoneTimeout,
    #[error("invalid output buffer: {0}")]
    InvalidBuffer(String),
    #[error("output task not loaded or not started")]
    NotStarted,
    #[error("device closed")]
    Closed,
    #[error("unsupported backend: {0}")]
    Unsupported(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
