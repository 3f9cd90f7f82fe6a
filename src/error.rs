//! Crate-wide error taxonomy.
//!
//! Input problems (`InvalidArgument`, `Unauthorized`) are detected before any
//! network call is attempted. `Transport` wraps failures from the external
//! identity/store/inference vendors. `Decode` covers a single store record
//! that failed to parse.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("transport failure: {0}")]
    Transport(anyhow::Error),

    #[error("record decode failed: {0}")]
    Decode(String),
}

impl ScanError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        ScanError::InvalidArgument(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        ScanError::Unauthorized(msg.into())
    }

    pub fn transport(err: impl Into<anyhow::Error>) -> Self {
        ScanError::Transport(err.into())
    }
}

pub type ScanResult<T> = Result<T, ScanError>;
