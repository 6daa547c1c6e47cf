//! Error taxonomy for the PTY session engine.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("failed to allocate pty: {0}")]
    Pty(String),

    #[error("session {0} not found")]
    SessionMissing(String),

    #[error("session {0} expired")]
    SessionExpired(String),

    #[error("session {0} is closed")]
    SessionDead(String),

    #[error("persistence error: {0}")]
    Persist(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;
