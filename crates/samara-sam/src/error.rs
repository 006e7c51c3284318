//! Error types for SAM client operations

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use crate::wire::Reply;

/// Result type for SAM operations
pub type Result<T> = std::result::Result<T, SamError>;

/// Errors surfaced by the SAM client
#[derive(Error, Debug)]
pub enum SamError {
    #[error("SAM bridge refused handshake: {0}")]
    Handshake(Reply),

    #[error("name {name:?} not resolved: {reply}")]
    NameResolution { name: String, reply: Reply },

    #[error("session create failed: {0}")]
    SessionCreate(Reply),

    #[error("destination key generation failed: {0}")]
    KeyGeneration(Reply),

    #[error("destination unreachable: {0}")]
    Unreachable(Reply),

    #[error("stream accept failed: {0}")]
    AcceptFailed(Reply),

    #[error("datagram from unexpected source address {0}")]
    Source(SocketAddr),

    #[error("SAM connection died mid-reply (partial line {0:?})")]
    Disconnected(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{0} is not supported")]
    Unsupported(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl SamError {
    /// True for conditions that leave buffered protocol state intact and can
    /// be retried by issuing the same call again (a would-block or timed-out
    /// read). Everything else is final for the operation that raised it.
    pub fn is_retryable(&self) -> bool {
        match self {
            SamError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }
}
