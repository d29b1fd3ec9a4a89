//! Client error types.

use navlink_protocol::{Command, ProtocolError};
use thiserror::Error;

/// Errors on the display link.
///
/// None of these are fatal: a failed action drops the socket and the next
/// keepalive interval drives a fresh connection attempt.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("not connected")]
    NotConnected,

    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error("no reply within the deadline")]
    Timeout,

    #[error("unexpected reply: {0}")]
    UnexpectedReply(Command),
}
