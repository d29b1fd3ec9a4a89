//! Protocol error types.

use thiserror::Error;

/// Errors raised while framing or parsing display link traffic.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame too large: {size} bytes on the wire (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("truncated frame: {len} bytes before terminator (need at least 3)")]
    TruncatedFrame { len: usize },

    #[error("unknown command code: {0:#04x}")]
    UnknownCommand(u8),

    #[error("payload character {0:?} not representable in a single byte")]
    UnencodablePayload(char),
}
