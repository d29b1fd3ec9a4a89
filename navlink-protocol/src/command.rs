//! The display link command set.

use crate::error::ProtocolError;
use std::fmt;

/// Commands understood by the external display.
///
/// The set is closed: a frame carrying any other code is rejected at decode
/// time. Codes are part of the wire contract and must remain stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    /// Keepalive request, sent by the host.
    Ping = 0x01,
    /// Keepalive reply, sent by the display.
    Pong = 0x02,
    /// Clock sync: payload is decimal milliseconds since local midnight.
    UpdateTime = 0x08,
    /// Navigation push: payload is an opaque routing-info string.
    UpdateRoutingInfo = 0x10,
}

impl Command {
    /// Returns the wire code for this command.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Parses a wire code into a command.
    pub fn from_code(code: u8) -> Result<Self, ProtocolError> {
        match code {
            0x01 => Ok(Command::Ping),
            0x02 => Ok(Command::Pong),
            0x08 => Ok(Command::UpdateTime),
            0x10 => Ok(Command::UpdateRoutingInfo),
            other => Err(ProtocolError::UnknownCommand(other)),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Ping => write!(f, "PING"),
            Command::Pong => write!(f, "PONG"),
            Command::UpdateTime => write!(f, "UPDATE_TIME"),
            Command::UpdateRoutingInfo => write!(f, "UPDATE_ROUTING_INFO"),
        }
    }
}
