//! # navlink-protocol
//!
//! Wire protocol for the external display link.
//!
//! This crate provides:
//! - Length-prefixed, zero-terminated binary framing
//! - The closed command set (PING, PONG, UPDATE_TIME, UPDATE_ROUTING_INFO)
//! - A buffering decoder for reassembling frames from a byte stream
//!
//! The crate does no I/O of its own; the client feeds it bytes.

pub mod codec;
pub mod command;
pub mod error;
pub mod frame;

pub use codec::Decoder;
pub use command::Command;
pub use error::ProtocolError;
pub use frame::{Frame, FRAME_OVERHEAD, MAX_WIRE_LEN, TERMINATOR};

/// Default TCP port external display units listen on.
pub const DEFAULT_PORT: u16 = 8080;
