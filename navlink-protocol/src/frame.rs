//! Binary frame format for the display link.
//!
//! Frame layout (2-byte length prefix + command + payload + terminator):
//!
//! ```text
//! +-----------------+------------+---------+------------------+------+
//! | (len >> 8)|0x80 | len & 0xFF | command | payload          | 0x00 |
//! |     1 byte      |   1 byte   | 1 byte  | len - 4 bytes    |1 byte|
//! +-----------------+------------+---------+------------------+------+
//! ```
//!
//! `len` is `payload_len + 4` (two length bytes, command byte, terminator).
//! It is a 15-bit value; the top bit of the first byte is a fixed marker.
//!
//! The read side is terminator-delimited: [`Frame::decode`] scans for the
//! first 0x00 byte and never consults the transmitted length field. A payload
//! byte of value 0 would therefore truncate the frame on read even though the
//! writer's length field disagrees. This asymmetry is a known fragility of
//! the deployed display firmware and is preserved here, which is why payload
//! text is restricted to a single-byte charset with NUL rejected up front.

use crate::command::Command;
use crate::error::ProtocolError;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Wire bytes a frame carries besides the payload (2 length + command + terminator).
pub const FRAME_OVERHEAD: usize = 4;

/// Maximum value of the 15-bit length field, and so of a whole frame.
pub const MAX_WIRE_LEN: usize = 1 << 15;

/// Marks the end of a frame on the wire.
pub const TERMINATOR: u8 = 0x00;

/// Marker bit forced onto the high length byte.
const LENGTH_MARKER: u8 = 0x80;

/// One unit of display link traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// What the peer should do with the payload.
    pub command: Command,
    /// Opaque payload bytes (single-byte charset, no NUL).
    pub payload: Bytes,
}

impl Frame {
    pub fn new(command: Command, payload: Bytes) -> Self {
        Self { command, payload }
    }

    /// Keepalive request (empty payload).
    pub fn ping() -> Self {
        Self::new(Command::Ping, Bytes::new())
    }

    /// Keepalive reply (empty payload).
    pub fn pong() -> Self {
        Self::new(Command::Pong, Bytes::new())
    }

    /// Clock sync frame: `millis` since local midnight as decimal ASCII.
    pub fn update_time(millis: u64) -> Self {
        Self::new(Command::UpdateTime, Bytes::from(millis.to_string()))
    }

    /// Routing-info push. The text must fit the single-byte charset.
    pub fn update_routing_info(text: &str) -> Result<Self, ProtocolError> {
        Ok(Self::new(Command::UpdateRoutingInfo, latin1_bytes(text)?))
    }

    /// Encodes the frame into wire bytes.
    pub fn encode(&self) -> Result<BytesMut, ProtocolError> {
        let wire_len = self.payload.len() + FRAME_OVERHEAD;
        if wire_len > MAX_WIRE_LEN {
            return Err(ProtocolError::FrameTooLarge {
                size: wire_len,
                max: MAX_WIRE_LEN,
            });
        }

        let mut buf = BytesMut::with_capacity(wire_len);
        buf.put_u8((wire_len >> 8) as u8 | LENGTH_MARKER);
        buf.put_u8((wire_len & 0xFF) as u8);
        buf.put_u8(self.command.code());
        buf.put_slice(&self.payload);
        buf.put_u8(TERMINATOR);
        Ok(buf)
    }

    /// Decodes one frame from the buffer, terminator-delimited.
    ///
    /// Returns `Ok(Some(frame))` if a terminator was found, `Ok(None)` if the
    /// frame is still incomplete, or `Err` on a malformed body. The length
    /// prefix bytes are carried in the body but deliberately not used to
    /// delimit the read (see the module docs).
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Self>, ProtocolError> {
        let pos = match buf.iter().position(|&b| b == TERMINATOR) {
            Some(pos) => pos,
            None => return Ok(None),
        };

        // Body = length prefix + command + payload; terminator dropped.
        let body = buf.split_to(pos).freeze();
        buf.advance(1);

        if body.len() < 3 {
            return Err(ProtocolError::TruncatedFrame { len: body.len() });
        }

        let command = Command::from_code(body[2])?;
        let payload = body.slice(3..);
        Ok(Some(Self { command, payload }))
    }
}

/// Encodes text one byte per character, rejecting anything outside the
/// Latin-1 range and NUL (which would collide with the terminator).
pub fn latin1_bytes(text: &str) -> Result<Bytes, ProtocolError> {
    let mut out = BytesMut::with_capacity(text.len());
    for ch in text.chars() {
        match u32::from(ch) {
            0 => return Err(ProtocolError::UnencodablePayload(ch)),
            code @ 1..=0xFF => out.put_u8(code as u8),
            _ => return Err(ProtocolError::UnencodablePayload(ch)),
        }
    }
    Ok(out.freeze())
}
