//! Byte-level codec for the legacy fixed-layout protocol.
//!
//! Every unit starts with an 8-byte header:
//!
//! ```text
//! byte 0      packet marker (0x53)
//! bytes 1..3  channel (u16 little-endian, byte 2 is always zero)
//! bytes 3..7  message id (u32 little-endian, only byte 3 is ever used)
//! byte 7      padding
//! ```
//!
//! Only the first four bytes are needed to classify a unit. Scalars and
//! fixed blocks are written with bincode's fixed-int little-endian encoding,
//! which matches the legacy bit stream for byte-aligned fields. Text is carried
//! as UCS-2: characters outside the Basic Multilingual Plane keep only their low
//! 16 bits, exactly like the peers this server talks to.

use crate::ids::Channel;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io;
use thiserror::Error;

/// Byte 0 of every user message.
pub const PACKET_MARKER: u8 = 0x53;
/// Full header length; bodies start at this offset.
pub const HEADER_LEN: usize = 8;
/// Bytes needed to read the channel and message id.
pub const MIN_HEADER_LEN: usize = 4;
/// Width of a display name field in UTF-16 units.
pub const NAME_UNITS: usize = 33;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("unit of {0} bytes is shorter than the {MIN_HEADER_LEN}-byte header")]
    MalformedHeader(usize),
    #[error("truncated input at byte {offset}: {needed} more bytes needed")]
    Truncated { offset: usize, needed: usize },
    #[error("invalid field at byte {offset}: {reason}")]
    Invalid { offset: usize, reason: String },
    #[error("unexpected message: expected {expected}, found channel {channel} id {message_id}")]
    UnexpectedMessage {
        expected: &'static str,
        channel: u8,
        message_id: u8,
    },
}

/// Returns the 8-byte header for a message.
pub fn encode_header(channel: Channel, message_id: impl Into<u32>) -> [u8; HEADER_LEN] {
    let channel = (channel as u16).to_le_bytes();
    let message_id = message_id.into().to_le_bytes();
    [
        PACKET_MARKER,
        channel[0],
        channel[1],
        message_id[0],
        message_id[1],
        message_id[2],
        message_id[3],
        0,
    ]
}

/// Reads the raw `(channel, message id)` bytes of a unit.
///
/// The channel byte is returned unparsed so that the caller can decide how to
/// treat channels it does not recognise.
pub fn decode_header(unit: &[u8]) -> Result<(u8, u8), WireError> {
    if unit.len() < MIN_HEADER_LEN {
        return Err(WireError::MalformedHeader(unit.len()));
    }
    Ok((unit[1], unit[3]))
}

/// Converts text to UCS-2 units. Code points above U+FFFF are truncated to
/// their low 16 bits.
pub fn to_units(text: &str) -> Vec<u16> {
    text.chars().map(|c| c as u32 as u16).collect()
}

/// Converts UCS-2 units back to a string, replacing unpaired surrogates.
pub fn from_units(units: &[u16]) -> String {
    char::decode_utf16(units.iter().copied())
        .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

/// Bounds-checked cursor over a received unit.
#[derive(Debug, Clone)]
pub struct WireReader<'a> {
    buf: &'a [u8],
    consumed: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, consumed: 0 }
    }

    /// Reader positioned after the header. Units between 4 and 8 bytes long
    /// have an empty body.
    pub fn body(unit: &'a [u8]) -> Self {
        let start = HEADER_LEN.min(unit.len());
        Self {
            buf: &unit[start..],
            consumed: start,
        }
    }

    pub fn position(&self) -> usize {
        self.consumed
    }

    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    /// Everything not read yet.
    pub fn rest(&self) -> &'a [u8] {
        self.buf
    }

    fn ensure(&self, needed: usize) -> Result<(), WireError> {
        if self.buf.len() < needed {
            return Err(WireError::Truncated {
                offset: self.consumed,
                needed: needed - self.buf.len(),
            });
        }
        Ok(())
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], WireError> {
        self.ensure(len)?;
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        self.consumed += len;
        Ok(head)
    }

    /// Decodes a scalar or fixed block.
    pub fn read<T: DeserializeOwned>(&mut self) -> Result<T, WireError> {
        let mut cursor = self.buf;
        let value = bincode::deserialize_from(&mut cursor).map_err(|e| match *e {
            bincode::ErrorKind::Io(ref io) if io.kind() == io::ErrorKind::UnexpectedEof => {
                WireError::Truncated {
                    offset: self.consumed,
                    needed: 1,
                }
            }
            other => WireError::Invalid {
                offset: self.consumed,
                reason: other.to_string(),
            },
        })?;
        let used = self.buf.len() - cursor.len();
        self.buf = cursor;
        self.consumed += used;
        Ok(value)
    }

    pub fn skip(&mut self, len: usize) -> Result<(), WireError> {
        self.take(len).map(|_| ())
    }

    pub fn read_bool(&mut self) -> Result<bool, WireError> {
        Ok(self.read::<u8>()? != 0)
    }

    /// Reads `count` UTF-16 units. The length is checked against the input
    /// before anything is allocated.
    pub fn read_units(&mut self, count: usize) -> Result<Vec<u16>, WireError> {
        let needed = count.checked_mul(2).ok_or_else(|| WireError::Invalid {
            offset: self.consumed,
            reason: format!("unit count {count} overflows"),
        })?;
        let raw = self.take(needed)?;
        Ok(raw
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect())
    }

    /// Reads a u32 unit count followed by that many units.
    pub fn read_text(&mut self) -> Result<Vec<u16>, WireError> {
        let count: u32 = self.read()?;
        self.read_units(count as usize)
    }

    /// Reads a fixed-width name field, stopping at the first zero unit.
    pub fn read_fixed_name(&mut self, width: usize) -> Result<String, WireError> {
        let units = self.read_units(width)?;
        let len = units.iter().position(|&u| u == 0).unwrap_or(units.len());
        Ok(from_units(&units[..len]))
    }

    /// Reads a u16-length-prefixed byte string.
    pub fn read_byte_string(&mut self) -> Result<String, WireError> {
        let len: u16 = self.read()?;
        let raw = self.take(len as usize)?;
        Ok(String::from_utf8_lossy(raw).into_owned())
    }

    /// Reads a u32-length-prefixed narrow string.
    pub fn read_narrow_string(&mut self) -> Result<String, WireError> {
        let len: u32 = self.read()?;
        let raw = self.take(len as usize)?;
        Ok(String::from_utf8_lossy(raw).into_owned())
    }
}

/// Growable output buffer for one unit.
#[derive(Debug, Default, Clone)]
pub struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a unit with its header already written.
    pub fn with_header(channel: Channel, message_id: impl Into<u32>) -> Self {
        let mut writer = Self::new();
        writer.write_raw(&encode_header(channel, message_id));
        writer
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn write<T: Serialize>(&mut self, value: &T) -> Result<(), WireError> {
        let offset = self.buf.len();
        bincode::serialize_into(&mut self.buf, value).map_err(|e| WireError::Invalid {
            offset,
            reason: e.to_string(),
        })
    }

    pub fn write_bool(&mut self, value: bool) -> Result<(), WireError> {
        self.write(&(value as u8))
    }

    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_units(&mut self, units: &[u16]) {
        for unit in units {
            self.buf.extend_from_slice(&unit.to_le_bytes());
        }
    }

    /// Writes a u32 unit count followed by the units.
    pub fn write_text(&mut self, units: &[u16]) -> Result<(), WireError> {
        self.write(&(units.len() as u32))?;
        self.write_units(units);
        Ok(())
    }

    /// Writes exactly `width` units: truncated when longer, zero-padded when
    /// shorter.
    pub fn write_fixed_name(&mut self, name: &str, width: usize) {
        let mut units = to_units(name);
        units.resize(width, 0);
        self.write_units(&units);
    }

    /// Writes a u16 length and the UTF-8 bytes, truncated to `u16::MAX`.
    pub fn write_byte_string(&mut self, text: &str) -> Result<(), WireError> {
        let bytes = &text.as_bytes()[..text.len().min(u16::MAX as usize)];
        self.write(&(bytes.len() as u16))?;
        self.write_raw(bytes);
        Ok(())
    }

    /// Writes a u32 length and the UTF-8 bytes.
    pub fn write_narrow_string(&mut self, text: &str) -> Result<(), WireError> {
        self.write(&(text.len() as u32))?;
        self.write_raw(text.as_bytes());
        Ok(())
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}
