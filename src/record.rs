//! Binary record format and field value encoding
//!
//! ```text
//! ┌──────────┬───────┬───────┬─────────┬──────────────────────────────┐
//! │ event_id │ flags │ depth │   pid   │ payload (Layout::payload_size)│
//! │   u16    │  u8   │  u8   │   u32   │ one word per scalar field,   │
//! │          │       │       │         │ rounded capacity per string  │
//! └──────────┴───────┴───────┴─────────┴──────────────────────────────┘
//! ```
//!
//! All integers are native-endian; records never leave the process.

use crate::error::{DecodeError, EmissionError};
use crate::field::FieldSchema;
use std::ffi::CStr;
use std::fmt;

/// Size of [`RecordHeader`] on the wire
pub const HEADER_SIZE: usize = 8;

/// Header flag: record was written while another write was in flight on
/// the same channel and thread
pub const FLAG_NESTED: u8 = 0x01;

/// Fixed header preceding every record payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub event_id: u16,
    pub flags: u8,
    /// Writer nesting depth at reservation time (1 = outermost)
    pub depth: u8,
    pub pid: u32,
}

impl RecordHeader {
    pub fn write(&self, buf: &mut [u8]) {
        buf[0..2].copy_from_slice(&self.event_id.to_ne_bytes());
        buf[2] = self.flags;
        buf[3] = self.depth;
        buf[4..8].copy_from_slice(&self.pid.to_ne_bytes());
    }

    pub fn read(buf: &[u8]) -> Result<Self, DecodeError> {
        if buf.len() < HEADER_SIZE {
            return Err(DecodeError::Truncated {
                expected: HEADER_SIZE,
                got: buf.len(),
            });
        }
        Ok(Self {
            event_id: u16::from_ne_bytes([buf[0], buf[1]]),
            flags: buf[2],
            depth: buf[3],
            pid: u32::from_ne_bytes([buf[4], buf[5], buf[6], buf[7]]),
        })
    }

    pub fn is_nested(&self) -> bool {
        self.flags & FLAG_NESTED != 0
    }
}

/// One committed record: header followed by the packed payload
#[derive(Clone, PartialEq, Eq)]
pub struct Record {
    bytes: Box<[u8]>,
}

impl Record {
    pub(crate) fn from_bytes(bytes: Box<[u8]>) -> Self {
        Self { bytes }
    }

    pub fn header(&self) -> Result<RecordHeader, DecodeError> {
        RecordHeader::read(&self.bytes)
    }

    pub fn event_id(&self) -> Option<u16> {
        self.header().ok().map(|h| h.event_id)
    }

    pub fn payload(&self) -> &[u8] {
        self.bytes.get(HEADER_SIZE..).unwrap_or(&[])
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("header", &self.header().ok())
            .field("payload_len", &self.payload().len())
            .finish()
    }
}

/// A value supplied for one field at emission time
///
/// Integers are passed as 64 bits and truncated to the field's declared
/// width. Text is copied up to its first NUL byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value<'a> {
    Int(u64),
    Str(&'a [u8]),
}

impl Value<'_> {
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Int(_) => "an integer",
            Value::Str(_) => "a string",
        }
    }
}

macro_rules! value_from_unsigned {
    ($($t:ty),*) => {
        $(impl From<$t> for Value<'_> {
            fn from(v: $t) -> Self {
                Value::Int(v as u64)
            }
        })*
    };
}

macro_rules! value_from_signed {
    ($($t:ty),*) => {
        $(impl From<$t> for Value<'_> {
            fn from(v: $t) -> Self {
                Value::Int(v as i64 as u64)
            }
        })*
    };
}

value_from_unsigned!(u8, u16, u32, u64, usize);
value_from_signed!(i8, i16, i32, i64, isize);

impl<'a> From<&'a str> for Value<'a> {
    fn from(s: &'a str) -> Self {
        Value::Str(s.as_bytes())
    }
}

impl<'a> From<&'a String> for Value<'a> {
    fn from(s: &'a String) -> Self {
        Value::Str(s.as_bytes())
    }
}

impl<'a> From<&'a CStr> for Value<'a> {
    fn from(s: &'a CStr) -> Self {
        Value::Str(s.to_bytes())
    }
}

impl<'a> From<&'a [u8]> for Value<'a> {
    fn from(s: &'a [u8]) -> Self {
        Value::Str(s)
    }
}

/// A field value decoded from a committed record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Unsigned(u64),
    Signed(i64),
    Str(String),
}

impl FieldValue {
    /// Raw 64-bit view, as the value was stored (sign-extended for signed)
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            FieldValue::Unsigned(v) => Some(*v),
            FieldValue::Signed(v) => Some(*v as u64),
            FieldValue::Str(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Unsigned(v) => write!(f, "{v}"),
            FieldValue::Signed(v) => write!(f, "{v}"),
            FieldValue::Str(s) => f.write_str(s),
        }
    }
}

/// Check that `value` suits `field` without touching any buffer
pub fn check_kind(field: &FieldSchema, value: &Value<'_>) -> Result<(), EmissionError> {
    match (field.is_string(), value) {
        (true, Value::Str(_)) | (false, Value::Int(_)) => Ok(()),
        (true, Value::Int(_)) => Err(EmissionError::ValueKind {
            field: field.name.clone(),
            expected: "a string",
        }),
        (false, Value::Str(_)) => Err(EmissionError::ValueKind {
            field: field.name.clone(),
            expected: "an integer",
        }),
    }
}

/// Write one value into its slot of a reserved payload
///
/// The payload length was fixed by the event's layout when it was reserved,
/// so field slots are always in bounds.
pub fn encode_field(
    payload: &mut [u8],
    field: &FieldSchema,
    value: Value<'_>,
) -> Result<(), EmissionError> {
    check_kind(field, &value)?;
    let slot = &mut payload[field.offset..field.offset + field.storage];

    match value {
        Value::Int(v) => write_scalar(slot, field.ty.size, v),
        Value::Str(s) => write_str(slot, field.ty.size, s),
    }
    Ok(())
}

fn write_scalar(slot: &mut [u8], width: usize, v: u64) {
    match width {
        1 => slot[0] = v as u8,
        2 => slot[..2].copy_from_slice(&(v as u16).to_ne_bytes()),
        4 => slot[..4].copy_from_slice(&(v as u32).to_ne_bytes()),
        _ => slot[..8].copy_from_slice(&v.to_ne_bytes()),
    }
}

/// Copy at most `capacity - 1` bytes and always NUL-terminate
fn write_str(slot: &mut [u8], capacity: usize, s: &[u8]) {
    let s = match s.iter().position(|&b| b == 0) {
        Some(nul) => &s[..nul],
        None => s,
    };
    let n = s.len().min(capacity.saturating_sub(1));
    slot[..n].copy_from_slice(&s[..n]);
    slot[n] = 0;
}

/// Read one field back out of a payload
pub fn decode_field(payload: &[u8], field: &FieldSchema) -> Result<FieldValue, DecodeError> {
    let end = field.offset + field.storage;
    let slot = payload.get(field.offset..end).ok_or(DecodeError::Truncated {
        expected: end,
        got: payload.len(),
    })?;

    if field.is_string() {
        let bytes = &slot[..field.ty.size];
        let len = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        return Ok(FieldValue::Str(
            String::from_utf8_lossy(&bytes[..len]).into_owned(),
        ));
    }

    let raw = read_scalar(slot, field.ty.size);
    if field.ty.signed {
        let shift = 64 - 8 * field.ty.size.min(8) as u32;
        Ok(FieldValue::Signed(((raw << shift) as i64) >> shift))
    } else {
        Ok(FieldValue::Unsigned(raw))
    }
}

fn read_scalar(slot: &[u8], width: usize) -> u64 {
    match width {
        1 => slot[0] as u64,
        2 => u16::from_ne_bytes([slot[0], slot[1]]) as u64,
        4 => u32::from_ne_bytes([slot[0], slot[1], slot[2], slot[3]]) as u64,
        _ => {
            let mut word = [0u8; 8];
            word.copy_from_slice(&slot[..8]);
            u64::from_ne_bytes(word)
        }
    }
}
