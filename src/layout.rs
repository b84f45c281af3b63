//! Record layout compiler
//!
//! Assigns every field its payload offset by walking the fields in
//! declaration order. Encoding and decoding address a field through
//! `FieldSchema::offset` and `storage`; the layout keeps only the sizes.

use crate::field::FieldSchema;
use crate::record::HEADER_SIZE;

/// Compiled byte layout of one event's records
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    payload_size: usize,
}

impl Layout {
    /// Assign offsets to `fields` in place and return the resulting layout
    pub fn compile(fields: &mut [FieldSchema]) -> Self {
        let mut offset = 0;

        for field in fields.iter_mut() {
            field.offset = offset;
            offset += field.storage;
        }

        Self { payload_size: offset }
    }

    /// Bytes taken by the fields alone
    pub fn payload_size(&self) -> usize {
        self.payload_size
    }

    /// Header plus payload
    pub fn record_size(&self) -> usize {
        HEADER_SIZE + self.payload_size
    }
}
