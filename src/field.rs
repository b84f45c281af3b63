//! Field descriptor parsing
//!
//! A field is written as `[unsigned] <type> <name>[;]` or `<type> <name>[N]`.
//! Descriptors arrive as a flat token stream, so the parser reports how many
//! tokens it consumed and the caller advances past them.

use crate::error::DefinitionError;
use crate::types::{self, TypeDescriptor};
use serde::{Deserialize, Serialize};

/// Storage unit for scalar fields; every record slot is one word
pub const WORD_SIZE: usize = std::mem::size_of::<u64>();

/// Type/name pair as supplied by a caller or shown in a listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDesc {
    #[serde(rename = "type")]
    pub ty: String,
    pub name: String,
}

impl FieldDesc {
    pub fn new(ty: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            ty: ty.into(),
            name: name.into(),
        }
    }
}

/// One named, typed, offset-assigned member of an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSchema {
    pub name: String,
    pub ty: TypeDescriptor,
    /// Byte offset within the record payload; assigned by the layout compiler
    pub offset: usize,
    /// Bytes reserved for this field in the payload
    pub storage: usize,
}

impl FieldSchema {
    /// Build an offset-less field from an already resolved type
    pub fn new(name: impl Into<String>, ty: TypeDescriptor) -> Self {
        let storage = storage_width(&ty);
        Self {
            name: name.into(),
            ty,
            offset: 0,
            storage,
        }
    }

    pub fn is_string(&self) -> bool {
        self.ty.is_string()
    }

    pub fn desc(&self) -> FieldDesc {
        FieldDesc::new(self.ty.name.clone(), self.name.clone())
    }
}

/// Scalars take one word regardless of width; strings take their capacity
/// rounded up to a whole word.
pub fn storage_width(ty: &TypeDescriptor) -> usize {
    if ty.is_string() {
        ty.size.div_ceil(WORD_SIZE) * WORD_SIZE
    } else {
        WORD_SIZE
    }
}

/// Parse one field from the head of `tokens`
///
/// Returns the field and the number of tokens consumed (2, or 3 when the
/// type is qualified with `unsigned`).
pub fn parse_field(
    tokens: &[&str],
    string_ceiling: usize,
) -> Result<(FieldSchema, usize), DefinitionError> {
    let bad = || DefinitionError::BadFieldSyntax(tokens.join(" "));

    let first = tokens.first().ok_or_else(bad)?;
    let first = first.strip_prefix(';').unwrap_or(first);

    let (prefix, field_type, field_name, consumed) = if first == "unsigned" {
        if tokens.len() < 3 {
            return Err(bad());
        }
        ("unsigned ", tokens[1], tokens[2], 3)
    } else {
        if tokens.len() < 2 {
            return Err(bad());
        }
        ("", first, tokens[1], 2)
    };

    let (name, array) = match field_name.find('[') {
        Some(idx) => (&field_name[..idx], Some(&field_name[idx..])),
        None => (field_name.strip_suffix(';').unwrap_or(field_name), None),
    };
    if name.is_empty() {
        return Err(bad());
    }

    let field_type = field_type.strip_prefix(';').unwrap_or(field_type);
    let mut ty = format!("{prefix}{field_type}");
    if let Some(array) = array {
        ty.push_str(array.strip_suffix(';').unwrap_or(array));
    }

    let ty = types::resolve(&ty, string_ceiling)?;
    Ok((FieldSchema::new(name, ty), consumed))
}

/// Parse a single `"type name"` string, as used by the programmatic API
pub fn parse_field_str(
    type_name: &str,
    string_ceiling: usize,
) -> Result<FieldSchema, DefinitionError> {
    let tokens: Vec<&str> = type_name.split_whitespace().collect();
    let (field, consumed) = parse_field(&tokens, string_ceiling)?;
    if consumed != tokens.len() {
        return Err(DefinitionError::BadFieldSyntax(type_name.to_string()));
    }
    Ok(field)
}

/// Parse a flat field-description token stream
///
/// Fields are separated either by a standalone `;` token or by a `;`
/// attached to the previous field's name. A dangling final token that is
/// not a separator is a syntax error, as is an empty stream.
pub fn parse_fields(
    tokens: &[&str],
    max_fields: usize,
    string_ceiling: usize,
) -> Result<Vec<FieldSchema>, DefinitionError> {
    if tokens.is_empty() {
        return Err(DefinitionError::BadFieldSyntax("no fields given".to_string()));
    }

    let mut fields = Vec::new();
    let mut i = 0;
    while i + 1 < tokens.len() {
        if tokens[i] == ";" {
            i += 1;
            continue;
        }
        if fields.len() == max_fields {
            return Err(DefinitionError::FieldLimitExceeded {
                count: fields.len() + 1,
                max: max_fields,
            });
        }
        let (field, consumed) = parse_field(&tokens[i..], string_ceiling)?;
        fields.push(field);
        i += consumed;
    }

    if i < tokens.len() && tokens[i] != ";" {
        return Err(DefinitionError::BadFieldSyntax(tokens[i..].join(" ")));
    }
    if fields.is_empty() {
        return Err(DefinitionError::BadFieldSyntax("no fields given".to_string()));
    }
    Ok(fields)
}
