//! Type catalog for synthetic event fields
//!
//! Maps a textual type token (as written in a definition command) to a
//! [`TypeDescriptor`]. The catalog is fixed: sized integers, the C-style
//! `char`/`int`/`long` family, `pid_t`, the `gfp_t` allocation-flags bitmask,
//! and `char[N]` strings of bounded capacity.

use crate::error::DefinitionError;
use std::ffi::c_long;
use std::mem::size_of;

/// Absolute upper bound for a string field's declared capacity
pub const STR_VAR_LEN_MAX: usize = 256;

/// Name of the flags-bitmask type
pub const FLAGS_TYPE: &str = "gfp_t";

/// Broad category of a field type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// Plain integer, rendered numerically
    Integer,
    /// Allocation-flags bitmask, rendered as hex plus decoded flag names
    Flags,
    /// Fixed-capacity NUL-terminated string
    Str,
}

/// Resolved description of a field type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeDescriptor {
    /// Canonical type text, e.g. `unsigned int` or `char[16]`
    pub name: String,
    /// Declared width in bytes (1, 2, 4 or 8), or the capacity for strings
    pub size: usize,
    pub signed: bool,
    pub kind: TypeKind,
}

struct ScalarEntry {
    name: &'static str,
    size: usize,
    fmt: &'static str,
}

const SCALARS: &[ScalarEntry] = &[
    ScalarEntry { name: "s64", size: 8, fmt: "%lld" },
    ScalarEntry { name: "u64", size: 8, fmt: "%llu" },
    ScalarEntry { name: "s32", size: 4, fmt: "%d" },
    ScalarEntry { name: "u32", size: 4, fmt: "%u" },
    ScalarEntry { name: "s16", size: 2, fmt: "%d" },
    ScalarEntry { name: "u16", size: 2, fmt: "%u" },
    ScalarEntry { name: "s8", size: 1, fmt: "%d" },
    ScalarEntry { name: "u8", size: 1, fmt: "%u" },
    ScalarEntry { name: "char", size: 1, fmt: "%d" },
    ScalarEntry { name: "unsigned char", size: 1, fmt: "%u" },
    ScalarEntry { name: "int", size: 4, fmt: "%d" },
    ScalarEntry { name: "unsigned int", size: 4, fmt: "%u" },
    ScalarEntry { name: "long", size: size_of::<c_long>(), fmt: "%ld" },
    ScalarEntry { name: "unsigned long", size: size_of::<c_long>(), fmt: "%lu" },
    ScalarEntry { name: "pid_t", size: 4, fmt: "%d" },
    ScalarEntry { name: FLAGS_TYPE, size: 4, fmt: "%x" },
];

impl TypeDescriptor {
    pub fn is_string(&self) -> bool {
        self.kind == TypeKind::Str
    }

    /// printf-style conversion used in rendered output and print formats
    pub fn fmt(&self) -> &'static str {
        if self.is_string() {
            return "%s";
        }
        SCALARS
            .iter()
            .find(|e| e.name == self.name)
            .map(|e| e.fmt)
            .unwrap_or("%llu")
    }
}

/// Signedness rule: unsigned when the type starts with `u` or is the flags type
fn is_signed(ty: &str) -> bool {
    !(ty.starts_with('u') || ty == FLAGS_TYPE)
}

/// Resolve a type token against the catalog
///
/// `ceiling` bounds the capacity of `char[N]` strings and is itself clamped
/// to [`STR_VAR_LEN_MAX`].
pub fn resolve(ty: &str, ceiling: usize) -> Result<TypeDescriptor, DefinitionError> {
    if let Some(entry) = SCALARS.iter().find(|e| e.name == ty) {
        let kind = if ty == FLAGS_TYPE {
            TypeKind::Flags
        } else {
            TypeKind::Integer
        };
        return Ok(TypeDescriptor {
            name: ty.to_string(),
            size: entry.size,
            signed: is_signed(ty),
            kind,
        });
    }

    if is_string_type(ty) {
        let size = string_capacity(ty, ceiling)?;
        return Ok(TypeDescriptor {
            name: ty.to_string(),
            size,
            signed: is_signed(ty),
            kind: TypeKind::Str,
        });
    }

    Err(DefinitionError::UnknownType(ty.to_string()))
}

fn is_string_type(ty: &str) -> bool {
    ty.starts_with("char[") || ty.starts_with("unsigned char[")
}

fn string_capacity(ty: &str, ceiling: usize) -> Result<usize, DefinitionError> {
    let max = ceiling.min(STR_VAR_LEN_MAX);
    let invalid = || DefinitionError::StringCapacityInvalid {
        ty: ty.to_string(),
        max,
    };

    let start = ty.find('[').ok_or_else(invalid)? + 1;
    let digits = ty[start..].strip_suffix(']').ok_or_else(invalid)?;
    if digits.is_empty() || digits.len() > 3 {
        return Err(invalid());
    }

    let size = parse_c_uint(digits).ok_or_else(invalid)?;
    if size == 0 || size > max {
        return Err(invalid());
    }
    Ok(size)
}

/// Parse an unsigned integer with C base-0 rules: `0x` hex, leading `0` octal
fn parse_c_uint(s: &str) -> Option<usize> {
    let (digits, radix) = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        (hex, 16)
    } else if s.len() > 1 && s.starts_with('0') {
        (&s[1..], 8)
    } else {
        (s, 10)
    };
    if digits.is_empty() {
        return None;
    }
    usize::from_str_radix(digits, radix).ok()
}
