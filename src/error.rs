//! Error taxonomy for synthetic event definition, registry and emission
//!
//! Every failure is surfaced synchronously and mutates nothing: a rejected
//! definition registers no partial schema, a rejected emission leaves the
//! log channel untouched (or commits whatever was already written, in the
//! piecewise case). A soft-disabled event is *not* an error; emission
//! returns `Ok` and skips encoding.

use thiserror::Error;

/// Errors raised while parsing or compiling an event definition
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DefinitionError {
    #[error("synthetic event '{0}' already exists")]
    DuplicateName(String),

    #[error("too many fields: {count} exceeds the limit of {max}")]
    FieldLimitExceeded { count: usize, max: usize },

    #[error("malformed field descriptor: {0}")]
    BadFieldSyntax(String),

    #[error("unknown field type '{0}'")]
    UnknownType(String),

    #[error("invalid string capacity in '{ty}' (must be 1..={max})")]
    StringCapacityInvalid { ty: String, max: usize },

    #[error("duplicate field '{field}' in event '{event}'")]
    DuplicateField { event: String, field: String },

    #[error("invalid event name '{0}'")]
    BadEventName(String),

    #[error("event id space exhausted")]
    IdsExhausted,
}

/// Errors raised by registry lookups and deletions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("synthetic event '{0}' not found")]
    NotFound(String),

    #[error("synthetic event '{0}' is busy ({1} active references)")]
    Busy(String, u32),
}

/// Errors raised by the log channel reserve/commit protocol
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelError {
    #[error("recursive write detected on channel {0}")]
    Recursion(u64),

    #[error("nesting depth {depth} exceeds channel limit {max}")]
    NestingTooDeep { depth: u32, max: u32 },

    #[error("channel {0} is full")]
    Full(u64),
}

/// Errors raised on the emission hot path
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EmissionError {
    #[error("expected {expected} values, got {got}")]
    ArityMismatch { expected: usize, got: usize },

    #[error("cannot mix positional and named values in one trace")]
    ModeConflict,

    #[error("all {0} fields already set")]
    TooManyValues(usize),

    #[error("no field named '{0}'")]
    NoSuchField(String),

    #[error("field '{field}' expects {expected} value")]
    ValueKind {
        field: String,
        expected: &'static str,
    },

    #[error("reservation failed: {0}")]
    ReserveFailed(#[from] ChannelError),
}

/// Errors raised while decoding a committed record
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("record too short: expected {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },

    #[error("record belongs to event id {found}, not {expected}")]
    WrongEvent { expected: u16, found: u16 },
}

/// Crate-wide error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SynthError {
    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Emission(#[from] EmissionError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Result type for synthetic event operations
pub type Result<T> = std::result::Result<T, SynthError>;
