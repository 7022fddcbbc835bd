//! Error types for atomforge

use thiserror::Error;

/// Errors raised while decoding a byte buffer against a schema
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("short read at `{path}` (offset {offset}): needed {needed} bytes, {remaining} remaining")]
    ShortRead {
        path: String,
        offset: usize,
        needed: usize,
        remaining: usize,
    },

    #[error("array `{path}`: count field is missing or not a non-negative integer")]
    BadCount { path: String },

    #[error("field `{path}` referenced before it was decoded")]
    MissingField { path: String },

    #[error("seek at `{path}`: anchor node has not been visited")]
    UnknownAnchor { path: String },

    #[error("seek at `{path}`: target offset {target} is outside the {len}-byte buffer")]
    SeekOutOfBounds {
        path: String,
        target: i64,
        len: usize,
    },
}

/// Errors raised while encoding a record back into bytes
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("missing required field `{path}`")]
    MissingField { path: String },

    #[error("field `{path}` has the wrong shape: expected {expected}")]
    WrongShape { path: String, expected: &'static str },

    #[error("array `{path}`: {actual} elements do not match the static count {expected}")]
    LengthMismatch {
        path: String,
        expected: usize,
        actual: usize,
    },

    #[error("value {value} at `{path}` does not fit the field width")]
    ValueRange { path: String, value: i64 },

    #[error("unresolved forward seek reference at `{path}`")]
    UnresolvedSeek { path: String },

    #[error("patch at byte {at} ({len} bytes) falls outside the {buf} bytes produced so far")]
    BadPatch { at: usize, len: usize, buf: usize },
}

/// Schema construction or usage errors
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("codec root must be a group node")]
    RootNotGroup,

    #[error("derived chain operand must be a named node")]
    UnnamedOperand,

    #[error("seek offset field `{name}` must be an integer scalar")]
    BadSeekOffset { name: String },

    #[error("a field-driven seek offset requires a node or absolute anchor")]
    SeekNeedsAnchor,

    #[error("record has no field `{name}`")]
    UnknownField { name: String },

    #[error("field `{name}` is derived and read-only")]
    ReadOnlyField { name: String },

    #[error("record is frozen; new fields cannot be added")]
    FrozenRecord,

    #[error("array `{path}` repeats a node that produces no value")]
    StructuralArrayItem { path: String },
}

/// Main error type for atomforge operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),

    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),
}

/// Result type alias for atomforge operations
pub type Result<T> = std::result::Result<T, Error>;
