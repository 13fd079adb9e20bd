//! Error types for oicbus translation

use thiserror::Error;

use crate::ValueKind;

/// Result type alias for translation operations
pub type Result<T> = std::result::Result<T, Error>;

/// Translation error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Value kind has no bus-protocol representation
    #[error("unsupported value kind: {0}")]
    UnsupportedValue(ValueKind),

    /// Array nesting exceeds the fixed dimensionality
    #[error("array nesting too deep: {depth} dimensions (max {max})", max = crate::MAX_ARRAY_DEPTH)]
    ArrayTooDeep { depth: usize },

    /// Array element count does not match its dimensions
    #[error("array shape mismatch: dimensions describe {expected} elements, have {found}")]
    ArrayShape { expected: usize, found: usize },

    /// Nested arrays of unequal length
    #[error("jagged array")]
    JaggedArray,

    /// Array elements of differing kinds
    #[error("mixed array: expected {expected} elements, found {found}")]
    MixedArray { expected: ValueKind, found: ValueKind },

    /// Value does not match the signature it is converted under
    #[error("signature mismatch: expected {expected}, found {found}")]
    SignatureMismatch { expected: String, found: String },

    /// Signature outside the supported subset
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// Resource integer does not fit the bus 32-bit integer
    #[error("integer out of range: {0}")]
    IntegerOutOfRange(i64),

    /// No device identifier to derive from
    #[error("no device identifier available")]
    MissingDeviceId,

    /// Malformed name
    #[error("invalid name: {0}")]
    InvalidName(String),
}
