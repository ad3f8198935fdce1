//! NDR error types

use thiserror::Error;

/// Default ceiling on a single decoded container, in bytes
pub const MAX_NDR_ALLOCATION_SIZE: usize = 16 * 1024 * 1024;

/// Default ceiling on pointer nesting (flush passes and isolated scopes)
pub const MAX_NDR_DEPTH: usize = 256;

/// NDR encoding/decoding errors
#[derive(Debug, Error)]
pub enum NdrError {
    /// Buffer underflow - the input holds fewer bytes than a field needs
    #[error("buffer underflow: needed {needed} bytes, have {have}")]
    BufferUnderflow { needed: usize, have: usize },

    /// A declared count asks for more memory than the session allows
    #[error("allocation limit exceeded: requested {requested} bytes, limit {limit}")]
    AllocationLimitExceeded { requested: usize, limit: usize },

    /// Arithmetic on wire counts overflowed
    #[error("integer overflow in NDR size computation")]
    IntegerOverflow,

    /// A field is outside its documented range
    #[error("{field} is out of range: {value} not in [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: i128,
        min: i128,
        max: i128,
    },

    /// Invalid string - bad offset or encoding
    #[error("invalid string: {0}")]
    InvalidString(String),

    /// An aliasable referent was used but its pointee never arrived
    #[error("unresolved referent: ID {0:#x}")]
    UnresolvedReferent(u32),

    /// One referent ID was used for pointees of different types
    #[error("referent ID {0:#x} refers to pointees of different types")]
    ReferentTypeMismatch(u32),

    /// Invalid discriminant for union
    #[error("invalid union discriminant: {0}")]
    InvalidDiscriminant(u32),

    /// The discriminant supplied by the enclosing structure disagrees with the union
    #[error("union discriminant mismatch: expected {expected}, got {got}")]
    DiscriminantMismatch { expected: u32, got: u32 },

    /// Conformance mismatch
    #[error("conformance mismatch: max_count={max_count}, actual_count={actual_count}")]
    ConformanceMismatch { max_count: u32, actual_count: u32 },

    /// Alignment that is not 1, 2, 4 or 8
    #[error("invalid alignment: {0}")]
    InvalidAlignment(usize),

    /// Pointer chains nested deeper than the session allows
    #[error("nesting depth limit of {0} exceeded")]
    DepthLimitExceeded(usize),

    /// UTF-8 decoding error
    #[error("UTF-8 error: {0}")]
    Utf8Error(#[from] std::string::FromUtf8Error),

    /// UTF-16 decoding error
    #[error("UTF-16 error: {0}")]
    Utf16Error(#[from] std::char::DecodeUtf16Error),
}

impl NdrError {
    /// True when the input declared more data than it carries
    pub fn is_bounds(&self) -> bool {
        matches!(
            self,
            NdrError::BufferUnderflow { .. }
                | NdrError::AllocationLimitExceeded { .. }
                | NdrError::IntegerOverflow
        )
    }

    /// True for aliasable pointer inconsistencies
    pub fn is_referent(&self) -> bool {
        matches!(
            self,
            NdrError::UnresolvedReferent(_) | NdrError::ReferentTypeMismatch(_)
        )
    }
}

/// Result type for NDR operations
pub type Result<T> = std::result::Result<T, NdrError>;
