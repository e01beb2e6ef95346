//! Error types for data validation in sysmend-types.

use thiserror::Error;

/// Errors that can occur when validating task data or parameters.
///
/// This error type is platform-agnostic and does not include
/// execution errors (those belong in sysmend-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ParseError {
    /// A byte value did not map to a known task state.
    #[error("Unknown task state: {0}")]
    UnknownTaskState(u8),

    /// A required operation parameter was not provided.
    #[error("Missing parameter: {key}")]
    MissingParam {
        /// The parameter key that was absent.
        key: String,
    },

    /// An operation parameter had the wrong type.
    #[error("Parameter '{key}' has wrong type (expected {expected})")]
    WrongParamType {
        /// The parameter key.
        key: String,
        /// The expected type name ("string" or "bool").
        expected: &'static str,
    },
}

/// Result type alias using sysmend-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
