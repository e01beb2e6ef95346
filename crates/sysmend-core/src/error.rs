//! Error types for sysmend-core.
//!
//! Two errors are caller errors surfaced synchronously from
//! [`crate::TaskRunner::launch`]: [`Error::UnknownOperation`] and
//! [`Error::AlreadyRunning`]. Everything an operation body raises stays
//! local to its task handle: the runner absorbs it into a failed
//! `Completed` event and the worker never crashes the process. Probe
//! failures are likewise absorbed into backoff state by the poller and
//! never reach the consumer as errors.

use std::process::ExitStatus;

use thiserror::Error;

/// Errors that can occur when launching and executing background tasks.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The operation identifier is not registered in the catalog.
    ///
    /// Surfaced synchronously at launch time; no worker is created and no
    /// events are emitted. Unknown identifiers never silently no-op.
    #[error("Unknown operation: '{id}'")]
    UnknownOperation {
        /// The unregistered identifier.
        id: String,
    },

    /// Another task for the same tool surface is still active.
    #[error("Operation '{id}' rejected: surface '{surface}' already has a running task")]
    AlreadyRunning {
        /// The tool surface that is busy.
        surface: String,
        /// The operation that was rejected.
        id: String,
    },

    /// An operation body returned an error mid-run.
    #[error("Operation failed: {message}")]
    OperationFailed {
        /// Description of the failure.
        message: String,
    },

    /// The operation observed a cancellation request and exited.
    #[error("Operation cancelled")]
    Cancelled,

    /// A telemetry probe failed. Absorbed into backoff state by the
    /// poller; never rendered to the consumer as an error.
    #[error("Probe failed: {message}")]
    ProbeFailed {
        /// Description of the failure.
        message: String,
    },

    /// A subprocess step exited unsuccessfully.
    #[error("Command '{program}' exited with {status}")]
    CommandFailed {
        /// The program that was invoked.
        program: String,
        /// The exit status.
        status: ExitStatus,
    },

    /// A required parameter was missing or malformed.
    #[error(transparent)]
    Param(#[from] sysmend_types::ParseError),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create an unknown-operation error.
    pub fn unknown_operation(id: impl Into<String>) -> Self {
        Self::UnknownOperation { id: id.into() }
    }

    /// Create an already-running error.
    pub fn already_running(surface: impl Into<String>, id: impl Into<String>) -> Self {
        Self::AlreadyRunning {
            surface: surface.into(),
            id: id.into(),
        }
    }

    /// Create an operation failure with context.
    pub fn operation_failed(message: impl Into<String>) -> Self {
        Self::OperationFailed {
            message: message.into(),
        }
    }

    /// Create a probe failure.
    pub fn probe_failed(message: impl Into<String>) -> Self {
        Self::ProbeFailed {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}

/// Result type alias using sysmend-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::unknown_operation("frobnicate");
        assert!(err.to_string().contains("frobnicate"));

        let err = Error::already_running("virus_scan", "quick_scan");
        assert!(err.to_string().contains("virus_scan"));
        assert!(err.to_string().contains("quick_scan"));

        let err = Error::Cancelled;
        assert_eq!(err.to_string(), "Operation cancelled");

        let err = Error::probe_failed("sensor read timed out");
        assert!(err.to_string().contains("sensor read timed out"));
    }

    #[test]
    fn test_param_error_conversion() {
        let parse = sysmend_types::ParseError::MissingParam {
            key: "target".to_string(),
        };
        let err: Error = parse.into();
        assert!(matches!(err, Error::Param(_)));
        assert!(err.to_string().contains("target"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "tool not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("tool not found"));
    }
}
