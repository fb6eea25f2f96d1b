//! Application error types.
//!
//! All errors use `thiserror` for automatic Error trait derivation and provide
//! clear error messages with context.

use thiserror::Error;

/// Application result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error enum for the cost engine.
#[derive(Error, Debug)]
pub enum Error {
    /// Validation errors (map to INVALID_ARGUMENT).
    #[error("validation error: {0}")]
    Validation(String),

    /// Resource not found (map to NOT_FOUND).
    #[error("not found: {0}")]
    NotFound(String),

    /// Plugin could not be started or reached (map to UNAVAILABLE).
    #[error("launch error: {0}")]
    Launch(String),

    /// Timeout (map to DEADLINE_EXCEEDED).
    #[error("timeout: {0}")]
    Timeout(String),

    /// Cancellation by the caller (map to CANCELLED).
    #[error("operation cancelled: {0}")]
    Cancelled(String),

    /// The plugin does not implement the requested method (map to UNIMPLEMENTED).
    #[error("not implemented: {0}")]
    Unimplemented(String),

    /// Error reported by the remote plugin, carrying its wire code.
    #[error("plugin error [{code}]: {message}")]
    Remote { code: String, message: String },

    /// Plugin protocol version rejected under strict compatibility
    /// (map to FAILED_PRECONDITION).
    #[error("incompatible plugin: {0}")]
    Incompatible(String),

    /// Malformed frame or response envelope (map to DATA_LOSS).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Internal errors (map to INTERNAL).
    #[error("internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wire error code sent in RPC error envelopes.
    pub fn to_ipc_error_code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "INVALID_ARGUMENT",
            Error::NotFound(_) => "NOT_FOUND",
            Error::Launch(_) => "UNAVAILABLE",
            Error::Timeout(_) => "DEADLINE_EXCEEDED",
            Error::Cancelled(_) => "CANCELLED",
            Error::Unimplemented(_) => "UNIMPLEMENTED",
            Error::Incompatible(_) => "FAILED_PRECONDITION",
            Error::Protocol(_) => "DATA_LOSS",
            Error::Remote { .. } | Error::Internal(_) | Error::Serialization(_) | Error::Io(_) => {
                "INTERNAL"
            }
        }
    }

    /// Rebuild an error from a wire error envelope.
    ///
    /// Codes the core gives local meaning to (unimplemented, deadline,
    /// cancellation) become their own variants so callers can match on them;
    /// everything else stays a [`Error::Remote`].
    pub fn from_wire(code: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            "UNIMPLEMENTED" => Error::Unimplemented(message),
            "DEADLINE_EXCEEDED" => Error::Timeout(message),
            "CANCELLED" => Error::Cancelled(message),
            _ => Error::Remote {
                code: code.to_string(),
                message,
            },
        }
    }

    pub fn is_unimplemented(&self) -> bool {
        matches!(self, Error::Unimplemented(_))
    }
}

// Convenience constructors
impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn launch(msg: impl Into<String>) -> Self {
        Self::Launch(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled(msg.into())
    }

    pub fn unimplemented(msg: impl Into<String>) -> Self {
        Self::Unimplemented(msg.into())
    }

    pub fn incompatible(msg: impl Into<String>) -> Self {
        Self::Incompatible(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
