//! Unified error type for cross-crate seams.
//!
//! Each layer defines its own precise error enum. This type is what those
//! errors collapse into when they cross into code that only needs a coarse
//! classification (configuration loading, host integration).

use serde::{Deserialize, Serialize};

/// Unified error type for client device auth operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum ClientAuthError {
    /// Invalid input or configuration
    #[error("Invalid: {message}")]
    Invalid {
        /// Error message describing the invalid input
        message: String,
    },

    /// Resource not found
    #[error("Not found: {message}")]
    NotFound {
        /// Error message describing what was not found
        message: String,
    },

    /// Authentication or authorization refused
    #[error("Permission denied: {message}")]
    PermissionDenied {
        /// Error message describing the refusal
        message: String,
    },

    /// Cloud service could not be reached or answered with a transient failure
    #[error("Cloud unavailable: {message}")]
    CloudUnavailable {
        /// Error message describing the cloud failure
        message: String,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message describing the serialization failure
        message: String,
    },

    /// Internal system error
    #[error("Internal error: {message}")]
    Internal {
        /// Error message describing the internal error
        message: String,
    },
}

impl ClientAuthError {
    /// Create an invalid input error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create a permission denied error
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::PermissionDenied {
            message: message.into(),
        }
    }

    /// Create a cloud unavailable error
    pub fn cloud_unavailable(message: impl Into<String>) -> Self {
        Self::CloudUnavailable {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Standard Result type for client device auth operations
pub type Result<T> = std::result::Result<T, ClientAuthError>;

impl From<std::io::Error> for ClientAuthError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::not_found(err.to_string()),
            std::io::ErrorKind::PermissionDenied => Self::permission_denied(err.to_string()),
            _ => Self::internal(err.to_string()),
        }
    }
}

impl From<toml::de::Error> for ClientAuthError {
    fn from(err: toml::de::Error) -> Self {
        Self::serialization(err.to_string())
    }
}
