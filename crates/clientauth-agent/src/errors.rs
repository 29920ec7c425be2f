//! Errors returned to the host.
//!
//! Messages are safe to relay to the connecting device: they never carry the
//! underlying cause. Causes are logged where the error is produced.

use clientauth_authentication::AuthenticationError;
use clientauth_authorization::{AuthorizationError, PolicyError};
use clientauth_core::ClientAuthError;
use thiserror::Error;

/// Result type for service operations
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Errors the host may relay to a connecting device
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// Credentials were rejected
    #[error("Authentication failed")]
    AuthenticationFailed,

    /// No session factory handles the credential type
    #[error("Unsupported credential type: {credential_type}")]
    UnsupportedCredentialType { credential_type: String },

    /// The cloud could not be consulted and nothing usable is cached
    #[error("Unable to verify credentials, retry later")]
    VerificationUnavailable,

    /// The session id does not resolve
    #[error("Invalid session")]
    InvalidSession,

    /// Malformed operation or resource
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// Rejected service or group configuration
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration { message: String },
}

impl ServiceError {
    /// Create an invalid configuration error
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
        }
    }
}

impl From<AuthenticationError> for ServiceError {
    fn from(err: AuthenticationError) -> Self {
        match err {
            AuthenticationError::UnknownCredentialType { credential_type } => {
                Self::UnsupportedCredentialType { credential_type }
            }
            AuthenticationError::VerificationUnavailable { .. } => Self::VerificationUnavailable,
            _ => Self::AuthenticationFailed,
        }
    }
}

impl From<AuthorizationError> for ServiceError {
    fn from(err: AuthorizationError) -> Self {
        match err {
            AuthorizationError::UnknownSession => Self::InvalidSession,
            other => Self::InvalidRequest {
                message: other.to_string(),
            },
        }
    }
}

impl From<PolicyError> for ServiceError {
    fn from(err: PolicyError) -> Self {
        Self::invalid_configuration(err.to_string())
    }
}

impl From<ClientAuthError> for ServiceError {
    fn from(err: ClientAuthError) -> Self {
        Self::invalid_configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authentication_details_are_not_exposed() {
        let err: ServiceError = AuthenticationError::ThingNotAttached {
            thing_name: "lamp".to_string(),
            certificate_id: "secret-cert-id".to_string(),
        }
        .into();

        assert_eq!(err, ServiceError::AuthenticationFailed);
        assert!(!err.to_string().contains("secret-cert-id"));
    }

    #[test]
    fn unknown_session_maps_to_invalid_session() {
        let err: ServiceError = AuthorizationError::UnknownSession.into();
        assert_eq!(err, ServiceError::InvalidSession);
    }
}
