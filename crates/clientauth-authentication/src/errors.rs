//! Authentication errors.

use clientauth_core::ClientAuthError;

/// Result type for authentication operations
pub type Result<T> = std::result::Result<T, AuthenticationError>;

/// Reasons a set of device credentials could not be turned into a session
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthenticationError {
    /// No session factory is registered for the credential type
    #[error("Unknown credential type: {credential_type}")]
    UnknownCredentialType { credential_type: String },

    /// A required credential entry is absent or empty
    #[error("Missing credential: {name}")]
    MissingCredential { name: String },

    /// The certificate PEM is not a certificate
    #[error("Invalid certificate: {message}")]
    InvalidCertificate { message: String },

    /// The cloud does not consider the certificate active
    #[error("Certificate is not active")]
    CertificateNotActive,

    /// The thing is not attached to the certificate it presented
    #[error("Thing {thing_name} is not attached to certificate {certificate_id}")]
    ThingNotAttached {
        thing_name: String,
        certificate_id: String,
    },

    /// The thing name does not match `[a-zA-Z0-9\-_:]+`
    #[error("Invalid thing name: {thing_name:?}")]
    InvalidThingName { thing_name: String },

    /// The cloud could not be asked and nothing usable is cached
    #[error("Verification unavailable: {message}")]
    VerificationUnavailable { message: String },
}

impl AuthenticationError {
    /// Create a missing credential error
    pub fn missing_credential(name: impl Into<String>) -> Self {
        Self::MissingCredential { name: name.into() }
    }

    /// Create an invalid certificate error
    pub fn invalid_certificate(message: impl Into<String>) -> Self {
        Self::InvalidCertificate {
            message: message.into(),
        }
    }

    /// Create a verification unavailable error
    pub fn verification_unavailable(message: impl Into<String>) -> Self {
        Self::VerificationUnavailable {
            message: message.into(),
        }
    }

    /// Whether retrying later with the same credentials may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::VerificationUnavailable { .. })
    }
}

impl From<AuthenticationError> for ClientAuthError {
    fn from(err: AuthenticationError) -> Self {
        match err {
            AuthenticationError::VerificationUnavailable { message } => {
                ClientAuthError::cloud_unavailable(message)
            }
            AuthenticationError::UnknownCredentialType { .. }
            | AuthenticationError::MissingCredential { .. }
            | AuthenticationError::InvalidCertificate { .. }
            | AuthenticationError::InvalidThingName { .. } => {
                ClientAuthError::invalid(err.to_string())
            }
            AuthenticationError::CertificateNotActive
            | AuthenticationError::ThingNotAttached { .. } => {
                ClientAuthError::permission_denied(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unavailable_verification_is_transient() {
        assert!(AuthenticationError::verification_unavailable("offline").is_transient());
        assert!(!AuthenticationError::CertificateNotActive.is_transient());
    }

    #[test]
    fn classifies_into_unified_error() {
        let err: ClientAuthError = AuthenticationError::missing_credential("clientId").into();
        assert!(matches!(err, ClientAuthError::Invalid { .. }));

        let err: ClientAuthError = AuthenticationError::CertificateNotActive.into();
        assert!(matches!(err, ClientAuthError::PermissionDenied { .. }));
    }
}
