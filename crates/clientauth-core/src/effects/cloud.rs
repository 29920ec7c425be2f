//! Cloud identity service effect.
//!
//! The cloud is the source of truth for which certificates are active and
//! which things they are attached to. Every operation distinguishes a
//! definitive answer (`Ok(None)`, `Ok(false)`) from a failure to obtain one
//! (`Err(CloudError)`); only the latter allows callers to fall back to cached
//! facts.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Failure to obtain an answer from the cloud identity service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum CloudError {
    /// No connectivity or the request timed out
    #[error("Cloud unreachable: {message}")]
    Unreachable { message: String },

    /// The service throttled the request
    #[error("Request throttled: {message}")]
    Throttled { message: String },

    /// The service failed internally
    #[error("Cloud service error: {message}")]
    ServerError { message: String },

    /// The gateway identity lacks permission for the call
    #[error("Access denied: {message}")]
    AccessDenied { message: String },
}

impl CloudError {
    /// Create an unreachable error
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::Unreachable {
            message: message.into(),
        }
    }

    /// Create a throttled error
    pub fn throttled(message: impl Into<String>) -> Self {
        Self::Throttled {
            message: message.into(),
        }
    }

    /// Create a server error
    pub fn server_error(message: impl Into<String>) -> Self {
        Self::ServerError {
            message: message.into(),
        }
    }

    /// Create an access denied error
    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::AccessDenied {
            message: message.into(),
        }
    }

    /// Whether repeating the same call shortly afterwards may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Throttled { .. } | Self::ServerError { .. })
    }

    /// Whether the failure is expected to clear up on its own, as opposed to
    /// a misconfiguration of the gateway identity.
    pub fn is_transient(&self) -> bool {
        !self.is_access_denied()
    }

    /// Whether the cloud refused the gateway itself.
    pub fn is_access_denied(&self) -> bool {
        matches!(self, Self::AccessDenied { .. })
    }
}

impl From<CloudError> for crate::ClientAuthError {
    fn from(err: CloudError) -> Self {
        match err {
            CloudError::AccessDenied { message } => Self::permission_denied(message),
            other => Self::cloud_unavailable(other.to_string()),
        }
    }
}

/// Cloud identity/fleet-management operations consumed by the registries.
#[async_trait]
pub trait CloudIdentityEffects: Send + Sync {
    /// Resolve the cloud id of the certificate encoded by `certificate_pem`.
    ///
    /// Returns `Ok(None)` when the cloud definitively reports the certificate
    /// as unknown or not active.
    async fn get_active_certificate_id(
        &self,
        certificate_pem: &str,
    ) -> Result<Option<String>, CloudError>;

    /// Whether `thing_name` is currently attached to `certificate_id`.
    async fn is_thing_attached_to_certificate(
        &self,
        thing_name: &str,
        certificate_id: &str,
    ) -> Result<bool, CloudError>;

    /// Names of every thing associated with this gateway.
    async fn get_things_associated_with_core_device(&self) -> Result<Vec<String>, CloudError>;
}

/// Blanket implementation for Arc<T> where T: CloudIdentityEffects
#[async_trait]
impl<T: CloudIdentityEffects + ?Sized> CloudIdentityEffects for std::sync::Arc<T> {
    async fn get_active_certificate_id(
        &self,
        certificate_pem: &str,
    ) -> Result<Option<String>, CloudError> {
        (**self).get_active_certificate_id(certificate_pem).await
    }

    async fn is_thing_attached_to_certificate(
        &self,
        thing_name: &str,
        certificate_id: &str,
    ) -> Result<bool, CloudError> {
        (**self)
            .is_thing_attached_to_certificate(thing_name, certificate_id)
            .await
    }

    async fn get_things_associated_with_core_device(&self) -> Result<Vec<String>, CloudError> {
        (**self).get_things_associated_with_core_device().await
    }
}
