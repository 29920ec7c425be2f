//! Credential-type dispatch for session creation.

use crate::errors::{AuthenticationError, Result};
use async_trait::async_trait;
use clientauth_core::Session;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Authenticates one kind of credentials.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn create_session(&self, credentials: &HashMap<String, String>) -> Result<Session>;
}

/// Blanket implementation for Arc<T> where T: SessionFactory
#[async_trait]
impl<T: SessionFactory + ?Sized> SessionFactory for Arc<T> {
    async fn create_session(&self, credentials: &HashMap<String, String>) -> Result<Session> {
        (**self).create_session(credentials).await
    }
}

/// Registry of session factories keyed by credential type.
#[derive(Default)]
pub struct SessionCreator {
    factories: RwLock<HashMap<String, Arc<dyn SessionFactory>>>,
}

impl SessionCreator {
    /// A creator with no factories registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` for `credential_type`, replacing any previous one.
    pub fn register(&self, credential_type: impl Into<String>, factory: Arc<dyn SessionFactory>) {
        let credential_type = credential_type.into();
        tracing::debug!(credential_type = %credential_type, "Registered session factory");
        self.factories.write().insert(credential_type, factory);
    }

    /// Remove the factory for `credential_type`. Returns false if none.
    pub fn unregister(&self, credential_type: &str) -> bool {
        self.factories.write().remove(credential_type).is_some()
    }

    /// Whether a factory is registered for `credential_type`.
    pub fn supports(&self, credential_type: &str) -> bool {
        self.factories.read().contains_key(credential_type)
    }

    /// Authenticate with the factory registered for `credential_type`.
    pub async fn create_session(
        &self,
        credential_type: &str,
        credentials: &HashMap<String, String>,
    ) -> Result<Session> {
        let factory = self
            .factories
            .read()
            .get(credential_type)
            .cloned()
            .ok_or_else(|| AuthenticationError::UnknownCredentialType {
                credential_type: credential_type.to_string(),
            })?;
        factory.create_session(credentials).await
    }
}

impl std::fmt::Debug for SessionCreator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<String> = self.factories.read().keys().cloned().collect();
        types.sort();
        f.debug_struct("SessionCreator")
            .field("credential_types", &types)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    struct FixedFactory;

    #[async_trait]
    impl SessionFactory for FixedFactory {
        async fn create_session(&self, _credentials: &HashMap<String, String>) -> Result<Session> {
            Ok(Session::new("fixed"))
        }
    }

    #[tokio::test]
    async fn dispatches_by_credential_type() {
        let creator = SessionCreator::new();
        creator.register("fixed", Arc::new(FixedFactory));

        let session = creator.create_session("fixed", &HashMap::new()).await.unwrap();
        assert_eq!(session.credential_type(), "fixed");

        assert_matches!(
            creator.create_session("mqtt", &HashMap::new()).await,
            Err(AuthenticationError::UnknownCredentialType { credential_type }) if credential_type == "mqtt"
        );

        assert!(creator.unregister("fixed"));
        assert!(!creator.supports("fixed"));
    }
}
