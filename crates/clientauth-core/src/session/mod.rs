//! Authenticated sessions.
//!
//! A [`Session`] is the result of authenticating one set of credentials. It
//! carries one [`AttributeProvider`] per namespace; selection rules and policy
//! variables look attributes up by `(namespace, name)`.

/// Device attributes and providers
pub mod attribute;

pub use attribute::{AttributeProvider, DeviceAttribute, StaticAttributes};

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Namespace carried by sessions of trusted local components.
pub const COMPONENT_NAMESPACE: &str = "Component";

/// An authenticated device or component.
#[derive(Clone)]
pub struct Session {
    credential_type: String,
    providers: HashMap<String, Arc<dyn AttributeProvider>>,
}

impl Session {
    /// A device session with no attribute providers.
    pub fn new(credential_type: impl Into<String>) -> Self {
        Self {
            credential_type: credential_type.into(),
            providers: HashMap::new(),
        }
    }

    /// Session for a trusted local component. Every attribute lookup in the
    /// `Component` namespace matches.
    pub fn component(credential_type: impl Into<String>) -> Self {
        Self::new(credential_type).with_provider(Arc::new(
            StaticAttributes::new(COMPONENT_NAMESPACE)
                .with_attribute(COMPONENT_NAMESPACE, DeviceAttribute::Any),
        ))
    }

    /// Add (or replace) the provider for its namespace.
    pub fn with_provider(mut self, provider: Arc<dyn AttributeProvider>) -> Self {
        self.providers
            .insert(provider.namespace().to_string(), provider);
        self
    }

    /// Credential type the session was created from.
    pub fn credential_type(&self) -> &str {
        &self.credential_type
    }

    /// Provider for `namespace`, if any.
    pub fn attribute_provider(&self, namespace: &str) -> Option<&Arc<dyn AttributeProvider>> {
        self.providers.get(namespace)
    }

    /// Attribute `name` of namespace `namespace`, if provided.
    pub fn session_attribute(&self, namespace: &str, name: &str) -> Option<DeviceAttribute> {
        self.providers
            .get(namespace)
            .and_then(|provider| provider.device_attribute(name))
    }

    /// Whether this session belongs to a trusted local component.
    pub fn is_component(&self) -> bool {
        self.providers.contains_key(COMPONENT_NAMESPACE)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut namespaces: Vec<&String> = self.providers.keys().collect();
        namespaces.sort();
        f.debug_struct("Session")
            .field("credential_type", &self.credential_type)
            .field("namespaces", &namespaces)
            .finish()
    }
}
