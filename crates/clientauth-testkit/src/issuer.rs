//! Local CA stand-in.

use clientauth_core::effects::LocalIssuerEffects;
use parking_lot::RwLock;
use std::collections::HashSet;

/// Recognizes exactly the PEMs it was given as locally issued.
#[derive(Debug, Default)]
pub struct StaticLocalIssuer {
    issued: RwLock<HashSet<String>>,
}

impl StaticLocalIssuer {
    /// An issuer that recognizes nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Recognize `pem` as locally issued.
    pub fn with_certificate(self, pem: impl Into<String>) -> Self {
        self.issue(pem);
        self
    }

    /// Recognize `pem` from now on.
    pub fn issue(&self, pem: impl Into<String>) {
        self.issued.write().insert(pem.into());
    }
}

impl LocalIssuerEffects for StaticLocalIssuer {
    fn is_issued_by_local_ca(&self, certificate_pem: &str) -> bool {
        self.issued.read().contains(certificate_pem)
    }
}
