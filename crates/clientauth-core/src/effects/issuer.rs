//! Local certificate authority effect.
//!
//! Components running on the gateway itself present certificates issued by
//! the gateway's own CA. Those are trusted without consulting the cloud.
//! X.509 parsing and chain validation live with the host's certificate store,
//! not here.

/// Checks whether a certificate was issued by the gateway's local CA.
pub trait LocalIssuerEffects: Send + Sync {
    fn is_issued_by_local_ca(&self, certificate_pem: &str) -> bool;
}

/// Blanket implementation for Arc<T> where T: LocalIssuerEffects
impl<T: LocalIssuerEffects + ?Sized> LocalIssuerEffects for std::sync::Arc<T> {
    fn is_issued_by_local_ca(&self, certificate_pem: &str) -> bool {
        (**self).is_issued_by_local_ca(certificate_pem)
    }
}

/// Issuer for hosts without a local CA. Trusts nothing locally.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLocalIssuer;

impl LocalIssuerEffects for NoLocalIssuer {
    fn is_issued_by_local_ca(&self, _certificate_pem: &str) -> bool {
        false
    }
}
