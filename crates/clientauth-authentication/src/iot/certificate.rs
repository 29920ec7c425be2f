//! Device certificates as the registry tracks them.

use crate::errors::{AuthenticationError, Result};
use clientauth_core::session::AttributeProvider;
use clientauth_core::{DeviceAttribute, PhysicalTime, TrustWindow};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Attribute namespace exposed by certificates
pub const CERTIFICATE_NAMESPACE: &str = "Certificate";
/// Cloud-assigned certificate id attribute
pub const CERTIFICATE_ID_ATTRIBUTE: &str = "CertificateId";

const PEM_BEGIN: &str = "-----BEGIN CERTIFICATE-----";
const PEM_END: &str = "-----END CERTIFICATE-----";

/// What the cloud last said about a certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CertificateStatus {
    /// Never verified
    Unknown,
    Active,
    Inactive,
}

/// A certificate keyed by the SHA-256 fingerprint of its PEM text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    fingerprint: String,
    certificate_id: Option<String>,
    status: CertificateStatus,
    last_updated: PhysicalTime,
    pem: String,
}

impl Certificate {
    /// A never-verified certificate. Fails if `pem` is not PEM armored.
    pub fn from_pem(pem: &str) -> Result<Self> {
        let trimmed = pem.trim();
        if trimmed.is_empty() {
            return Err(AuthenticationError::invalid_certificate("empty PEM"));
        }
        if !trimmed.starts_with(PEM_BEGIN) || !trimmed.ends_with(PEM_END) {
            return Err(AuthenticationError::invalid_certificate(
                "missing certificate PEM armor",
            ));
        }
        Ok(Self {
            fingerprint: Self::fingerprint_of(pem),
            certificate_id: None,
            status: CertificateStatus::Unknown,
            last_updated: PhysicalTime::EPOCH,
            pem: pem.to_string(),
        })
    }

    /// Hex SHA-256 of the PEM text exactly as presented.
    pub fn fingerprint_of(pem: &str) -> String {
        hex::encode(Sha256::digest(pem.as_bytes()))
    }

    /// Hex SHA-256 of the PEM text.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Cloud-assigned id, once the cloud has reported one.
    pub fn certificate_id(&self) -> Option<&str> {
        self.certificate_id.as_deref()
    }

    /// Last verdict from the cloud.
    pub fn status(&self) -> CertificateStatus {
        self.status
    }

    /// When the cloud last gave a verdict. `EPOCH` if never.
    pub fn last_updated(&self) -> PhysicalTime {
        self.last_updated
    }

    /// PEM text as presented by the device.
    pub fn pem(&self) -> &str {
        &self.pem
    }

    /// Whether the last verdict was `Active`.
    pub fn is_active(&self) -> bool {
        self.status == CertificateStatus::Active
    }

    /// Active and verified within `window` of `now`.
    pub fn is_trusted(&self, window: TrustWindow, now: PhysicalTime) -> bool {
        self.is_active() && window.is_trusted(self.last_updated, now)
    }

    /// Record an `Active` verdict from the cloud.
    pub fn mark_active(&mut self, certificate_id: impl Into<String>, now: PhysicalTime) {
        self.certificate_id = Some(certificate_id.into());
        self.status = CertificateStatus::Active;
        self.last_updated = now;
    }

    /// Keep the id, if any, so unreferenced certificates can still be found.
    pub fn mark_inactive(&mut self, now: PhysicalTime) {
        self.status = CertificateStatus::Inactive;
        self.last_updated = now;
    }
}

impl AttributeProvider for Certificate {
    fn namespace(&self) -> &str {
        CERTIFICATE_NAMESPACE
    }

    fn device_attribute(&self, name: &str) -> Option<DeviceAttribute> {
        match name {
            CERTIFICATE_ID_ATTRIBUTE => self.certificate_id.as_deref().map(DeviceAttribute::literal),
            _ => None,
        }
    }
}
