//! Certificate trust registry.
//!
//! Caches the cloud's verdict on each certificate PEM it has seen, keyed by
//! fingerprint. A cached `Active` verdict is used without asking the cloud
//! while it is inside the trust window. Outside the window the cloud is asked
//! again and, if it cannot answer, the last `Active` verdict is used however
//! old it is. A definitive "not active" from the cloud always wins.

use crate::errors::Result;
use crate::iot::Certificate;
use clientauth_core::effects::{CloudError, CloudIdentityEffects, PhysicalTimeEffects};
use clientauth_core::{PhysicalTime, TrustWindow};
use parking_lot::RwLock;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

/// Certificates seen by the gateway, keyed by fingerprint.
pub struct CertificateRegistry {
    cloud: Arc<dyn CloudIdentityEffects>,
    clock: Arc<dyn PhysicalTimeEffects>,
    trust_window: RwLock<TrustWindow>,
    certificates: RwLock<HashMap<String, Certificate>>,
}

impl CertificateRegistry {
    /// An empty registry. Verdicts older than `trust_window` are
    /// re-checked with the cloud.
    pub fn new(
        cloud: Arc<dyn CloudIdentityEffects>,
        clock: Arc<dyn PhysicalTimeEffects>,
        trust_window: TrustWindow,
    ) -> Self {
        Self {
            cloud,
            clock,
            trust_window: RwLock::new(trust_window),
            certificates: RwLock::new(HashMap::new()),
        }
    }

    /// Trust window currently applied.
    pub fn trust_window(&self) -> TrustWindow {
        *self.trust_window.read()
    }

    /// Change the trust window. Applies to cached entries too.
    pub fn set_trust_window(&self, window: TrustWindow) {
        *self.trust_window.write() = window;
    }

    /// Cloud id of the active certificate encoded by `pem`, if any.
    pub async fn get_certificate_id_for_pem(&self, pem: &str) -> Option<String> {
        self.authenticate_pem(pem)
            .await
            .and_then(|cert| cert.certificate_id().map(str::to_string))
    }

    /// Whether `pem` currently authenticates.
    pub async fn is_certificate_valid(&self, pem: &str) -> bool {
        self.get_certificate_id_for_pem(pem).await.is_some()
    }

    /// Snapshot of the certificate for `pem` if it is active, consulting the
    /// cloud when the cached verdict is missing or stale.
    pub async fn authenticate_pem(&self, pem: &str) -> Option<Certificate> {
        if pem.trim().is_empty() {
            return None;
        }
        let fingerprint = Certificate::fingerprint_of(pem);
        let now = self.clock.physical_time();
        let window = self.trust_window();

        if let Some(cert) = self
            .get_certificate(&fingerprint)
            .filter(|cert| cert.is_trusted(window, now))
        {
            tracing::debug!(
                certificate_id = cert.certificate_id().unwrap_or_default(),
                verification_source = "local",
                "Certificate is active"
            );
            return Some(cert);
        }

        match self.verify_with_cloud(pem).await {
            Ok(verdict) => verdict,
            Err(err) => {
                let cached = self.get_certificate(&fingerprint).filter(Certificate::is_active);
                tracing::warn!(
                    error = %err,
                    fingerprint = %fingerprint,
                    cached = cached.is_some(),
                    "Unable to verify certificate with cloud, falling back to last known state"
                );
                cached
            }
        }
    }

    /// Ask the cloud about `pem` and record the answer.
    ///
    /// Returns the updated certificate if it is active, `None` if the cloud
    /// says it is not (or the PEM is unusable), and the cloud error untouched
    /// if no answer was obtained.
    pub async fn verify_with_cloud(
        &self,
        pem: &str,
    ) -> std::result::Result<Option<Certificate>, CloudError> {
        let template = match Certificate::from_pem(pem) {
            Ok(cert) => cert,
            Err(err) => {
                tracing::warn!(error = %err, "Unable to process certificate");
                return Ok(None);
            }
        };

        let verdict = self.cloud.get_active_certificate_id(pem).await?;
        let now = self.clock.physical_time();

        let mut certificates = self.certificates.write();
        let cert = certificates
            .entry(template.fingerprint().to_string())
            .or_insert(template);
        match verdict {
            Some(certificate_id) => {
                cert.mark_active(certificate_id, now);
                tracing::debug!(
                    certificate_id = cert.certificate_id().unwrap_or_default(),
                    verification_source = "cloud",
                    "Certificate is active"
                );
                Ok(Some(cert.clone()))
            }
            None => {
                cert.mark_inactive(now);
                tracing::debug!(
                    fingerprint = %cert.fingerprint(),
                    verification_source = "cloud",
                    "Certificate is not active"
                );
                Ok(None)
            }
        }
    }

    /// Get or create the registry entry for `pem`.
    pub fn create_certificate(&self, pem: &str) -> Result<Certificate> {
        let template = Certificate::from_pem(pem)?;
        let mut certificates = self.certificates.write();
        Ok(certificates
            .entry(template.fingerprint().to_string())
            .or_insert(template)
            .clone())
    }

    /// Store `cert` unless the registry already holds a newer version.
    /// Returns whether it was stored.
    pub fn update_certificate(&self, cert: Certificate) -> bool {
        let mut certificates = self.certificates.write();
        match certificates.entry(cert.fingerprint().to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(cert);
                true
            }
            Entry::Occupied(mut slot) => {
                if cert.last_updated() >= slot.get().last_updated() {
                    slot.insert(cert);
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Forget a certificate by fingerprint.
    pub fn remove_certificate(&self, fingerprint: &str) -> Option<Certificate> {
        self.certificates.write().remove(fingerprint)
    }

    /// Certificate by fingerprint.
    pub fn get_certificate(&self, fingerprint: &str) -> Option<Certificate> {
        self.certificates.read().get(fingerprint).cloned()
    }

    /// Look up a certificate by its cloud-assigned id.
    pub fn certificate_by_id(&self, certificate_id: &str) -> Option<Certificate> {
        self.certificates
            .read()
            .values()
            .find(|cert| cert.certificate_id() == Some(certificate_id))
            .cloned()
    }

    /// Snapshot of every cached certificate.
    pub fn all_certificates(&self) -> Vec<Certificate> {
        self.certificates.read().values().cloned().collect()
    }

    /// Remove certificates matching `predicate`. Returns the removed ones.
    pub fn remove_where<F>(&self, mut predicate: F) -> Vec<Certificate>
    where
        F: FnMut(&Certificate) -> bool,
    {
        let mut certificates = self.certificates.write();
        let doomed: Vec<String> = certificates
            .values()
            .filter(|cert| predicate(cert))
            .map(|cert| cert.fingerprint().to_string())
            .collect();
        doomed
            .iter()
            .filter_map(|fingerprint| certificates.remove(fingerprint))
            .collect()
    }

    /// Drop entries whose last verification is outside the trust window.
    /// Returns how many were removed.
    pub fn refresh(&self, now: PhysicalTime) -> usize {
        let window = self.trust_window();
        let mut certificates = self.certificates.write();
        let before = certificates.len();
        certificates.retain(|_, cert| window.is_trusted(cert.last_updated(), now));
        let removed = before - certificates.len();
        if removed > 0 {
            tracing::debug!(removed, "Removed expired certificates");
        }
        removed
    }

    /// Number of cached certificates.
    pub fn len(&self) -> usize {
        self.certificates.read().len()
    }

    /// Whether no certificate is cached.
    pub fn is_empty(&self) -> bool {
        self.certificates.read().is_empty()
    }
}

impl std::fmt::Debug for CertificateRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateRegistry")
            .field("trust_window", &self.trust_window())
            .field("certificates", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iot::CertificateStatus;
    use clientauth_testkit::{certificate_pem, FakeCloudIdentity, ManualClock};

    struct Fixture {
        cloud: Arc<FakeCloudIdentity>,
        clock: Arc<ManualClock>,
        registry: CertificateRegistry,
    }

    fn fixture() -> Fixture {
        let cloud = Arc::new(FakeCloudIdentity::new());
        let clock = Arc::new(ManualClock::starting_now());
        let registry =
            CertificateRegistry::new(cloud.clone(), clock.clone(), TrustWindow::from_hours(24));
        Fixture {
            cloud,
            clock,
            registry,
        }
    }

    #[tokio::test]
    async fn trusted_entry_skips_the_cloud() {
        let f = fixture();
        let pem = certificate_pem("device");
        f.cloud.activate_certificate(&pem, "cert-1");

        assert_eq!(f.registry.get_certificate_id_for_pem(&pem).await.as_deref(), Some("cert-1"));
        assert_eq!(f.registry.get_certificate_id_for_pem(&pem).await.as_deref(), Some("cert-1"));
        assert_eq!(f.cloud.certificate_calls(), 1);
    }

    #[tokio::test]
    async fn expired_entry_is_reverified() {
        let f = fixture();
        let pem = certificate_pem("device");
        f.cloud.activate_certificate(&pem, "cert-1");
        f.registry.get_certificate_id_for_pem(&pem).await;

        f.clock.advance_hours(25);
        assert!(f.registry.is_certificate_valid(&pem).await);
        assert_eq!(f.cloud.certificate_calls(), 2);
    }

    #[tokio::test]
    async fn definitive_inactive_answer_fails_closed() {
        let f = fixture();
        let pem = certificate_pem("device");
        f.cloud.activate_certificate(&pem, "cert-1");
        f.registry.get_certificate_id_for_pem(&pem).await;

        f.clock.advance_hours(25);
        f.cloud.deactivate_certificate(&pem);

        assert_eq!(f.registry.get_certificate_id_for_pem(&pem).await, None);
        let stored = f.registry.get_certificate(&Certificate::fingerprint_of(&pem)).unwrap();
        assert_eq!(stored.status(), CertificateStatus::Inactive);
    }

    #[tokio::test]
    async fn transient_failure_falls_back_to_lapsed_active_entry() {
        let f = fixture();
        let pem = certificate_pem("device");
        f.cloud.activate_certificate(&pem, "cert-1");
        f.registry.get_certificate_id_for_pem(&pem).await;

        f.clock.advance_hours(48);
        f.cloud.fail_with(CloudError::unreachable("offline"));

        assert_eq!(f.registry.get_certificate_id_for_pem(&pem).await.as_deref(), Some("cert-1"));
    }

    #[tokio::test]
    async fn transient_failure_without_history_fails_closed() {
        let f = fixture();
        let pem = certificate_pem("device");
        f.cloud.activate_certificate(&pem, "cert-1");
        f.cloud.fail_with(CloudError::unreachable("offline"));

        assert_eq!(f.registry.get_certificate_id_for_pem(&pem).await, None);
    }

    #[tokio::test]
    async fn empty_or_malformed_pem_never_reaches_the_cloud() {
        let f = fixture();
        assert_eq!(f.registry.get_certificate_id_for_pem("").await, None);
        assert_eq!(f.registry.get_certificate_id_for_pem("garbage").await, None);
        assert_eq!(f.cloud.certificate_calls(), 0);
    }

    #[test]
    fn update_ignores_older_versions() {
        let f = fixture();
        let pem = certificate_pem("device");
        let created = f.registry.create_certificate(&pem).unwrap();
        assert_eq!(created.status(), CertificateStatus::Unknown);

        let mut newer = created.clone();
        newer.mark_active("cert-1", PhysicalTime::from_millis(200));
        assert!(f.registry.update_certificate(newer));

        let mut older = created;
        older.mark_inactive(PhysicalTime::from_millis(100));
        assert!(!f.registry.update_certificate(older));

        assert!(f.registry.certificate_by_id("cert-1").unwrap().is_active());
    }

    #[tokio::test]
    async fn refresh_removes_expired_entries() {
        let f = fixture();
        let fresh = certificate_pem("fresh");
        let stale = certificate_pem("stale");
        f.cloud.activate_certificate(&fresh, "c-fresh");
        f.cloud.activate_certificate(&stale, "c-stale");

        f.registry.get_certificate_id_for_pem(&stale).await;
        f.clock.advance_hours(20);
        f.registry.get_certificate_id_for_pem(&fresh).await;
        f.clock.advance_hours(10);

        assert_eq!(f.registry.refresh(f.clock.now()), 1);
        assert!(f.registry.certificate_by_id("c-fresh").is_some());
        assert!(f.registry.certificate_by_id("c-stale").is_none());
    }
}
