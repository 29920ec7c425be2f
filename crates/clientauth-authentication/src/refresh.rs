//! Registry refresh cycle.
//!
//! One pass that brings both registries back in line with the cloud:
//!
//! 1. list the things associated with the gateway, retrying throttling and
//!    server errors with backoff
//! 2. re-verify every attachment of those things and every certificate they
//!    reference, asking about each certificate once
//! 3. if every re-verification got an answer, drop things the cloud no longer
//!    reports and certificates no remaining thing references, then sweep
//!    entries outside the trust window
//!
//! Scheduling lives with the host-facing service; this module only runs
//! single passes.

use crate::registry::{CertificateRegistry, ThingRegistry};
use clientauth_core::effects::{
    CloudError, CloudIdentityEffects, NetworkMonitor, PhysicalTimeEffects, RetryPolicy,
};
use std::collections::HashSet;
use std::sync::Arc;

/// Why a pass stopped before touching the registries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshSkipReason {
    NetworkDown,
    /// The gateway identity may not list its things
    AccessDenied,
    /// Listing failed even after retries
    CloudUnavailable(CloudError),
}

/// Counters from one completed pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub things_listed: usize,
    pub attachments_verified: usize,
    pub certificates_verified: usize,
    /// Re-verifications that got no answer from the cloud
    pub transient_errors: usize,
    /// Whether removal of stale entries ran
    pub pruned: bool,
    pub things_removed: usize,
    pub certificates_removed: usize,
}

/// Result of one refresh pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Skipped(RefreshSkipReason),
    Completed(RefreshReport),
}

impl RefreshOutcome {
    /// Whether the pass ran rather than being skipped.
    pub fn is_completed(&self) -> bool {
        matches!(self, RefreshOutcome::Completed(_))
    }
}

/// Reconciles both registries with the cloud, one pass at a time.
pub struct RegistryRefresher {
    cloud: Arc<dyn CloudIdentityEffects>,
    clock: Arc<dyn PhysicalTimeEffects>,
    network: Arc<NetworkMonitor>,
    certificates: Arc<CertificateRegistry>,
    things: Arc<ThingRegistry>,
    retry: RetryPolicy,
}

impl RegistryRefresher {
    /// Refresher using the default retry policy.
    pub fn new(
        cloud: Arc<dyn CloudIdentityEffects>,
        clock: Arc<dyn PhysicalTimeEffects>,
        network: Arc<NetworkMonitor>,
        certificates: Arc<CertificateRegistry>,
        things: Arc<ThingRegistry>,
    ) -> Self {
        Self {
            cloud,
            clock,
            network,
            certificates,
            things,
            retry: RetryPolicy::default(),
        }
    }

    /// Retry policy for the thing listing call.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Run one refresh pass.
    pub async fn run_once(&self) -> RefreshOutcome {
        if !self.network.is_up() {
            tracing::debug!("Network is down, skipping registry refresh");
            return RefreshOutcome::Skipped(RefreshSkipReason::NetworkDown);
        }

        let listed = match self
            .retry
            .execute_if(
                || self.cloud.get_things_associated_with_core_device(),
                CloudError::is_retryable,
            )
            .await
        {
            Ok(listed) => listed,
            Err(err) if err.is_access_denied() => {
                tracing::warn!(error = %err, "Not allowed to list things associated with this gateway, skipping registry refresh");
                return RefreshOutcome::Skipped(RefreshSkipReason::AccessDenied);
            }
            Err(err) => {
                tracing::error!(error = %err, "Unable to list things associated with this gateway, skipping registry refresh");
                return RefreshOutcome::Skipped(RefreshSkipReason::CloudUnavailable(err));
            }
        };

        let mut report = RefreshReport {
            things_listed: listed.len(),
            ..RefreshReport::default()
        };
        self.things.record_cloud_things(&listed);
        let listed: HashSet<String> = listed.into_iter().collect();

        self.reverify_attachments(&listed, &mut report).await;
        self.reverify_certificates(&listed, &mut report).await;

        if report.transient_errors > 0 {
            tracing::warn!(
                transient_errors = report.transient_errors,
                "Cloud did not answer every re-verification, keeping registries unpruned"
            );
        } else {
            self.prune(&listed, &mut report);
        }

        tracing::info!(
            things_listed = report.things_listed,
            attachments_verified = report.attachments_verified,
            certificates_verified = report.certificates_verified,
            things_removed = report.things_removed,
            certificates_removed = report.certificates_removed,
            "Registry refresh complete"
        );
        RefreshOutcome::Completed(report)
    }

    async fn reverify_attachments(&self, listed: &HashSet<String>, report: &mut RefreshReport) {
        let mut pairs: Vec<(String, String)> = self
            .things
            .all_things()
            .into_iter()
            .filter(|thing| listed.contains(thing.name()))
            .flat_map(|thing| {
                let name = thing.name().to_string();
                thing
                    .attached_certificates()
                    .keys()
                    .map(|certificate_id| (name.clone(), certificate_id.clone()))
                    .collect::<Vec<_>>()
            })
            .collect();
        pairs.sort();

        for (thing_name, certificate_id) in pairs {
            match self
                .things
                .verify_attachment_with_cloud(&thing_name, &certificate_id)
                .await
            {
                Ok(_) => report.attachments_verified += 1,
                Err(err) => {
                    tracing::warn!(thing_name = %thing_name, certificate_id = %certificate_id, error = %err, "Unable to re-verify attachment");
                    report.transient_errors += 1;
                }
            }
        }
    }

    async fn reverify_certificates(&self, listed: &HashSet<String>, report: &mut RefreshReport) {
        let referenced: HashSet<String> = self
            .things
            .all_things()
            .iter()
            .filter(|thing| listed.contains(thing.name()))
            .flat_map(|thing| thing.attached_certificates().keys().cloned())
            .collect();

        let mut pems: Vec<(String, String)> = self
            .certificates
            .all_certificates()
            .into_iter()
            .filter_map(|cert| {
                let id = cert.certificate_id()?.to_string();
                referenced
                    .contains(&id)
                    .then(|| (id, cert.pem().to_string()))
            })
            .collect();
        pems.sort();
        pems.dedup_by(|a, b| a.0 == b.0);

        for (certificate_id, pem) in pems {
            match self.certificates.verify_with_cloud(&pem).await {
                Ok(_) => report.certificates_verified += 1,
                Err(err) => {
                    tracing::warn!(certificate_id = %certificate_id, error = %err, "Unable to re-verify certificate");
                    report.transient_errors += 1;
                }
            }
        }
    }

    fn prune(&self, listed: &HashSet<String>, report: &mut RefreshReport) {
        let removed_things = self.things.retain_things(listed);
        for thing_name in &removed_things {
            tracing::debug!(thing_name = %thing_name, "Removed thing no longer associated with this gateway");
        }
        report.things_removed = removed_things.len();

        let now = self.clock.physical_time();
        report.things_removed += self.things.refresh(now);

        let referenced = self.things.referenced_certificate_ids();
        let unreferenced = self.certificates.remove_where(|cert| {
            cert.certificate_id()
                .map_or(true, |id| !referenced.contains(id))
        });
        report.certificates_removed = unreferenced.len();
        report.certificates_removed += self.certificates.refresh(now);
        report.pruned = true;
    }
}

impl std::fmt::Debug for RegistryRefresher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryRefresher")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clientauth_core::effects::NetworkState;
    use clientauth_core::TrustWindow;
    use clientauth_testkit::{certificate_pem, FakeCloudIdentity, ManualClock};
    use std::time::Duration;

    struct Fixture {
        cloud: Arc<FakeCloudIdentity>,
        clock: Arc<ManualClock>,
        network: Arc<NetworkMonitor>,
        certificates: Arc<CertificateRegistry>,
        things: Arc<ThingRegistry>,
        refresher: RegistryRefresher,
    }

    fn fixture() -> Fixture {
        let cloud = Arc::new(FakeCloudIdentity::new());
        let clock = Arc::new(ManualClock::starting_now());
        let network = Arc::new(NetworkMonitor::new(NetworkState::Up));
        let window = TrustWindow::from_hours(24);
        let certificates = Arc::new(CertificateRegistry::new(cloud.clone(), clock.clone(), window));
        let things = Arc::new(ThingRegistry::new(cloud.clone(), clock.clone(), window));
        let refresher = RegistryRefresher::new(
            cloud.clone(),
            clock.clone(),
            network.clone(),
            certificates.clone(),
            things.clone(),
        )
        .with_retry_policy(
            RetryPolicy::exponential()
                .with_max_attempts(3)
                .with_initial_delay(Duration::from_millis(1)),
        );
        Fixture {
            cloud,
            clock,
            network,
            certificates,
            things,
            refresher,
        }
    }

    /// Authenticate `thing` with a certificate `id` so both registries know it.
    async fn seed(f: &Fixture, thing: &str, id: &str) -> String {
        let pem = certificate_pem(id);
        f.cloud.activate_certificate(&pem, id);
        f.cloud.attach(thing, id);
        f.certificates.get_certificate_id_for_pem(&pem).await;
        f.things.is_thing_attached_to_certificate(thing, id).await.unwrap();
        pem
    }

    #[tokio::test]
    async fn skips_while_network_is_down() {
        let f = fixture();
        f.network.set_state(NetworkState::Down);

        assert_eq!(
            f.refresher.run_once().await,
            RefreshOutcome::Skipped(RefreshSkipReason::NetworkDown)
        );
        assert_eq!(f.cloud.total_calls(), 0);
    }

    #[tokio::test]
    async fn access_denied_is_a_soft_skip() {
        let f = fixture();
        f.cloud.fail_with(CloudError::access_denied("no iam"));

        assert_eq!(
            f.refresher.run_once().await,
            RefreshOutcome::Skipped(RefreshSkipReason::AccessDenied)
        );
        assert_eq!(f.cloud.list_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn throttled_listing_is_retried() {
        let f = fixture();
        f.cloud.fail_next(CloudError::throttled("slow down"));
        f.cloud.fail_next(CloudError::server_error("500"));
        f.cloud.set_core_device_things(["lamp"]);

        assert!(f.refresher.run_once().await.is_completed());
        assert_eq!(f.cloud.list_calls(), 3);
    }

    #[tokio::test]
    async fn unreachable_cloud_aborts_without_retry() {
        let f = fixture();
        f.cloud.fail_with(CloudError::unreachable("offline"));

        assert_eq!(
            f.refresher.run_once().await,
            RefreshOutcome::Skipped(RefreshSkipReason::CloudUnavailable(CloudError::unreachable(
                "offline"
            )))
        );
        assert_eq!(f.cloud.list_calls(), 1);
    }

    #[tokio::test]
    async fn prunes_things_and_certificates_no_longer_reported() {
        let f = fixture();
        seed(&f, "lamp", "c-lamp").await;
        seed(&f, "fan", "c-fan").await;
        f.cloud.set_core_device_things(["lamp"]);
        f.cloud.reset_call_counts();

        let RefreshOutcome::Completed(report) = f.refresher.run_once().await else {
            panic!("refresh should complete");
        };

        assert!(report.pruned);
        assert_eq!(report.attachments_verified, 1);
        assert_eq!(report.certificates_verified, 1);
        assert!(f.things.get_thing("lamp").is_some());
        assert!(f.things.get_thing("fan").is_none());
        assert!(f.certificates.certificate_by_id("c-lamp").is_some());
        assert!(f.certificates.certificate_by_id("c-fan").is_none());
    }

    #[tokio::test]
    async fn shared_certificate_is_verified_once() {
        let f = fixture();
        seed(&f, "lamp", "shared").await;
        f.cloud.attach("fan", "shared");
        f.things.is_thing_attached_to_certificate("fan", "shared").await.unwrap();
        f.cloud.set_core_device_things(["lamp", "fan"]);
        f.cloud.reset_call_counts();

        assert!(f.refresher.run_once().await.is_completed());
        assert_eq!(f.cloud.attachment_calls(), 2);
        assert_eq!(f.cloud.certificate_calls(), 1);
    }

    #[tokio::test]
    async fn revoked_attachment_is_detached() {
        let f = fixture();
        seed(&f, "lamp", "c1").await;
        f.cloud.set_core_device_things(["lamp"]);
        f.cloud.detach("lamp", "c1");

        assert!(f.refresher.run_once().await.is_completed());
        assert!(f.things.get_thing("lamp").unwrap().attached_certificates().is_empty());
        assert!(f.certificates.certificate_by_id("c1").is_none());
    }

    #[tokio::test]
    async fn transient_reverification_error_skips_pruning() {
        let f = fixture();
        seed(&f, "lamp", "c-lamp").await;
        seed(&f, "fan", "c-fan").await;
        f.cloud.set_core_device_things(["lamp"]);
        f.cloud.fail_attachment_checks_with(CloudError::unreachable("blip"));

        let RefreshOutcome::Completed(report) = f.refresher.run_once().await else {
            panic!("refresh should complete");
        };

        assert_eq!(report.transient_errors, 1);
        assert_eq!(report.certificates_verified, 1);
        assert!(!report.pruned);
        assert!(f.things.get_thing("fan").is_some());
        assert!(f.certificates.certificate_by_id("c-fan").is_some());
    }

    #[tokio::test]
    async fn sweeps_expired_entries_after_pruning() {
        let f = fixture();
        seed(&f, "lamp", "c-lamp").await;
        f.cloud.set_core_device_things(Vec::<String>::new());
        f.clock.advance_hours(48);

        let RefreshOutcome::Completed(report) = f.refresher.run_once().await else {
            panic!("refresh should complete");
        };

        assert_eq!(report.things_removed, 1);
        assert_eq!(report.certificates_removed, 1);
        assert!(f.things.is_empty());
        assert!(f.certificates.is_empty());
    }
}
