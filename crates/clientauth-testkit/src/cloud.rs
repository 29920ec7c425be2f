//! In-memory cloud identity service.

use async_trait::async_trait;
use clientauth_core::effects::{CloudError, CloudIdentityEffects};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug, Default)]
struct CloudState {
    /// PEM to certificate id, active certificates only
    active_certificates: HashMap<String, String>,
    /// (thing name, certificate id)
    attachments: HashSet<(String, String)>,
    core_device_things: Vec<String>,
    /// Returned by every call until cleared
    outage: Option<CloudError>,
    /// Returned by attachment checks only, until cleared
    attachment_outage: Option<CloudError>,
    /// Returned by the next calls, one each, before consulting state
    queued_failures: VecDeque<CloudError>,
    certificate_calls: usize,
    attachment_calls: usize,
    list_calls: usize,
}

impl CloudState {
    fn next_failure(&mut self) -> Option<CloudError> {
        self.queued_failures
            .pop_front()
            .or_else(|| self.outage.clone())
    }
}

/// Scriptable [`CloudIdentityEffects`] implementation.
///
/// Every call is counted, including the ones that fail.
#[derive(Debug, Default)]
pub struct FakeCloudIdentity {
    state: Mutex<CloudState>,
}

impl FakeCloudIdentity {
    /// A cloud that knows no certificates or things.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the certificate encoded by `pem` active under `certificate_id`.
    pub fn activate_certificate(&self, pem: &str, certificate_id: &str) {
        self.state
            .lock()
            .active_certificates
            .insert(pem.to_string(), certificate_id.to_string());
    }

    /// Stop reporting `pem` as active.
    pub fn deactivate_certificate(&self, pem: &str) {
        self.state.lock().active_certificates.remove(pem);
    }

    /// Attach a certificate to a thing.
    pub fn attach(&self, thing_name: &str, certificate_id: &str) {
        self.state
            .lock()
            .attachments
            .insert((thing_name.to_string(), certificate_id.to_string()));
    }

    /// Detach a certificate from a thing.
    pub fn detach(&self, thing_name: &str, certificate_id: &str) {
        self.state
            .lock()
            .attachments
            .remove(&(thing_name.to_string(), certificate_id.to_string()));
    }

    /// Things reported as associated with the gateway.
    pub fn set_core_device_things<I, S>(&self, things: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state.lock().core_device_things = things.into_iter().map(Into::into).collect();
    }

    /// Fail every call with `error` until [`Self::restore`] is called.
    pub fn fail_with(&self, error: CloudError) {
        self.state.lock().outage = Some(error);
    }

    /// Fail only attachment checks with `error` until [`Self::restore`].
    pub fn fail_attachment_checks_with(&self, error: CloudError) {
        self.state.lock().attachment_outage = Some(error);
    }

    /// End every outage.
    pub fn restore(&self) {
        let mut state = self.state.lock();
        state.outage = None;
        state.attachment_outage = None;
    }

    /// Fail the next call (of any kind) with `error`.
    pub fn fail_next(&self, error: CloudError) {
        self.state.lock().queued_failures.push_back(error);
    }

    /// Calls to `get_active_certificate_id`.
    pub fn certificate_calls(&self) -> usize {
        self.state.lock().certificate_calls
    }

    /// Calls to `is_thing_attached_to_certificate`.
    pub fn attachment_calls(&self) -> usize {
        self.state.lock().attachment_calls
    }

    /// Calls to `get_things_associated_with_core_device`.
    pub fn list_calls(&self) -> usize {
        self.state.lock().list_calls
    }

    /// Calls of any kind.
    pub fn total_calls(&self) -> usize {
        let state = self.state.lock();
        state.certificate_calls + state.attachment_calls + state.list_calls
    }

    /// Zero every call counter.
    pub fn reset_call_counts(&self) {
        let mut state = self.state.lock();
        state.certificate_calls = 0;
        state.attachment_calls = 0;
        state.list_calls = 0;
    }
}

#[async_trait]
impl CloudIdentityEffects for FakeCloudIdentity {
    async fn get_active_certificate_id(
        &self,
        certificate_pem: &str,
    ) -> Result<Option<String>, CloudError> {
        let mut state = self.state.lock();
        state.certificate_calls += 1;
        if let Some(err) = state.next_failure() {
            return Err(err);
        }
        Ok(state.active_certificates.get(certificate_pem).cloned())
    }

    async fn is_thing_attached_to_certificate(
        &self,
        thing_name: &str,
        certificate_id: &str,
    ) -> Result<bool, CloudError> {
        let mut state = self.state.lock();
        state.attachment_calls += 1;
        if let Some(err) = state
            .next_failure()
            .or_else(|| state.attachment_outage.clone())
        {
            return Err(err);
        }
        Ok(state
            .attachments
            .contains(&(thing_name.to_string(), certificate_id.to_string())))
    }

    async fn get_things_associated_with_core_device(&self) -> Result<Vec<String>, CloudError> {
        let mut state = self.state.lock();
        state.list_calls += 1;
        if let Some(err) = state.next_failure() {
            return Err(err);
        }
        Ok(state.core_device_things.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn answers_from_scripted_state() {
        let cloud = FakeCloudIdentity::new();
        cloud.activate_certificate("pem", "cert-1");
        cloud.attach("lamp", "cert-1");

        assert_eq!(
            cloud.get_active_certificate_id("pem").await.unwrap(),
            Some("cert-1".to_string())
        );
        assert_eq!(cloud.get_active_certificate_id("other").await.unwrap(), None);
        assert!(cloud.is_thing_attached_to_certificate("lamp", "cert-1").await.unwrap());
        assert!(!cloud.is_thing_attached_to_certificate("fan", "cert-1").await.unwrap());
        assert_eq!(cloud.certificate_calls(), 2);
        assert_eq!(cloud.attachment_calls(), 2);
    }

    #[tokio::test]
    async fn queued_failures_come_before_outages() {
        let cloud = FakeCloudIdentity::new();
        cloud.fail_with(CloudError::unreachable("offline"));
        cloud.fail_next(CloudError::throttled("slow down"));

        assert_eq!(
            cloud.get_things_associated_with_core_device().await,
            Err(CloudError::throttled("slow down"))
        );
        assert_eq!(
            cloud.get_things_associated_with_core_device().await,
            Err(CloudError::unreachable("offline"))
        );

        cloud.restore();
        assert!(cloud.get_things_associated_with_core_device().await.is_ok());
        assert_eq!(cloud.list_calls(), 3);
    }
}
