//! Host-facing service.
//!
//! [`ClientDeviceAuthService`] wires the registries, session manager, group
//! manager and background refresh together and exposes the four operations a
//! broker needs: authenticate a connection, authorize a request, close a
//! session and apply a new group configuration.

use crate::errors::{Result, ServiceError};
use crate::refresh_task::BackgroundRefresh;
use clientauth_authentication::{
    CertificateRegistry, MqttSessionFactory, RefreshOutcome, RegistryRefresher, SessionCreator,
    SessionFactory, SessionManager, ThingRegistry, MQTT_CREDENTIAL_TYPE,
};
use clientauth_authorization::{
    GroupConfiguration, GroupConfigurationDocument, GroupManager, PermissionEvaluator,
};
use clientauth_core::effects::{
    CloudIdentityEffects, LocalIssuerEffects, NetworkMonitor, NetworkState, NoLocalIssuer,
    PhysicalTimeEffects, SystemClock,
};
use clientauth_core::ClientAuthConfig;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Builder for [`ClientDeviceAuthService`].
pub struct ClientDeviceAuthServiceBuilder {
    cloud: Arc<dyn CloudIdentityEffects>,
    config: ClientAuthConfig,
    clock: Arc<dyn PhysicalTimeEffects>,
    network: Arc<NetworkMonitor>,
    local_issuer: Arc<dyn LocalIssuerEffects>,
}

impl ClientDeviceAuthServiceBuilder {
    /// Use `config` instead of the defaults. It is normalized on build.
    pub fn with_config(mut self, config: ClientAuthConfig) -> Self {
        self.config = config;
        self
    }

    /// Clock used to stamp and expire cached cloud facts.
    pub fn with_clock(mut self, clock: Arc<dyn PhysicalTimeEffects>) -> Self {
        self.clock = clock;
        self
    }

    /// Share a network monitor the host already drives.
    pub fn with_network_monitor(mut self, network: Arc<NetworkMonitor>) -> Self {
        self.network = network;
        self
    }

    /// Recognize certificates minted by the gateway CA as components.
    pub fn with_local_issuer(mut self, local_issuer: Arc<dyn LocalIssuerEffects>) -> Self {
        self.local_issuer = local_issuer;
        self
    }

    /// Build the service. The background refresh is not started.
    pub fn build(self) -> Result<ClientDeviceAuthService> {
        let config = self.config.normalized()?;
        let trust_window = config.trust_window();

        let certificates = Arc::new(CertificateRegistry::new(
            self.cloud.clone(),
            self.clock.clone(),
            trust_window,
        ));
        let things = Arc::new(ThingRegistry::new(
            self.cloud.clone(),
            self.clock.clone(),
            trust_window,
        ));

        let creator = Arc::new(SessionCreator::new());
        creator.register(
            MQTT_CREDENTIAL_TYPE,
            Arc::new(MqttSessionFactory::new(
                certificates.clone(),
                things.clone(),
                self.local_issuer,
            )),
        );
        let sessions = SessionManager::new(creator, config.max_active_sessions());

        let groups = Arc::new(GroupManager::new());
        let evaluator = PermissionEvaluator::new(groups.clone());

        let refresher = Arc::new(
            RegistryRefresher::new(
                self.cloud,
                self.clock,
                self.network.clone(),
                certificates.clone(),
                things.clone(),
            )
            .with_retry_policy(config.retry_policy()),
        );
        let refresh = BackgroundRefresh::new(
            refresher,
            self.network.clone(),
            config.refresh_interval(),
        );

        Ok(ClientDeviceAuthService {
            config: RwLock::new(config),
            network: self.network,
            certificates,
            things,
            sessions,
            groups,
            evaluator,
            refresh,
        })
    }
}

/// Authenticates client devices and authorizes their requests.
pub struct ClientDeviceAuthService {
    config: RwLock<ClientAuthConfig>,
    network: Arc<NetworkMonitor>,
    certificates: Arc<CertificateRegistry>,
    things: Arc<ThingRegistry>,
    sessions: SessionManager,
    groups: Arc<GroupManager>,
    evaluator: PermissionEvaluator,
    refresh: BackgroundRefresh,
}

impl ClientDeviceAuthService {
    /// Start building a service backed by `cloud`.
    ///
    /// Defaults: [`ClientAuthConfig::default`], the system clock, a network
    /// monitor reporting `Up`, and no local certificate authority.
    pub fn builder(cloud: Arc<dyn CloudIdentityEffects>) -> ClientDeviceAuthServiceBuilder {
        ClientDeviceAuthServiceBuilder {
            cloud,
            config: ClientAuthConfig::default(),
            clock: Arc::new(SystemClock),
            network: Arc::new(NetworkMonitor::new(NetworkState::Up)),
            local_issuer: Arc::new(NoLocalIssuer),
        }
    }

    /// Authenticate a connecting client and return its session id.
    pub async fn authenticate(
        &self,
        credential_type: &str,
        credentials: &HashMap<String, String>,
    ) -> Result<String> {
        match self
            .sessions
            .create_session(credential_type, credentials)
            .await
        {
            Ok(session_id) => Ok(session_id),
            Err(err) => {
                tracing::info!(credential_type, error = %err, "Client authentication failed");
                Err(err.into())
            }
        }
    }

    /// Decide whether the session may perform `operation` on `resource`.
    pub fn authorize(
        &self,
        session_id: &str,
        operation: &str,
        resource: Option<&str>,
    ) -> Result<bool> {
        let Some(session) = self.sessions.find_session(session_id) else {
            tracing::debug!(session_id, "Authorization requested for unknown session");
            return Err(ServiceError::InvalidSession);
        };

        let allowed = self
            .evaluator
            .is_authorized(&session, operation, resource)
            .map_err(|err| {
                tracing::debug!(session_id, operation, error = %err, "Rejected authorization request");
                ServiceError::from(err)
            })?;
        tracing::debug!(session_id, operation, resource, allowed, "Authorization decision");
        Ok(allowed)
    }

    /// Forget a session. Unknown ids are ignored.
    pub fn close_session(&self, session_id: &str) -> bool {
        self.sessions.close_session(session_id)
    }

    /// Validate and install a new group configuration.
    ///
    /// On error the previous configuration stays in effect. Sessions are not
    /// re-authenticated; their next authorization sees the new groups.
    pub fn apply_group_configuration(&self, document: GroupConfigurationDocument) -> Result<()> {
        let config = GroupConfiguration::try_from(document).map_err(|err| {
            tracing::warn!(error = %err, "Rejected group configuration, keeping the previous one");
            ServiceError::from(err)
        })?;
        if config.ignored_deny_statements() > 0 {
            tracing::warn!(
                count = config.ignored_deny_statements(),
                "Group configuration contains DENY statements, which are not enforced"
            );
        }
        self.groups.set_group_configuration(config);
        Ok(())
    }

    /// As [`apply_group_configuration`](Self::apply_group_configuration), from JSON.
    pub fn apply_group_configuration_json(&self, json: &str) -> Result<()> {
        let document = GroupConfigurationDocument::from_json(json).map_err(|err| {
            tracing::warn!(error = %err, "Malformed group configuration, keeping the previous one");
            ServiceError::invalid_configuration(err.to_string())
        })?;
        self.apply_group_configuration(document)
    }

    /// Apply new service settings.
    ///
    /// Session capacity, trust windows and the refresh interval take effect
    /// immediately. The retry policy is fixed when the service is built.
    pub fn update_config(&self, config: ClientAuthConfig) -> Result<()> {
        let config = config.normalized()?;

        self.sessions.set_capacity(config.max_active_sessions());
        let trust_window = config.trust_window();
        self.certificates.set_trust_window(trust_window);
        self.things.set_trust_window(trust_window);
        self.refresh.set_interval(config.refresh_interval());

        tracing::info!(
            max_active_sessions = config.session.max_active_sessions,
            trust_duration_hours = config.security.client_device_trust_duration_hours,
            refresh_interval_secs = config.refresh.interval_secs,
            "Applied client device auth configuration"
        );
        *self.config.write() = config;
        Ok(())
    }

    /// Settings currently in effect.
    pub fn config(&self) -> ClientAuthConfig {
        self.config.read().clone()
    }

    /// Add or replace the session factory for a credential type.
    pub fn register_session_factory(
        &self,
        credential_type: impl Into<String>,
        factory: Arc<dyn SessionFactory>,
    ) {
        self.sessions.creator().register(credential_type, factory);
    }

    /// Network monitor driving the background refresh.
    pub fn network(&self) -> &Arc<NetworkMonitor> {
        &self.network
    }

    /// Report a network transition. Going `Up` triggers a refresh pass.
    pub fn set_network_state(&self, state: NetworkState) {
        self.network.set_state(state);
    }

    /// Start periodic registry refresh. Must be called within a Tokio runtime.
    pub fn start_background_refresh(&self) -> bool {
        self.refresh.start()
    }

    /// Stop periodic registry refresh.
    pub fn stop_background_refresh(&self) -> bool {
        self.refresh.stop()
    }

    /// Run a refresh pass now. `None` if one is already in progress.
    pub async fn refresh_now(&self) -> Option<RefreshOutcome> {
        self.refresh.trigger().await
    }

    /// Certificate trust registry.
    pub fn certificate_registry(&self) -> &Arc<CertificateRegistry> {
        &self.certificates
    }

    /// Thing attachment registry.
    pub fn thing_registry(&self) -> &Arc<ThingRegistry> {
        &self.things
    }

    /// Group manager consulted for every decision.
    pub fn group_manager(&self) -> &Arc<GroupManager> {
        &self.groups
    }

    /// Number of cached sessions.
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }
}

impl std::fmt::Debug for ClientDeviceAuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientDeviceAuthService")
            .field("active_sessions", &self.sessions.len())
            .field("network", &self.network.current())
            .field("refresh", &self.refresh)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use clientauth_testkit::FakeCloudIdentity;

    fn service() -> ClientDeviceAuthService {
        ClientDeviceAuthService::builder(Arc::new(FakeCloudIdentity::new()))
            .build()
            .unwrap()
    }

    #[test]
    fn unknown_session_is_invalid() {
        assert_matches!(
            service().authorize("nope", "mqtt:publish", Some("mqtt:topic:a")),
            Err(ServiceError::InvalidSession)
        );
    }

    #[test]
    fn update_config_resizes_the_session_cache() {
        let service = service();
        let mut config = ClientAuthConfig::default();
        config.session.max_active_sessions = 10;
        config.security.client_device_trust_duration_hours = 2;

        service.update_config(config).unwrap();
        assert_eq!(service.config().session.max_active_sessions, 10);
        assert_eq!(
            service.certificate_registry().trust_window(),
            clientauth_core::TrustWindow::from_hours(2)
        );
    }

    #[test]
    fn inconsistent_config_is_rejected() {
        let service = service();
        let mut config = ClientAuthConfig::default();
        config.refresh.retry.initial_delay_ms = 5_000;
        config.refresh.retry.max_delay_ms = 10;

        assert_matches!(
            service.update_config(config),
            Err(ServiceError::InvalidConfiguration { .. })
        );
        assert_eq!(service.config(), ClientAuthConfig::default());
    }

    #[test]
    fn malformed_group_json_is_rejected() {
        assert_matches!(
            service().apply_group_configuration_json("{not json"),
            Err(ServiceError::InvalidConfiguration { .. })
        );
    }
}
