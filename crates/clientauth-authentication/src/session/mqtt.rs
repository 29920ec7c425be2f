//! Sessions for devices connecting to the local MQTT broker.
//!
//! A device presents its client id and certificate. Certificates minted by the
//! gateway's local CA belong to trusted components on the gateway and yield a
//! component session. Anything else must be a certificate the cloud considers
//! active, attached to the thing named by the client id.

use super::factory::SessionFactory;
use crate::errors::{AuthenticationError, Result};
use crate::iot::{Certificate, Thing};
use crate::registry::{CertificateRegistry, ThingRegistry};
use async_trait::async_trait;
use clientauth_core::effects::LocalIssuerEffects;
use clientauth_core::Session;
use std::collections::HashMap;
use std::sync::Arc;

/// Credential type handled by [`MqttSessionFactory`]
pub const MQTT_CREDENTIAL_TYPE: &str = "mqtt";

/// MQTT client id, which must be the thing name
pub const CLIENT_ID_KEY: &str = "clientId";
/// Client certificate presented during the TLS handshake
pub const CERTIFICATE_PEM_KEY: &str = "certificatePem";
/// Accepted but not used for certificate authentication
pub const USERNAME_KEY: &str = "username";
/// Accepted but not used for certificate authentication
pub const PASSWORD_KEY: &str = "password";

/// Authenticates MQTT clients by certificate and thing attachment.
pub struct MqttSessionFactory {
    certificates: Arc<CertificateRegistry>,
    things: Arc<ThingRegistry>,
    local_issuer: Arc<dyn LocalIssuerEffects>,
}

impl MqttSessionFactory {
    /// Factory checking certificates and attachments against the registries.
    pub fn new(
        certificates: Arc<CertificateRegistry>,
        things: Arc<ThingRegistry>,
        local_issuer: Arc<dyn LocalIssuerEffects>,
    ) -> Self {
        Self {
            certificates,
            things,
            local_issuer,
        }
    }

    async fn create_thing_session(&self, client_id: &str, pem: &str) -> Result<Session> {
        let certificate = self
            .certificates
            .authenticate_pem(pem)
            .await
            .ok_or(AuthenticationError::CertificateNotActive)?;
        let certificate_id = certificate
            .certificate_id()
            .ok_or(AuthenticationError::CertificateNotActive)?
            .to_string();

        if !self
            .things
            .is_thing_attached_to_certificate(client_id, &certificate_id)
            .await?
        {
            return Err(AuthenticationError::ThingNotAttached {
                thing_name: client_id.to_string(),
                certificate_id,
            });
        }

        let thing = self.things.get_or_create_thing(client_id)?;
        tracing::debug!(
            thing_name = %client_id,
            certificate_id = %certificate_id,
            "Authenticated thing session"
        );
        Ok(Session::new(MQTT_CREDENTIAL_TYPE)
            .with_provider(Arc::new(thing))
            .with_provider(Arc::new(certificate)))
    }
}

fn required<'a>(credentials: &'a HashMap<String, String>, key: &str) -> Result<&'a str> {
    credentials
        .get(key)
        .map(String::as_str)
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| AuthenticationError::missing_credential(key))
}

#[async_trait]
impl SessionFactory for MqttSessionFactory {
    async fn create_session(&self, credentials: &HashMap<String, String>) -> Result<Session> {
        let pem = required(credentials, CERTIFICATE_PEM_KEY)?;
        let client_id = required(credentials, CLIENT_ID_KEY)?;

        // Fail on garbage before any lookup
        Certificate::from_pem(pem)?;

        if self.local_issuer.is_issued_by_local_ca(pem) {
            tracing::debug!(client_id, "Certificate issued by local CA, creating component session");
            return Ok(Session::component(MQTT_CREDENTIAL_TYPE));
        }

        if !Thing::is_valid_name(client_id) {
            return Err(AuthenticationError::InvalidThingName {
                thing_name: client_id.to_string(),
            });
        }

        self.create_thing_session(client_id, pem).await
    }
}

impl std::fmt::Debug for MqttSessionFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttSessionFactory")
            .field("certificates", &self.certificates)
            .field("things", &self.things)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iot::{CERTIFICATE_ID_ATTRIBUTE, CERTIFICATE_NAMESPACE, THING_NAMESPACE, THING_NAME_ATTRIBUTE};
    use assert_matches::assert_matches;
    use clientauth_core::TrustWindow;
    use clientauth_testkit::{certificate_pem, FakeCloudIdentity, ManualClock, StaticLocalIssuer};

    struct Fixture {
        cloud: Arc<FakeCloudIdentity>,
        issuer: Arc<StaticLocalIssuer>,
        factory: MqttSessionFactory,
    }

    fn fixture() -> Fixture {
        let cloud = Arc::new(FakeCloudIdentity::new());
        let clock = Arc::new(ManualClock::starting_now());
        let issuer = Arc::new(StaticLocalIssuer::new());
        let window = TrustWindow::from_hours(24);
        let certificates = Arc::new(CertificateRegistry::new(cloud.clone(), clock.clone(), window));
        let things = Arc::new(ThingRegistry::new(cloud.clone(), clock, window));
        let factory = MqttSessionFactory::new(certificates, things, issuer.clone());
        Fixture {
            cloud,
            issuer,
            factory,
        }
    }

    fn credentials(client_id: &str, pem: &str) -> HashMap<String, String> {
        HashMap::from([
            (CLIENT_ID_KEY.to_string(), client_id.to_string()),
            (CERTIFICATE_PEM_KEY.to_string(), pem.to_string()),
        ])
    }

    #[tokio::test]
    async fn attached_active_certificate_yields_thing_session() {
        let f = fixture();
        let pem = certificate_pem("lamp");
        f.cloud.activate_certificate(&pem, "cert-1");
        f.cloud.attach("lamp", "cert-1");

        let session = f.factory.create_session(&credentials("lamp", &pem)).await.unwrap();

        assert!(!session.is_component());
        assert!(session
            .session_attribute(THING_NAMESPACE, THING_NAME_ATTRIBUTE)
            .unwrap()
            .matches("lamp"));
        assert!(session
            .session_attribute(CERTIFICATE_NAMESPACE, CERTIFICATE_ID_ATTRIBUTE)
            .unwrap()
            .matches("cert-1"));
    }

    #[tokio::test]
    async fn inactive_certificate_is_refused() {
        let f = fixture();
        let pem = certificate_pem("lamp");
        f.cloud.attach("lamp", "cert-1");

        assert_matches!(
            f.factory.create_session(&credentials("lamp", &pem)).await,
            Err(AuthenticationError::CertificateNotActive)
        );
    }

    #[tokio::test]
    async fn unattached_thing_is_refused() {
        let f = fixture();
        let pem = certificate_pem("lamp");
        f.cloud.activate_certificate(&pem, "cert-1");

        assert_matches!(
            f.factory.create_session(&credentials("fan", &pem)).await,
            Err(AuthenticationError::ThingNotAttached { thing_name, .. }) if thing_name == "fan"
        );
    }

    #[tokio::test]
    async fn locally_issued_certificate_yields_component_session() {
        let f = fixture();
        let pem = certificate_pem("component");
        f.issuer.issue(pem.clone());

        let session = f
            .factory
            .create_session(&credentials("any client id", &pem))
            .await
            .unwrap();
        assert!(session.is_component());
        assert_eq!(f.cloud.total_calls(), 0);
    }

    #[tokio::test]
    async fn missing_or_malformed_credentials() {
        let f = fixture();
        let pem = certificate_pem("lamp");

        let mut no_client = credentials("lamp", &pem);
        no_client.remove(CLIENT_ID_KEY);
        assert_matches!(
            f.factory.create_session(&no_client).await,
            Err(AuthenticationError::MissingCredential { name }) if name == CLIENT_ID_KEY
        );

        assert_matches!(
            f.factory.create_session(&credentials("lamp", "")).await,
            Err(AuthenticationError::MissingCredential { name }) if name == CERTIFICATE_PEM_KEY
        );
        assert_matches!(
            f.factory.create_session(&credentials("lamp", "nonsense")).await,
            Err(AuthenticationError::InvalidCertificate { .. })
        );
        assert_matches!(
            f.factory.create_session(&credentials("bad/name", &pem)).await,
            Err(AuthenticationError::InvalidThingName { .. })
        );
    }
}
