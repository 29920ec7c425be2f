//! Client Device Authentication
//!
//! Turns device credentials into sessions while the gateway is only
//! intermittently connected to the cloud identity service:
//!
//! - [`CertificateRegistry`] and [`ThingRegistry`] cache what the cloud said
//!   about certificates and thing/certificate attachments, trusting each fact
//!   for a bounded [`TrustWindow`](clientauth_core::TrustWindow)
//! - [`SessionFactory`] implementations authenticate one credential type;
//!   [`MqttSessionFactory`] handles devices on the local broker
//! - [`SessionManager`] keeps authenticated sessions in a bounded LRU cache
//! - [`RegistryRefresher`] reconciles both registries with the cloud

#![forbid(unsafe_code)]

/// Authentication errors
pub mod errors;
/// Certificate and thing domain types
pub mod iot;
/// Registry reconciliation with the cloud
pub mod refresh;
/// Cached cloud verdicts
pub mod registry;
/// Session factories and the session cache
pub mod session;

pub use errors::{AuthenticationError, Result};
pub use iot::{Certificate, CertificateStatus, Thing, ThingSource};
pub use refresh::{RefreshOutcome, RefreshReport, RefreshSkipReason, RegistryRefresher};
pub use registry::{CertificateRegistry, ThingRegistry};
pub use session::{
    MqttSessionFactory, SessionCreator, SessionFactory, SessionManager, MQTT_CREDENTIAL_TYPE,
};
