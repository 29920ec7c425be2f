//! Session creation and caching.

/// Credential-type dispatch
pub mod factory;
/// Session cache
pub mod manager;
/// Devices on the local MQTT broker
pub mod mqtt;

pub use factory::{SessionCreator, SessionFactory};
pub use manager::{internal_session_id, SessionManager};
pub use mqtt::{MqttSessionFactory, MQTT_CREDENTIAL_TYPE};
