//! Client Device Auth Agent
//!
//! The service a gateway host embeds to authenticate and authorize client
//! devices connecting to its local broker. See [`ClientDeviceAuthService`].
//!
//! ```ignore
//! let service = ClientDeviceAuthService::builder(cloud)
//!     .with_config(ClientAuthConfig::load_from_file(path)?)
//!     .with_network_monitor(network)
//!     .build()?;
//! service.apply_group_configuration_json(&groups_json)?;
//! service.start_background_refresh();
//!
//! let session_id = service.authenticate("mqtt", &credentials).await?;
//! if service.authorize(&session_id, "mqtt:publish", Some("mqtt:topic:a"))? {
//!     // forward the message
//! }
//! ```

#![forbid(unsafe_code)]

/// Host-facing errors
pub mod errors;
/// Tracing subscriber setup
pub mod logging;
/// Background registry refresh
pub mod refresh_task;
/// The service facade
pub mod service;

pub use errors::{Result, ServiceError};
pub use logging::init_tracing;
pub use refresh_task::BackgroundRefresh;
pub use service::{ClientDeviceAuthService, ClientDeviceAuthServiceBuilder};
