//! Client Device Auth Testing Infrastructure
//!
//! Deterministic stand-ins for the collaborators the engine consumes:
//!
//! - [`FakeCloudIdentity`]: scriptable cloud identity service with call
//!   counters and failure injection
//! - [`ManualClock`]: physical time that only moves when a test says so
//! - [`StaticLocalIssuer`]: local CA that recognizes a fixed set of PEMs
//! - [`fixtures`]: PEM-shaped certificates
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! clientauth-testkit = { workspace = true }
//! ```

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

/// Scriptable cloud
pub mod cloud;
/// Certificates, sessions and group configurations
pub mod fixtures;
/// Local issuer fake
pub mod issuer;
/// Manually advanced clock
pub mod time;

pub use cloud::FakeCloudIdentity;
pub use fixtures::{certificate_pem, DEVICE_CERT_PEM};
pub use issuer::StaticLocalIssuer;
pub use time::ManualClock;
