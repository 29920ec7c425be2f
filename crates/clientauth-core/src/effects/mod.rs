//! External collaborator interfaces.
//!
//! This module defines **what** the engine needs from its environment; hosts
//! and test fakes define **how**.
//!
//! - **Time**: wall-clock timestamps used to stamp and expire cached facts
//! - **Cloud identity**: the fleet-management service that is the source of
//!   truth for certificate validity and thing/certificate attachment
//! - **Network**: reachability signal driving background refresh
//! - **Local issuer**: recognizes certificates minted by the gateway's own CA
//! - **Reliability**: bounded retry with capped exponential backoff for
//!   cloud calls

/// Cloud identity service
pub mod cloud;
/// Local certificate authority
pub mod issuer;
/// Network reachability
pub mod network;
/// Retry with backoff
pub mod reliability;
/// Wall-clock time
pub mod time;

pub use cloud::{CloudError, CloudIdentityEffects};
pub use issuer::{LocalIssuerEffects, NoLocalIssuer};
pub use network::{NetworkMonitor, NetworkState};
pub use reliability::{BackoffStrategy, RetryPolicy};
pub use time::{PhysicalTimeEffects, SystemClock};
