//! Client Device Auth Core
//!
//! Foundation types shared by every layer of the client device trust and
//! authorization engine:
//!
//! - [`errors`]: the unified [`ClientAuthError`] used at crate seams
//! - [`time`]: physical timestamps and the trust window applied to cached
//!   cloud facts
//! - [`effects`]: interfaces for the external collaborators (clock, cloud
//!   identity service, network reachability) plus the retry policy used when
//!   talking to the cloud
//! - [`config`]: service configuration with clamped values
//! - [`session`]: authenticated sessions and the attribute providers that
//!   selection rules evaluate against
//!
//! Nothing in this crate holds global state. Every component is constructed
//! explicitly and handed to its consumers behind an `Arc`.

#![forbid(unsafe_code)]

/// Unified error handling
pub mod errors;

/// Physical time and trust windows
pub mod time;

/// External collaborator interfaces
pub mod effects;

/// Service configuration
pub mod config;

/// Sessions and session attributes
pub mod session;

pub use config::ClientAuthConfig;
pub use errors::{ClientAuthError, Result};
pub use session::{AttributeProvider, DeviceAttribute, Session};
pub use time::{PhysicalTime, TrustWindow};
