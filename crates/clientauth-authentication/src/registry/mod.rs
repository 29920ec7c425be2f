//! Caches of cloud-verified identity facts.

/// Certificate trust registry
pub mod certificate;
/// Thing attachment registry
pub mod thing;

pub use certificate::CertificateRegistry;
pub use thing::ThingRegistry;
