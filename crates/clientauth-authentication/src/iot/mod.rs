//! IoT identity domain types.

/// Device certificates
pub mod certificate;
/// Things and their certificate attachments
pub mod thing;

pub use certificate::{Certificate, CertificateStatus, CERTIFICATE_ID_ATTRIBUTE, CERTIFICATE_NAMESPACE};
pub use thing::{Thing, ThingSource, THING_NAMESPACE, THING_NAME_ATTRIBUTE};
