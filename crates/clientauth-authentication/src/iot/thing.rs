//! Things and the certificates attached to them.

use crate::errors::{AuthenticationError, Result};
use clientauth_core::session::AttributeProvider;
use clientauth_core::{DeviceAttribute, PhysicalTime, TrustWindow};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Attribute namespace exposed by things
pub const THING_NAMESPACE: &str = "Thing";
/// Thing name attribute
pub const THING_NAME_ATTRIBUTE: &str = "ThingName";

/// Where the registry first learned about a thing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThingSource {
    /// Created when a device connected
    Local,
    /// Reported by the cloud as associated with this gateway
    Cloud,
}

/// A thing and, per attached certificate id, when the attachment was last
/// confirmed by the cloud.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thing {
    name: String,
    attached_certificates: HashMap<String, PhysicalTime>,
    source: ThingSource,
}

impl Thing {
    /// A `Local` thing with no attachments. Fails on invalid names.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if !Self::is_valid_name(&name) {
            return Err(AuthenticationError::InvalidThingName { thing_name: name });
        }
        Ok(Self {
            name,
            attached_certificates: HashMap::new(),
            source: ThingSource::Local,
        })
    }

    /// `[a-zA-Z0-9\-_:]+`
    pub fn is_valid_name(name: &str) -> bool {
        !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':'))
    }

    /// Set where the thing was learned from.
    pub fn with_source(mut self, source: ThingSource) -> Self {
        self.source = source;
        self
    }

    /// Change where the thing was learned from.
    pub fn set_source(&mut self, source: ThingSource) {
        self.source = source;
    }

    /// Thing name, unique per account.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Where the thing was learned from.
    pub fn source(&self) -> ThingSource {
        self.source
    }

    /// Certificate id to the time the attachment was last verified.
    pub fn attached_certificates(&self) -> &HashMap<String, PhysicalTime> {
        &self.attached_certificates
    }

    /// Record that the cloud confirmed the attachment at `now`.
    pub fn attach_certificate(&mut self, certificate_id: impl Into<String>, now: PhysicalTime) {
        self.attached_certificates.insert(certificate_id.into(), now);
    }

    /// Returns whether an attachment was removed.
    pub fn detach_certificate(&mut self, certificate_id: &str) -> bool {
        self.attached_certificates.remove(certificate_id).is_some()
    }

    /// When the attachment was last verified.
    pub fn certificate_last_attached_on(&self, certificate_id: &str) -> Option<PhysicalTime> {
        self.attached_certificates.get(certificate_id).copied()
    }

    /// Attached and confirmed within `window` of `now`.
    pub fn is_certificate_attached(
        &self,
        certificate_id: &str,
        window: TrustWindow,
        now: PhysicalTime,
    ) -> bool {
        self.certificate_last_attached_on(certificate_id)
            .is_some_and(|verified_at| window.is_trusted(verified_at, now))
    }

    /// Fold `other` into `self`, keeping the newest confirmation time for each
    /// certificate. A thing once reported by the cloud stays a cloud thing.
    pub fn merge(&mut self, other: &Thing) {
        for (certificate_id, verified_at) in &other.attached_certificates {
            self.attached_certificates
                .entry(certificate_id.clone())
                .and_modify(|current| *current = (*current).max(*verified_at))
                .or_insert(*verified_at);
        }
        if other.source == ThingSource::Cloud {
            self.source = ThingSource::Cloud;
        }
    }

    /// Drop attachments outside the trust window. Returns how many went.
    pub fn remove_expired_attachments(&mut self, window: TrustWindow, now: PhysicalTime) -> usize {
        let before = self.attached_certificates.len();
        self.attached_certificates
            .retain(|_, verified_at| window.is_trusted(*verified_at, now));
        before - self.attached_certificates.len()
    }
}

impl AttributeProvider for Thing {
    fn namespace(&self) -> &str {
        THING_NAMESPACE
    }

    fn device_attribute(&self, name: &str) -> Option<DeviceAttribute> {
        match name {
            THING_NAME_ATTRIBUTE => Some(DeviceAttribute::wildcard_suffix(self.name.as_str())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::time::Duration;

    #[test]
    fn validates_thing_names() {
        for name in ["lamp", "Lamp-1", "lamp_1", "a:b", "0"] {
            assert!(Thing::new(name).is_ok(), "{name:?} should be valid");
        }
        for name in ["", "lamp 1", "lamp/1", "lamp*", "lämp"] {
            assert_matches!(
                Thing::new(name),
                Err(AuthenticationError::InvalidThingName { .. }),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn attachment_trust_follows_window() {
        let window = TrustWindow::new(Duration::from_millis(10));
        let mut thing = Thing::new("lamp").unwrap();
        thing.attach_certificate("c1", PhysicalTime::from_millis(100));

        assert!(thing.is_certificate_attached("c1", window, PhysicalTime::from_millis(110)));
        assert!(!thing.is_certificate_attached("c1", window, PhysicalTime::from_millis(111)));
        assert!(!thing.is_certificate_attached("c2", window, PhysicalTime::from_millis(100)));

        assert!(thing.detach_certificate("c1"));
        assert!(!thing.detach_certificate("c1"));
    }

    #[test]
    fn merge_keeps_newest_confirmation() {
        let mut stored = Thing::new("lamp").unwrap();
        stored.attach_certificate("c1", PhysicalTime::from_millis(200));
        stored.attach_certificate("c2", PhysicalTime::from_millis(100));

        let mut incoming = Thing::new("lamp").unwrap().with_source(ThingSource::Cloud);
        incoming.attach_certificate("c1", PhysicalTime::from_millis(150));
        incoming.attach_certificate("c2", PhysicalTime::from_millis(300));
        incoming.attach_certificate("c3", PhysicalTime::from_millis(50));

        stored.merge(&incoming);

        assert_eq!(stored.certificate_last_attached_on("c1"), Some(PhysicalTime::from_millis(200)));
        assert_eq!(stored.certificate_last_attached_on("c2"), Some(PhysicalTime::from_millis(300)));
        assert_eq!(stored.certificate_last_attached_on("c3"), Some(PhysicalTime::from_millis(50)));
        assert_eq!(stored.source(), ThingSource::Cloud);
    }

    #[test]
    fn exposes_thing_name_as_wildcard_attribute() {
        let thing = Thing::new("sensor-kitchen").unwrap();
        let attr = thing.device_attribute(THING_NAME_ATTRIBUTE).unwrap();

        assert!(attr.matches("sensor-*"));
        assert!(attr.matches("*kitchen"));
        assert!(!attr.matches("light-*"));
        assert!(thing.device_attribute("Other").is_none());
    }
}
