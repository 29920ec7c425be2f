//! Thing attachment registry.
//!
//! Same caching rules as the certificate registry, keyed by
//! `(thing name, certificate id)`.

use crate::errors::{AuthenticationError, Result};
use crate::iot::{Thing, ThingSource};
use clientauth_core::effects::{CloudError, CloudIdentityEffects, PhysicalTimeEffects};
use clientauth_core::{PhysicalTime, TrustWindow};
use parking_lot::RwLock;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Things seen by the gateway and their verified attachments.
pub struct ThingRegistry {
    cloud: Arc<dyn CloudIdentityEffects>,
    clock: Arc<dyn PhysicalTimeEffects>,
    trust_window: RwLock<TrustWindow>,
    things: RwLock<HashMap<String, Thing>>,
}

impl ThingRegistry {
    /// An empty registry. Verdicts older than `trust_window` are
    /// re-checked with the cloud.
    pub fn new(
        cloud: Arc<dyn CloudIdentityEffects>,
        clock: Arc<dyn PhysicalTimeEffects>,
        trust_window: TrustWindow,
    ) -> Self {
        Self {
            cloud,
            clock,
            trust_window: RwLock::new(trust_window),
            things: RwLock::new(HashMap::new()),
        }
    }

    /// Trust window currently applied.
    pub fn trust_window(&self) -> TrustWindow {
        *self.trust_window.read()
    }

    /// Change the trust window.
    pub fn set_trust_window(&self, window: TrustWindow) {
        *self.trust_window.write() = window;
    }

    /// Existing thing, or a new empty `Local` one.
    pub fn get_or_create_thing(&self, name: &str) -> Result<Thing> {
        if let Some(thing) = self.get_thing(name) {
            return Ok(thing);
        }
        let created = Thing::new(name)?;
        Ok(self
            .things
            .write()
            .entry(name.to_string())
            .or_insert(created)
            .clone())
    }

    /// Snapshot of a thing, if known.
    pub fn get_thing(&self, name: &str) -> Option<Thing> {
        self.things.read().get(name).cloned()
    }

    /// Merge `thing` into the stored version and return the result.
    pub fn update_thing(&self, thing: Thing) -> Thing {
        let mut things = self.things.write();
        match things.entry(thing.name().to_string()) {
            Entry::Vacant(slot) => slot.insert(thing).clone(),
            Entry::Occupied(mut slot) => {
                slot.get_mut().merge(&thing);
                slot.get().clone()
            }
        }
    }

    /// Forget a thing.
    pub fn remove_thing(&self, name: &str) -> Option<Thing> {
        self.things.write().remove(name)
    }

    /// Whether `thing_name` is attached to `certificate_id`.
    ///
    /// A trusted cached attachment answers immediately. Otherwise the cloud
    /// decides; if it cannot, a previously confirmed attachment of any age
    /// counts, and with none the check fails with
    /// [`AuthenticationError::VerificationUnavailable`].
    pub async fn is_thing_attached_to_certificate(
        &self,
        thing_name: &str,
        certificate_id: &str,
    ) -> Result<bool> {
        if !Thing::is_valid_name(thing_name) {
            return Err(AuthenticationError::InvalidThingName {
                thing_name: thing_name.to_string(),
            });
        }

        let now = self.clock.physical_time();
        let window = self.trust_window();
        let cached = self
            .get_thing(thing_name)
            .and_then(|thing| thing.certificate_last_attached_on(certificate_id));
        if cached.is_some_and(|verified_at| window.is_trusted(verified_at, now)) {
            tracing::debug!(
                thing_name,
                certificate_id,
                verification_source = "local",
                "Thing is attached to certificate"
            );
            return Ok(true);
        }

        match self.verify_attachment_with_cloud(thing_name, certificate_id).await {
            Ok(attached) => Ok(attached),
            Err(err) if cached.is_some() => {
                tracing::warn!(
                    thing_name,
                    certificate_id,
                    error = %err,
                    "Unable to verify attachment with cloud, using last known attachment"
                );
                Ok(true)
            }
            Err(err) => {
                tracing::warn!(
                    thing_name,
                    certificate_id,
                    error = %err,
                    "Unable to verify attachment with cloud and no attachment is known"
                );
                Err(AuthenticationError::verification_unavailable(format!(
                    "attachment of {thing_name} to {certificate_id}: {err}"
                )))
            }
        }
    }

    /// Ask the cloud whether `thing_name` is attached to `certificate_id` and
    /// record the answer. Cloud errors are returned untouched.
    pub async fn verify_attachment_with_cloud(
        &self,
        thing_name: &str,
        certificate_id: &str,
    ) -> std::result::Result<bool, CloudError> {
        let attached = self
            .cloud
            .is_thing_attached_to_certificate(thing_name, certificate_id)
            .await?;
        let now = self.clock.physical_time();

        let mut things = self.things.write();
        if attached {
            match things.entry(thing_name.to_string()) {
                Entry::Occupied(mut slot) => slot.get_mut().attach_certificate(certificate_id, now),
                Entry::Vacant(slot) => {
                    if let Ok(mut thing) = Thing::new(thing_name) {
                        thing.attach_certificate(certificate_id, now);
                        slot.insert(thing);
                    }
                }
            }
        } else if let Some(thing) = things.get_mut(thing_name) {
            thing.detach_certificate(certificate_id);
        }
        drop(things);

        tracing::debug!(
            thing_name,
            certificate_id,
            attached,
            verification_source = "cloud",
            "Verified thing attachment"
        );
        Ok(attached)
    }

    /// Record the things the cloud reports for this gateway. Unknown names
    /// are created, known ones become cloud things.
    pub fn record_cloud_things(&self, names: &[String]) {
        let mut things = self.things.write();
        for name in names {
            match things.entry(name.clone()) {
                Entry::Occupied(mut slot) => slot.get_mut().set_source(ThingSource::Cloud),
                Entry::Vacant(slot) => match Thing::new(name.as_str()) {
                    Ok(thing) => {
                        slot.insert(thing.with_source(ThingSource::Cloud));
                    }
                    Err(err) => {
                        tracing::warn!(thing_name = %name, error = %err, "Ignoring thing reported by cloud");
                    }
                },
            }
        }
    }

    /// Remove every thing whose name is not in `keep`. Returns the removed
    /// names.
    pub fn retain_things(&self, keep: &HashSet<String>) -> Vec<String> {
        let mut things = self.things.write();
        let removed: Vec<String> = things
            .keys()
            .filter(|name| !keep.contains(*name))
            .cloned()
            .collect();
        for name in &removed {
            things.remove(name);
        }
        removed
    }

    /// Things with `certificate_id` attached, expired or not.
    pub fn things_with_certificate(&self, certificate_id: &str) -> Vec<Thing> {
        self.things
            .read()
            .values()
            .filter(|thing| thing.certificate_last_attached_on(certificate_id).is_some())
            .cloned()
            .collect()
    }

    /// Snapshot of every cached thing.
    pub fn all_things(&self) -> Vec<Thing> {
        self.things.read().values().cloned().collect()
    }

    /// Every certificate id attached to some thing.
    pub fn referenced_certificate_ids(&self) -> HashSet<String> {
        self.things
            .read()
            .values()
            .flat_map(|thing| thing.attached_certificates().keys().cloned())
            .collect()
    }

    /// Drop attachments outside the trust window, then locally created
    /// things with no attachment left. Returns how many things were removed.
    pub fn refresh(&self, now: PhysicalTime) -> usize {
        let window = self.trust_window();
        let mut things = self.things.write();
        let before = things.len();
        things.retain(|_, thing| {
            thing.remove_expired_attachments(window, now);
            thing.source() == ThingSource::Cloud || !thing.attached_certificates().is_empty()
        });
        let removed = before - things.len();
        if removed > 0 {
            tracing::debug!(removed, "Removed things without trusted attachments");
        }
        removed
    }

    /// Number of cached things.
    pub fn len(&self) -> usize {
        self.things.read().len()
    }

    /// Whether no thing is cached.
    pub fn is_empty(&self) -> bool {
        self.things.read().is_empty()
    }
}

impl std::fmt::Debug for ThingRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThingRegistry")
            .field("trust_window", &self.trust_window())
            .field("things", &self.len())
            .finish_non_exhaustive()
    }
}
