//! Active group configuration and group membership resolution.

use crate::policy::{GroupConfiguration, PermissionSet};
use clientauth_core::Session;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Holds the active [`GroupConfiguration`] snapshot.
///
/// Replacing the configuration swaps a single `Arc`; evaluations already in
/// flight keep using the snapshot they started with.
#[derive(Debug, Default)]
pub struct GroupManager {
    config: RwLock<Option<Arc<GroupConfiguration>>>,
}

impl GroupManager {
    /// A manager with no configuration; every request is denied.
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically replace the active configuration.
    pub fn set_group_configuration(&self, config: GroupConfiguration) {
        let groups = config.definitions().len();
        *self.config.write() = Some(Arc::new(config));
        tracing::info!(groups, "Applied group configuration");
    }

    /// The active snapshot, if one was applied.
    pub fn group_configuration(&self) -> Option<Arc<GroupConfiguration>> {
        self.config.read().clone()
    }

    /// Group name to permissions, for every group whose selection rule
    /// matches `session`.
    pub fn get_applicable_permissions(&self, session: &Session) -> HashMap<String, PermissionSet> {
        let Some(config) = self.group_configuration() else {
            return HashMap::new();
        };

        config
            .definitions()
            .iter()
            .filter(|(_, definition)| definition.contains_client_device(session))
            .filter_map(|(group, _)| {
                config
                    .permissions_for_group(group)
                    .map(|permissions| (group.clone(), Arc::clone(permissions)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{GroupConfigurationDocument, PolicyStatement};
    use clientauth_core::session::StaticAttributes;
    use clientauth_core::DeviceAttribute;

    fn session_with_thing(name: &str) -> Session {
        Session::new("mqtt").with_provider(Arc::new(
            StaticAttributes::new("Thing")
                .with_attribute("ThingName", DeviceAttribute::wildcard_suffix(name)),
        ))
    }

    fn config() -> GroupConfiguration {
        GroupConfiguration::try_from(
            GroupConfigurationDocument::new()
                .with_group("sensors", "thingName: sensor-*", "read")
                .with_group("all", "thingName: *", "connect")
                .with_statement("read", "s", PolicyStatement::allow(["mqtt:subscribe"], ["mqtt:topic:*"]))
                .with_statement("connect", "s", PolicyStatement::allow(["mqtt:connect"], ["mqtt:clientId:*"])),
        )
        .unwrap()
    }

    #[test]
    fn no_configuration_means_no_groups() {
        let manager = GroupManager::new();
        assert!(manager
            .get_applicable_permissions(&session_with_thing("sensor-1"))
            .is_empty());
    }

    #[test]
    fn returns_permissions_of_matching_groups_only() {
        let manager = GroupManager::new();
        manager.set_group_configuration(config());

        let sensor = manager.get_applicable_permissions(&session_with_thing("sensor-1"));
        assert_eq!(sensor.len(), 2);
        assert!(sensor.contains_key("sensors"));

        let lamp = manager.get_applicable_permissions(&session_with_thing("lamp"));
        assert_eq!(lamp.keys().collect::<Vec<_>>(), vec!["all"]);
    }

    #[test]
    fn replacement_is_visible_to_later_lookups() {
        let manager = GroupManager::new();
        manager.set_group_configuration(config());
        let before = manager.group_configuration().unwrap();

        manager.set_group_configuration(GroupConfiguration::empty());

        assert!(manager
            .get_applicable_permissions(&session_with_thing("sensor-1"))
            .is_empty());
        // Snapshots taken earlier are unaffected
        assert_eq!(before.definitions().len(), 2);
    }
}
