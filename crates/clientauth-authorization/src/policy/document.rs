//! Wire shape of a group configuration.
//!
//! ```json
//! {
//!   "formatVersion": "2021-03-05",
//!   "definitions": {
//!     "sensors": { "selectionRule": "thingName: sensor-*", "policyName": "sensorPolicy" }
//!   },
//!   "policies": {
//!     "sensorPolicy": {
//!       "publish": {
//!         "statementDescription": "telemetry",
//!         "operations": ["mqtt:publish"],
//!         "resources": ["mqtt:topic:telemetry/${iot:Connection.Thing.ThingName}"],
//!         "effect": "ALLOW"
//!       }
//!     }
//!   }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Format version assumed when a document omits it
pub const DEFAULT_FORMAT_VERSION: &str = "2021-03-05";

/// Undecoded group configuration as supplied by the host.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GroupConfigurationDocument {
    pub format_version: Option<String>,
    /// Group name to definition
    pub definitions: BTreeMap<String, GroupDefinitionDocument>,
    /// Policy name to statement name to statement
    pub policies: BTreeMap<String, BTreeMap<String, PolicyStatement>>,
}

/// Undecoded group definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupDefinitionDocument {
    pub selection_rule: String,
    pub policy_name: String,
}

/// Statement effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Effect {
    #[default]
    Allow,
    /// Parsed but not enforced.
    Deny,
}

/// Operations and resources granted together.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PolicyStatement {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statement_description: Option<String>,
    pub operations: Vec<String>,
    pub resources: Vec<String>,
    pub effect: Effect,
}

impl PolicyStatement {
    /// An `ALLOW` statement over the cross product of `operations` and `resources`.
    pub fn allow<O, R>(operations: O, resources: R) -> Self
    where
        O: IntoIterator,
        O::Item: Into<String>,
        R: IntoIterator,
        R::Item: Into<String>,
    {
        Self {
            statement_description: None,
            operations: operations.into_iter().map(Into::into).collect(),
            resources: resources.into_iter().map(Into::into).collect(),
            effect: Effect::Allow,
        }
    }

    /// Set the statement effect.
    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effect = effect;
        self
    }

    /// Attach a free-form description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.statement_description = Some(description.into());
        self
    }
}

impl GroupConfigurationDocument {
    /// An empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode without validating. See `GroupConfiguration::try_from`.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Add or replace a group definition.
    pub fn with_group(
        mut self,
        group: impl Into<String>,
        selection_rule: impl Into<String>,
        policy_name: impl Into<String>,
    ) -> Self {
        self.definitions.insert(
            group.into(),
            GroupDefinitionDocument {
                selection_rule: selection_rule.into(),
                policy_name: policy_name.into(),
            },
        );
        self
    }

    /// Add or replace a statement of `policy_name`.
    pub fn with_statement(
        mut self,
        policy_name: impl Into<String>,
        statement_name: impl Into<String>,
        statement: PolicyStatement,
    ) -> Self {
        self.policies
            .entry(policy_name.into())
            .or_default()
            .insert(statement_name.into(), statement);
        self
    }
}
