//! Validated group configuration.
//!
//! All validation happens here, when a document is converted: selection rules
//! are parsed into ASTs, policy references are resolved and policy variables
//! are checked. Evaluation against sessions never fails.

use super::document::{
    Effect, GroupConfigurationDocument, PolicyStatement, DEFAULT_FORMAT_VERSION,
};
use super::selection::{RuleParseError, SelectionRule};
use super::variables::find_policy_variables;
use crate::errors::PolicyError;
use crate::permission::Permission;
use clientauth_core::Session;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// Permissions granted to one group.
pub type PermissionSet = Arc<HashSet<Permission>>;

/// A device group: membership rule plus the policy it receives.
#[derive(Debug, Clone)]
pub struct GroupDefinition {
    selection_rule_text: String,
    selection_rule: SelectionRule,
    policy_name: String,
}

impl GroupDefinition {
    /// Parse the selection rule of a group.
    pub fn new(
        selection_rule_text: impl Into<String>,
        policy_name: impl Into<String>,
    ) -> Result<Self, RuleParseError> {
        let selection_rule_text = selection_rule_text.into();
        let selection_rule = SelectionRule::parse(&selection_rule_text)?;
        Ok(Self {
            selection_rule_text,
            selection_rule,
            policy_name: policy_name.into(),
        })
    }

    /// Selection rule as written.
    pub fn selection_rule_text(&self) -> &str {
        &self.selection_rule_text
    }

    /// Parsed selection rule.
    pub fn selection_rule(&self) -> &SelectionRule {
        &self.selection_rule
    }

    /// Name of the policy granted to the group.
    pub fn policy_name(&self) -> &str {
        &self.policy_name
    }

    /// Whether the device behind `session` belongs to this group.
    pub fn contains_client_device(&self, session: &Session) -> bool {
        self.selection_rule.evaluate(session)
    }
}

/// Immutable, validated configuration snapshot.
#[derive(Debug, Clone)]
pub struct GroupConfiguration {
    format_version: String,
    definitions: BTreeMap<String, GroupDefinition>,
    group_permissions: HashMap<String, PermissionSet>,
    ignored_deny_statements: usize,
}

impl GroupConfiguration {
    /// Decode and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self, PolicyError> {
        Self::try_from(GroupConfigurationDocument::from_json(json)?)
    }

    /// A configuration with no groups: every request is denied.
    pub fn empty() -> Self {
        Self {
            format_version: DEFAULT_FORMAT_VERSION.to_string(),
            definitions: BTreeMap::new(),
            group_permissions: HashMap::new(),
            ignored_deny_statements: 0,
        }
    }

    /// Document format version.
    pub fn format_version(&self) -> &str {
        &self.format_version
    }

    /// Group name to definition.
    pub fn definitions(&self) -> &BTreeMap<String, GroupDefinition> {
        &self.definitions
    }

    /// Permissions derived from the group's policy.
    pub fn permissions_for_group(&self, group: &str) -> Option<&PermissionSet> {
        self.group_permissions.get(group)
    }

    /// Number of `DENY` statements referenced by groups and not enforced.
    pub fn ignored_deny_statements(&self) -> usize {
        self.ignored_deny_statements
    }
}

impl TryFrom<GroupConfigurationDocument> for GroupConfiguration {
    type Error = PolicyError;

    fn try_from(document: GroupConfigurationDocument) -> Result<Self, Self::Error> {
        let mut definitions = BTreeMap::new();
        let mut group_permissions = HashMap::new();
        let mut ignored_deny_statements = 0;

        for (group, definition) in document.definitions {
            let parsed = GroupDefinition::new(
                definition.selection_rule.clone(),
                definition.policy_name.clone(),
            )
            .map_err(|e| PolicyError::SelectionRule {
                group: group.clone(),
                rule: definition.selection_rule.clone(),
                offset: e.offset,
                message: e.message,
            })?;

            let policy = document.policies.get(&definition.policy_name).ok_or_else(|| {
                PolicyError::UnknownPolicy {
                    group: group.clone(),
                    policy: definition.policy_name.clone(),
                }
            })?;

            let mut permissions = HashSet::new();
            for (statement_name, statement) in policy {
                if statement.effect == Effect::Deny {
                    tracing::warn!(
                        group = %group,
                        policy = %definition.policy_name,
                        statement = %statement_name,
                        "DENY statements are not supported and will be ignored"
                    );
                    ignored_deny_statements += 1;
                    continue;
                }
                permissions.extend(statement_permissions(
                    &group,
                    &definition.policy_name,
                    statement_name,
                    statement,
                )?);
            }

            tracing::debug!(group = %group, permissions = permissions.len(), "Derived group permissions");
            group_permissions.insert(group.clone(), Arc::new(permissions));
            definitions.insert(group, parsed);
        }

        Ok(Self {
            format_version: document
                .format_version
                .unwrap_or_else(|| DEFAULT_FORMAT_VERSION.to_string()),
            definitions,
            group_permissions,
            ignored_deny_statements,
        })
    }
}

/// Cross product of a statement's operations and resources. A statement with
/// no resources grants its operations for resource-less requests only.
fn statement_permissions(
    group: &str,
    policy: &str,
    statement_name: &str,
    statement: &PolicyStatement,
) -> Result<Vec<Permission>, PolicyError> {
    let operations: Vec<&str> = statement
        .operations
        .iter()
        .map(String::as_str)
        .filter(|op| !op.is_empty())
        .collect();
    if operations.is_empty() {
        return Err(PolicyError::InvalidStatement {
            policy: policy.to_string(),
            statement: statement_name.to_string(),
            message: "statement grants no operations".to_string(),
        });
    }
    let resources: Vec<&str> = statement
        .resources
        .iter()
        .map(String::as_str)
        .filter(|rsc| !rsc.is_empty())
        .collect();

    let mut permissions = Vec::with_capacity(operations.len() * resources.len().max(1));
    for operation in operations {
        if resources.is_empty() {
            permissions.push(Permission::new(group, operation, None));
            continue;
        }
        for resource in &resources {
            let variables = find_policy_variables(resource).map_err(|variable| {
                PolicyError::UnsupportedPolicyVariable {
                    policy: policy.to_string(),
                    statement: statement_name.to_string(),
                    variable,
                }
            })?;
            permissions.push(
                Permission::new(group, operation, Some((*resource).to_string()))
                    .with_policy_variables(variables),
            );
        }
    }
    Ok(permissions)
}
