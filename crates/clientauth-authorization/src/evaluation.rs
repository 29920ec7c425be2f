//! Authorization decision.
//!
//! Deny by default: a request is allowed iff some permission of some group
//! the session belongs to matches it on principal, operation and resource.
//! `DENY` statements never reach this point, so the first match wins.

use crate::errors::{AuthorizationError, Result};
use crate::groups::GroupManager;
use crate::permission::{resource_matches, Operation, Resource};
use crate::policy::PermissionSet;
use clientauth_core::Session;
use std::collections::HashMap;
use std::sync::Arc;

/// Evaluate `operation` on `resource` against pre-resolved group permissions.
///
/// Malformed requests are errors rather than denials so the host can tell a
/// broken client from an unauthorized one.
pub fn is_authorized(
    operation: &str,
    resource: Option<&str>,
    group_permissions: &HashMap<String, PermissionSet>,
    session: &Session,
) -> Result<bool> {
    let operation = Operation::parse(operation)?;
    let resource = resource.map(Resource::parse).transpose()?;
    if let Some(resource) = &resource {
        if resource.service != operation.service {
            return Err(AuthorizationError::ServiceMismatch {
                operation: operation.text.to_string(),
                resource: resource.text.to_string(),
            });
        }
    }

    if group_permissions.is_empty() {
        tracing::debug!(
            %operation,
            resource = ?resource.map(|r| r.text),
            "No authorization group matches, deny the request"
        );
        return Ok(false);
    }

    for (group, permissions) in group_permissions {
        for permission in permissions.iter() {
            if !permission.principal_matches(group) || !permission.operation_matches(&operation) {
                continue;
            }

            let policy_resource = match permission.resource_for(session) {
                Ok(policy_resource) => policy_resource,
                Err(variable) => {
                    tracing::warn!(
                        %group,
                        %variable,
                        "No session attribute for policy variable, skipping permission"
                    );
                    continue;
                }
            };

            if resource_matches(policy_resource.as_deref(), resource.as_ref()) {
                tracing::debug!(%group, %permission, "Hit policy with permission");
                return Ok(true);
            }
        }
    }

    Ok(false)
}

/// Authorizes sessions against the groups held by a [`GroupManager`].
#[derive(Debug, Clone)]
pub struct PermissionEvaluator {
    group_manager: Arc<GroupManager>,
}

impl PermissionEvaluator {
    /// Evaluator reading groups from `group_manager` on every call.
    pub fn new(group_manager: Arc<GroupManager>) -> Self {
        Self { group_manager }
    }

    /// Group manager consulted for every decision.
    pub fn group_manager(&self) -> &Arc<GroupManager> {
        &self.group_manager
    }

    /// Decide whether `session` may perform `operation` on `resource`.
    ///
    /// Sessions of trusted local components are allowed every well-formed
    /// request.
    pub fn is_authorized(
        &self,
        session: &Session,
        operation: &str,
        resource: Option<&str>,
    ) -> Result<bool> {
        if session.is_component() {
            // Still reject malformed requests
            is_authorized(operation, resource, &HashMap::new(), session)?;
            return Ok(true);
        }

        let group_permissions = self.group_manager.get_applicable_permissions(session);
        is_authorized(operation, resource, &group_permissions, session)
    }
}
