//! Permissions and the request strings they are matched against.
//!
//! Operations have the form `service:action`, resources the form
//! `service:resourceType:resourceName`. Permissions are never written by hand;
//! they are derived from a [`GroupConfiguration`](crate::GroupConfiguration).

use crate::errors::{AuthorizationError, Result};
use crate::policy::variables::PolicyVariable;
use crate::wildcard::{MatchOptions, WildcardTrie};
use clientauth_core::Session;
use std::fmt;

const WILDCARD: &str = "*";

/// One `(principal, operation, resource)` grant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Permission {
    pub principal: String,
    pub operation: String,
    /// `None` grants the operation only for requests that name no resource.
    pub resource: Option<String>,
    /// Policy variables occurring in `resource`, substituted per session.
    pub resource_policy_variables: Vec<PolicyVariable>,
}

impl Permission {
    /// Permission granted to `principal` (a group name).
    pub fn new(
        principal: impl Into<String>,
        operation: impl Into<String>,
        resource: Option<String>,
    ) -> Self {
        Self {
            principal: principal.into(),
            operation: operation.into(),
            resource,
            resource_policy_variables: Vec::new(),
        }
    }

    /// Variables to substitute into the resource before matching.
    pub fn with_policy_variables(mut self, variables: Vec<PolicyVariable>) -> Self {
        self.resource_policy_variables = variables;
        self
    }

    /// The resource pattern with every policy variable replaced by the
    /// session's value.
    ///
    /// Returns `Err(variable)` naming the first variable the session cannot
    /// provide.
    pub fn resource_for(
        &self,
        session: &Session,
    ) -> std::result::Result<Option<String>, PolicyVariable> {
        let Some(resource) = &self.resource else {
            return Ok(None);
        };
        let mut resolved = resource.clone();
        for variable in &self.resource_policy_variables {
            let value = variable.resolve(session).ok_or(*variable)?;
            resolved = resolved.replace(variable.text(), &value);
        }
        Ok(Some(resolved))
    }

    pub(crate) fn principal_matches(&self, group_name: &str) -> bool {
        self.principal == group_name || self.principal == WILDCARD
    }

    pub(crate) fn operation_matches(&self, requested: &Operation<'_>) -> bool {
        if self.operation == requested.text || self.operation == WILDCARD {
            return true;
        }
        // `service:*`
        self.operation
            .strip_suffix(WILDCARD)
            .and_then(|prefix| prefix.strip_suffix(':'))
            .is_some_and(|service| service == requested.service)
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{principal: {}, operation: {}, resource: {}}}",
            self.principal,
            self.operation,
            self.resource.as_deref().unwrap_or("<none>")
        )
    }
}

/// Whether the (already substituted) policy resource grants `requested`.
pub(crate) fn resource_matches(policy: Option<&str>, requested: Option<&Resource<'_>>) -> bool {
    match (policy, requested) {
        (None, None) => true,
        (Some(policy), Some(requested)) => {
            policy == requested.text
                || WildcardTrie::new(MatchOptions::glob_only())
                    .with_pattern(policy)
                    .matches(requested.text)
        }
        _ => false,
    }
}

/// A parsed `service:action` operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operation<'a> {
    pub text: &'a str,
    pub service: &'a str,
    pub action: &'a str,
}

impl<'a> Operation<'a> {
    /// Parse `service:action`.
    pub fn parse(text: &'a str) -> Result<Self> {
        let invalid = || AuthorizationError::InvalidOperation {
            operation: text.to_string(),
        };

        let (service, action) = text.split_once(':').ok_or_else(invalid)?;
        if !is_service(service) {
            return Err(invalid());
        }
        if action.is_empty()
            || !action
                .chars()
                .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
        {
            return Err(invalid());
        }

        Ok(Self {
            text,
            service,
            action,
        })
    }
}

impl fmt::Display for Operation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text)
    }
}

/// A parsed `service:resourceType:resourceName` resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resource<'a> {
    pub text: &'a str,
    pub service: &'a str,
    pub resource_type: &'a str,
    /// May be empty.
    pub resource_name: &'a str,
}

impl<'a> Resource<'a> {
    /// Parse `service:type:name`.
    pub fn parse(text: &'a str) -> Result<Self> {
        let invalid = || AuthorizationError::InvalidResource {
            resource: text.to_string(),
        };

        let (service, rest) = text.split_once(':').ok_or_else(invalid)?;
        if !is_service(service) {
            return Err(invalid());
        }
        let (resource_type, resource_name) = rest.split_once(':').ok_or_else(invalid)?;
        if resource_type.is_empty() || !resource_type.chars().all(char::is_alphabetic) {
            return Err(invalid());
        }
        if resource_name.chars().any(char::is_control) {
            return Err(invalid());
        }

        Ok(Self {
            text,
            service,
            resource_type,
            resource_name,
        })
    }
}

impl fmt::Display for Resource<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text)
    }
}

fn is_service(service: &str) -> bool {
    !service.is_empty() && service.chars().all(char::is_alphabetic)
}
