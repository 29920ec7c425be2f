//! Client Device Authorization
//!
//! Decides whether an authenticated session may perform an operation on a
//! resource:
//!
//! 1. [`GroupManager`] resolves which configured device groups the session
//!    belongs to by evaluating each group's [`SelectionRule`]
//! 2. each matching group contributes the [`Permission`]s pre-derived from its
//!    policy
//! 3. [`is_authorized`] matches the request against those permissions using
//!    [`WildcardTrie`] for resource patterns
//!
//! Group configurations are validated when they are built; a
//! [`GroupConfiguration`] that exists can always be evaluated.

#![forbid(unsafe_code)]

/// Authorization and configuration errors
pub mod errors;
/// Authorization decisions
pub mod evaluation;
/// Group membership
pub mod groups;
/// Permissions, operations and resources
pub mod permission;
/// Group configuration documents and policies
pub mod policy;
/// Wildcard pattern matching
pub mod wildcard;

pub use errors::{AuthorizationError, PolicyError, Result};
pub use evaluation::{is_authorized, PermissionEvaluator};
pub use groups::GroupManager;
pub use permission::{Operation, Permission, Resource};
pub use policy::{
    Effect, GroupConfiguration, GroupConfigurationDocument, GroupDefinition, PermissionSet,
    PolicyStatement, PolicyVariable, SelectionRule,
};
pub use wildcard::{MatchOptions, WildcardTrie};
