//! Group configuration: documents, selection rules, policy variables and the
//! validated snapshot built from them.

/// Validated configurations
pub mod configuration;
/// Serde documents
pub mod document;
/// Selection rules
pub mod selection;
/// Policy variables
pub mod variables;

pub use configuration::{GroupConfiguration, GroupDefinition, PermissionSet};
pub use document::{Effect, GroupConfigurationDocument, PolicyStatement};
pub use selection::{RuleParseError, SelectionRule};
pub use variables::PolicyVariable;
