//! Session attributes consumed by selection rules and policy variables.

use std::collections::BTreeMap;
use std::fmt;

/// A single attribute value together with its matching semantics.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeviceAttribute {
    /// Matches only an identical expression.
    StringLiteral(String),
    /// Matches expressions of the form `x`, `x*`, `*x` or `*x*` against the
    /// value as exact, prefix, suffix or substring respectively.
    WildcardSuffix(String),
    /// Matches every expression. Carried by trusted local components.
    Any,
}

impl DeviceAttribute {
    /// Matches only the exact value.
    pub fn literal(value: impl Into<String>) -> Self {
        Self::StringLiteral(value.into())
    }

    /// Matches the value, or a pattern ending in `*` that prefixes it.
    pub fn wildcard_suffix(value: impl Into<String>) -> Self {
        Self::WildcardSuffix(value.into())
    }

    /// Whether this attribute satisfies `expr`.
    pub fn matches(&self, expr: &str) -> bool {
        match self {
            DeviceAttribute::StringLiteral(value) => value == expr,
            DeviceAttribute::WildcardSuffix(value) => wildcard_suffix_matches(value, expr),
            DeviceAttribute::Any => true,
        }
    }

    /// Concrete value, if the attribute has one.
    pub fn value(&self) -> Option<&str> {
        match self {
            DeviceAttribute::StringLiteral(value) | DeviceAttribute::WildcardSuffix(value) => {
                Some(value)
            }
            DeviceAttribute::Any => None,
        }
    }
}

fn wildcard_suffix_matches(value: &str, expr: &str) -> bool {
    if expr.len() > 1 && expr.starts_with('*') && expr.ends_with('*') {
        return value.contains(&expr[1..expr.len() - 1]);
    }
    if let Some(suffix) = expr.strip_prefix('*') {
        return value.ends_with(suffix);
    }
    if let Some(prefix) = expr.strip_suffix('*') {
        return value.starts_with(prefix);
    }
    value == expr
}

/// Source of the attributes in one namespace of a session (e.g. `Thing`,
/// `Certificate`, `Component`).
pub trait AttributeProvider: Send + Sync + fmt::Debug {
    fn namespace(&self) -> &str;

    fn device_attribute(&self, name: &str) -> Option<DeviceAttribute>;
}

/// Attribute provider backed by a fixed map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticAttributes {
    namespace: String,
    attributes: BTreeMap<String, DeviceAttribute>,
}

impl StaticAttributes {
    /// Provider for `namespace` with no attributes yet.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Add attribute `name`.
    pub fn with_attribute(mut self, name: impl Into<String>, attribute: DeviceAttribute) -> Self {
        self.attributes.insert(name.into(), attribute);
        self
    }
}

impl AttributeProvider for StaticAttributes {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn device_attribute(&self, name: &str) -> Option<DeviceAttribute> {
        self.attributes.get(name).cloned()
    }
}
