//! Policy variables substituted from session attributes.

use clientauth_core::Session;
use std::fmt;

const VARIABLE_OPEN: &str = "${";
const VARIABLE_CLOSE: char = '}';

/// A supported `${...}` variable in a policy resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PolicyVariable {
    /// `${iot:Connection.Thing.ThingName}`
    ThingName,
}

impl PolicyVariable {
    /// Every variable policies may use.
    pub const ALL: [PolicyVariable; 1] = [PolicyVariable::ThingName];

    /// Parse the full `${...}` text of a variable.
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "${iot:Connection.Thing.ThingName}" => Some(Self::ThingName),
            _ => None,
        }
    }

    /// The `${...}` form as written in policies.
    pub fn text(&self) -> &'static str {
        match self {
            Self::ThingName => "${iot:Connection.Thing.ThingName}",
        }
    }

    /// `(namespace, attribute)` the value is read from.
    pub fn attribute(&self) -> (&'static str, &'static str) {
        match self {
            Self::ThingName => ("Thing", "ThingName"),
        }
    }

    /// Value of the variable for `session`, if the session carries it.
    pub fn resolve(&self, session: &Session) -> Option<String> {
        let (namespace, name) = self.attribute();
        session
            .session_attribute(namespace, name)
            .and_then(|attr| attr.value().map(str::to_string))
    }
}

impl fmt::Display for PolicyVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

/// Comma-separated list of the supported variables, for error messages.
pub fn supported_variables() -> String {
    PolicyVariable::ALL
        .iter()
        .map(PolicyVariable::text)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Every distinct variable occurring in `resource`, in first-occurrence
/// order. `Err` carries the text of the first unsupported variable.
pub fn find_policy_variables(resource: &str) -> Result<Vec<PolicyVariable>, String> {
    let mut found = Vec::new();
    let mut rest = resource;
    while let Some(start) = rest.find(VARIABLE_OPEN) {
        let candidate = &rest[start..];
        let Some(end) = candidate.find(VARIABLE_CLOSE) else {
            break;
        };
        let text = &candidate[..=end];
        let variable = PolicyVariable::parse(text).ok_or_else(|| text.to_string())?;
        if !found.contains(&variable) {
            found.push(variable);
        }
        rest = &candidate[end + 1..];
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clientauth_core::{DeviceAttribute, session::StaticAttributes};
    use std::sync::Arc;

    #[test]
    fn finds_thing_name_once() {
        let vars = find_policy_variables(
            "mqtt:topic:${iot:Connection.Thing.ThingName}/${iot:Connection.Thing.ThingName}",
        )
        .unwrap();
        assert_eq!(vars, vec![PolicyVariable::ThingName]);
    }

    #[test]
    fn resources_without_variables() {
        assert!(find_policy_variables("mqtt:topic:a/b").unwrap().is_empty());
        assert!(find_policy_variables("mqtt:topic:${unterminated").unwrap().is_empty());
    }

    #[test]
    fn unsupported_variables_are_reported() {
        let err = find_policy_variables("mqtt:topic:${iot:Connection.Thing.Attributes[color]}")
            .unwrap_err();
        assert_eq!(err, "${iot:Connection.Thing.Attributes[color]}");
    }

    #[test]
    fn resolves_from_session() {
        let session = Session::new("mqtt").with_provider(Arc::new(
            StaticAttributes::new("Thing")
                .with_attribute("ThingName", DeviceAttribute::wildcard_suffix("lamp")),
        ));
        assert_eq!(PolicyVariable::ThingName.resolve(&session).as_deref(), Some("lamp"));
        assert_eq!(PolicyVariable::ThingName.resolve(&Session::new("mqtt")), None);
    }
}
