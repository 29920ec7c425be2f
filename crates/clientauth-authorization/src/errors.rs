//! Authorization and policy configuration errors.

use clientauth_core::ClientAuthError;

/// Failure to evaluate an authorization request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthorizationError {
    /// Operation is not of the form `service:action`
    #[error("Operation is malformed, must be of the form service:action (got {operation:?})")]
    InvalidOperation { operation: String },

    /// Resource is not of the form `service:resourceType:resourceName`
    #[error("Resource is malformed, must be of the form service:resourceType:resourceName (got {resource:?})")]
    InvalidResource { resource: String },

    /// Operation and resource name different services
    #[error("Operation {operation} service is not same as resource {resource} service")]
    ServiceMismatch { operation: String, resource: String },

    /// Session token does not resolve to a live session
    #[error("Unknown session")]
    UnknownSession,
}

/// Invalid group configuration. Raised when a configuration is applied, never
/// during evaluation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    /// A group references a policy that does not exist
    #[error("Group {group} references unknown policy {policy}")]
    UnknownPolicy { group: String, policy: String },

    /// A selection rule could not be parsed
    #[error("Invalid selection rule {rule:?} for group {group} at offset {offset}: {message}")]
    SelectionRule {
        group: String,
        rule: String,
        offset: usize,
        message: String,
    },

    /// A statement uses a policy variable the engine cannot resolve.
    ///
    /// Thing attribute variables such as `${iot:Connection.Thing.Attributes[name]}`
    /// are not resolvable because sessions carry no thing attributes.
    #[error(
        "Policy {policy} statement {statement} uses unsupported policy variable {variable}; supported variables: {supported}",
        supported = crate::policy::variables::supported_variables()
    )]
    UnsupportedPolicyVariable {
        policy: String,
        statement: String,
        variable: String,
    },

    /// A statement is structurally invalid
    #[error("Policy {policy} statement {statement} is invalid: {message}")]
    InvalidStatement {
        policy: String,
        statement: String,
        message: String,
    },

    /// The document itself could not be decoded
    #[error("Malformed group configuration: {message}")]
    Malformed { message: String },
}

impl From<serde_json::Error> for PolicyError {
    fn from(err: serde_json::Error) -> Self {
        PolicyError::Malformed {
            message: err.to_string(),
        }
    }
}

impl From<AuthorizationError> for ClientAuthError {
    fn from(err: AuthorizationError) -> Self {
        match err {
            AuthorizationError::UnknownSession => ClientAuthError::not_found(err.to_string()),
            other => ClientAuthError::invalid(other.to_string()),
        }
    }
}

impl From<PolicyError> for ClientAuthError {
    fn from(err: PolicyError) -> Self {
        ClientAuthError::invalid(err.to_string())
    }
}

/// Result type for authorization operations
pub type Result<T> = std::result::Result<T, AuthorizationError>;
