//! Configuration validation utilities.
//!
//! Numeric settings are never rejected for being out of range; they are
//! clamped into range and the adjustment is logged. Structural problems
//! (inconsistent combinations of settings) are collected by
//! [`ConfigValidator`] and reported as errors.

use crate::ClientAuthError;

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Value was outside its accepted range
    #[error("Field '{field}' must be between {min} and {max} (got {actual})")]
    OutOfRange {
        field: String,
        min: i64,
        max: i64,
        actual: i64,
    },
    /// Custom validation failed
    #[error("Field '{field}': {message}")]
    Custom { field: String, message: String },
}

impl From<ValidationError> for ClientAuthError {
    fn from(err: ValidationError) -> Self {
        ClientAuthError::invalid(err.to_string())
    }
}

/// Clamp `value` into `[min, max]`, logging a warning when it had to move.
pub fn clamp_with_warning(field: &str, value: i64, min: i64, max: i64) -> i64 {
    let clamped = value.clamp(min, max);
    if clamped != value {
        let err = ValidationError::OutOfRange {
            field: field.to_string(),
            min,
            max,
            actual: value,
        };
        tracing::warn!(field, value, clamped, "{err}; using clamped value");
    }
    clamped
}

/// Accumulates structural validation failures.
#[derive(Debug, Default)]
pub struct ConfigValidator {
    errors: Vec<ValidationError>,
}

impl ConfigValidator {
    /// A validator with no recorded failures.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate using a custom predicate
    pub fn custom<T, F>(&mut self, field: &str, value: &T, predicate: F, message: &str) -> &mut Self
    where
        F: FnOnce(&T) -> bool,
    {
        if !predicate(value) {
            self.errors.push(ValidationError::Custom {
                field: field.to_string(),
                message: message.to_string(),
            });
        }
        self
    }

    /// First failure, if any.
    pub fn result(self) -> Result<(), ValidationError> {
        match self.errors.into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Every failure recorded so far.
    pub fn all_errors(self) -> Vec<ValidationError> {
        self.errors
    }
}
