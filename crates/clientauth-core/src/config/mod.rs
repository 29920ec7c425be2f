//! Service configuration.
//!
//! Loaded from TOML by the host. Every numeric setting has a default and an
//! accepted range; out-of-range values are clamped with a warning rather than
//! rejected, so a bad deployment value degrades to a safe bound instead of
//! refusing to start.
//!
//! ```toml
//! [session]
//! max_active_sessions = 25000
//!
//! [security]
//! client_device_trust_duration_hours = 24
//!
//! [refresh]
//! interval_secs = 86400
//!
//! [refresh.retry]
//! max_attempts = 3
//! initial_delay_ms = 200
//! max_delay_ms = 5000
//! ```

/// Range clamping and cross-field checks
pub mod validation;

use crate::effects::reliability::{BackoffStrategy, RetryPolicy};
use crate::time::TrustWindow;
use crate::{ClientAuthError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use validation::{clamp_with_warning, ConfigValidator};

/// Default session cache capacity
pub const DEFAULT_MAX_ACTIVE_SESSIONS: i64 = 25_000;
/// Smallest accepted session cache capacity
pub const MIN_ACTIVE_SESSIONS: i64 = 1;
/// Largest accepted session cache capacity
pub const MAX_ACTIVE_SESSIONS: i64 = i32::MAX as i64 - 1;

/// Default trust window
pub const DEFAULT_TRUST_DURATION_HOURS: u32 = 24;
/// Zero trusts a verdict only at the instant it was obtained
pub const MIN_TRUST_DURATION_HOURS: i64 = 0;
/// Longest accepted trust window
pub const MAX_TRUST_DURATION_HOURS: i64 = i32::MAX as i64;

/// Background refresh runs daily by default
pub const DEFAULT_REFRESH_INTERVAL_SECS: i64 = 24 * 60 * 60;
/// Shortest accepted refresh interval
pub const MIN_REFRESH_INTERVAL_SECS: i64 = 60;
/// Longest accepted refresh interval
pub const MAX_REFRESH_INTERVAL_SECS: i64 = 7 * 24 * 60 * 60;

/// Retry bounds for refresh cloud calls
pub const DEFAULT_RETRY_MAX_ATTEMPTS: i64 = 3;
/// Upper bound on retry attempts
pub const MAX_RETRY_ATTEMPTS: i64 = 10;
/// Default first retry delay
pub const DEFAULT_RETRY_INITIAL_DELAY_MS: i64 = 200;
/// Default retry delay cap
pub const DEFAULT_RETRY_MAX_DELAY_MS: i64 = 5_000;
/// Upper bound on any retry delay
pub const MAX_RETRY_DELAY_MS: i64 = 60_000;

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ClientAuthConfig {
    pub session: SessionConfig,
    pub security: SecurityConfig,
    pub refresh: RefreshConfig,
}

/// Session cache settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Capacity of the session cache
    pub max_active_sessions: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_active_sessions: DEFAULT_MAX_ACTIVE_SESSIONS,
        }
    }
}

/// Trust window settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// How long a cloud verification is trusted without re-verification
    pub client_device_trust_duration_hours: i64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            client_device_trust_duration_hours: i64::from(DEFAULT_TRUST_DURATION_HOURS),
        }
    }
}

/// Background refresh settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    pub interval_secs: i64,
    pub retry: RetryConfig,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_REFRESH_INTERVAL_SECS,
            retry: RetryConfig::default(),
        }
    }
}

/// Retry settings for cloud calls made during refresh
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: i64,
    pub initial_delay_ms: i64,
    pub max_delay_ms: i64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
            initial_delay_ms: DEFAULT_RETRY_INITIAL_DELAY_MS,
            max_delay_ms: DEFAULT_RETRY_MAX_DELAY_MS,
        }
    }
}

impl ClientAuthConfig {
    /// Parse TOML, clamp every setting into range and validate.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: ClientAuthConfig = toml::from_str(s)
            .map_err(|e| ClientAuthError::serialization(format!("Failed to parse config: {e}")))?;
        config.normalized()
    }

    /// Load configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ClientAuthError::invalid(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Clamp out-of-range settings and check cross-field consistency.
    pub fn normalized(mut self) -> Result<Self> {
        self.session.max_active_sessions = clamp_with_warning(
            "session.max_active_sessions",
            self.session.max_active_sessions,
            MIN_ACTIVE_SESSIONS,
            MAX_ACTIVE_SESSIONS,
        );
        self.security.client_device_trust_duration_hours = clamp_with_warning(
            "security.client_device_trust_duration_hours",
            self.security.client_device_trust_duration_hours,
            MIN_TRUST_DURATION_HOURS,
            MAX_TRUST_DURATION_HOURS,
        );
        self.refresh.interval_secs = clamp_with_warning(
            "refresh.interval_secs",
            self.refresh.interval_secs,
            MIN_REFRESH_INTERVAL_SECS,
            MAX_REFRESH_INTERVAL_SECS,
        );
        let retry = &mut self.refresh.retry;
        retry.max_attempts = clamp_with_warning(
            "refresh.retry.max_attempts",
            retry.max_attempts,
            1,
            MAX_RETRY_ATTEMPTS,
        );
        retry.initial_delay_ms = clamp_with_warning(
            "refresh.retry.initial_delay_ms",
            retry.initial_delay_ms,
            0,
            MAX_RETRY_DELAY_MS,
        );
        retry.max_delay_ms = clamp_with_warning(
            "refresh.retry.max_delay_ms",
            retry.max_delay_ms,
            0,
            MAX_RETRY_DELAY_MS,
        );

        let mut validator = ConfigValidator::new();
        validator.custom(
            "refresh.retry",
            &self.refresh.retry,
            |r| r.initial_delay_ms <= r.max_delay_ms,
            "initial_delay_ms must not exceed max_delay_ms",
        );
        validator.result()?;

        Ok(self)
    }

    /// Session cache capacity, clamped.
    pub fn max_active_sessions(&self) -> usize {
        usize::try_from(
            self.session
                .max_active_sessions
                .clamp(MIN_ACTIVE_SESSIONS, MAX_ACTIVE_SESSIONS),
        )
        .unwrap_or(1)
    }

    /// Trust window currently applied.
    pub fn trust_window(&self) -> TrustWindow {
        let hours = self
            .security
            .client_device_trust_duration_hours
            .clamp(MIN_TRUST_DURATION_HOURS, MAX_TRUST_DURATION_HOURS);
        TrustWindow::from_hours(u32::try_from(hours).unwrap_or(u32::MAX))
    }

    /// Interval between background refresh passes, clamped.
    pub fn refresh_interval(&self) -> Duration {
        let secs = self
            .refresh
            .interval_secs
            .clamp(MIN_REFRESH_INTERVAL_SECS, MAX_REFRESH_INTERVAL_SECS);
        Duration::from_secs(secs.unsigned_abs())
    }

    /// Retry policy for refresh cloud calls.
    pub fn retry_policy(&self) -> RetryPolicy {
        let retry = &self.refresh.retry;
        RetryPolicy::exponential()
            .with_strategy(BackoffStrategy::ExponentialWithJitter)
            .with_max_attempts(u32::try_from(retry.max_attempts.clamp(1, MAX_RETRY_ATTEMPTS)).unwrap_or(1))
            .with_initial_delay(Duration::from_millis(retry.initial_delay_ms.clamp(0, MAX_RETRY_DELAY_MS).unsigned_abs()))
            .with_max_delay(Duration::from_millis(retry.max_delay_ms.clamp(0, MAX_RETRY_DELAY_MS).unsigned_abs()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_document_yields_defaults() {
        let config = ClientAuthConfig::from_toml_str("").unwrap();
        assert_eq!(config, ClientAuthConfig::default());
        assert_eq!(config.max_active_sessions(), 25_000);
        assert_eq!(config.trust_window(), TrustWindow::from_hours(24));
        assert_eq!(config.refresh_interval(), Duration::from_secs(86_400));
        assert_eq!(config.retry_policy().max_attempts, 3);
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let config = ClientAuthConfig::from_toml_str(
            r#"
            [session]
            max_active_sessions = 0

            [security]
            client_device_trust_duration_hours = -5

            [refresh]
            interval_secs = 1
            "#,
        )
        .unwrap();

        assert_eq!(config.session.max_active_sessions, MIN_ACTIVE_SESSIONS);
        assert_eq!(config.security.client_device_trust_duration_hours, 0);
        assert_eq!(config.refresh.interval_secs, MIN_REFRESH_INTERVAL_SECS);
        assert_eq!(config.max_active_sessions(), 1);
    }

    #[test]
    fn oversized_session_capacity_is_clamped_to_max() {
        let config = ClientAuthConfig::from_toml_str(
            "[session]\nmax_active_sessions = 9999999999\n",
        )
        .unwrap();
        assert_eq!(config.session.max_active_sessions, MAX_ACTIVE_SESSIONS);
    }

    #[test]
    fn inconsistent_retry_delays_are_rejected() {
        let err = ClientAuthConfig::from_toml_str(
            "[refresh.retry]\ninitial_delay_ms = 4000\nmax_delay_ms = 100\n",
        )
        .unwrap_err();
        assert!(matches!(err, ClientAuthError::Invalid { .. }));
    }

    #[test]
    fn malformed_toml_is_a_serialization_error() {
        let err = ClientAuthConfig::from_toml_str("[session\n").unwrap_err();
        assert!(matches!(err, ClientAuthError::Serialization { .. }));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[security]\nclient_device_trust_duration_hours = 2").unwrap();

        let config = ClientAuthConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.trust_window(), TrustWindow::from_hours(2));
    }
}
