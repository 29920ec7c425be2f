//! Physical time and trust windows.
//!
//! Cached cloud facts (certificate validity, thing attachment) carry the
//! physical time of their last successful verification. A [`TrustWindow`]
//! decides whether such a fact may still be used without asking the cloud
//! again.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

const MILLIS_PER_HOUR: u64 = 60 * 60 * 1000;

/// Wall-clock timestamp in milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct PhysicalTime {
    /// Milliseconds since the Unix epoch
    pub ts_ms: u64,
}

impl PhysicalTime {
    /// The Unix epoch. Used as the "never verified" marker.
    pub const EPOCH: PhysicalTime = PhysicalTime { ts_ms: 0 };

    /// Timestamp at `ts_ms` milliseconds since the Unix epoch.
    pub const fn from_millis(ts_ms: u64) -> Self {
        Self { ts_ms }
    }

    /// Later timestamp, saturating at the maximum.
    pub fn saturating_add(self, duration: Duration) -> Self {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        Self {
            ts_ms: self.ts_ms.saturating_add(millis),
        }
    }

    /// Earlier timestamp, saturating at the epoch.
    pub fn saturating_sub(self, duration: Duration) -> Self {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        Self {
            ts_ms: self.ts_ms.saturating_sub(millis),
        }
    }
}

impl fmt::Display for PhysicalTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.ts_ms)
    }
}

/// Bounded interval after a cloud verification during which the cached fact
/// is trusted without re-querying the cloud.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustWindow {
    duration: Duration,
}

impl TrustWindow {
    /// Window of `duration` after each verification.
    pub const fn new(duration: Duration) -> Self {
        Self { duration }
    }

    /// Trust window of `hours` hours.
    pub fn from_hours(hours: u32) -> Self {
        Self::new(Duration::from_millis(u64::from(hours) * MILLIS_PER_HOUR))
    }

    /// Window length.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// A fact verified at `verified_at` is trusted iff
    /// `now <= verified_at + duration`.
    pub fn is_trusted(&self, verified_at: PhysicalTime, now: PhysicalTime) -> bool {
        now <= verified_at.saturating_add(self.duration)
    }

    /// Whether a fact verified at `verified_at` is no longer trusted at `now`.
    pub fn is_expired(&self, verified_at: PhysicalTime, now: PhysicalTime) -> bool {
        !self.is_trusted(verified_at, now)
    }
}

impl Default for TrustWindow {
    fn default() -> Self {
        Self::from_hours(crate::config::DEFAULT_TRUST_DURATION_HOURS)
    }
}
