//! Manually advanced clock.

use clientauth_core::effects::PhysicalTimeEffects;
use clientauth_core::PhysicalTime;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    /// A clock stopped at `start`.
    pub fn new(start: PhysicalTime) -> Self {
        Self {
            now_ms: AtomicU64::new(start.ts_ms),
        }
    }

    /// Clock starting at an arbitrary fixed point well after the epoch.
    pub fn starting_now() -> Self {
        Self::new(PhysicalTime::from_millis(1_700_000_000_000))
    }

    /// Current time.
    pub fn now(&self) -> PhysicalTime {
        PhysicalTime::from_millis(self.now_ms.load(Ordering::SeqCst))
    }

    /// Move time forward.
    pub fn advance(&self, by: Duration) {
        let millis = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        self.now_ms.fetch_add(millis, Ordering::SeqCst);
    }

    /// Move time forward by whole hours.
    pub fn advance_hours(&self, hours: u64) {
        self.advance(Duration::from_secs(hours * 60 * 60));
    }

    /// Jump to `time`.
    pub fn set(&self, time: PhysicalTime) {
        self.now_ms.store(time.ts_ms, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::starting_now()
    }
}

impl PhysicalTimeEffects for ManualClock {
    fn physical_time(&self) -> PhysicalTime {
        self.now()
    }
}
