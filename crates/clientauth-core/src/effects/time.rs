//! Wall-clock time effect.

use crate::time::PhysicalTime;
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of wall-clock time for trust-window bookkeeping.
pub trait PhysicalTimeEffects: Send + Sync {
    fn physical_time(&self) -> PhysicalTime;
}

/// Blanket implementation for Arc<T> where T: PhysicalTimeEffects
impl<T: PhysicalTimeEffects + ?Sized> PhysicalTimeEffects for std::sync::Arc<T> {
    fn physical_time(&self) -> PhysicalTime {
        (**self).physical_time()
    }
}

/// Production clock backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl PhysicalTimeEffects for SystemClock {
    #[allow(clippy::disallowed_methods)] // Effect handler owns the only SystemTime::now call
    fn physical_time(&self) -> PhysicalTime {
        let ts_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0);
        PhysicalTime::from_millis(ts_ms)
    }
}
