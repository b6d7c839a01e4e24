//! Time source abstraction

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Source of wall-clock time in milliseconds
pub trait Timer: Send + Sync {
    fn current_time_ms(&self) -> u64;
}

/// Timer backed by the system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimer;

impl Timer for SystemTimer {
    fn current_time_ms(&self) -> u64 {
        u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
    }
}

/// Manually advanced timer for tests and simulation
#[derive(Debug, Clone, Default)]
pub struct FakeTimer {
    now_ms: Arc<AtomicU64>,
}

impl FakeTimer {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now_ms: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    pub fn advance_ms(&self, delta_ms: u64) {
        self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }

    pub fn set_ms(&self, now_ms: u64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }
}

impl Timer for FakeTimer {
    fn current_time_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}
