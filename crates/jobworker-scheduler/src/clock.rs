//! Clock abstraction so selection and completion timestamps are testable.

use std::sync::{Arc, Mutex};

use chrono::{Duration, Local};

use crate::types::Timestamp;

/// A source of "now" in local fixed-offset terms.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Real wall clock, observed in the host's current local offset.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Local::now().fixed_offset()
    }
}

/// Fake clock for testing with controllable time.
#[derive(Debug, Clone)]
pub struct FakeClock {
    current: Arc<Mutex<Timestamp>>,
}

impl FakeClock {
    pub fn new(at: Timestamp) -> Self {
        Self {
            current: Arc::new(Mutex::new(at)),
        }
    }

    /// Advance the clock by the given duration.
    pub fn advance(&self, by: Duration) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *current += by;
    }

    /// Set the clock to a specific instant.
    pub fn set(&self, at: Timestamp) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *current = at;
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Timestamp {
        *self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}
