use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// Source of "now" for schedules and worker hosts.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall time derived from a fixed wall-clock origin plus tokio's monotonic
/// clock.
///
/// Unaffected by wall-clock adjustments after construction, and follows
/// tokio's paused/advanced time in tests.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    wall_origin: DateTime<Utc>,
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            wall_origin: Utc::now(),
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> DateTime<Utc> {
        chrono::Duration::from_std(self.origin.elapsed())
            .map(|elapsed| self.wall_origin + elapsed)
            .unwrap_or(self.wall_origin)
    }
}
