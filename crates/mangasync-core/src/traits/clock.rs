//! Local wall-clock time
//!
//! Release schedules and "already bumped today" checks are evaluated in the
//! user's time zone, not the host's. The zone is fixed when the clock is
//! built and never changes during the life of the process.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

/// Source of the current local time
pub trait Clock: Send + Sync {
    /// The current instant in the configured time zone
    fn now(&self) -> DateTime<Tz>;
}

/// Wall clock in a fixed time zone
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    tz: Tz,
}

impl SystemClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.tz)
    }
}
