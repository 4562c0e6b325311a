//! Wall-clock port so sync timing can be driven from tests.

use chrono::{DateTime, Utc};

/// Wall-clock source for timestamps written by the journal and the sync core.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
