//! Time source for the engine.

use chrono::{DateTime, Utc};

/// Supplies the current time. Every deadline comparison in the engine goes
/// through this so tests can drive time explicitly.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
