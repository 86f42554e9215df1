//! Test doubles for the engine's collaborators.

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;

use crate::clock::Clock;
use crate::notify::{LadderEvent, NotificationSink, NotifyError};
use crate::types::UserId;

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: TimeDelta) {
        *self.now.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Records every delivered event.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(UserId, LadderEvent)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(UserId, LadderEvent)> {
        self.events.lock().clone()
    }

    /// Events delivered to `user`.
    pub fn events_for(&self, user: UserId) -> Vec<LadderEvent> {
        self.events
            .lock()
            .iter()
            .filter(|(u, _)| *u == user)
            .map(|(_, e)| e.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn notify(&self, user: UserId, event: &LadderEvent) -> Result<(), NotifyError> {
        self.events.lock().push((user, event.clone()));
        Ok(())
    }
}

/// Fails every delivery.
#[derive(Clone, Copy, Debug, Default)]
pub struct FailingSink;

#[async_trait]
impl NotificationSink for FailingSink {
    async fn notify(&self, _user: UserId, _event: &LadderEvent) -> Result<(), NotifyError> {
        Err(NotifyError::Delivery {
            reason: "transport unavailable".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn manual_clock_moves_on_request() {
        let start = Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);
        clock.advance(TimeDelta::minutes(90));
        assert_eq!(clock.now(), start + TimeDelta::minutes(90));
        clock.set(start);
        assert_eq!(clock.now(), start);
    }
}
