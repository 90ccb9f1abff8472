//! Injectable time source.

use std::sync::Mutex;

use chrono::{DateTime, Local, NaiveDate, Utc};

/// Source of "now" for expiry checks and relative dates.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Calendar date in the process's local time zone.
    fn today(&self) -> NaiveDate {
        self.now().with_timezone(&Local).date_naive()
    }
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    today: Mutex<Option<NaiveDate>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
            today: Mutex::new(None),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }

    /// Pin the calendar date returned by [`Clock::today`], independent of time zone.
    pub fn set_today(&self, date: NaiveDate) {
        *self.today.lock().unwrap_or_else(|e| e.into_inner()) = Some(date);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn today(&self) -> NaiveDate {
        let pinned = *self.today.lock().unwrap_or_else(|e| e.into_inner());
        pinned.unwrap_or_else(|| self.now().with_timezone(&Local).date_naive())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let start = Utc::now();
        let clock = ManualClock::new(start);
        clock.advance(chrono::Duration::seconds(90));
        assert_eq!(clock.now() - start, chrono::Duration::seconds(90));
    }

    #[test]
    fn pinned_today_wins() {
        let clock = ManualClock::new(Utc::now());
        let date = NaiveDate::from_ymd_opt(2025, 11, 15).unwrap();
        clock.set_today(date);
        assert_eq!(clock.today(), date);
    }
}
