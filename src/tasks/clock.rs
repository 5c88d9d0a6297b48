//! Time source. "Today" is the local calendar day.

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Local, NaiveDate, NaiveTime, TimeDelta, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Current calendar day in local time.
    fn today(&self) -> NaiveDate;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// A clock pinned to a given day, for tests and replays.
///
/// `now()` starts at noon UTC of that day and only moves via `set_now`.
#[derive(Debug)]
pub struct FixedClock {
    today: Mutex<NaiveDate>,
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(today: NaiveDate) -> Self {
        let noon = today.and_time(NaiveTime::MIN) + TimeDelta::hours(12);
        Self {
            today: Mutex::new(today),
            now: Mutex::new(noon.and_utc()),
        }
    }

    pub fn set_today(&self, today: NaiveDate) {
        *lock(&self.today) = today;
    }

    pub fn set_now(&self, now: DateTime<Utc>) {
        *lock(&self.now) = now;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *lock(&self.now)
    }

    fn today(&self) -> NaiveDate {
        *lock(&self.today)
    }
}
