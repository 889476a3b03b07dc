//! Source of "now" for time-dependent rules.
//!
//! Cancellation eligibility, overdue detection and past-date validation all
//! depend on the current time. They take a [`Clock`] instead of reading the
//! system time so tests can pin it.

use chrono::{NaiveDate, NaiveDateTime};

pub trait Clock: Send + Sync {
    /// Current local wall-clock time.
    fn now(&self) -> NaiveDateTime;

    fn today(&self) -> NaiveDate {
        self.now().date()
    }
}

/// Reads the host's local time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}

/// Always returns the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl FixedClock {
    /// Midnight at the start of `date`.
    pub fn at_start_of(date: NaiveDate) -> Self {
        Self(date.and_time(chrono::NaiveTime::MIN))
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_reports_its_date() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
        let clock = FixedClock::at_start_of(date);
        assert_eq!(clock.today(), date);
        assert_eq!(clock.now(), date.and_hms_opt(0, 0, 0).unwrap());
    }
}
