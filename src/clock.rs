//! The [`SimulationClock`], threaded explicitly into every tick.

use chrono::{Local, NaiveDateTime, Timelike};

/// Simulated wall-clock time.
///
/// The clock is owned by the poll loop and advanced once per tick. The value
/// model only reads it, so a reading is a function of the sensor, the clock
/// and the random draws, nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationClock {
    start: NaiveDateTime,
    now: NaiveDateTime,
}

impl SimulationClock {
    /// A clock that starts, and currently reads, `at`.
    pub fn starting_at(at: NaiveDateTime) -> Self {
        Self { start: at, now: at }
    }

    /// A clock that starts at the local wall-clock time.
    pub fn from_local_now() -> Self {
        Self::starting_at(Local::now().naive_local())
    }

    /// Move the clock to `now`. Time never runs backwards: an earlier instant
    /// leaves the clock where it is.
    pub fn advance_to(&mut self, now: NaiveDateTime) {
        if now > self.now {
            self.now = now;
        }
    }

    /// Move the clock to the local wall-clock time.
    pub fn advance_to_local_now(&mut self) {
        self.advance_to(Local::now().naive_local());
    }

    /// The current simulated instant.
    pub fn now(&self) -> NaiveDateTime {
        self.now
    }

    /// Hour of day, 0 through 23.
    pub fn hour(&self) -> u32 {
        self.now.hour()
    }

    /// Whole calendar days elapsed since the clock started.
    pub fn elapsed_days(&self) -> u64 {
        (self.now.date() - self.start.date()).num_days().max(0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, day)
            .unwrap()
            .and_hms_opt(hour, 15, 0)
            .unwrap()
    }

    #[test]
    fn counts_calendar_days() {
        let mut clock = SimulationClock::starting_at(at(1, 23));
        assert_eq!(clock.elapsed_days(), 0);
        assert_eq!(clock.hour(), 23);

        clock.advance_to(at(2, 1));
        assert_eq!(clock.elapsed_days(), 1);
        assert_eq!(clock.hour(), 1);

        clock.advance_to(at(5, 12));
        assert_eq!(clock.elapsed_days(), 4);
    }

    #[test]
    fn never_runs_backwards() {
        let mut clock = SimulationClock::starting_at(at(3, 10));
        clock.advance_to(at(2, 10));
        assert_eq!(clock.now(), at(3, 10));
    }
}
