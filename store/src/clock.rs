//! Receive-timestamp key allocation.

use chrono::{Duration, Local, NaiveDateTime, Timelike};

/// Allocates strictly increasing microsecond-resolution timestamp keys.
///
/// The message-log table is keyed by receive time, so two messages
/// arriving within the same clock tick must still get distinct keys.
/// A key that would not exceed the previous one (same tick, or a clock
/// stepping backwards) is bumped to the previous key plus one
/// microsecond.
#[derive(Debug, Default)]
pub struct KeyClock {
    last: Option<NaiveDateTime>,
}

impl KeyClock {
    /// Create a new clock with no previous key.
    pub fn new() -> Self {
        Self::default()
    }

    /// Next unique key, based on the current local time.
    pub fn next_key(&mut self) -> NaiveDateTime {
        self.key_for(Local::now().naive_local())
    }

    fn key_for(&mut self, now: NaiveDateTime) -> NaiveDateTime {
        let mut key = truncate_to_micros(now);
        if let Some(last) = self.last {
            if key <= last {
                key = last + Duration::microseconds(1);
            }
        }
        self.last = Some(key);
        key
    }
}

fn truncate_to_micros(t: NaiveDateTime) -> NaiveDateTime {
    let micros = t.nanosecond() / 1_000;
    t.with_nanosecond(micros * 1_000).unwrap_or(t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(micros: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_micro_opt(12, 0, 0, micros)
            .unwrap()
    }

    #[test]
    fn test_keys_advance_with_clock() {
        let mut clock = KeyClock::new();
        assert_eq!(clock.key_for(at(100)), at(100));
        assert_eq!(clock.key_for(at(200)), at(200));
    }

    #[test]
    fn test_same_tick_bumps() {
        let mut clock = KeyClock::new();
        assert_eq!(clock.key_for(at(100)), at(100));
        assert_eq!(clock.key_for(at(100)), at(101));
        assert_eq!(clock.key_for(at(100)), at(102));
    }

    #[test]
    fn test_clock_step_backwards_bumps() {
        let mut clock = KeyClock::new();
        assert_eq!(clock.key_for(at(500)), at(500));
        assert_eq!(clock.key_for(at(100)), at(501));
    }

    #[test]
    fn test_sub_microsecond_precision_truncated() {
        let mut clock = KeyClock::new();
        let now = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_nano_opt(12, 0, 0, 100_500)
            .unwrap();
        assert_eq!(clock.key_for(now), at(100));
    }

    #[test]
    fn test_next_key_strictly_increasing() {
        let mut clock = KeyClock::new();
        let mut prev = clock.next_key();
        for _ in 0..1000 {
            let key = clock.next_key();
            assert!(key > prev);
            prev = key;
        }
    }
}
