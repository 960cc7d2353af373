//! Time and timestamp helpers.

use chrono::{DateTime, NaiveTime, TimeDelta, Utc};

use crate::error::ParseTimeError;

/// UTC timestamp used for wall-clock readings.
pub type Timestamp = DateTime<Utc>;

/// Return the current UTC time.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now()
}

/// Parse a 24-hour `HH:MM:SS` time of day.
///
/// # Errors
///
/// Returns [`ParseTimeError`] when the input is not in that form.
pub fn parse_time_of_day(input: &str) -> Result<NaiveTime, ParseTimeError> {
    NaiveTime::parse_from_str(input.trim(), "%H:%M:%S").map_err(|source| ParseTimeError {
        input: input.to_string(),
        source,
    })
}

/// Time from `now` until the next occurrence of `target`.
///
/// The result is always in `(0, 24h]`: a target that has already passed
/// today, or that equals `now` exactly, is taken from the following day.
#[must_use]
pub fn duration_until(target: NaiveTime, now: NaiveTime) -> TimeDelta {
    let delta = target.signed_duration_since(now);
    if delta <= TimeDelta::zero() {
        delta + TimeDelta::days(1)
    } else {
        delta
    }
}

/// Whole seconds from `now` until the next occurrence of `target`.
///
/// Never negative; `seconds_until(t, t)` is a full day.
#[must_use]
pub fn seconds_until(target: NaiveTime, now: NaiveTime) -> i64 {
    duration_until(target, now).num_seconds()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hms(h: u32, m: u32, s: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, s).unwrap()
    }

    #[test]
    fn should_return_current_utc_time() {
        let before = Utc::now();
        let ts = now();
        let after = Utc::now();
        assert!(ts >= before);
        assert!(ts <= after);
    }

    #[test]
    fn should_count_seconds_until_later_today() {
        assert_eq!(seconds_until(hms(12, 0, 0), hms(11, 59, 59)), 1);
        assert_eq!(seconds_until(hms(22, 0, 0), hms(21, 0, 0)), 3600);
    }

    #[test]
    fn should_wrap_to_next_day_when_target_has_passed() {
        assert_eq!(seconds_until(hms(6, 0, 0), hms(7, 0, 0)), 23 * 3600);
    }

    #[test]
    fn should_wrap_to_full_day_when_target_equals_now() {
        assert_eq!(seconds_until(hms(12, 0, 0), hms(12, 0, 0)), 86_400);
    }

    #[test]
    fn should_never_be_negative_across_the_day() {
        let target = hms(0, 0, 30);
        for hour in 0..24 {
            for minute in [0, 17, 59] {
                let secs = seconds_until(target, hms(hour, minute, 45));
                assert!(secs >= 0);
                assert!(secs <= 86_400);
            }
        }
    }

    #[test]
    fn should_keep_sub_second_precision() {
        let now = NaiveTime::from_hms_milli_opt(11, 59, 59, 500).unwrap();
        assert_eq!(
            duration_until(hms(12, 0, 0), now),
            TimeDelta::milliseconds(500)
        );
    }

    #[test]
    fn should_parse_time_of_day() {
        assert_eq!(parse_time_of_day("22:00:00"), Ok(hms(22, 0, 0)));
    }

    #[test]
    fn should_reject_malformed_time_of_day() {
        let err = parse_time_of_day("10pm").unwrap_err();
        assert_eq!(err.input, "10pm");
    }
}
