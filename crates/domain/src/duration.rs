//! Human duration strings.
//!
//! A duration is an integer with an optional single-letter unit suffix:
//! `S` (seconds), `M` (minutes), `H` (hours) or `D` (days), in either case.
//! Without a suffix the value is in seconds. A leading sign is accepted so
//! that offsets such as `"-2250s"` can be expressed.

use std::time::Duration;

use crate::error::ParseDurationError;

const SECONDS_PER_MINUTE: i64 = 60;
const SECONDS_PER_HOUR: i64 = 60 * SECONDS_PER_MINUTE;
const SECONDS_PER_DAY: i64 = 24 * SECONDS_PER_HOUR;

/// Parse a duration string into a signed number of seconds.
///
/// # Errors
///
/// Returns [`ParseDurationError`] when the input is empty, the numeric part
/// is not an integer, the unit is unknown or the result overflows.
pub fn parse_duration(input: &str) -> Result<i64, ParseDurationError> {
    let trimmed = input.trim();
    let last = trimmed.chars().last().ok_or(ParseDurationError::Empty)?;

    let (number, scale) = if last.is_ascii_alphabetic() {
        let scale = match last.to_ascii_uppercase() {
            'S' => 1,
            'M' => SECONDS_PER_MINUTE,
            'H' => SECONDS_PER_HOUR,
            'D' => SECONDS_PER_DAY,
            other => return Err(ParseDurationError::UnknownUnit(other)),
        };
        (&trimmed[..trimmed.len() - last.len_utf8()], scale)
    } else {
        (trimmed, 1)
    };

    let value: i64 = number
        .trim()
        .parse()
        .map_err(|_| ParseDurationError::NotANumber(input.to_string()))?;

    value
        .checked_mul(scale)
        .ok_or_else(|| ParseDurationError::Overflow(input.to_string()))
}

/// Parse a duration string that must describe a non-negative period.
///
/// Used for timer periods, where a negative value makes no sense.
///
/// # Errors
///
/// Returns [`ParseDurationError::Negative`] for negative values, or any
/// error [`parse_duration`] reports.
pub fn parse_duration_std(input: &str) -> Result<Duration, ParseDurationError> {
    let seconds = parse_duration(input)?;
    let seconds =
        u64::try_from(seconds).map_err(|_| ParseDurationError::Negative(input.to_string()))?;
    Ok(Duration::from_secs(seconds))
}
