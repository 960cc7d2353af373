//! Solar event computation.
//!
//! Computes the time of named daily solar events (sunrise, dusk, golden
//! hour, ...) for an [`Observer`] on a given calendar date, expressed in
//! any `chrono` time zone.
//!
//! ## Algorithm
//!
//! The sun position comes from the NOAA solar calculator equations: Julian
//! century, geometric mean longitude and anomaly, equation of centre,
//! apparent longitude, obliquity, declination and equation of time. Event
//! times are obtained from the hour angle at which the sun reaches a given
//! zenith, refined with a second pass using the sun position at the first
//! estimate.
//!
//! Results are accurate to within a minute or so for inhabited latitudes,
//! which is all a home automation schedule needs.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeDelta, TimeZone, Utc, Weekday};

/// Zenith of the sun's upper limb at sunrise and sunset, refraction included.
const HORIZON_ZENITH: f64 = 90.833;
/// Civil twilight: 6° below the horizon.
const CIVIL_ZENITH: f64 = 96.0;
/// End of the blue hour and start of the golden hour: 4° below the horizon.
const BLUE_GOLDEN_ZENITH: f64 = 94.0;
/// End of the golden hour: 6° above the horizon.
const GOLDEN_END_ZENITH: f64 = 84.0;

const JULIAN_DAY_OF_CE: f64 = 1_721_424.5;
const J2000: f64 = 2_451_545.0;
const MINUTES_PER_DAY: f64 = 1440.0;

// ── Observer ───────────────────────────────────────────────────────

/// Location from which solar events are observed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observer {
    latitude: f64,
    longitude: f64,
    elevation: f64,
}

impl Observer {
    /// Build an observer from degrees of latitude/longitude and an
    /// elevation in metres.
    ///
    /// # Errors
    ///
    /// Returns [`SolarError::InvalidCoordinates`] when the latitude is
    /// outside `[-90, 90]`, the longitude outside `[-180, 180]`, or any
    /// value is not finite.
    pub fn new(latitude: f64, longitude: f64, elevation: f64) -> Result<Self, SolarError> {
        if !(-90.0..=90.0).contains(&latitude)
            || !(-180.0..=180.0).contains(&longitude)
            || !elevation.is_finite()
        {
            return Err(SolarError::InvalidCoordinates {
                latitude,
                longitude,
            });
        }
        Ok(Self {
            latitude,
            longitude,
            elevation,
        })
    }

    #[must_use]
    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    #[must_use]
    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    #[must_use]
    pub fn elevation(&self) -> f64 {
        self.elevation
    }

    /// Extra depression of the visible horizon seen from above sea level.
    fn horizon_dip(&self) -> f64 {
        if self.elevation > 0.0 {
            2.076 * self.elevation.sqrt() / 60.0
        } else {
            0.0
        }
    }
}

// ── Events ─────────────────────────────────────────────────────────

/// Named daily solar event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SolarEvent {
    BlueHourStart,
    BlueHourEnd,
    Dawn,
    DaylightStart,
    DaylightEnd,
    Dusk,
    GoldenHourStart,
    GoldenHourEnd,
    /// Civil dusk (6° below the horizon) of the same date.
    ///
    /// This is not astronomical night: the sun keeps sinking to 18° below
    /// the horizon well after this event.
    NightStart,
    /// Civil dawn (6° below the horizon) of the same date, so it ends the
    /// night that began the previous evening, not the one that starts at
    /// [`NightStart`](Self::NightStart).
    ///
    /// Astronomical night ends earlier, when the sun rises past 18° below
    /// the horizon.
    NightEnd,
    RahukaalamStart,
    RahukaalamEnd,
    SolarMidnight,
    SolarNoon,
    Sunrise,
    Sunset,
    TwilightStart,
    TwilightEnd,
}

impl SolarEvent {
    /// Every event, in name order.
    pub const ALL: [Self; 18] = [
        Self::BlueHourStart,
        Self::BlueHourEnd,
        Self::Dawn,
        Self::DaylightStart,
        Self::DaylightEnd,
        Self::Dusk,
        Self::GoldenHourStart,
        Self::GoldenHourEnd,
        Self::NightStart,
        Self::NightEnd,
        Self::RahukaalamStart,
        Self::RahukaalamEnd,
        Self::SolarMidnight,
        Self::SolarNoon,
        Self::Sunrise,
        Self::Sunset,
        Self::TwilightStart,
        Self::TwilightEnd,
    ];

    /// Snake-case name used in configuration and notifications.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BlueHourStart => "blue_hour_start",
            Self::BlueHourEnd => "blue_hour_end",
            Self::Dawn => "dawn",
            Self::DaylightStart => "daylight_start",
            Self::DaylightEnd => "daylight_end",
            Self::Dusk => "dusk",
            Self::GoldenHourStart => "golden_hour_start",
            Self::GoldenHourEnd => "golden_hour_end",
            Self::NightStart => "night_start",
            Self::NightEnd => "night_end",
            Self::RahukaalamStart => "rahukaalam_start",
            Self::RahukaalamEnd => "rahukaalam_end",
            Self::SolarMidnight => "solar_midnight",
            Self::SolarNoon => "solar_noon",
            Self::Sunrise => "sunrise",
            Self::Sunset => "sunset",
            Self::TwilightStart => "twilight_start",
            Self::TwilightEnd => "twilight_end",
        }
    }

    /// How the event time is obtained.
    fn schedule(self, observer: &Observer) -> Schedule {
        let horizon = HORIZON_ZENITH + observer.horizon_dip();
        Schedule::Crossing(match self {
            Self::Sunrise | Self::DaylightStart | Self::TwilightEnd => {
                Crossing::Zenith(horizon, Direction::Rising)
            }
            Self::Sunset | Self::DaylightEnd => Crossing::Zenith(horizon, Direction::Setting),
            Self::Dawn | Self::TwilightStart | Self::NightEnd | Self::BlueHourStart => {
                Crossing::Zenith(CIVIL_ZENITH, Direction::Rising)
            }
            Self::Dusk | Self::NightStart => Crossing::Zenith(CIVIL_ZENITH, Direction::Setting),
            Self::BlueHourEnd | Self::GoldenHourStart => {
                Crossing::Zenith(BLUE_GOLDEN_ZENITH, Direction::Rising)
            }
            Self::GoldenHourEnd => Crossing::Zenith(GOLDEN_END_ZENITH, Direction::Rising),
            Self::SolarNoon => Crossing::Noon,
            Self::SolarMidnight => Crossing::Midnight,
            Self::RahukaalamStart => return Schedule::Rahukaalam { end: false },
            Self::RahukaalamEnd => return Schedule::Rahukaalam { end: true },
        })
    }
}

impl fmt::Display for SolarEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SolarEvent {
    type Err = ParseSolarEventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|event| event.as_str() == s)
            .ok_or_else(|| ParseSolarEventError {
                name: s.to_string(),
            })
    }
}

/// A name is not one of the known solar events.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("`{name}` is not a valid solar event name")]
pub struct ParseSolarEventError {
    pub name: String,
}

/// A solar event could not be computed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SolarError {
    /// The sun never reaches the required position that day (polar day or
    /// polar night).
    #[error("the sun never reaches the {event} position on {date}")]
    NeverReaches { event: SolarEvent, date: NaiveDate },
    #[error("invalid observer coordinates ({latitude}, {longitude})")]
    InvalidCoordinates { latitude: f64, longitude: f64 },
    #[error("{date} is outside the supported calendar range")]
    DateOutOfRange { date: NaiveDate },
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Rising,
    Setting,
}

#[derive(Debug, Clone, Copy)]
enum Crossing {
    Zenith(f64, Direction),
    Noon,
    Midnight,
}

/// Rahukaalam is derived from the local sunrise and sunset, every other
/// event is a direct crossing.
#[derive(Debug, Clone, Copy)]
enum Schedule {
    Crossing(Crossing),
    Rahukaalam { end: bool },
}

// ── Public API ─────────────────────────────────────────────────────

/// Time of `event` on the local calendar `date` in time zone `tz`.
///
/// The returned instant always falls on `date` in `tz` when such an
/// instant exists; events that would land on the neighbouring day in UTC
/// are recomputed for the adjacent UTC date.
///
/// # Errors
///
/// Returns [`SolarError::NeverReaches`] when the sun does not reach the
/// required position that day.
pub fn event_time<Tz: TimeZone>(
    observer: &Observer,
    date: NaiveDate,
    tz: &Tz,
    event: SolarEvent,
) -> Result<DateTime<Tz>, SolarError> {
    match event.schedule(observer) {
        Schedule::Crossing(crossing) => local_instant(observer, date, tz, event, crossing),
        Schedule::Rahukaalam { end } => rahukaalam(observer, date, tz, event, end),
    }
}

// ── Internals ──────────────────────────────────────────────────────

fn local_instant<Tz: TimeZone>(
    observer: &Observer,
    date: NaiveDate,
    tz: &Tz,
    event: SolarEvent,
    crossing: Crossing,
) -> Result<DateTime<Tz>, SolarError> {
    let first = utc_instant(observer, date, event, crossing)?.with_timezone(tz);
    let shifted = match first.date_naive().cmp(&date) {
        Ordering::Equal => return Ok(first),
        Ordering::Less => date.succ_opt(),
        Ordering::Greater => date.pred_opt(),
    }
    .ok_or(SolarError::DateOutOfRange { date })?;
    utc_instant(observer, shifted, event, crossing)
        .map(|instant| instant.with_timezone(tz))
        .map_err(|_| SolarError::NeverReaches { event, date })
}

fn rahukaalam<Tz: TimeZone>(
    observer: &Observer,
    date: NaiveDate,
    tz: &Tz,
    event: SolarEvent,
    end: bool,
) -> Result<DateTime<Tz>, SolarError> {
    let never = |_| SolarError::NeverReaches { event, date };
    let sunrise = event_time(observer, date, tz, SolarEvent::Sunrise).map_err(never)?;
    let sunset = event_time(observer, date, tz, SolarEvent::Sunset).map_err(never)?;
    let octant = (sunset - sunrise.clone()) / 8;
    let index = match date.weekday() {
        Weekday::Mon => 1,
        Weekday::Tue => 6,
        Weekday::Wed => 4,
        Weekday::Thu => 5,
        Weekday::Fri => 3,
        Weekday::Sat => 2,
        Weekday::Sun => 7,
    };
    let start = sunrise + octant * index;
    Ok(if end { start + octant } else { start })
}

/// Instant of the crossing for the UTC calendar `date`.
fn utc_instant(
    observer: &Observer,
    date: NaiveDate,
    event: SolarEvent,
    crossing: Crossing,
) -> Result<DateTime<Utc>, SolarError> {
    let jd = julian_day(date);
    let minutes = match crossing {
        Crossing::Zenith(zenith, direction) => transit_minutes(observer, jd, zenith, direction)
            .ok_or(SolarError::NeverReaches { event, date })?,
        Crossing::Noon => noon_minutes(observer.longitude, jd),
        Crossing::Midnight => noon_minutes(observer.longitude, jd) - MINUTES_PER_DAY / 2.0,
    };
    Ok(date.and_time(NaiveTime::MIN).and_utc() + minutes_to_delta(minutes))
}

#[allow(clippy::cast_possible_truncation)]
fn minutes_to_delta(minutes: f64) -> TimeDelta {
    TimeDelta::milliseconds((minutes * 60_000.0).round() as i64)
}

fn julian_day(date: NaiveDate) -> f64 {
    JULIAN_DAY_OF_CE + f64::from(date.num_days_from_ce())
}

fn julian_century(jd: f64) -> f64 {
    (jd - J2000) / 36_525.0
}

/// Declination (degrees) and equation of time (minutes).
struct SunPosition {
    declination: f64,
    equation_of_time: f64,
}

fn sun_position(t: f64) -> SunPosition {
    let mean_longitude = (280.466_46 + t * (36_000.769_83 + 0.000_303_2 * t)).rem_euclid(360.0);
    let mean_anomaly = 357.529_11 + t * (35_999.050_29 - 0.000_153_7 * t);
    let eccentricity = 0.016_708_634 - t * (0.000_042_037 + 0.000_000_126_7 * t);

    let m = mean_anomaly.to_radians();
    let centre = m.sin() * (1.914_602 - t * (0.004_817 + 0.000_014 * t))
        + (2.0 * m).sin() * (0.019_993 - 0.000_101 * t)
        + (3.0 * m).sin() * 0.000_289;
    let true_longitude = mean_longitude + centre;

    let omega = (125.04 - 1934.136 * t).to_radians();
    let apparent_longitude = true_longitude - 0.005_69 - 0.004_78 * omega.sin();

    let mean_obliquity =
        23.0 + (26.0 + (21.448 - t * (46.815 + t * (0.000_59 - t * 0.001_813))) / 60.0) / 60.0;
    let obliquity = mean_obliquity + 0.002_56 * omega.cos();

    let declination = (obliquity.to_radians().sin() * apparent_longitude.to_radians().sin())
        .asin()
        .to_degrees();

    let y = (obliquity.to_radians() / 2.0).tan().powi(2);
    let l0 = mean_longitude.to_radians();
    let e = eccentricity;
    let equation_of_time = y * (2.0 * l0).sin() - 2.0 * e * m.sin()
        + 4.0 * e * y * m.sin() * (2.0 * l0).cos()
        - 0.5 * y * y * (4.0 * l0).sin()
        - 1.25 * e * e * (2.0 * m).sin();

    SunPosition {
        declination,
        equation_of_time: 4.0 * equation_of_time.to_degrees(),
    }
}

/// Hour angle (degrees) at which the sun reaches `zenith`, if it does.
fn hour_angle(latitude: f64, declination: f64, zenith: f64) -> Option<f64> {
    let lat = latitude.to_radians();
    let dec = declination.to_radians();
    let cos_h = (zenith.to_radians().cos() - lat.sin() * dec.sin()) / (lat.cos() * dec.cos());
    (-1.0..=1.0)
        .contains(&cos_h)
        .then(|| cos_h.acos().to_degrees())
}

/// Minutes after 00:00 UTC at which the sun crosses `zenith`.
fn transit_minutes(observer: &Observer, jd: f64, zenith: f64, direction: Direction) -> Option<f64> {
    let mut minutes = MINUTES_PER_DAY / 2.0 - 4.0 * observer.longitude;
    for _ in 0..2 {
        let sun = sun_position(julian_century(jd + minutes / MINUTES_PER_DAY));
        let angle = hour_angle(observer.latitude, sun.declination, zenith)?;
        let signed = match direction {
            Direction::Rising => angle,
            Direction::Setting => -angle,
        };
        minutes = MINUTES_PER_DAY / 2.0 - 4.0 * (observer.longitude + signed) - sun.equation_of_time;
    }
    Some(minutes)
}

/// Minutes after 00:00 UTC of the solar noon.
fn noon_minutes(longitude: f64, jd: f64) -> f64 {
    let base = MINUTES_PER_DAY / 2.0 - 4.0 * longitude;
    let mut minutes = base;
    for _ in 0..2 {
        let sun = sun_position(julian_century(jd + minutes / MINUTES_PER_DAY));
        minutes = base - sun.equation_of_time;
    }
    minutes
}
