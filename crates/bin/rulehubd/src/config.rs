//! Configuration loading: TOML file with environment variable overrides.
//!
//! Looks for `rulehub.toml` in the working directory, or at the path in
//! `RULEHUB_CONFIG`. Every field has a default so the file is optional.
//! Environment variables take precedence over file values.

use std::time::Duration;

use chrono::TimeDelta;
use chrono_tz::Tz;
use rulehub_adapter_gateway::GatewayConfig;
use rulehub_app::rule_system::EngineSettings;
use rulehub_app::thing::ConnectionSettings;
use rulehub_domain::duration::{parse_duration, parse_duration_std};
use rulehub_domain::solar::{Observer, SolarEvent};
use rulehub_domain::time::parse_time_of_day;
use serde::Deserialize;
use serde_json::Value;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How to reach the gateway.
    pub gateway: GatewayConfig,
    /// Engine timing and time zones.
    pub engine: EngineConfig,
    /// Where the installation is, for solar events.
    pub location: LocationConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Rules to install.
    pub rules: Vec<RuleConfig>,
}

/// Engine timing and time zones.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Zone of the host clock. Informational: wall-clock time is read in UTC.
    pub system_timezone: String,
    /// Zone in which times of day and solar events are interpreted.
    pub local_timezone: String,
    /// Pause before reconnecting a Thing (e.g. `30s`).
    pub reconnect_backoff: String,
    /// Pause between failed discovery attempts (e.g. `30s`).
    pub discovery_backoff: String,
}

/// Observer position for solar computations.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    /// Degrees, north positive.
    pub latitude: f64,
    /// Degrees, east positive.
    pub longitude: f64,
    /// Meters above the horizon.
    pub elevation: f64,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

/// One `[[rules]]` entry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleConfig {
    /// Copy `property` of `source` to the same property of every target.
    Follow {
        name: String,
        source: String,
        property: String,
        targets: Vec<String>,
    },
    /// Switch `property` of `thing` back off once it stayed on for `period`.
    DelayOff {
        name: String,
        thing: String,
        #[serde(default = "default_property")]
        property: String,
        period: String,
    },
    /// Log a liveness tick every `period`.
    Heartbeat { name: String, period: String },
    /// Set `property` of `thing` to `value` every day at `time`.
    AtTime {
        name: String,
        time: String,
        thing: String,
        property: String,
        value: Value,
    },
    /// Set `property` of `thing` to `value` at a solar event.
    Solar {
        name: String,
        event: String,
        #[serde(default)]
        offset: Option<String>,
        thing: String,
        property: String,
        value: Value,
    },
}

fn default_property() -> String {
    "on".to_string()
}

impl RuleConfig {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Follow { name, .. }
            | Self::DelayOff { name, .. }
            | Self::Heartbeat { name, .. }
            | Self::AtTime { name, .. }
            | Self::Solar { name, .. } => name,
        }
    }

    /// Check every value that is parsed later on.
    fn validate(&self) -> Result<(), ConfigError> {
        let invalid =
            |what: String| ConfigError::Validation(format!("rule `{}`: {what}", self.name()));
        match self {
            Self::Follow { targets, .. } if targets.is_empty() => {
                Err(invalid("no targets".to_string()))
            }
            Self::DelayOff { period, .. } => parse_duration_std(period)
                .map(drop)
                .map_err(|err| invalid(err.to_string())),
            Self::Heartbeat { period, .. } => match parse_duration_std(period) {
                Ok(parsed) if parsed.is_zero() => {
                    Err(invalid("period must be positive".to_string()))
                }
                Ok(_) => Ok(()),
                Err(err) => Err(invalid(err.to_string())),
            },
            Self::AtTime { time, .. } => parse_time_of_day(time)
                .map(drop)
                .map_err(|err| invalid(err.to_string())),
            Self::Solar { event, offset, .. } => {
                event
                    .parse::<SolarEvent>()
                    .map_err(|err| invalid(err.to_string()))?;
                parse_offset(offset.as_deref())
                    .map(drop)
                    .map_err(|err| invalid(err.to_string()))
            }
            Self::Follow { .. } => Ok(()),
        }
    }
}

impl Config {
    /// Load configuration from `rulehub.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if a
    /// value does not validate.
    pub fn load() -> Result<Self, ConfigError> {
        let path =
            std::env::var("RULEHUB_CONFIG").unwrap_or_else(|_| "rulehub.toml".to_string());
        let mut config = Self::from_file(&path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    /// Apply `RULEHUB_*` and `RUST_LOG` overrides read through `var`.
    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(val) = var("RULEHUB_GATEWAY_HOST") {
            self.gateway.host = val;
        }
        if let Some(val) = var("RULEHUB_AUTH_TOKEN") {
            self.gateway.auth_token = val;
        }
        if let Some(val) = var("RULEHUB_TIMEOUT") {
            if let Ok(seconds) = val.parse() {
                self.gateway.seconds_for_timeout = seconds;
            }
        }
        if let Some(val) = var("RULEHUB_LOCAL_TIMEZONE") {
            self.engine.local_timezone = val;
        }
        if let Some(val) = var("RULEHUB_LOG") {
            self.logging.filter = val;
        }
        if let Some(val) = var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.gateway.seconds_for_timeout == 0 {
            return Err(ConfigError::Validation(
                "seconds_for_timeout must be non-zero".to_string(),
            ));
        }
        parse_timezone(&self.engine.system_timezone)?;
        self.local_timezone()?;
        self.engine_settings()?;
        self.observer()?;
        for rule in &self.rules {
            rule.validate()?;
        }
        Ok(())
    }

    /// Zone in which rules interpret times of day.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] for an unknown zone name.
    pub fn local_timezone(&self) -> Result<Tz, ConfigError> {
        parse_timezone(&self.engine.local_timezone)
    }

    /// Settings handed to the engine.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if a backoff is not a duration.
    pub fn engine_settings(&self) -> Result<EngineSettings, ConfigError> {
        Ok(EngineSettings {
            token: self.gateway.auth_token.clone(),
            discovery_backoff: parse_backoff(
                "discovery_backoff",
                &self.engine.discovery_backoff,
            )?,
            connection: ConnectionSettings {
                reconnect_backoff: parse_backoff(
                    "reconnect_backoff",
                    &self.engine.reconnect_backoff,
                )?,
                ..ConnectionSettings::default()
            },
        })
    }

    /// Observer for solar events.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] for out-of-range coordinates.
    pub fn observer(&self) -> Result<Observer, ConfigError> {
        Observer::new(
            self.location.latitude,
            self.location.longitude,
            self.location.elevation,
        )
        .map_err(|err| ConfigError::Validation(err.to_string()))
    }
}

fn parse_timezone(name: &str) -> Result<Tz, ConfigError> {
    name.parse()
        .map_err(|_| ConfigError::Validation(format!("unknown time zone `{name}`")))
}

fn parse_backoff(field: &str, value: &str) -> Result<Duration, ConfigError> {
    match parse_duration_std(value) {
        Ok(parsed) if !parsed.is_zero() => Ok(parsed),
        Ok(_) => Err(ConfigError::Validation(format!("{field} must be positive"))),
        Err(err) => Err(ConfigError::Validation(format!("{field}: {err}"))),
    }
}

/// Signed offset such as `-15m`, zero when absent.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] if the offset is not a duration.
pub fn parse_offset(offset: Option<&str>) -> Result<TimeDelta, ConfigError> {
    let Some(offset) = offset else {
        return Ok(TimeDelta::zero());
    };
    let seconds =
        parse_duration(offset).map_err(|err| ConfigError::Validation(format!("offset: {err}")))?;
    TimeDelta::try_seconds(seconds)
        .ok_or_else(|| ConfigError::Validation(format!("offset `{offset}` is out of range")))
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            system_timezone: "UTC".to_string(),
            local_timezone: "US/Pacific".to_string(),
            reconnect_backoff: "30s".to_string(),
            discovery_backoff: "30s".to_string(),
        }
    }
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            latitude: 44.5646,
            longitude: -123.262,
            elevation: 0.0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "rulehubd=info,rulehub_app=info,rulehub_adapter_gateway=info".to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
