//! Daily time-of-day trigger.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveTime;
use chrono_tz::Tz;
use rulehub_domain::error::ParseTimeError;
use rulehub_domain::time::{duration_until, parse_time_of_day};
use serde_json::Value;

use super::{Trigger, TriggerCore};
use crate::ports::Clock;
use crate::source::DetectionLoop;

/// Pause after firing so the same instant is never matched twice.
const FIRE_GUARD: Duration = Duration::from_secs(1);

/// Notifies `("activated", true)` every day at a fixed local time.
pub struct AbsoluteTimeTrigger {
    core: TriggerCore,
    time_of_day: NaiveTime,
    timezone: Tz,
    clock: Arc<dyn Clock>,
}

impl AbsoluteTimeTrigger {
    /// Fire every day at `time_of_day` (`"HH:MM:SS"`) in `timezone`.
    ///
    /// # Errors
    ///
    /// Returns [`ParseTimeError`] if `time_of_day` is malformed.
    pub fn new(
        name: impl Into<String>,
        time_of_day: &str,
        timezone: Tz,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ParseTimeError> {
        Ok(Self {
            core: TriggerCore::new(name),
            time_of_day: parse_time_of_day(time_of_day)?,
            timezone,
            clock,
        })
    }

    #[must_use]
    pub fn time_of_day(&self) -> NaiveTime {
        self.time_of_day
    }

    /// Time left until the next occurrence.
    #[must_use]
    pub fn until_next(&self) -> Duration {
        let now = self.clock.now().with_timezone(&self.timezone).time();
        duration_until(self.time_of_day, now)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

impl std::fmt::Debug for AbsoluteTimeTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AbsoluteTimeTrigger")
            .field("core", &self.core)
            .field("time_of_day", &self.time_of_day)
            .field("timezone", &self.timezone)
            .finish_non_exhaustive()
    }
}

impl Trigger for AbsoluteTimeTrigger {
    fn core(&self) -> &TriggerCore {
        &self.core
    }

    fn detection_loop(self: Arc<Self>) -> Option<DetectionLoop> {
        Some(Box::pin(async move {
            loop {
                let wait = self.until_next();
                tracing::debug!(trigger = %self.core.name(), ?wait, "next activation");
                tokio::time::sleep(wait).await;
                self.core.notify(Some("activated"), &Value::Bool(true));
                tokio::time::sleep(FIRE_GUARD).await;
            }
        }))
    }
}
