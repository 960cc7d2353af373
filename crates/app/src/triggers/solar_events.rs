//! Daily solar event trigger.
//!
//! Every day the trigger computes when each of its solar events happens,
//! schedules one notification per event still ahead, then sleeps until
//! 01:00 local time the next day and starts over.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, TimeDelta, TimeZone};
use chrono_tz::Tz;
use rulehub_domain::solar::{Observer, SolarEvent, event_time};
use serde_json::Value;
use tokio::task::JoinSet;

use super::{Trigger, TriggerCore};
use crate::ports::Clock;
use crate::source::DetectionLoop;

/// Local hour at which the next day's schedule is computed.
const RESCHEDULE_HOUR: u32 = 1;

/// Notifies `(event_name, null)` at named solar events, shifted by an offset.
pub struct DailySolarEventsTrigger {
    core: TriggerCore,
    events: Vec<SolarEvent>,
    observer: Observer,
    timezone: Tz,
    offset: TimeDelta,
    clock: Arc<dyn Clock>,
}

impl DailySolarEventsTrigger {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        events: Vec<SolarEvent>,
        observer: Observer,
        timezone: Tz,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            core: TriggerCore::new(name),
            events,
            observer,
            timezone,
            offset: TimeDelta::zero(),
            clock,
        }
    }

    /// Shift every event by `offset` (negative for earlier).
    #[must_use]
    pub fn with_offset(mut self, offset: TimeDelta) -> Self {
        self.offset = offset;
        self
    }

    /// Offset-adjusted time of each event on the local `date`.
    ///
    /// Events the sun does not reach that day are logged and left out.
    #[must_use]
    pub fn schedule(&self, date: NaiveDate) -> Vec<(DateTime<Tz>, SolarEvent)> {
        self.events
            .iter()
            .filter_map(|&event| {
                match event_time(&self.observer, date, &self.timezone, event) {
                    Ok(at) => Some((at + self.offset, event)),
                    Err(err) => {
                        tracing::error!(trigger = %self.core.name(), %event, %err, "event skipped");
                        None
                    }
                }
            })
            .collect()
    }

    /// Time left until the next day's schedule should be computed.
    fn until_reschedule(&self, now: &DateTime<Tz>) -> Duration {
        let next = now
            .date_naive()
            .succ_opt()
            .and_then(|day| day.and_hms_opt(RESCHEDULE_HOUR, 0, 0))
            .and_then(|at| self.timezone.from_local_datetime(&at).earliest());
        next.and_then(|at| at.signed_duration_since(now).to_std().ok())
            .unwrap_or(Duration::from_secs(24 * 60 * 60))
    }

    async fn fire_at(self: Arc<Self>, wait: Duration, event: SolarEvent) {
        tokio::time::sleep(wait).await;
        tracing::info!(trigger = %self.core.name(), %event, "solar event");
        self.core.notify(Some(event.as_str()), &Value::Null);
    }
}

impl std::fmt::Debug for DailySolarEventsTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DailySolarEventsTrigger")
            .field("core", &self.core)
            .field("events", &self.events)
            .field("observer", &self.observer)
            .field("timezone", &self.timezone)
            .field("offset", &self.offset)
            .finish_non_exhaustive()
    }
}

impl Trigger for DailySolarEventsTrigger {
    fn core(&self) -> &TriggerCore {
        &self.core
    }

    fn detection_loop(self: Arc<Self>) -> Option<DetectionLoop> {
        Some(Box::pin(async move {
            // Pending notifications are aborted along with this loop.
            let mut pending = JoinSet::new();
            loop {
                while pending.try_join_next().is_some() {}

                let now = self.clock.now().with_timezone(&self.timezone);
                for (at, event) in self.schedule(now.date_naive()) {
                    let Ok(wait) = at.signed_duration_since(&now).to_std() else {
                        continue;
                    };
                    tracing::info!(trigger = %self.core.name(), %event, %at, "scheduled");
                    pending.spawn(Arc::clone(&self).fire_at(wait, event));
                }

                let wait = self.until_reschedule(&now);
                tracing::info!(
                    trigger = %self.core.name(),
                    ?wait,
                    "next day's schedule pulled in"
                );
                tokio::time::sleep(wait).await;
            }
        }))
    }
}
