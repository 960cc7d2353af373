//! Periodic tick.

use std::sync::Arc;
use std::time::Duration;

use rulehub_domain::duration::parse_duration_std;
use rulehub_domain::error::ParseDurationError;
use serde_json::Value;

use super::{Trigger, TriggerCore};
use crate::source::DetectionLoop;

/// Notifies its rules with a null value every `period`, forever.
///
/// Canceling only silences the ticks; the loop keeps running.
#[derive(Debug)]
pub struct Heartbeat {
    core: TriggerCore,
    period: Duration,
}

impl Heartbeat {
    /// Build a heartbeat ticking every `period` (e.g. `"10s"`).
    ///
    /// # Errors
    ///
    /// Returns [`ParseDurationError`] if `period` is not a positive duration.
    pub fn new(name: impl Into<String>, period: &str) -> Result<Self, ParseDurationError> {
        let parsed = parse_duration_std(period)?;
        if parsed.is_zero() {
            return Err(ParseDurationError::Zero(period.to_string()));
        }
        Ok(Self {
            core: TriggerCore::new(name),
            period: parsed,
        })
    }

    #[must_use]
    pub fn period(&self) -> Duration {
        self.period
    }
}

impl Trigger for Heartbeat {
    fn core(&self) -> &TriggerCore {
        &self.core
    }

    fn detection_loop(self: Arc<Self>) -> Option<DetectionLoop> {
        Some(Box::pin(async move {
            tracing::debug!(trigger = %self.core.name(), period = ?self.period, "heartbeat started");
            loop {
                tokio::time::sleep(self.period).await;
                tracing::trace!(trigger = %self.core.name(), "beat");
                self.core.notify(None, &Value::Null);
            }
        }))
    }
}
