//! Triggers: engine-internal event sources that are not devices.
//!
//! Every trigger keeps a [`TriggerCore`] with its name, subscribed rules
//! and `canceled` flag. The kinds differ in what drives their
//! notifications:
//!
//! - [`Heartbeat`]: periodic bare tick
//! - [`DelayTimer`]: fires once after all the time added to it elapsed
//! - [`DurationTimer`]: on/off cycles repeated a fixed number of times
//! - [`AbsoluteTimeTrigger`]: once per day at a time of day
//! - [`DailySolarEventsTrigger`]: at named solar events every day

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;

use crate::dispatch::{Notification, SourceKind, Subscriber, SubscriberList};
use crate::source::DetectionLoop;

pub mod absolute_time;
pub mod delay_timer;
pub mod duration_timer;
pub mod heartbeat;
pub mod solar_events;

pub use absolute_time::AbsoluteTimeTrigger;
pub use delay_timer::DelayTimer;
pub use duration_timer::DurationTimer;
pub use heartbeat::Heartbeat;
pub use solar_events::DailySolarEventsTrigger;

/// State shared by every trigger kind.
#[derive(Debug)]
pub struct TriggerCore {
    name: String,
    subscribers: SubscriberList,
    canceled: AtomicBool,
}

impl TriggerCore {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            subscribers: SubscriberList::default(),
            canceled: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn register(&self, rule: Arc<dyn Subscriber>) {
        self.subscribers.push(rule);
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn set_canceled(&self, canceled: bool) {
        self.canceled.store(canceled, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    /// Notify every registered rule, unless canceled.
    pub fn notify(&self, name: Option<&str>, value: &Value) {
        if self.is_canceled() {
            tracing::debug!(trigger = %self.name, ?name, "canceled, notification suppressed");
            return;
        }
        self.subscribers.dispatch(&Notification {
            source: &self.name,
            kind: SourceKind::Trigger,
            name,
            value,
        });
    }
}

/// Common contract of every trigger.
pub trait Trigger: Send + Sync + 'static {
    fn core(&self) -> &TriggerCore;

    fn name(&self) -> &str {
        self.core().name()
    }

    /// Subscribe a rule to this trigger's notifications.
    fn register_rule(&self, rule: Arc<dyn Subscriber>) {
        self.core().register(rule);
    }

    /// Silence future notifications. Bindings are kept.
    fn cancel(&self) {
        tracing::info!(trigger = %self.name(), "canceled");
        self.core().set_canceled(true);
    }

    fn is_canceled(&self) -> bool {
        self.core().is_canceled()
    }

    /// Background loop driving this trigger, for the kinds that need one.
    fn detection_loop(self: Arc<Self>) -> Option<DetectionLoop> {
        None
    }
}
