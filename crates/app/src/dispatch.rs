//! Fan-out of source notifications to subscribed rules.
//!
//! Things and triggers both keep a [`SubscriberList`]. When a property
//! changes, an event arrives or a timer fires, every subscriber is invoked
//! exactly once, synchronously, in subscription order.

use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;

/// What kind of object produced a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Thing,
    Trigger,
}

/// A single change reported by a source.
#[derive(Debug, Clone, Copy)]
pub struct Notification<'a> {
    /// Name of the Thing or trigger that produced the change.
    pub source: &'a str,
    pub kind: SourceKind,
    /// Property or event name; `None` for a bare tick.
    pub name: Option<&'a str>,
    pub value: &'a Value,
}

impl Notification<'_> {
    /// Whether this notification reports `name` on the source `source`.
    #[must_use]
    pub fn is(&self, source: &str, name: &str) -> bool {
        self.source == source && self.name == Some(name)
    }
}

/// Receives notifications from the sources it is subscribed to.
pub trait Subscriber: Send + Sync {
    fn notify(&self, notification: &Notification<'_>);
}

/// Ordered list of subscribers.
#[derive(Default)]
pub struct SubscriberList {
    inner: Mutex<Vec<Arc<dyn Subscriber>>>,
}

impl SubscriberList {
    /// Append a subscriber.
    pub fn push(&self, subscriber: Arc<dyn Subscriber>) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(subscriber);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invoke every subscriber with `notification`, in order.
    ///
    /// The list is snapshotted first so a subscriber may subscribe others
    /// (or itself) without deadlocking; those only see later notifications.
    pub fn dispatch(&self, notification: &Notification<'_>) {
        let snapshot = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for subscriber in &snapshot {
            subscriber.notify(notification);
        }
    }
}

impl std::fmt::Debug for SubscriberList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberList")
            .field("len", &self.len())
            .finish()
    }
}
