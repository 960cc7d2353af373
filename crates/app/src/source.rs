//! Sources a rule can be bound to: Things and triggers.

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::dispatch::SourceKind;
use crate::thing::Thing;
use crate::triggers::Trigger;

/// Long-running task producing events for one source.
pub type DetectionLoop = BoxFuture<'static, ()>;

/// Either a Thing proxy or a trigger.
#[derive(Clone)]
pub enum Source {
    Thing(Arc<Thing>),
    Trigger(Arc<dyn Trigger>),
}

impl Source {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Thing(thing) => thing.name(),
            Self::Trigger(trigger) => trigger.name(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> SourceKind {
        match self {
            Self::Thing(_) => SourceKind::Thing,
            Self::Trigger(_) => SourceKind::Trigger,
        }
    }

    /// The Thing behind this source, if it is one.
    #[must_use]
    pub fn as_thing(&self) -> Option<&Arc<Thing>> {
        match self {
            Self::Thing(thing) => Some(thing),
            Self::Trigger(_) => None,
        }
    }

    /// The source's background loop, for sources that have one.
    #[must_use]
    pub fn detection_loop(&self) -> Option<DetectionLoop> {
        match self {
            Self::Thing(thing) => Arc::clone(thing).detection_loop(),
            Self::Trigger(trigger) => Arc::clone(trigger).detection_loop(),
        }
    }

    /// Whether both values refer to the same object.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Thing(a), Self::Thing(b)) => Arc::ptr_eq(a, b),
            (Self::Trigger(a), Self::Trigger(b)) => {
                std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
            }
            _ => false,
        }
    }
}

impl From<Arc<Thing>> for Source {
    fn from(thing: Arc<Thing>) -> Self {
        Self::Thing(thing)
    }
}

impl From<Arc<dyn Trigger>> for Source {
    fn from(trigger: Arc<dyn Trigger>) -> Self {
        Self::Trigger(trigger)
    }
}

impl std::fmt::Debug for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Source")
            .field("name", &self.name())
            .field("kind", &self.kind())
            .finish()
    }
}
