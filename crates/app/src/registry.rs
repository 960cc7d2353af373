//! Registry of every Thing known to the engine.

use std::collections::BTreeMap;
use std::sync::Arc;

use rulehub_domain::error::LookupError;

use crate::thing::Thing;

/// Every Thing known to the engine, indexed by display name.
///
/// Lookups try the name first and fall back to the id.
#[derive(Debug, Default)]
pub struct ThingRegistry {
    things: Vec<Arc<Thing>>,
    by_name: BTreeMap<String, usize>,
}

impl ThingRegistry {
    /// Keep every Thing. On a name clash the first one owns the name; the
    /// others stay reachable by id.
    #[must_use]
    pub fn new(things: impl IntoIterator<Item = Arc<Thing>>) -> Self {
        let mut registry = Self::default();
        for thing in things {
            let index = registry.things.len();
            let name = thing.name().to_string();
            if registry.by_name.contains_key(&name) {
                tracing::warn!(
                    thing = %name,
                    id = %thing.id(),
                    "duplicate thing name, reachable by id only"
                );
            } else {
                registry.by_name.insert(name, index);
            }
            registry.things.push(thing);
        }
        registry
    }

    /// Find a Thing by name, or by id if no name matches.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError`] if neither matches.
    pub fn lookup(&self, name: &str) -> Result<Arc<Thing>, LookupError> {
        self.by_name
            .get(name)
            .map(|&index| &self.things[index])
            .or_else(|| self.things.iter().find(|thing| thing.id() == name))
            .cloned()
            .ok_or_else(|| LookupError::new(name))
    }

    /// Every Thing, in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Thing>> {
        self.things.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.things.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.things.is_empty()
    }
}
