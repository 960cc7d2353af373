//! Rules: automation logic bound to a fixed set of sources.
//!
//! A [`Rule`] is built once with the Things and triggers it listens to.
//! The binding is immutable: sources are resolved at build time, the rule
//! subscribes itself to every trigger among them, and the Things are
//! handed over to [`RuleSystem::add_rule`](crate::rule_system::RuleSystem::add_rule),
//! which subscribes the rule to them.
//!
//! What a rule *does* lives in a [`RuleBehavior`].

use std::collections::BTreeMap;
use std::sync::Arc;

use rulehub_domain::error::LookupError;

use crate::dispatch::{Notification, Subscriber};
use crate::registry::ThingRegistry;
use crate::source::Source;
use crate::thing::Thing;
use crate::triggers::Trigger;

/// User-defined logic of a rule.
pub trait RuleBehavior: Send + Sync + 'static {
    /// Called once, after the sources are bound and before any
    /// notification can reach the rule.
    fn initial_state(&self, _rule: &Rule) {}

    /// React to a change on one of the rule's sources.
    fn action(&self, rule: &Rule, notification: &Notification<'_>);
}

/// A named rule and its bound sources.
pub struct Rule {
    name: String,
    sources: BTreeMap<String, Source>,
    registry: Arc<ThingRegistry>,
    behavior: Box<dyn RuleBehavior>,
}

impl Rule {
    /// Start binding a rule named `name`. Names are resolved against
    /// `registry`.
    #[must_use]
    pub fn builder(name: impl Into<String>, registry: Arc<ThingRegistry>) -> RuleBuilder {
        RuleBuilder {
            name: name.into(),
            registry,
            sources: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// A source this rule is bound to.
    #[must_use]
    pub fn source(&self, name: &str) -> Option<&Source> {
        self.sources.get(name)
    }

    pub fn sources(&self) -> impl Iterator<Item = &Source> {
        self.sources.values()
    }

    /// A bound Thing, by name.
    #[must_use]
    pub fn thing(&self, name: &str) -> Option<&Arc<Thing>> {
        self.source(name).and_then(Source::as_thing)
    }

    /// Any Thing known to the engine, bound or not.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError`] if no Thing has that name or id.
    pub fn lookup(&self, name: &str) -> Result<Arc<Thing>, LookupError> {
        self.registry.lookup(name)
    }
}

impl Subscriber for Rule {
    fn notify(&self, notification: &Notification<'_>) {
        tracing::debug!(
            rule = %self.name,
            source = %notification.source,
            name = ?notification.name,
            value = %notification.value,
            "action"
        );
        self.behavior.action(self, notification);
    }
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("sources", &self.sources.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Collects the sources of a [`Rule`].
#[derive(Debug)]
pub struct RuleBuilder {
    name: String,
    registry: Arc<ThingRegistry>,
    sources: BTreeMap<String, Source>,
}

impl RuleBuilder {
    /// Bind a Thing by name or id. Unknown names are logged and skipped.
    #[must_use]
    pub fn named(self, name: &str) -> Self {
        match self.registry.lookup(name) {
            Ok(thing) => self.thing(thing),
            Err(err) => {
                tracing::error!(rule = %self.name, %err, "source skipped");
                self
            }
        }
    }

    #[must_use]
    pub fn thing(self, thing: Arc<Thing>) -> Self {
        self.source(Source::Thing(thing))
    }

    #[must_use]
    pub fn trigger(self, trigger: Arc<dyn Trigger>) -> Self {
        self.source(Source::Trigger(trigger))
    }

    #[must_use]
    pub fn source(mut self, source: Source) -> Self {
        let name = source.name().to_string();
        if self.sources.contains_key(&name) {
            tracing::warn!(rule = %self.name, source = %name, "source bound twice, ignored");
        } else {
            self.sources.insert(name, source);
        }
        self
    }

    /// Finish the rule: run its initial state, then subscribe it to every
    /// bound trigger.
    pub fn build(self, behavior: impl RuleBehavior) -> Arc<Rule> {
        let rule = Arc::new(Rule {
            name: self.name,
            sources: self.sources,
            registry: self.registry,
            behavior: Box::new(behavior),
        });
        rule.behavior.initial_state(&rule);
        for source in rule.sources.values() {
            if let Source::Trigger(trigger) = source {
                trigger.register_rule(Arc::clone(&rule) as Arc<dyn Subscriber>);
            }
        }
        tracing::info!(
            rule = %rule.name,
            sources = rule.sources.len(),
            "rule bound"
        );
        rule
    }
}
