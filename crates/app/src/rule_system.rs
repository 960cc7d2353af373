//! Rule system: top-level registry and scheduler.
//!
//! ## Lifecycle
//! 1. [`RuleSystem::initialize`] discovers every Thing through the
//!    [`Gateway`] port and builds one [`Thing`] proxy per description.
//! 2. [`RuleSystem::add_rule`] subscribes each rule to its Things and
//!    records every source that may need a detection loop.
//! 3. [`RuleSystem::run`] spawns one task per detection loop.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rulehub_domain::error::LookupError;
use tokio::task::JoinSet;

use crate::dispatch::Subscriber;
use crate::ports::{Gateway, GatewayError, ThingConnector};
use crate::registry::ThingRegistry;
use crate::rule::Rule;
use crate::source::Source;
use crate::thing::{ConnectionSettings, Thing};

/// Settings the engine needs to reach the gateway and its Things.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Bearer token for discovery and live connections.
    pub token: String,
    /// Pause between two failed discovery attempts.
    pub discovery_backoff: Duration,
    pub connection: ConnectionSettings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            token: String::new(),
            discovery_backoff: Duration::from_secs(30),
            connection: ConnectionSettings::default(),
        }
    }
}

/// Setup failure of the engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("thing discovery failed")]
    Discovery(#[from] GatewayError),
}

/// All known Things, the installed rules and the sources to run.
#[derive(Debug)]
pub struct RuleSystem {
    registry: Arc<ThingRegistry>,
    rules: Vec<Arc<Rule>>,
    detection: Vec<Source>,
}

impl RuleSystem {
    /// Discover the Things and build their proxies.
    ///
    /// Unreachable gateways are retried forever, `discovery_backoff` apart.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Discovery`] if the gateway answered with
    /// something that is not a list of Thing descriptions.
    pub async fn initialize<G: Gateway>(
        gateway: &G,
        connector: Arc<dyn ThingConnector>,
        settings: &EngineSettings,
    ) -> Result<Self, EngineError> {
        let descriptions = loop {
            match gateway.fetch_things().await {
                Ok(descriptions) => break descriptions,
                Err(err) if err.is_transient() => {
                    tracing::warn!(
                        error = %err,
                        cause = ?std::error::Error::source(&err),
                        retry_in = ?settings.discovery_backoff,
                        "gateway unreachable"
                    );
                    tokio::time::sleep(settings.discovery_backoff).await;
                }
                Err(err) => return Err(err.into()),
            }
        };
        tracing::info!(things = descriptions.len(), "things discovered");

        let things = descriptions.into_iter().map(|description| {
            Arc::new(Thing::new(
                description,
                settings.token.clone(),
                Arc::clone(&connector),
                settings.connection,
            ))
        });
        Ok(Self::from_things(things))
    }

    /// Build a rule system around already constructed Things.
    #[must_use]
    pub fn from_things(things: impl IntoIterator<Item = Arc<Thing>>) -> Self {
        let registry = Arc::new(ThingRegistry::new(things));
        let detection = registry
            .iter()
            .map(|thing| Source::Thing(Arc::clone(thing)))
            .collect();
        Self {
            registry,
            rules: Vec::new(),
            detection,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<ThingRegistry> {
        &self.registry
    }

    /// Any known Thing, by name or id.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError`] if no Thing matches.
    pub fn lookup(&self, name: &str) -> Result<Arc<Thing>, LookupError> {
        self.registry.lookup(name)
    }

    #[must_use]
    pub fn rules(&self) -> &[Arc<Rule>] {
        &self.rules
    }

    /// Every source a detection loop may be started for.
    #[must_use]
    pub fn detection_sources(&self) -> &[Source] {
        &self.detection
    }

    /// Install a rule. Installing the same rule twice has no effect.
    pub fn add_rule(&mut self, rule: Arc<Rule>) {
        if self.rules.iter().any(|known| Arc::ptr_eq(known, &rule)) {
            tracing::debug!(rule = %rule.name(), "rule already installed");
            return;
        }
        for source in rule.sources() {
            if let Some(thing) = source.as_thing() {
                thing.add_subscriber(Arc::clone(&rule) as Arc<dyn Subscriber>);
            }
            if !self.detection.iter().any(|known| known.same_as(source)) {
                self.detection.push(source.clone());
            }
        }
        tracing::info!(rule = %rule.name(), "rule installed");
        self.rules.push(rule);
    }

    /// Spawn the detection loop of every source that has one.
    #[must_use]
    pub fn run(&self) -> JoinSet<()> {
        let mut tasks = JoinSet::new();
        for source in &self.detection {
            match source.detection_loop() {
                Some(detection) => {
                    tracing::debug!(source = %source.name(), "detection loop started");
                    tasks.spawn(detection);
                }
                None => tracing::debug!(source = %source.name(), "no detection loop"),
            }
        }
        tracing::info!(loops = tasks.len(), "rule system running");
        tasks
    }

    /// Run until `shutdown` resolves, then stop every loop.
    pub async fn run_until(&self, shutdown: impl Future<Output = ()>) {
        let mut tasks = self.run();
        shutdown.await;
        tracing::info!("shutting down");
        tasks.shutdown().await;
    }
}
