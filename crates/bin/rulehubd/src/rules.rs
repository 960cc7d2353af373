//! Rules declared in the configuration file.
//!
//! Each `[[rules]]` entry becomes one [`Rule`] with the trigger it needs.
//! Thing names may be given as display names or ids.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono_tz::Tz;
use rulehub_app::dispatch::{Notification, SourceKind};
use rulehub_app::ports::Clock;
use rulehub_app::registry::ThingRegistry;
use rulehub_app::rule::{Rule, RuleBehavior};
use rulehub_app::rule_system::RuleSystem;
use rulehub_app::triggers::{
    AbsoluteTimeTrigger, DailySolarEventsTrigger, DelayTimer, Heartbeat, Trigger,
};
use rulehub_domain::error::{ParseDurationError, ParseTimeError};
use rulehub_domain::solar::{Observer, ParseSolarEventError, SolarEvent};
use serde_json::Value;

use crate::config::{ConfigError, RuleConfig, parse_offset};

/// What the declared rules need besides the Things.
pub struct RuleContext {
    pub timezone: Tz,
    pub observer: Observer,
    pub clock: Arc<dyn Clock>,
}

/// A declared rule cannot be built.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("rule `{rule}` has an invalid period")]
    Period {
        rule: String,
        #[source]
        source: ParseDurationError,
    },
    #[error("rule `{rule}` has an invalid time of day")]
    Time {
        rule: String,
        #[source]
        source: ParseTimeError,
    },
    #[error("rule `{rule}` names an unknown solar event")]
    SolarEvent {
        rule: String,
        #[source]
        source: ParseSolarEventError,
    },
    #[error("rule `{rule}` has an invalid offset")]
    Offset {
        rule: String,
        #[source]
        source: ConfigError,
    },
}

/// Build every declared rule and install it.
///
/// # Errors
///
/// Returns the first [`RuleError`]; rules before it stay installed.
pub fn install(
    system: &mut RuleSystem,
    rules: &[RuleConfig],
    context: &RuleContext,
) -> Result<(), RuleError> {
    for config in rules {
        let rule = build(system.registry(), config, context)?;
        system.add_rule(rule);
    }
    Ok(())
}

/// Display name of a Thing given by name or id; unknown names are kept.
fn canonical(registry: &ThingRegistry, name: &str) -> String {
    registry
        .lookup(name)
        .map_or_else(|_| name.to_string(), |thing| thing.name().to_string())
}

fn build(
    registry: &Arc<ThingRegistry>,
    config: &RuleConfig,
    context: &RuleContext,
) -> Result<Arc<Rule>, RuleError> {
    let rule = match config {
        RuleConfig::Follow {
            name,
            source,
            property,
            targets,
        } => Rule::builder(name, Arc::clone(registry))
            .named(source)
            .build(Follow {
                source: canonical(registry, source),
                property: property.clone(),
                targets: targets.clone(),
            }),
        RuleConfig::DelayOff {
            name,
            thing,
            property,
            period,
        } => {
            let timer = DelayTimer::new(format!("{name} timer"), period).map_err(|source| {
                RuleError::Period {
                    rule: name.clone(),
                    source,
                }
            })?;
            let timer = Arc::new(timer);
            Rule::builder(name, Arc::clone(registry))
                .named(thing)
                .trigger(Arc::clone(&timer) as Arc<dyn Trigger>)
                .build(DelayOff {
                    source: canonical(registry, thing),
                    thing: thing.clone(),
                    property: property.clone(),
                    timer,
                })
        }
        RuleConfig::Heartbeat { name, period } => {
            let heartbeat = Heartbeat::new(format!("{name} heartbeat"), period).map_err(
                |source| RuleError::Period {
                    rule: name.clone(),
                    source,
                },
            )?;
            Rule::builder(name, Arc::clone(registry))
                .trigger(Arc::new(heartbeat))
                .build(Liveness::default())
        }
        RuleConfig::AtTime {
            name,
            time,
            thing,
            property,
            value,
        } => {
            let trigger = AbsoluteTimeTrigger::new(
                format!("{name} at {time}"),
                time,
                context.timezone,
                Arc::clone(&context.clock),
            )
            .map_err(|source| RuleError::Time {
                rule: name.clone(),
                source,
            })?;
            Rule::builder(name, Arc::clone(registry))
                .trigger(Arc::new(trigger))
                .build(SetOnTrigger {
                    thing: thing.clone(),
                    property: property.clone(),
                    value: value.clone(),
                })
        }
        RuleConfig::Solar {
            name,
            event,
            offset,
            thing,
            property,
            value,
        } => {
            let event: SolarEvent = event.parse().map_err(|source| RuleError::SolarEvent {
                rule: name.clone(),
                source,
            })?;
            let offset = parse_offset(offset.as_deref()).map_err(|source| RuleError::Offset {
                rule: name.clone(),
                source,
            })?;
            let trigger = DailySolarEventsTrigger::new(
                format!("{name} at {event}"),
                vec![event],
                context.observer,
                context.timezone,
                Arc::clone(&context.clock),
            )
            .with_offset(offset);
            Rule::builder(name, Arc::clone(registry))
                .trigger(Arc::new(trigger))
                .build(SetOnTrigger {
                    thing: thing.clone(),
                    property: property.clone(),
                    value: value.clone(),
                })
        }
    };
    Ok(rule)
}

fn set(rule: &Rule, thing: &str, property: &str, value: Value) {
    let result = rule
        .lookup(thing)
        .map_err(|err| err.to_string())
        .and_then(|thing| {
            thing
                .set_property(property, value)
                .map_err(|err| err.to_string())
        });
    if let Err(err) = result {
        tracing::warn!(rule = %rule.name(), %thing, %property, %err, "cannot set property");
    }
}

/// Mirrors a property of one Thing onto others.
struct Follow {
    source: String,
    property: String,
    targets: Vec<String>,
}

impl RuleBehavior for Follow {
    fn action(&self, rule: &Rule, notification: &Notification<'_>) {
        if !notification.is(&self.source, &self.property) {
            return;
        }
        for target in &self.targets {
            set(rule, target, &self.property, notification.value.clone());
        }
    }
}

/// Keeps a light on while it is used, then switches it off.
struct DelayOff {
    /// Display name carried by the Thing's notifications.
    source: String,
    /// Name or id the Thing was configured with; used for writes.
    thing: String,
    property: String,
    timer: Arc<DelayTimer>,
}

impl RuleBehavior for DelayOff {
    fn action(&self, rule: &Rule, notification: &Notification<'_>) {
        match notification.kind {
            SourceKind::Thing if notification.is(&self.source, &self.property) => {
                match notification.value {
                    Value::Bool(true) => self.timer.add_time(),
                    Value::Bool(false) => self.timer.cancel(),
                    _ => {}
                }
            }
            SourceKind::Trigger
                if notification.is(self.timer.name(), "timer_status")
                    && *notification.value == Value::Bool(false) =>
            {
                tracing::info!(rule = %rule.name(), thing = %self.thing, "time is up");
                set(rule, &self.thing, &self.property, Value::Bool(false));
            }
            _ => {}
        }
    }
}

/// Logs every heartbeat.
#[derive(Default)]
struct Liveness {
    beats: AtomicU64,
}

impl RuleBehavior for Liveness {
    fn action(&self, rule: &Rule, _notification: &Notification<'_>) {
        let beats = self.beats.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!(rule = %rule.name(), beats, "alive");
    }
}

/// Sets a property whenever its trigger fires.
struct SetOnTrigger {
    thing: String,
    property: String,
    value: Value,
}

impl RuleBehavior for SetOnTrigger {
    fn action(&self, rule: &Rule, notification: &Notification<'_>) {
        if notification.kind == SourceKind::Trigger {
            set(rule, &self.thing, &self.property, self.value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use futures::future::BoxFuture;
    use rulehub_app::dispatch::Subscriber;
    use rulehub_app::ports::{AnchoredClock, Connection, ThingConnector, TransportError};
    use rulehub_app::thing::{ConnectionSettings, Thing};
    use rulehub_domain::thing::ThingDescription;
    use serde_json::json;

    use super::*;

    // ── Helpers ────────────────────────────────────────────────────

    /// Things in these tests have no live address, so this is never used.
    struct Offline;

    impl ThingConnector for Offline {
        fn connect<'a>(
            &'a self,
            _uri: &'a str,
            _token: &'a str,
        ) -> BoxFuture<'a, Result<Connection, TransportError>> {
            Box::pin(async { Err(TransportError::Closed) })
        }
    }

    fn thing(title: &str) -> Arc<Thing> {
        let slug = title.to_lowercase().replace(' ', "-");
        let description: ThingDescription = serde_json::from_value(json!({
            "href": format!("/things/{slug}"),
            "title": title,
            "properties": { "on": { "type": "boolean" } }
        }))
        .unwrap();
        Arc::new(Thing::new(
            description,
            "token",
            Arc::new(Offline),
            ConnectionSettings::default(),
        ))
    }

    fn system(origin: chrono::DateTime<Utc>, rules: &[RuleConfig]) -> RuleSystem {
        let mut system =
            RuleSystem::from_things([thing("Hall"), thing("Porch"), thing("Pantry Light")]);
        let context = RuleContext {
            timezone: Tz::UTC,
            observer: Observer::new(51.5074, -0.1278, 0.0).unwrap(),
            clock: Arc::new(AnchoredClock::starting_at(origin)),
        };
        install(&mut system, rules, &context).unwrap();
        system
    }

    fn notify(rule: &Rule, source: &str, name: &str, value: &Value) {
        rule.notify(&Notification {
            source,
            kind: SourceKind::Thing,
            name: Some(name),
            value,
        });
    }

    fn midnight() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 21, 0, 0, 0).unwrap()
    }

    fn delay_off() -> RuleConfig {
        RuleConfig::DelayOff {
            name: "pantry".to_string(),
            thing: "pantry-light".to_string(),
            property: "on".to_string(),
            period: "5m".to_string(),
        }
    }

    // ── Tests ──────────────────────────────────────────────────────

    #[test]
    fn should_copy_source_value_to_targets() {
        let system = system(
            midnight(),
            &[RuleConfig::Follow {
                name: "porch follows hall".to_string(),
                source: "hall".to_string(),
                property: "on".to_string(),
                targets: vec!["Porch".to_string(), "Garage".to_string()],
            }],
        );
        let rule = &system.rules()[0];

        notify(rule, "Hall", "on", &json!(true));

        assert_eq!(system.lookup("Porch").unwrap().get("on"), Some(json!(true)));
        assert_eq!(system.lookup("Hall").unwrap().subscriber_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn should_switch_off_once_the_delay_is_over() {
        let system = system(midnight(), &[delay_off()]);
        let rule = &system.rules()[0];
        let pantry = system.lookup("Pantry Light").unwrap();

        notify(rule, "Pantry Light", "on", &json!(true));
        tokio::time::sleep(Duration::from_secs(299)).await;
        assert_eq!(pantry.get("on"), None);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(pantry.get("on"), Some(json!(false)));
    }

    #[tokio::test(start_paused = true)]
    async fn should_forget_the_delay_when_switched_off_by_hand() {
        let system = system(midnight(), &[delay_off()]);
        let rule = &system.rules()[0];
        let pantry = system.lookup("Pantry Light").unwrap();

        notify(rule, "Pantry Light", "on", &json!(true));
        tokio::time::sleep(Duration::from_secs(60)).await;
        notify(rule, "Pantry Light", "on", &json!(false));
        tokio::time::sleep(Duration::from_secs(600)).await;

        assert_eq!(pantry.get("on"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn should_set_property_at_time_of_day() {
        let origin = Utc.with_ymd_and_hms(2024, 6, 21, 21, 59, 0).unwrap();
        let system = system(
            origin,
            &[RuleConfig::AtTime {
                name: "night".to_string(),
                time: "22:00:00".to_string(),
                thing: "Porch".to_string(),
                property: "on".to_string(),
                value: json!(false),
            }],
        );
        let porch = system.lookup("Porch").unwrap();
        porch.set_property("on", json!(true)).unwrap();

        let mut tasks = system.run();
        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(porch.get("on"), Some(json!(true)));
        tokio::time::sleep(Duration::from_secs(2)).await;
        tasks.shutdown().await;

        assert_eq!(porch.get("on"), Some(json!(false)));
    }

    #[tokio::test(start_paused = true)]
    async fn should_set_property_at_solar_event() {
        let system = system(
            midnight(),
            &[RuleConfig::Solar {
                name: "evening".to_string(),
                event: "sunset".to_string(),
                offset: Some("-1h".to_string()),
                thing: "Porch".to_string(),
                property: "on".to_string(),
                value: json!(true),
            }],
        );
        let porch = system.lookup("Porch").unwrap();

        let mut tasks = system.run();
        // Sunset in London on that day is around 20:21 UTC.
        tokio::time::sleep(Duration::from_secs(19 * 60 * 60)).await;
        assert_eq!(porch.get("on"), None);
        tokio::time::sleep(Duration::from_secs(60 * 60)).await;
        tasks.shutdown().await;

        assert_eq!(porch.get("on"), Some(json!(true)));
    }

    #[test]
    fn should_give_heartbeat_its_own_loop() {
        let system = system(
            midnight(),
            &[RuleConfig::Heartbeat {
                name: "alive".to_string(),
                period: "1m".to_string(),
            }],
        );
        assert_eq!(system.detection_sources().len(), 4);
    }

    #[test]
    fn should_reject_unknown_solar_event() {
        let mut system = RuleSystem::from_things([]);
        let context = RuleContext {
            timezone: Tz::UTC,
            observer: Observer::new(0.0, 0.0, 0.0).unwrap(),
            clock: Arc::new(AnchoredClock::starting_at(midnight())),
        };
        let err = install(
            &mut system,
            &[RuleConfig::Solar {
                name: "sun".to_string(),
                event: "moonrise".to_string(),
                offset: None,
                thing: "Porch".to_string(),
                property: "on".to_string(),
                value: json!(true),
            }],
            &context,
        )
        .unwrap_err();

        assert!(matches!(err, RuleError::SolarEvent { .. }));
        assert!(system.rules().is_empty());
    }
}
