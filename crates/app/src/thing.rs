//! Thing proxy: local mirror of one remote device.
//!
//! A [`Thing`] keeps the last known value of every property, a queue of
//! commands waiting to be sent and the rules subscribed to it. Its
//! detection loop holds the live connection open:
//!
//! 1. connect with the auth token,
//! 2. read inbound frames while draining the command queue,
//! 3. on any failure, log and try again after a fixed backoff.
//!
//! Commands are only sent once the Thing acknowledged the connection, and
//! never faster than one per send interval. Commands queued while
//! disconnected wait for the next connection.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use rulehub_domain::protocol::{Command, InboundMessage};
use rulehub_domain::thing::{ThingDescription, ThingState};
use serde_json::{Map, Value};
use tokio::sync::{mpsc, watch};

use crate::dispatch::{Notification, SourceKind, Subscriber, SubscriberList};
use crate::ports::{Connection, FrameSink, FrameStream, ThingConnector, TransportError};
use crate::source::DetectionLoop;

/// Timing of a Thing's connection loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// Pause before reconnecting after a failure.
    pub reconnect_backoff: Duration,
    /// Minimum gap between two outbound commands.
    pub send_interval: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            reconnect_backoff: Duration::from_secs(30),
            send_interval: Duration::from_millis(250),
        }
    }
}

/// A property write was refused before being queued.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ThingError {
    #[error("`{thing}` has no property `{property}`")]
    UnknownProperty { thing: String, property: String },
    #[error("property `{property}` of `{thing}` is read-only")]
    ReadOnly { thing: String, property: String },
    #[error("property `{property}` of `{thing}` does not accept {value}")]
    InvalidValue {
        thing: String,
        property: String,
        value: Value,
    },
}

/// Proxy for a remote, gateway-managed device.
pub struct Thing {
    id: String,
    name: String,
    description: ThingDescription,
    token: String,
    settings: ConnectionSettings,
    connector: Arc<dyn ThingConnector>,
    cache: Mutex<Map<String, Value>>,
    commands: mpsc::UnboundedSender<Command>,
    pending: tokio::sync::Mutex<mpsc::UnboundedReceiver<Command>>,
    subscribers: SubscriberList,
}

impl Thing {
    #[must_use]
    pub fn new(
        description: ThingDescription,
        token: impl Into<String>,
        connector: Arc<dyn ThingConnector>,
        settings: ConnectionSettings,
    ) -> Self {
        let (commands, pending) = mpsc::unbounded_channel();
        Self {
            id: description.id().to_string(),
            name: description.title.clone(),
            description,
            token: token.into(),
            settings,
            connector,
            cache: Mutex::default(),
            commands,
            pending: tokio::sync::Mutex::new(pending),
            subscribers: SubscriberList::default(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn description(&self) -> &ThingDescription {
        &self.description
    }

    /// Last known value of a property.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        self.cache().get(name).cloned()
    }

    /// Snapshot of every known property value.
    #[must_use]
    pub fn state(&self) -> ThingState {
        ThingState(self.cache().clone())
    }

    /// Optimistically set a property and queue the command. Never waits.
    ///
    /// # Errors
    ///
    /// Returns [`ThingError`] if the property is not declared, is
    /// read-only, or does not accept the value's JSON type.
    pub fn set_property(&self, name: &str, value: Value) -> Result<(), ThingError> {
        self.check(name, &value)?;
        self.cache().insert(name.to_string(), value.clone());
        self.enqueue(Command::set_property(name, value));
        Ok(())
    }

    /// Set several properties at once, sent as a single command.
    ///
    /// Nothing is changed unless every pair is valid.
    ///
    /// # Errors
    ///
    /// Returns the first [`ThingError`] found.
    pub fn set_properties(&self, values: Map<String, Value>) -> Result<(), ThingError> {
        for (name, value) in &values {
            self.check(name, value)?;
        }
        if values.is_empty() {
            return Ok(());
        }
        self.cache()
            .extend(values.iter().map(|(name, value)| (name.clone(), value.clone())));
        self.enqueue(Command::SetProperty(values));
        Ok(())
    }

    /// Ask the Thing to report the named event.
    pub fn subscribe_to_event(&self, name: &str) {
        self.enqueue(Command::subscribe_event(name));
    }

    pub fn add_subscriber(&self, rule: Arc<dyn Subscriber>) {
        self.subscribers.push(rule);
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// The connection loop, if the gateway published a live address.
    #[must_use]
    pub fn detection_loop(self: Arc<Self>) -> Option<DetectionLoop> {
        let uri = self.description.web_socket_uri()?.to_string();
        Some(Box::pin(self.connection_loop(uri)))
    }

    fn cache(&self) -> MutexGuard<'_, Map<String, Value>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(&self, name: &str, value: &Value) -> Result<(), ThingError> {
        let Some(property) = self.description.properties.get(name) else {
            return Err(ThingError::UnknownProperty {
                thing: self.name.clone(),
                property: name.to_string(),
            });
        };
        if property.read_only {
            return Err(ThingError::ReadOnly {
                thing: self.name.clone(),
                property: name.to_string(),
            });
        }
        if property.kind.is_some_and(|kind| !kind.accepts(value)) {
            return Err(ThingError::InvalidValue {
                thing: self.name.clone(),
                property: name.to_string(),
                value: value.clone(),
            });
        }
        Ok(())
    }

    fn enqueue(&self, command: Command) {
        tracing::debug!(thing = %self.name, ?command, "command queued");
        if self.commands.send(command).is_err() {
            tracing::error!(thing = %self.name, "command queue closed, command dropped");
        }
    }

    fn dispatch(&self, name: &str, value: &Value) {
        self.subscribers.dispatch(&Notification {
            source: &self.name,
            kind: SourceKind::Thing,
            name: Some(name),
            value,
        });
    }

    async fn connection_loop(self: Arc<Self>, uri: String) {
        loop {
            if let Err(err) = self.serve(&uri).await {
                tracing::error!(thing = %self.name, %err, "connection lost");
            }
            tracing::info!(
                thing = %self.name,
                retry_in = ?self.settings.reconnect_backoff,
                "reconnecting"
            );
            tokio::time::sleep(self.settings.reconnect_backoff).await;
        }
    }

    async fn serve(&self, uri: &str) -> Result<(), TransportError> {
        let Connection {
            mut sink,
            mut stream,
        } = self.connector.connect(uri, &self.token).await?;
        tracing::info!(thing = %self.name, %uri, "connected");

        let (ack_tx, ack_rx) = watch::channel(false);
        tokio::select! {
            result = self.read_frames(&mut stream, &ack_tx) => result,
            result = self.write_commands(&mut sink, ack_rx) => result,
        }
    }

    async fn read_frames(
        &self,
        stream: &mut FrameStream,
        ack: &watch::Sender<bool>,
    ) -> Result<(), TransportError> {
        while let Some(frame) = stream.next().await {
            self.handle_frame(&frame?, ack);
        }
        Err(TransportError::Closed)
    }

    async fn write_commands(
        &self,
        sink: &mut FrameSink,
        mut ack: watch::Receiver<bool>,
    ) -> Result<(), TransportError> {
        if ack.wait_for(|connected| *connected).await.is_err() {
            return Err(TransportError::Closed);
        }
        let mut commands = self.pending.lock().await;
        while let Some(command) = commands.recv().await {
            let frame = match command.encode() {
                Ok(frame) => frame,
                Err(err) => {
                    tracing::warn!(thing = %self.name, %err, "cannot encode command, dropped");
                    continue;
                }
            };
            tracing::debug!(thing = %self.name, %frame, "sending");
            sink.send(frame).await?;
            tokio::time::sleep(self.settings.send_interval).await;
        }
        Err(TransportError::Closed)
    }

    fn handle_frame(&self, text: &str, ack: &watch::Sender<bool>) {
        match InboundMessage::decode(text) {
            Ok(InboundMessage::PropertyStatus(values)) => {
                for (name, value) in values {
                    self.cache().insert(name.clone(), value.clone());
                    self.dispatch(&name, &value);
                }
            }
            Ok(InboundMessage::Event(events)) => {
                for name in events.keys() {
                    self.dispatch(name, &Value::Null);
                }
            }
            Ok(InboundMessage::Connected(connected)) => {
                tracing::debug!(thing = %self.name, connected, "connection acknowledged");
                ack.send_replace(connected);
            }
            Ok(InboundMessage::Other(kind)) => {
                tracing::debug!(thing = %self.name, message_type = %kind, "ignored frame");
            }
            Err(err) => {
                tracing::warn!(thing = %self.name, %err, "skipping malformed frame");
            }
        }
    }
}

impl std::fmt::Debug for Thing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Thing")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("subscribers", &self.subscribers)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::channel::mpsc as channel;
    use futures::future::BoxFuture;
    use serde_json::json;

    use super::*;
    use crate::dispatch::tests::{Recorder, Seen};

    // ── Helpers ────────────────────────────────────────────────────

    /// Remote end of a fake connection.
    pub(crate) struct Peer {
        inbound: channel::UnboundedSender<String>,
        outbound: channel::UnboundedReceiver<String>,
    }

    impl Peer {
        pub(crate) fn push(&self, frame: &str) {
            self.inbound.unbounded_send(frame.to_string()).unwrap();
        }

        pub(crate) fn ack(&self) {
            self.push(r#"{"messageType":"connected","data":true}"#);
        }

        /// Every frame sent so far, decoded.
        pub(crate) fn sent(&mut self) -> Vec<Value> {
            let mut frames = Vec::new();
            while let Ok(Some(frame)) = self.outbound.try_next() {
                frames.push(serde_json::from_str(&frame).unwrap());
            }
            frames
        }

        /// Close the connection from the remote side.
        pub(crate) fn hang_up(self) {
            drop(self);
        }
    }

    /// Connector handing out prepared connections, refusing once none are left.
    #[derive(Default)]
    pub(crate) struct FakeConnector {
        connections: Mutex<VecDeque<Connection>>,
        pub attempts: AtomicUsize,
        pub tokens: Mutex<Vec<String>>,
    }

    impl FakeConnector {
        pub(crate) fn peer(&self) -> Peer {
            let (inbound, inbound_rx) = channel::unbounded::<String>();
            let (outbound_tx, outbound) = channel::unbounded::<String>();
            let sink = outbound_tx.sink_map_err(|err| TransportError::Io(Box::new(err)));
            let stream = inbound_rx.map(Ok::<String, TransportError>);
            self.connections
                .lock()
                .unwrap()
                .push_back(Connection::new(Box::pin(sink), Box::pin(stream)));
            Peer { inbound, outbound }
        }
    }

    impl ThingConnector for FakeConnector {
        fn connect<'a>(
            &'a self,
            uri: &'a str,
            token: &'a str,
        ) -> BoxFuture<'a, Result<Connection, TransportError>> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            self.tokens.lock().unwrap().push(token.to_string());
            let next = self.connections.lock().unwrap().pop_front();
            Box::pin(async move {
                next.ok_or_else(|| TransportError::Connect {
                    uri: uri.to_string(),
                    source: "connection refused".into(),
                })
            })
        }
    }

    pub(crate) fn descriptor(title: &str) -> ThingDescription {
        let slug = title.to_lowercase().replace(' ', "-");
        serde_json::from_value(json!({
            "href": format!("/things/{slug}"),
            "title": title,
            "properties": {
                "on": { "type": "boolean" },
                "level": { "type": "integer" },
                "color": { "type": "string", "readOnly": true }
            },
            "links": [
                { "rel": "alternate", "href": format!("ws://gateway.local/things/{slug}") }
            ]
        }))
        .unwrap()
    }

    pub(crate) fn thing(title: &str, connector: &Arc<FakeConnector>) -> Arc<Thing> {
        Arc::new(Thing::new(
            descriptor(title),
            "secret",
            Arc::clone(connector) as Arc<dyn ThingConnector>,
            ConnectionSettings::default(),
        ))
    }

    fn set(name: &str, value: Value) -> Value {
        json!({ "messageType": "setProperty", "data": { name: value } })
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // ── Tests ──────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn should_notify_each_rule_once_in_subscription_order() {
        let connector = Arc::new(FakeConnector::default());
        let peer = connector.peer();
        let lamp = thing("Lamp", &connector);
        let log: Arc<Mutex<Vec<Seen>>> = Arc::default();
        lamp.add_subscriber(Recorder::new("first", &log));
        lamp.add_subscriber(Recorder::new("second", &log));

        let task = tokio::spawn(Arc::clone(&lamp).detection_loop().unwrap());
        peer.ack();
        peer.push(r#"{"messageType":"propertyStatus","data":{"on":true}}"#);
        settle().await;
        task.abort();

        let seen = log.lock().unwrap();
        let order: Vec<_> = seen.iter().map(|s| s.subscriber).collect();
        assert_eq!(order, vec!["first", "second"]);
        assert!(seen.iter().all(|s| s.source == "Lamp"
            && s.name.as_deref() == Some("on")
            && s.value == json!(true)));
        assert_eq!(lamp.get("on"), Some(json!(true)));
    }

    #[tokio::test(start_paused = true)]
    async fn should_process_updates_in_arrival_order() {
        let connector = Arc::new(FakeConnector::default());
        let peer = connector.peer();
        let lamp = thing("Lamp", &connector);
        let log: Arc<Mutex<Vec<Seen>>> = Arc::default();
        lamp.add_subscriber(Recorder::new("rule", &log));

        let task = tokio::spawn(Arc::clone(&lamp).detection_loop().unwrap());
        peer.push(r#"{"messageType":"propertyStatus","data":{"level":10,"on":true}}"#);
        peer.push(r#"{"messageType":"propertyStatus","data":{"level":20}}"#);
        settle().await;
        task.abort();

        let values: Vec<_> = log.lock().unwrap().iter().map(|s| s.value.clone()).collect();
        assert_eq!(values, vec![json!(10), json!(true), json!(20)]);
        assert_eq!(lamp.get("level"), Some(json!(20)));
    }

    #[tokio::test(start_paused = true)]
    async fn should_notify_events_with_null_value() {
        let connector = Arc::new(FakeConnector::default());
        let peer = connector.peer();
        let button = thing("Button", &connector);
        let log: Arc<Mutex<Vec<Seen>>> = Arc::default();
        button.add_subscriber(Recorder::new("rule", &log));

        let task = tokio::spawn(Arc::clone(&button).detection_loop().unwrap());
        peer.push(r#"{"messageType":"event","data":{"pressed":{"count":2}}}"#);
        settle().await;
        task.abort();

        let seen = log.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].name.as_deref(), Some("pressed"));
        assert!(seen[0].value.is_null());
    }

    #[tokio::test(start_paused = true)]
    async fn should_skip_malformed_frames() {
        let connector = Arc::new(FakeConnector::default());
        let peer = connector.peer();
        let lamp = thing("Lamp", &connector);
        let log: Arc<Mutex<Vec<Seen>>> = Arc::default();
        lamp.add_subscriber(Recorder::new("rule", &log));

        let task = tokio::spawn(Arc::clone(&lamp).detection_loop().unwrap());
        peer.push("{not json");
        peer.push(r#"{"messageType":"propertyStatus","data":{"on":false}}"#);
        settle().await;
        task.abort();

        assert_eq!(log.lock().unwrap().len(), 1);
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn should_hold_commands_until_connection_is_acknowledged() {
        let connector = Arc::new(FakeConnector::default());
        let mut peer = connector.peer();
        let lamp = thing("Lamp", &connector);

        let task = tokio::spawn(Arc::clone(&lamp).detection_loop().unwrap());
        lamp.set_property("on", json!(true)).unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(peer.sent().is_empty());

        peer.ack();
        settle().await;
        task.abort();

        assert_eq!(peer.sent(), vec![set("on", json!(true))]);
        assert_eq!(connector.tokens.lock().unwrap().as_slice(), ["secret"]);
    }

    #[tokio::test(start_paused = true)]
    async fn should_pace_outbound_commands() {
        let connector = Arc::new(FakeConnector::default());
        let mut peer = connector.peer();
        let lamp = thing("Lamp", &connector);

        let task = tokio::spawn(Arc::clone(&lamp).detection_loop().unwrap());
        peer.ack();
        lamp.set_property("level", json!(10)).unwrap();
        lamp.set_property("level", json!(20)).unwrap();
        lamp.set_property("level", json!(30)).unwrap();

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(peer.sent(), vec![set("level", json!(10))]);
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(peer.sent(), vec![set("level", json!(20))]);
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(peer.sent(), vec![set("level", json!(30))]);
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn should_reconnect_after_backoff_and_deliver_queued_commands() {
        let connector = Arc::new(FakeConnector::default());
        let first = connector.peer();
        let mut second = connector.peer();
        let lamp = thing("Lamp", &connector);

        let task = tokio::spawn(Arc::clone(&lamp).detection_loop().unwrap());
        first.ack();
        settle().await;
        first.hang_up();
        settle().await;

        lamp.set_property("on", json!(false)).unwrap();
        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 2);
        second.ack();
        settle().await;

        assert_eq!(second.sent(), vec![set("on", json!(false))]);
        assert!(!task.is_finished());
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn should_keep_retrying_when_connection_is_refused() {
        let connector = Arc::new(FakeConnector::default());
        let lamp = thing("Lamp", &connector);

        let task = tokio::spawn(Arc::clone(&lamp).detection_loop().unwrap());
        tokio::time::sleep(Duration::from_secs(95)).await;

        assert_eq!(connector.attempts.load(Ordering::SeqCst), 4);
        assert!(!task.is_finished());
        task.abort();
    }

    #[tokio::test]
    async fn should_send_batched_properties_as_one_command() {
        let connector = Arc::new(FakeConnector::default());
        let mut peer = connector.peer();
        let lamp = thing("Lamp", &connector);
        let task = tokio::spawn(Arc::clone(&lamp).detection_loop().unwrap());
        peer.ack();

        let mut values = Map::new();
        values.insert("on".to_string(), json!(true));
        values.insert("level".to_string(), json!(75));
        lamp.set_properties(values).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        task.abort();

        assert_eq!(
            peer.sent(),
            vec![json!({ "messageType": "setProperty", "data": { "on": true, "level": 75 } })]
        );
        assert_eq!(lamp.get("level"), Some(json!(75)));
    }

    #[tokio::test]
    async fn should_queue_event_subscription() {
        let connector = Arc::new(FakeConnector::default());
        let mut peer = connector.peer();
        let button = thing("Button", &connector);
        let task = tokio::spawn(Arc::clone(&button).detection_loop().unwrap());
        peer.ack();

        button.subscribe_to_event("pressed");
        tokio::time::sleep(Duration::from_millis(50)).await;
        task.abort();

        assert_eq!(
            peer.sent(),
            vec![json!({ "messageType": "addEventSubscription", "data": { "pressed": {} } })]
        );
    }

    #[test]
    fn should_reject_invalid_writes() {
        let connector = Arc::new(FakeConnector::default());
        let lamp = thing("Lamp", &connector);

        assert!(matches!(
            lamp.set_property("brightness", json!(3)),
            Err(ThingError::UnknownProperty { .. })
        ));
        assert!(matches!(
            lamp.set_property("color", json!("red")),
            Err(ThingError::ReadOnly { .. })
        ));
        assert!(matches!(
            lamp.set_property("on", json!("yes")),
            Err(ThingError::InvalidValue { .. })
        ));
        assert_eq!(lamp.get("on"), None);
    }

    #[test]
    fn should_leave_cache_untouched_when_batch_is_invalid() {
        let connector = Arc::new(FakeConnector::default());
        let lamp = thing("Lamp", &connector);
        let mut values = Map::new();
        values.insert("on".to_string(), json!(true));
        values.insert("nope".to_string(), json!(1));

        assert!(lamp.set_properties(values).is_err());
        assert_eq!(lamp.state(), ThingState::default());
    }

    #[test]
    fn should_update_cache_optimistically() {
        let connector = Arc::new(FakeConnector::default());
        let lamp = thing("Lamp", &connector);
        let before = lamp.state();

        lamp.set_property("on", json!(true)).unwrap();

        assert_eq!(lamp.get("on"), Some(json!(true)));
        assert_eq!(lamp.state().changed_from(&before), vec!["on"]);
    }

    #[test]
    fn should_have_no_detection_loop_without_live_address() {
        let connector = Arc::new(FakeConnector::default());
        let mut description = descriptor("Sensor");
        description.links.clear();
        let sensor = Arc::new(Thing::new(
            description,
            "secret",
            connector,
            ConnectionSettings::default(),
        ));

        assert_eq!(sensor.id(), "sensor");
        assert!(Arc::clone(&sensor).detection_loop().is_none());
        sensor.set_property("on", json!(true)).unwrap();
    }
}
