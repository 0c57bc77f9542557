//! Connection state machine and message routing.
//!
//! The [`SessionManager`] owns the transport adapter lifecycle and the
//! process-wide [`ConnectionState`]. Every external stimulus — a form
//! submission, a transport callback, the reconnect timer — arrives as a
//! [`SessionEvent`] on a single channel and is consumed by one central
//! [`SessionManager::handle`] transition function. The manager pushes
//! [`ViewEvent`]s to the UI and never reads UI state back.
//!
//! ## State transitions
//!
//! ```text
//! Idle ──Connect──▶ Connecting ──TransportUp──▶ Connected
//!                       │                           │
//!                  ConnectFailed              ConnectionLost
//!                       ▼                           ▼
//!                    Failed                   Disconnected
//!                  (dead end,                       │
//!               user must resubmit)        ReconnectDue (5s timer)
//!                                                   ▼
//!                                               Connecting
//! ```
//!
//! A connect rejection is terminal so a broker rejecting bad credentials is
//! not hammered; only an unsolicited loss of an established session is
//! retried. Each adapter is tagged with a generation id, and events carrying
//! a superseded generation are discarded, so a late callback or a stale
//! reconnect timer can never act on a torn-down session.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::config::BrokerConfig;
use super::telemetry::{ConfigEcho, TelemetrySample, ThresholdConfig};
use super::transport::{Adapter, Transport};
use super::{CONFIG_TOPIC, TELEMETRY_TOPIC};
use crate::persistence::settings_store::SettingsStore;
use crate::persistence::StoredSettings;

/// Delay before reconnecting after an unsolicited connection loss.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Process-wide connection state, owned exclusively by the session manager.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Connected,
    /// Connect attempt rejected; requires a new user-initiated connect.
    Failed,
    /// Established session lost; a reconnect is pending.
    Disconnected,
}

/// Input alphabet of the state machine. Transport-sourced events carry the
/// generation of the adapter that produced them.
#[derive(Debug)]
pub enum SessionEvent {
    /// User submitted the connection form (or a stored configuration).
    Connect(BrokerConfig),
    /// User submitted the threshold form.
    PublishThresholds { temp_on: f64, temp_off: f64 },
    /// The transport established a session.
    TransportUp { generation: u64 },
    /// The connect attempt was rejected.
    ConnectFailed { generation: u64, reason: String },
    /// An established session dropped.
    ConnectionLost { generation: u64, reason: String },
    /// An inbound message arrived on a subscribed topic.
    MessageArrived {
        generation: u64,
        topic: String,
        payload: Vec<u8>,
    },
    /// The reconnect timer for the given generation expired.
    ReconnectDue { generation: u64 },
}

/// One-way notifications to the rendering layer.
#[derive(Debug)]
pub enum ViewEvent {
    StatusChanged(ConnectionState),
    SampleReceived(TelemetrySample),
    ConfigEcho(ConfigEcho),
    /// Connect attempt rejected; the UI re-presents the connection form and
    /// surfaces the reason as an alert.
    ConnectionRejected { reason: String },
    PublishAccepted,
    PublishRejected { reason: String },
}

pub struct SessionManager {
    transport: Box<dyn Transport>,
    settings: SettingsStore,
    /// Sender handed to adapters and timers so their events flow back into
    /// the same channel [`run`](Self::run) consumes.
    events: mpsc::Sender<SessionEvent>,
    view: mpsc::Sender<ViewEvent>,
    state: ConnectionState,
    config: Option<BrokerConfig>,
    adapter: Option<Box<dyn Adapter>>,
    generation: u64,
    reconnect: Option<JoinHandle<()>>,
}

impl SessionManager {
    pub fn new(
        transport: Box<dyn Transport>,
        settings: SettingsStore,
        events: mpsc::Sender<SessionEvent>,
        view: mpsc::Sender<ViewEvent>,
    ) -> Self {
        Self {
            transport,
            settings,
            events,
            view,
            state: ConnectionState::Idle,
            config: None,
            adapter: None,
            generation: 0,
            reconnect: None,
        }
    }

    /// Drives the state machine until the event channel closes.
    pub async fn run(mut self, mut events: mpsc::Receiver<SessionEvent>) {
        while let Some(event) = events.recv().await {
            self.handle(event);
        }
        debug!("Session channel closed, tearing down");
        self.cancel_reconnect();
        if let Some(mut adapter) = self.adapter.take() {
            adapter.disconnect();
        }
    }

    /// Central transition function. Each event is classified, checked
    /// against the current generation and applied to the state machine.
    pub fn handle(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Connect(config) => {
                self.persist_settings(&config);
                self.open_session(config);
            }
            SessionEvent::TransportUp { generation } => self.on_transport_up(generation),
            SessionEvent::ConnectFailed { generation, reason } => {
                self.on_connect_failed(generation, reason)
            }
            SessionEvent::ConnectionLost { generation, reason } => {
                self.on_connection_lost(generation, reason)
            }
            SessionEvent::MessageArrived {
                generation,
                topic,
                payload,
            } => self.on_message(generation, &topic, &payload),
            SessionEvent::ReconnectDue { generation } => self.on_reconnect_due(generation),
            SessionEvent::PublishThresholds { temp_on, temp_off } => {
                self.on_publish_thresholds(temp_on, temp_off)
            }
        }
    }

    /// Tears down any current session and starts a connect attempt with the
    /// given configuration. Bumping the generation first guarantees that
    /// late callbacks from the superseded adapter are discarded.
    fn open_session(&mut self, config: BrokerConfig) {
        self.cancel_reconnect();
        if let Some(mut adapter) = self.adapter.take() {
            debug!(
                generation = adapter.generation(),
                "Discarding superseded adapter"
            );
            adapter.disconnect();
        }
        self.generation += 1;

        info!(
            host = %config.host,
            port = config.port,
            generation = self.generation,
            "Connecting to broker"
        );
        self.set_state(ConnectionState::Connecting);

        match self
            .transport
            .open(self.generation, &config, self.events.clone())
        {
            Ok(adapter) => self.adapter = Some(adapter),
            Err(e) => {
                error!("Failed to open transport: {}", e);
                self.set_state(ConnectionState::Failed);
                self.notify(ViewEvent::ConnectionRejected {
                    reason: e.to_string(),
                });
            }
        }
        self.config = Some(config);
    }

    fn on_transport_up(&mut self, generation: u64) {
        if generation != self.generation {
            debug!(generation, "Ignoring stale transport-up");
            return;
        }
        let Some(adapter) = self.adapter.as_mut() else {
            return;
        };

        for topic in [TELEMETRY_TOPIC, CONFIG_TOPIC] {
            if let Err(e) = adapter.subscribe(topic) {
                error!(topic, "Subscribe failed: {}", e);
            }
        }
        info!(generation, "Broker session established");
        self.set_state(ConnectionState::Connected);
    }

    fn on_connect_failed(&mut self, generation: u64, reason: String) {
        if generation != self.generation {
            debug!(generation, "Ignoring stale connect failure");
            return;
        }
        warn!("Connection failed: {}", reason);
        if let Some(mut adapter) = self.adapter.take() {
            adapter.disconnect();
        }
        // Dead end: no automatic retry against a broker that rejected us.
        self.set_state(ConnectionState::Failed);
        self.notify(ViewEvent::ConnectionRejected { reason });
    }

    fn on_connection_lost(&mut self, generation: u64, reason: String) {
        if generation != self.generation {
            debug!(generation, "Ignoring stale connection loss");
            return;
        }
        if self.state != ConnectionState::Connected {
            return;
        }
        warn!("Connection lost: {}", reason);
        if let Some(mut adapter) = self.adapter.take() {
            adapter.disconnect();
        }
        self.set_state(ConnectionState::Disconnected);

        let events = self.events.clone();
        self.reconnect = Some(tokio::spawn(async move {
            tokio::time::sleep(RECONNECT_DELAY).await;
            let _ = events.send(SessionEvent::ReconnectDue { generation }).await;
        }));
    }

    fn on_reconnect_due(&mut self, generation: u64) {
        if generation != self.generation {
            debug!(generation, "Ignoring stale reconnect timer");
            return;
        }
        if self.state != ConnectionState::Disconnected {
            return;
        }
        let Some(config) = self.config.clone() else {
            return;
        };
        info!("Reconnecting with last known configuration");
        self.open_session(config);
    }

    fn on_message(&mut self, generation: u64, topic: &str, payload: &[u8]) {
        if generation != self.generation || self.state != ConnectionState::Connected {
            debug!(generation, topic, "Dropping message outside active session");
            return;
        }

        match topic {
            TELEMETRY_TOPIC => match TelemetrySample::parse(payload) {
                Ok(sample) => self.notify(ViewEvent::SampleReceived(sample)),
                Err(e) => warn!("Dropping malformed telemetry payload: {}", e),
            },
            CONFIG_TOPIC => match ConfigEcho::parse(payload) {
                Ok(echo) => self.notify(ViewEvent::ConfigEcho(echo)),
                Err(e) => warn!("Dropping malformed config payload: {}", e),
            },
            other => debug!(topic = other, "Message on unexpected topic"),
        }
    }

    fn on_publish_thresholds(&mut self, temp_on: f64, temp_off: f64) {
        if self.state != ConnectionState::Connected {
            self.notify(ViewEvent::PublishRejected {
                reason: "Not connected to a broker".to_string(),
            });
            return;
        }
        if !temp_on.is_finite() || !temp_off.is_finite() {
            self.notify(ViewEvent::PublishRejected {
                reason: "Thresholds must be finite numbers".to_string(),
            });
            return;
        }
        let Some(adapter) = self.adapter.as_mut() else {
            self.notify(ViewEvent::PublishRejected {
                reason: "Not connected to a broker".to_string(),
            });
            return;
        };

        let thresholds = ThresholdConfig { temp_on, temp_off };
        let payload = match serde_json::to_vec(&thresholds) {
            Ok(payload) => payload,
            Err(e) => {
                self.notify(ViewEvent::PublishRejected {
                    reason: e.to_string(),
                });
                return;
            }
        };

        match adapter.publish(CONFIG_TOPIC, payload, true) {
            Ok(()) => {
                info!(?thresholds, "Published threshold configuration");
                self.notify(ViewEvent::PublishAccepted);
            }
            Err(e) => {
                warn!("Threshold publish failed: {}", e);
                self.notify(ViewEvent::PublishRejected {
                    reason: e.to_string(),
                });
            }
        }
    }

    /// Saves or clears the stored settings according to the persist flag.
    /// Storage errors are logged and never block the connect path.
    fn persist_settings(&self, config: &BrokerConfig) {
        let store = self.settings.clone();
        if config.persist {
            let stored = StoredSettings::from_config(config);
            tokio::spawn(async move {
                if let Err(e) = store.save(&stored).await {
                    warn!("Failed to store broker settings: {}", e);
                }
            });
        } else {
            tokio::spawn(async move {
                if let Err(e) = store.clear().await {
                    warn!("Failed to clear stored broker settings: {}", e);
                }
            });
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
        self.notify(ViewEvent::StatusChanged(state));
    }

    fn cancel_reconnect(&mut self) {
        if let Some(handle) = self.reconnect.take() {
            handle.abort();
        }
    }

    fn notify(&self, event: ViewEvent) {
        if let Err(e) = self.view.try_send(event) {
            warn!("View channel saturated, dropping notification: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mqtt::error::TransportError;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct FakeState {
        opened: Vec<(u64, BrokerConfig)>,
        subscriptions: Vec<(u64, String)>,
        published: Vec<(u64, String, Vec<u8>, bool)>,
        disconnected: Vec<u64>,
        fail_open: bool,
    }

    struct FakeTransport(Arc<Mutex<FakeState>>);

    impl Transport for FakeTransport {
        fn open(
            &self,
            generation: u64,
            config: &BrokerConfig,
            _events: mpsc::Sender<SessionEvent>,
        ) -> Result<Box<dyn Adapter>, TransportError> {
            let mut state = self.0.lock().unwrap();
            if state.fail_open {
                return Err(TransportError::Rejected("unreachable".to_string()));
            }
            state.opened.push((generation, config.clone()));
            Ok(Box::new(FakeAdapter {
                generation,
                state: self.0.clone(),
            }))
        }
    }

    struct FakeAdapter {
        generation: u64,
        state: Arc<Mutex<FakeState>>,
    }

    impl Adapter for FakeAdapter {
        fn generation(&self) -> u64 {
            self.generation
        }

        fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
            self.state
                .lock()
                .unwrap()
                .subscriptions
                .push((self.generation, topic.to_string()));
            Ok(())
        }

        fn publish(
            &mut self,
            topic: &str,
            payload: Vec<u8>,
            retained: bool,
        ) -> Result<(), TransportError> {
            self.state.lock().unwrap().published.push((
                self.generation,
                topic.to_string(),
                payload,
                retained,
            ));
            Ok(())
        }

        fn disconnect(&mut self) {
            self.state.lock().unwrap().disconnected.push(self.generation);
        }
    }

    struct Harness {
        manager: SessionManager,
        events_rx: mpsc::Receiver<SessionEvent>,
        view_rx: mpsc::Receiver<ViewEvent>,
        fake: Arc<Mutex<FakeState>>,
    }

    fn harness() -> Harness {
        let fake = Arc::new(Mutex::new(FakeState::default()));
        let (events_tx, events_rx) = mpsc::channel(32);
        let (view_tx, view_rx) = mpsc::channel(32);
        let store = SettingsStore::at(std::env::temp_dir().join(format!(
            "smartiot-monitor-session-test-{}.json",
            std::process::id()
        )));
        let manager = SessionManager::new(
            Box::new(FakeTransport(fake.clone())),
            store,
            events_tx,
            view_tx,
        );
        Harness {
            manager,
            events_rx,
            view_rx,
            fake,
        }
    }

    fn config() -> BrokerConfig {
        BrokerConfig::new("broker.local", 9001, "/ws", "", "", false, false).unwrap()
    }

    fn drain(view_rx: &mut mpsc::Receiver<ViewEvent>) -> Vec<ViewEvent> {
        let mut events = Vec::new();
        while let Ok(event) = view_rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn connect_success_subscribes_both_topics() {
        let mut h = harness();
        h.manager.handle(SessionEvent::Connect(config()));
        assert_eq!(h.manager.state, ConnectionState::Connecting);

        h.manager.handle(SessionEvent::TransportUp { generation: 1 });
        assert_eq!(h.manager.state, ConnectionState::Connected);

        let fake = h.fake.lock().unwrap();
        assert_eq!(fake.opened.len(), 1);
        let topics: Vec<&str> = fake.subscriptions.iter().map(|(_, t)| t.as_str()).collect();
        assert_eq!(topics, vec![TELEMETRY_TOPIC, CONFIG_TOPIC]);
        drop(fake);

        let statuses: Vec<ConnectionState> = drain(&mut h.view_rx)
            .into_iter()
            .filter_map(|e| match e {
                ViewEvent::StatusChanged(s) => Some(s),
                _ => None,
            })
            .collect();
        assert_eq!(
            statuses,
            vec![ConnectionState::Connecting, ConnectionState::Connected]
        );
    }

    #[tokio::test]
    async fn connect_failure_is_a_dead_end() {
        let mut h = harness();
        h.manager.handle(SessionEvent::Connect(config()));
        h.manager.handle(SessionEvent::ConnectFailed {
            generation: 1,
            reason: "bad credentials".to_string(),
        });
        assert_eq!(h.manager.state, ConnectionState::Failed);

        let views = drain(&mut h.view_rx);
        assert!(views.iter().any(|e| matches!(
            e,
            ViewEvent::ConnectionRejected { reason } if reason == "bad credentials"
        )));

        // A stray timer event must not revive a failed session.
        h.manager.handle(SessionEvent::ReconnectDue { generation: 1 });
        assert_eq!(h.manager.state, ConnectionState::Failed);
        assert_eq!(h.fake.lock().unwrap().opened.len(), 1);
    }

    #[tokio::test]
    async fn resubmission_supersedes_previous_adapter() {
        let mut h = harness();
        h.manager.handle(SessionEvent::Connect(config()));

        let second = BrokerConfig::new("other.local", 9001, "/ws", "", "", false, false).unwrap();
        h.manager.handle(SessionEvent::Connect(second));

        let fake = h.fake.lock().unwrap();
        assert_eq!(fake.opened.len(), 2);
        assert_eq!(fake.disconnected, vec![1]);
        drop(fake);

        // Late callbacks from the first adapter are discarded.
        h.manager.handle(SessionEvent::TransportUp { generation: 1 });
        assert_eq!(h.manager.state, ConnectionState::Connecting);
        assert!(h.fake.lock().unwrap().subscriptions.is_empty());

        h.manager.handle(SessionEvent::MessageArrived {
            generation: 1,
            topic: TELEMETRY_TOPIC.to_string(),
            payload: b"{}".to_vec(),
        });
        drain(&mut h.view_rx);

        h.manager.handle(SessionEvent::TransportUp { generation: 2 });
        assert_eq!(h.manager.state, ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn lost_connection_reconnects_with_same_config() {
        let mut h = harness();
        let cfg = config();
        h.manager.handle(SessionEvent::Connect(cfg.clone()));
        h.manager.handle(SessionEvent::TransportUp { generation: 1 });

        h.manager.handle(SessionEvent::ConnectionLost {
            generation: 1,
            reason: "socket closed".to_string(),
        });
        assert_eq!(h.manager.state, ConnectionState::Disconnected);

        // Paused time auto-advances through the 5s reconnect delay.
        let due = h.events_rx.recv().await.unwrap();
        assert!(matches!(due, SessionEvent::ReconnectDue { generation: 1 }));
        h.manager.handle(due);

        assert_eq!(h.manager.state, ConnectionState::Connecting);
        let fake = h.fake.lock().unwrap();
        assert_eq!(fake.opened.len(), 2);
        assert_eq!(fake.opened[1], (2, cfg));
    }

    #[tokio::test(start_paused = true)]
    async fn new_submission_cancels_pending_reconnect() {
        let mut h = harness();
        h.manager.handle(SessionEvent::Connect(config()));
        h.manager.handle(SessionEvent::TransportUp { generation: 1 });
        h.manager.handle(SessionEvent::ConnectionLost {
            generation: 1,
            reason: "socket closed".to_string(),
        });

        let second = BrokerConfig::new("other.local", 9001, "/ws", "", "", false, false).unwrap();
        h.manager.handle(SessionEvent::Connect(second));

        let due = tokio::time::timeout(Duration::from_secs(30), h.events_rx.recv()).await;
        assert!(due.is_err(), "aborted timer must not fire");
    }

    #[tokio::test]
    async fn malformed_telemetry_is_dropped_without_state_change() {
        let mut h = harness();
        h.manager.handle(SessionEvent::Connect(config()));
        h.manager.handle(SessionEvent::TransportUp { generation: 1 });
        drain(&mut h.view_rx);

        h.manager.handle(SessionEvent::MessageArrived {
            generation: 1,
            topic: TELEMETRY_TOPIC.to_string(),
            payload: b"{not json".to_vec(),
        });

        assert_eq!(h.manager.state, ConnectionState::Connected);
        assert!(drain(&mut h.view_rx).is_empty());
    }

    #[tokio::test]
    async fn telemetry_sample_reaches_view() {
        let mut h = harness();
        h.manager.handle(SessionEvent::Connect(config()));
        h.manager.handle(SessionEvent::TransportUp { generation: 1 });
        drain(&mut h.view_rx);

        h.manager.handle(SessionEvent::MessageArrived {
            generation: 1,
            topic: TELEMETRY_TOPIC.to_string(),
            payload: br#"{"timestamp":"2026-08-27 10:00:00","temperature":22.5,"humidity":48.0,"relay":"OFF"}"#.to_vec(),
        });

        let views = drain(&mut h.view_rx);
        assert!(views.iter().any(|e| matches!(
            e,
            ViewEvent::SampleReceived(s) if s.temperature == 22.5 && !s.relay_on
        )));
    }

    #[tokio::test]
    async fn partial_config_echo_forwards_present_fields_only() {
        let mut h = harness();
        h.manager.handle(SessionEvent::Connect(config()));
        h.manager.handle(SessionEvent::TransportUp { generation: 1 });
        drain(&mut h.view_rx);

        h.manager.handle(SessionEvent::MessageArrived {
            generation: 1,
            topic: CONFIG_TOPIC.to_string(),
            payload: br#"{"temp_on":27}"#.to_vec(),
        });

        let views = drain(&mut h.view_rx);
        assert!(views.iter().any(|e| matches!(
            e,
            ViewEvent::ConfigEcho(echo)
                if echo.temp_on == Some(27.0) && echo.temp_off.is_none()
        )));
    }

    #[tokio::test]
    async fn thresholds_publish_retained_with_exact_body() {
        let mut h = harness();
        h.manager.handle(SessionEvent::Connect(config()));
        h.manager.handle(SessionEvent::TransportUp { generation: 1 });
        drain(&mut h.view_rx);

        h.manager.handle(SessionEvent::PublishThresholds {
            temp_on: 28.5,
            temp_off: 26.0,
        });

        let fake = h.fake.lock().unwrap();
        assert_eq!(fake.published.len(), 1);
        let (generation, topic, payload, retained) = &fake.published[0];
        assert_eq!(*generation, 1);
        assert_eq!(topic, CONFIG_TOPIC);
        assert_eq!(payload, br#"{"temp_on":28.5,"temp_off":26.0}"#);
        assert!(*retained);
        drop(fake);

        let views = drain(&mut h.view_rx);
        assert!(views.iter().any(|e| matches!(e, ViewEvent::PublishAccepted)));
    }

    #[tokio::test]
    async fn publish_without_session_is_rejected() {
        let mut h = harness();
        h.manager.handle(SessionEvent::PublishThresholds {
            temp_on: 28.5,
            temp_off: 26.0,
        });

        assert!(h.fake.lock().unwrap().published.is_empty());
        let views = drain(&mut h.view_rx);
        assert!(views
            .iter()
            .any(|e| matches!(e, ViewEvent::PublishRejected { .. })));
    }

    #[tokio::test]
    async fn non_finite_thresholds_are_rejected() {
        let mut h = harness();
        h.manager.handle(SessionEvent::Connect(config()));
        h.manager.handle(SessionEvent::TransportUp { generation: 1 });
        drain(&mut h.view_rx);

        h.manager.handle(SessionEvent::PublishThresholds {
            temp_on: f64::NAN,
            temp_off: 26.0,
        });

        assert!(h.fake.lock().unwrap().published.is_empty());
        let views = drain(&mut h.view_rx);
        assert!(views
            .iter()
            .any(|e| matches!(e, ViewEvent::PublishRejected { .. })));
    }

    #[tokio::test]
    async fn failed_transport_open_reports_rejection() {
        let mut h = harness();
        h.fake.lock().unwrap().fail_open = true;
        h.manager.handle(SessionEvent::Connect(config()));

        assert_eq!(h.manager.state, ConnectionState::Failed);
        let views = drain(&mut h.view_rx);
        assert!(views
            .iter()
            .any(|e| matches!(e, ViewEvent::ConnectionRejected { .. })));
    }
}
