//! Transport adapter around the rumqttc websocket client.
//!
//! Exactly one adapter is live at a time. Every adapter carries the
//! generation id it was opened under and stamps it onto each event it feeds
//! back into the session channel, so the session manager can discard late
//! callbacks from an adapter it has already torn down.

use std::collections::HashSet;
use std::time::Duration;

use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::config::BrokerConfig;
use super::error::TransportError;
use super::session_manager::SessionEvent;

/// Keep-alive interval used to detect silent peer death.
pub const KEEP_ALIVE: Duration = Duration::from_secs(30);

const REQUEST_CAPACITY: usize = 64;

/// Live broker session handle. The session manager drives exactly one of
/// these at a time; all operations are non-blocking queue operations.
pub trait Adapter: Send {
    fn generation(&self) -> u64;

    /// Idempotent: subscribing to an already-subscribed topic is a no-op.
    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError>;

    fn publish(&mut self, topic: &str, payload: Vec<u8>, retained: bool)
        -> Result<(), TransportError>;

    /// Best-effort teardown. The session is being discarded regardless, so
    /// errors are swallowed.
    fn disconnect(&mut self);
}

/// Factory seam between the session manager and the concrete MQTT client,
/// so the state machine can be exercised against a recording fake.
pub trait Transport: Send {
    fn open(
        &self,
        generation: u64,
        config: &BrokerConfig,
        events: mpsc::Sender<SessionEvent>,
    ) -> Result<Box<dyn Adapter>, TransportError>;
}

/// Production transport: MQTT over websockets via rumqttc.
pub struct MqttTransport;

impl Transport for MqttTransport {
    fn open(
        &self,
        generation: u64,
        config: &BrokerConfig,
        events: mpsc::Sender<SessionEvent>,
    ) -> Result<Box<dyn Adapter>, TransportError> {
        Ok(Box::new(MqttAdapter::open(generation, config, events)))
    }
}

pub struct MqttAdapter {
    generation: u64,
    client: AsyncClient,
    driver: JoinHandle<()>,
    subscribed: HashSet<String>,
}

impl MqttAdapter {
    fn open(generation: u64, config: &BrokerConfig, events: mpsc::Sender<SessionEvent>) -> Self {
        let scheme = if config.use_tls { "wss" } else { "ws" };
        let url = format!("{}://{}:{}{}", scheme, config.host, config.port, config.path);

        let mut options = MqttOptions::new(client_id(generation), url, config.port);
        options.set_keep_alive(KEEP_ALIVE);
        options.set_transport(if config.use_tls {
            rumqttc::Transport::wss_with_default_config()
        } else {
            rumqttc::Transport::Ws
        });
        // Absent and empty-string credentials both mean "no auth"; brokers
        // may reject a blank username/password pair.
        if let Some(username) = &config.username {
            options.set_credentials(
                username.clone(),
                config.password.clone().unwrap_or_default(),
            );
        }

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let driver = tokio::spawn(drive(generation, eventloop, events));

        Self {
            generation,
            client,
            driver,
            subscribed: HashSet::new(),
        }
    }
}

impl Adapter for MqttAdapter {
    fn generation(&self) -> u64 {
        self.generation
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        if self.subscribed.contains(topic) {
            debug!(topic, "already subscribed, skipping");
            return Ok(());
        }
        self.client
            .try_subscribe(topic, QoS::AtMostOnce)
            .map_err(|e| TransportError::Client(e.to_string()))?;
        self.subscribed.insert(topic.to_string());
        Ok(())
    }

    fn publish(
        &mut self,
        topic: &str,
        payload: Vec<u8>,
        retained: bool,
    ) -> Result<(), TransportError> {
        self.client
            .try_publish(topic, QoS::AtMostOnce, retained, payload)
            .map_err(|e| TransportError::Client(e.to_string()))
    }

    fn disconnect(&mut self) {
        if let Err(e) = self.client.try_disconnect() {
            debug!("Ignoring error during teardown: {}", e);
        }
        self.driver.abort();
    }
}

/// Polls the rumqttc event loop and translates its stream into session
/// events. Exits after the first terminal event: the session manager owns
/// the retry policy, not the client's internal reconnect loop.
async fn drive(generation: u64, mut eventloop: EventLoop, events: mpsc::Sender<SessionEvent>) {
    let mut connected = false;
    loop {
        let event = match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    connected = true;
                    SessionEvent::TransportUp { generation }
                } else {
                    warn!(?ack.code, "Broker refused connection");
                    SessionEvent::ConnectFailed {
                        generation,
                        reason: format!("{:?}", ack.code),
                    }
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => SessionEvent::MessageArrived {
                generation,
                topic: publish.topic.clone(),
                payload: publish.payload.to_vec(),
            },
            Ok(_) => continue,
            Err(e) if connected => SessionEvent::ConnectionLost {
                generation,
                reason: e.to_string(),
            },
            Err(e) => SessionEvent::ConnectFailed {
                generation,
                reason: e.to_string(),
            },
        };

        let terminal = matches!(
            event,
            SessionEvent::ConnectFailed { .. } | SessionEvent::ConnectionLost { .. }
        );
        if events.send(event).await.is_err() {
            debug!(generation, "Session channel closed, stopping driver");
            return;
        }
        if terminal {
            return;
        }
    }
}

/// Client ids must be freshly unique per adapter so a reconnect never
/// collides with the broker-side session of its predecessor.
fn client_id(generation: u64) -> String {
    format!("web-dashboard-{}-{}", std::process::id(), generation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mqtt::TELEMETRY_TOPIC;

    fn adapter_without_driver() -> (MqttAdapter, EventLoop) {
        let options = MqttOptions::new("test", "localhost", 1883);
        let (client, eventloop) = AsyncClient::new(options, 8);
        let adapter = MqttAdapter {
            generation: 1,
            client,
            driver: tokio::spawn(async {}),
            subscribed: HashSet::new(),
        };
        (adapter, eventloop)
    }

    #[tokio::test]
    async fn subscribe_is_idempotent() {
        // The event loop must stay alive to keep the request queue open.
        let (mut adapter, _eventloop) = adapter_without_driver();

        adapter.subscribe(TELEMETRY_TOPIC).unwrap();
        adapter.subscribe(TELEMETRY_TOPIC).unwrap();

        assert_eq!(adapter.subscribed.len(), 1);
    }

    #[tokio::test]
    async fn disconnect_swallows_teardown_errors() {
        let (mut adapter, eventloop) = adapter_without_driver();
        // Dropping the event loop closes the request channel, so the
        // disconnect request can no longer be queued.
        drop(eventloop);
        adapter.disconnect();
    }

    #[test]
    fn client_ids_are_unique_per_generation() {
        assert_ne!(client_id(1), client_id(2));
    }
}
