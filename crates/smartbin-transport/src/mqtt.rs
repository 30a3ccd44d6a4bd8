//! MQTT-backed [`CommandLink`] built on `rumqttc`.
//!
//! [`MqttLink::connect`] returns the link plus the receive task that drives
//! the `rumqttc` event loop. The task (re)subscribes to the response topic on
//! every `ConnAck` and forwards each response payload into the shared
//! [`ResponseSlot`]. It is the slot's only writer.
//!
//! Commands are only handed to `rumqttc` while the broker session is up. A
//! publish attempted while disconnected fails immediately instead of being
//! queued, so no stale command is flushed to the device on reconnect.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS};
use smartbin_types::BinError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::link::CommandLink;
use crate::slot::ResponseSlot;
use crate::transport::Transport;

/// Pause between event-loop polls after a connection error.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Request queue depth between the client handle and the event loop.
const REQUEST_CAPACITY: usize = 16;

/// Connection parameters for the broker.
#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub broker: String,
    pub port: u16,
    pub client_id: String,
    pub command_topic: String,
    pub response_topic: String,
    pub keep_alive: Duration,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            broker: "broker.hivemq.com".to_string(),
            port: 1883,
            client_id: "smartbin-controller".to_string(),
            command_topic: "smartdustbin/commands".to_string(),
            response_topic: "smartdustbin/responses".to_string(),
            keep_alive: Duration::from_secs(60),
        }
    }
}

/// Outbound half of the MQTT channel pair.
#[derive(Clone)]
pub struct MqttLink {
    client: AsyncClient,
    command_topic: String,
    connected: Arc<AtomicBool>,
}

impl MqttLink {
    /// Create the client and spawn its receive task.
    ///
    /// The connection itself is established lazily by the event loop; publish
    /// calls made before the broker accepts the session are queued.
    pub fn connect(settings: &MqttSettings, slot: Arc<ResponseSlot>) -> (Self, JoinHandle<()>) {
        let mut options = MqttOptions::new(
            settings.client_id.clone(),
            settings.broker.clone(),
            settings.port,
        );
        options.set_keep_alive(settings.keep_alive);

        let (client, event_loop) = AsyncClient::new(options, REQUEST_CAPACITY);
        info!(
            broker = %settings.broker,
            port = settings.port,
            commands = %settings.command_topic,
            responses = %settings.response_topic,
            "connecting to MQTT broker"
        );

        let connected = Arc::new(AtomicBool::new(false));
        let receive = tokio::spawn(run_event_loop(
            event_loop,
            client.clone(),
            settings.response_topic.clone(),
            slot,
            Arc::clone(&connected),
        ));

        let link = Self {
            client,
            command_topic: settings.command_topic.clone(),
            connected,
        };
        (link, receive)
    }

    /// Convenience: build a [`Transport`] on top of a fresh MQTT link.
    pub fn transport(settings: &MqttSettings) -> (Transport, Self, JoinHandle<()>) {
        let slot = Arc::new(ResponseSlot::new());
        let (link, receive) = Self::connect(settings, Arc::clone(&slot));
        let transport = Transport::new(Arc::new(link.clone()), slot);
        (transport, link, receive)
    }

    /// `true` between an accepted `ConnAck` and the next connection error.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Send a DISCONNECT to the broker.
    ///
    /// # Errors
    ///
    /// Returns [`BinError::Transport`] if the request queue is closed.
    pub async fn disconnect(&self) -> Result<(), BinError> {
        self.client
            .disconnect()
            .await
            .map_err(|e| BinError::Transport(format!("MQTT disconnect failed: {e}")))
    }
}

#[async_trait]
impl CommandLink for MqttLink {
    async fn publish(&self, command: &str) -> Result<(), BinError> {
        if !self.is_connected() {
            return Err(BinError::Transport(format!(
                "MQTT broker not connected; dropped {command}"
            )));
        }
        self.client
            .try_publish(
                self.command_topic.as_str(),
                QoS::AtMostOnce,
                false,
                command.as_bytes().to_vec(),
            )
            .map_err(|e| BinError::Transport(format!("MQTT publish failed: {e}")))
    }
}

async fn run_event_loop(
    mut event_loop: EventLoop,
    client: AsyncClient,
    response_topic: String,
    slot: Arc<ResponseSlot>,
    connected: Arc<AtomicBool>,
) {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code != ConnectReturnCode::Success {
                    warn!(code = ?ack.code, "MQTT broker refused the session");
                    connected.store(false, Ordering::Release);
                    continue;
                }
                info!("connected to MQTT broker");
                connected.store(true, Ordering::Release);
                // try_subscribe: awaiting the request queue from inside the
                // task that drains it could deadlock.
                if let Err(e) = client.try_subscribe(response_topic.as_str(), QoS::AtMostOnce) {
                    warn!(error = %e, topic = %response_topic, "failed to subscribe to responses");
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                route_publish(&publish.topic, &publish.payload, &response_topic, &slot);
            }
            Ok(_) => {}
            Err(e) => {
                connected.store(false, Ordering::Release);
                warn!(error = %e, "MQTT connection error; retrying");
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

/// Forward a PUBLISH on the response topic into the slot.
///
/// Returns `true` when the payload was stored for a pending command.
fn route_publish(topic: &str, payload: &[u8], response_topic: &str, slot: &ResponseSlot) -> bool {
    if topic != response_topic {
        debug!(%topic, "ignoring message on unexpected topic");
        return false;
    }
    match std::str::from_utf8(payload) {
        Ok(text) => {
            debug!(response = %text, "received response");
            slot.offer(text)
        }
        Err(e) => {
            warn!(error = %e, "discarding non UTF-8 response payload");
            false
        }
    }
}
