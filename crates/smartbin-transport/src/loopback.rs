//! In-process command/response topic pair.
//!
//! [`LoopbackBus`] stands in for the broker when the controller runs against
//! a simulated device or in tests. It carries two [`Topic`] lanes built on
//! [`tokio::sync::broadcast`] channels:
//!
//! | Topic | Direction |
//! |---|---|
//! | [`Topic::Commands`] | controller → device |
//! | [`Topic::Responses`] | device → controller |
//!
//! [`LoopbackLink`] publishes onto the command lane, and
//! [`LoopbackBus::spawn_response_listener`] is the receive task that feeds the
//! response lane into a [`ResponseSlot`].

use std::sync::Arc;

use async_trait::async_trait;
use smartbin_types::BinError;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::link::CommandLink;
use crate::slot::ResponseSlot;
use crate::transport::Transport;

/// Default channel capacity (messages buffered before slow receivers lag).
const DEFAULT_CAPACITY: usize = 64;

/// The two lanes of the loopback bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Command tokens travelling to the device.
    Commands,
    /// Response tokens travelling back to the controller.
    Responses,
}

/// Shared loopback bus. Clones share the same underlying channels.
#[derive(Clone, Debug)]
pub struct LoopbackBus {
    commands: broadcast::Sender<String>,
    responses: broadcast::Sender<String>,
}

impl LoopbackBus {
    /// Create a bus whose lanes each buffer `capacity` messages.
    pub fn new(capacity: usize) -> Self {
        let (commands, _) = broadcast::channel(capacity);
        let (responses, _) = broadcast::channel(capacity);
        Self {
            commands,
            responses,
        }
    }

    /// Publish `payload` on `topic`.
    ///
    /// Returns the number of receivers handed the message.
    ///
    /// # Errors
    ///
    /// Returns [`BinError::Transport`] when nobody is listening on the topic.
    pub fn publish_to(&self, topic: Topic, payload: impl Into<String>) -> Result<usize, BinError> {
        self.sender(topic)
            .send(payload.into())
            .map_err(|_| BinError::Transport(format!("no subscribers for topic {topic:?}")))
    }

    /// Subscribe to one lane.
    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.sender(topic).subscribe(),
        }
    }

    /// Spawn the receive task that moves every response into `slot`.
    ///
    /// The task ends when the bus is dropped.
    pub fn spawn_response_listener(&self, slot: Arc<ResponseSlot>) -> JoinHandle<()> {
        let mut responses = self.subscribe_to(Topic::Responses);
        tokio::spawn(async move {
            while let Some(response) = responses.recv().await {
                slot.offer(response);
            }
            debug!("loopback response listener stopped");
        })
    }

    /// Build a [`Transport`] over this bus, returning it together with its
    /// receive task.
    pub fn connect(&self) -> (Transport, JoinHandle<()>) {
        let slot = Arc::new(ResponseSlot::new());
        let listener = self.spawn_response_listener(Arc::clone(&slot));
        let link = Arc::new(LoopbackLink { bus: self.clone() });
        (Transport::new(link, slot), listener)
    }

    fn sender(&self, topic: Topic) -> &broadcast::Sender<String> {
        match topic {
            Topic::Commands => &self.commands,
            Topic::Responses => &self.responses,
        }
    }
}

impl Default for LoopbackBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Receiver bound to one [`Topic`] lane.
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<String>,
}

impl TopicReceiver {
    /// Wait for the next message. Lagged messages are skipped with a warning;
    /// returns `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<String> {
        loop {
            match self.receiver.recv().await {
                Ok(payload) => return Some(payload),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(topic = ?self.topic, lagged_by = n, "loopback receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }
}

/// [`CommandLink`] that publishes onto [`Topic::Commands`].
pub struct LoopbackLink {
    bus: LoopbackBus,
}

#[async_trait]
impl CommandLink for LoopbackLink {
    async fn publish(&self, command: &str) -> Result<(), BinError> {
        self.bus.publish_to(Topic::Commands, command).map(|_| ())
    }
}
