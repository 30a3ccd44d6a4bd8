//! In-process firmware stand-in for tests and headless runs.
//!
//! [`SimDevice`] listens on the command lane of a
//! [`LoopbackBus`][smartbin_transport::LoopbackBus] and answers on the
//! response lane. Replies come from a per-token FIFO script first, then from
//! per-token defaults; a token with neither stays silent, which the transport
//! sees as a timeout.
//!
//! # Example
//!
//! ```rust
//! use smartbin_hal::sim::SimDevice;
//! use smartbin_transport::LoopbackBus;
//!
//! let bus = LoopbackBus::default();
//! let device = SimDevice::healthy(&bus)
//!     .queue_reply("get_ultra", Some("5"))
//!     .queue_reply("get_ultra", Some("45"));
//! assert!(device.received().is_empty());
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use smartbin_transport::{LoopbackBus, Topic};
use smartbin_types::DeviceCommand;
use tokio::task::JoinHandle;
use tracing::debug;

/// Key used for `register{id}` tokens without an exact entry.
const REGISTER_KEY: &str = "register";

#[derive(Default)]
struct SimState {
    defaults: HashMap<String, String>,
    scripted: HashMap<String, VecDeque<Option<String>>>,
    received: Vec<String>,
}

/// Scriptable simulated bin firmware. Clones share the same script.
#[derive(Clone)]
pub struct SimDevice {
    bus: LoopbackBus,
    state: Arc<Mutex<SimState>>,
}

impl SimDevice {
    /// A device that answers nothing until replies are configured.
    pub fn new(bus: &LoopbackBus) -> Self {
        Self {
            bus: bus.clone(),
            state: Arc::new(Mutex::new(SimState::default())),
        }
    }

    /// A device with plausible answers for the whole vocabulary: an empty,
    /// odourless bin with nobody in front of it.
    pub fn healthy(bus: &LoopbackBus) -> Self {
        Self::new(bus)
            .with_reply("get_ultra", "60")
            .with_reply("get_gas", "120")
            .with_reply("get_ir", "Not Detected")
            .with_reply("open_lid", "lid_opened")
            .with_reply("close_lid", "lid_closed")
            .with_reply("compaction", "Compaction done")
            .with_reply("uv_led", "sterilised")
            .with_reply(REGISTER_KEY, "registration_success")
            .with_reply("verify", "approved")
            .with_reply("clear_all_users", "users_cleared")
    }

    /// Set the fallback reply for `token`.
    pub fn with_reply(self, token: &str, reply: &str) -> Self {
        self.set_reply(token, reply);
        self
    }

    /// Queue a one-shot reply for `token`; `None` stays silent once.
    pub fn queue_reply(self, token: &str, reply: Option<&str>) -> Self {
        self.push_reply(token, reply);
        self
    }

    pub fn set_reply(&self, token: &str, reply: &str) {
        self.lock()
            .defaults
            .insert(token.to_string(), reply.to_string());
    }

    pub fn push_reply(&self, token: &str, reply: Option<&str>) {
        self.lock()
            .scripted
            .entry(token.to_string())
            .or_default()
            .push_back(reply.map(str::to_string));
    }

    /// Stop answering `token` (scripted and default replies are dropped).
    pub fn silence(&self, token: &str) {
        let mut state = self.lock();
        state.defaults.remove(token);
        state.scripted.remove(token);
    }

    /// Every command token received so far, in order.
    pub fn received(&self) -> Vec<String> {
        self.lock().received.clone()
    }

    /// How many times `token` was received.
    pub fn count(&self, token: &str) -> usize {
        self.lock().received.iter().filter(|t| *t == token).count()
    }

    pub fn clear_received(&self) {
        self.lock().received.clear();
    }

    /// Start answering commands. Subscribes before returning so no command
    /// published afterwards is missed.
    pub fn spawn(&self) -> JoinHandle<()> {
        let mut commands = self.bus.subscribe_to(Topic::Commands);
        let device = self.clone();
        tokio::spawn(async move {
            while let Some(token) = commands.recv().await {
                if let Some(reply) = device.answer(&token) {
                    let _ = device.bus.publish_to(Topic::Responses, reply);
                }
            }
        })
    }

    fn answer(&self, token: &str) -> Option<String> {
        let mut state = self.lock();
        state.received.push(token.to_string());

        if let Some(reply) = state.scripted.get_mut(token).and_then(VecDeque::pop_front) {
            debug!(%token, reply = ?reply, "sim device scripted reply");
            return reply;
        }
        let fallback = state.defaults.get(token).or_else(|| match DeviceCommand::from_token(token) {
            Some(DeviceCommand::Register(_)) => state.defaults.get(REGISTER_KEY),
            _ => None,
        });
        fallback.cloned()
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
