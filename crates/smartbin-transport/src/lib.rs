//! `smartbin-transport` – command/response exchange with the bin firmware.
//!
//! The firmware listens on one pub/sub topic for text commands and answers on
//! another. This crate turns that pair into a blocking-style
//! `send(command, timeout)` call with a single outstanding command.
//!
//! # Modules
//!
//! - [`slot`] – the single pending-response slot written by the receive task.
//! - [`transport`] – [`Transport::send`], the bounded-timeout exchange.
//! - [`link`] – the [`CommandLink`] trait implemented by every outbound path.
//! - [`mqtt`] – broker-backed link built on `rumqttc`.
//! - [`loopback`] – in-process topic pair used by tests and simulation.

pub mod link;
pub mod loopback;
pub mod mqtt;
pub mod slot;
pub mod transport;

pub use link::CommandLink;
pub use loopback::{LoopbackBus, LoopbackLink, Topic};
pub use mqtt::{MqttLink, MqttSettings};
pub use slot::ResponseSlot;
pub use transport::Transport;
