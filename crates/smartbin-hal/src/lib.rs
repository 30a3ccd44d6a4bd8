//! `smartbin-hal` – typed device operations for the bin firmware.
//!
//! # Modules
//!
//! - [`device`] – [`DeviceOps`]: one method per firmware command, each with
//!   its own timeout and response validation.
//! - [`retry`] – [`RetryPolicy`]: the bounded retry loop used by fingerprint
//!   registration and verification.
//! - [`sim`] – [`SimDevice`]: an in-process firmware stand-in on the
//!   loopback bus for tests and headless runs.

pub mod device;
pub mod retry;
pub mod sim;

pub use device::{DeviceOps, DeviceTimeouts};
pub use retry::{AttemptOutcome, RetryPolicy};
pub use sim::SimDevice;
