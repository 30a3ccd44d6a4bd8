//! [`DeviceOps`] – typed operations on top of the
//! [`Transport`][smartbin_transport::Transport].
//!
//! Each method sends one firmware command (or a bounded series for the
//! fingerprint workflows), validates the raw text, and maps it onto a typed
//! result:
//!
//! | Method | Command | Timeout | Result |
//! |---|---|---|---|
//! | [`read_distance`][DeviceOps::read_distance] | `get_ultra` | 2 s | `Option<u32>` |
//! | [`read_gas`][DeviceOps::read_gas] | `get_gas` | 2 s | `Option<u32>` |
//! | [`read_presence`][DeviceOps::read_presence] | `get_ir` | 1.5 s | [`Presence`] |
//! | [`open_lid`][DeviceOps::open_lid] / [`close_lid`][DeviceOps::close_lid] | `open_lid` / `close_lid` | 2 s | fire-and-forget |
//! | [`compact`][DeviceOps::compact] | `compaction` | 20 s | `bool` |
//! | [`sterilize`][DeviceOps::sterilize] | `uv_led` | 10 s | `bool` |
//! | [`register_fingerprint`][DeviceOps::register_fingerprint] | `register{id}` | 10 s × 3 | `bool` |
//! | [`verify_fingerprint`][DeviceOps::verify_fingerprint] | `verify` | 3 s × 5 | `bool` |
//! | [`clear_users`][DeviceOps::clear_users] | `clear_all_users` | 2 s | best-effort |
//!
//! Timeouts and malformed answers never surface as errors; only a failure to
//! publish does.

use std::sync::Arc;
use std::time::Duration;

use smartbin_transport::Transport;
use smartbin_types::{BinError, DeviceCommand, Presence};
use tracing::{debug, info, warn};

use crate::retry::{AttemptOutcome, RetryPolicy};

const COMPACTION_DONE: &str = "Compaction done";
const STERILISED: &str = "sterilised";
const REGISTRATION_SUCCESS: &str = "registration_success";
const REGISTRATION_FAILED: &str = "registration_failed";
const APPROVED: &str = "approved";
const DENIED: &str = "denied";

/// Per-command response timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceTimeouts {
    pub distance: Duration,
    pub gas: Duration,
    pub presence: Duration,
    pub lid: Duration,
    pub compaction: Duration,
    pub sterilize: Duration,
    pub register: Duration,
    pub verify: Duration,
    pub clear_users: Duration,
}

impl Default for DeviceTimeouts {
    fn default() -> Self {
        Self {
            distance: Duration::from_secs(2),
            gas: Duration::from_secs(2),
            presence: Duration::from_millis(1500),
            lid: Duration::from_secs(2),
            compaction: Duration::from_secs(20),
            sterilize: Duration::from_secs(10),
            register: Duration::from_secs(10),
            verify: Duration::from_secs(3),
            clear_users: Duration::from_secs(2),
        }
    }
}

/// Typed firmware operations. Construct once and share.
pub struct DeviceOps {
    transport: Arc<Transport>,
    timeouts: DeviceTimeouts,
    registration: RetryPolicy,
    verification: RetryPolicy,
}

impl DeviceOps {
    pub fn new(transport: Arc<Transport>) -> Self {
        Self {
            transport,
            timeouts: DeviceTimeouts::default(),
            registration: RetryPolicy::registration(),
            verification: RetryPolicy::verification(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: DeviceTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn timeouts(&self) -> &DeviceTimeouts {
        &self.timeouts
    }

    /// Ultrasonic distance to the waste surface. Smaller means fuller.
    pub async fn read_distance(&self) -> Result<Option<u32>, BinError> {
        let response = self
            .transport
            .send(&DeviceCommand::GetUltra, self.timeouts.distance)
            .await?;
        let distance = parse_reading(response.as_deref());
        if distance.is_none() {
            warn!(response = ?response, "invalid ultrasonic response");
        }
        Ok(distance)
    }

    pub async fn read_gas(&self) -> Result<Option<u32>, BinError> {
        let response = self
            .transport
            .send(&DeviceCommand::GetGas, self.timeouts.gas)
            .await?;
        let level = parse_reading(response.as_deref());
        if level.is_none() {
            warn!(response = ?response, "invalid gas sensor response");
        }
        Ok(level)
    }

    /// Infrared presence. Defaults to [`Presence::NotDetected`] on anything
    /// other than a valid answer.
    pub async fn read_presence(&self) -> Result<Presence, BinError> {
        let response = self
            .transport
            .send(&DeviceCommand::GetIr, self.timeouts.presence)
            .await?;
        Ok(Presence::from_response(response.as_deref()))
    }

    pub async fn open_lid(&self) -> Result<(), BinError> {
        self.fire(DeviceCommand::OpenLid, self.timeouts.lid).await
    }

    pub async fn close_lid(&self) -> Result<(), BinError> {
        self.fire(DeviceCommand::CloseLid, self.timeouts.lid).await
    }

    /// Run one compaction stroke. `true` only on `Compaction done`.
    pub async fn compact(&self) -> Result<bool, BinError> {
        let response = self
            .transport
            .send(&DeviceCommand::Compaction, self.timeouts.compaction)
            .await?;
        Ok(response.as_deref() == Some(COMPACTION_DONE))
    }

    /// Run the UV sterilisation cycle. `true` only on `sterilised`.
    pub async fn sterilize(&self) -> Result<bool, BinError> {
        let response = self
            .transport
            .send(&DeviceCommand::UvLed, self.timeouts.sterilize)
            .await?;
        Ok(response.as_deref() == Some(STERILISED))
    }

    /// Enrol a fingerprint for `user_id` with up to three attempts.
    pub async fn register_fingerprint(&self, user_id: &str) -> Result<bool, BinError> {
        let command = DeviceCommand::Register(user_id.to_string());
        let timeout = self.timeouts.register;
        self.registration
            .run("register_fingerprint", |attempt| {
                let command = command.clone();
                async move {
                    info!(user_id, attempt, "fingerprint registration attempt");
                    let response = self.transport.send(&command, timeout).await?;
                    Ok(match response.as_deref() {
                        Some(REGISTRATION_SUCCESS) => AttemptOutcome::Success,
                        Some(REGISTRATION_FAILED) => AttemptOutcome::Rejected,
                        _ => AttemptOutcome::NoResponse,
                    })
                }
            })
            .await
    }

    /// Match a presented fingerprint with up to five attempts.
    pub async fn verify_fingerprint(&self) -> Result<bool, BinError> {
        let timeout = self.timeouts.verify;
        self.verification
            .run("verify_fingerprint", |_| async move {
                let response = self.transport.send(&DeviceCommand::Verify, timeout).await?;
                Ok(match response.as_deref() {
                    Some(APPROVED) => AttemptOutcome::Success,
                    Some(DENIED) => AttemptOutcome::Rejected,
                    _ => AttemptOutcome::NoResponse,
                })
            })
            .await
    }

    /// Wipe every enrolled fingerprint. Returns whatever the device said.
    pub async fn clear_users(&self) -> Result<Option<String>, BinError> {
        let response = self
            .transport
            .send(&DeviceCommand::ClearAllUsers, self.timeouts.clear_users)
            .await?;
        info!(response = ?response, "requested fingerprint database wipe");
        Ok(response)
    }

    async fn fire(&self, command: DeviceCommand, timeout: Duration) -> Result<(), BinError> {
        let response = self.transport.send(&command, timeout).await?;
        debug!(%command, response = ?response, "actuator command sent");
        Ok(())
    }
}

/// A reading is valid only when it is a non-empty run of ASCII digits.
fn parse_reading(response: Option<&str>) -> Option<u32> {
    let text = response?;
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}
