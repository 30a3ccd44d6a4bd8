//! [`BinController`] – the bin state machine.
//!
//! Each outer tick runs, in order:
//!
//! 1. **Registration** – serve a pending fingerprint enrolment request from
//!    the shared store, independent of bin state.
//! 2. **Reconciliation** – republish the status; while biohazardous, run an
//!    armed fingerprint verification; once the crew acknowledges a collection,
//!    run UV sterilisation and return to [`BinStatus::Normal`]. A biohazardous
//!    bin is only sterilised after a verified approval.
//! 3. **Sensing** – the sub-loop of [`SenseStep`]s: lid follows presence,
//!    gas over threshold escalates to [`BinStatus::Biohazard`], a full
//!    reading triggers compaction whose measured efficiency decides whether
//!    compaction is attempted next time, and operator overrides are applied.
//!    While biohazardous a pass only records readings and serves overrides;
//!    the lid stays where the fingerprint gate left it.
//! 4. Sleep for the tick cadence.
//!
//! Device operations are strictly sequential. Timeouts and malformed answers
//! arrive as typed fallbacks; a transport failure aborts the current tick,
//! is logged by [`BinController::run`], and the next tick starts over from
//! the current state. Store failures read as absent values.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use smartbin_hal::{DeviceOps, SimDevice};
//! use smartbin_runtime::{BinController, BinControllerConfig};
//! use smartbin_store::{MemoryStore, StateAdapter};
//! use smartbin_transport::LoopbackBus;
//!
//! # async fn demo() {
//! let bus = LoopbackBus::default();
//! SimDevice::healthy(&bus).spawn();
//! let (transport, _receive) = bus.connect();
//! let mut controller = BinController::new(
//!     DeviceOps::new(Arc::new(transport)),
//!     StateAdapter::new(Arc::new(MemoryStore::new())),
//!     BinControllerConfig::default(),
//! );
//! controller.run().await;
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use smartbin_hal::DeviceOps;
use smartbin_store::{StateAdapter, paths};
use smartbin_types::{BinError, BinStatus, ManualControl, Presence};
use tracing::{debug, error, info, warn};

use crate::compaction::{compaction_efficiency, fill_percent};

/// Value of the verification flag that arms the fingerprint gate.
const VERIFY_ARMED: &str = "True";
const VERIFY_DISARMED: &str = "False";
const REGISTER_REQUESTED: &str = "true";
const REGISTER_CLEARED: &str = "false";

/// Tuning knobs for [`BinController`].
#[derive(Debug, Clone)]
pub struct BinControllerConfig {
    /// Identifier used under `Dustbins/{bin_id}/…`.
    pub bin_id: String,
    /// Sensor-to-floor distance of an empty bin, in cm.
    pub original_level_cm: u32,
    /// Distances below this read as full.
    pub fill_threshold_cm: u32,
    /// Gas readings at or above this are biohazardous.
    pub gas_threshold: u32,
    /// Compaction efficiency (percent) below which compaction is disabled.
    pub efficiency_threshold: f64,
    /// Pause between outer ticks.
    pub tick_interval: Duration,
    /// Pause between closing the lid and starting compaction.
    pub compaction_settle: Duration,
    /// Pause between sensing passes.
    pub sensing_interval: Duration,
    /// Hand control back to the outer tick after this many sensing passes so
    /// registration requests are not starved. `None` senses until the bin is
    /// full or biohazardous.
    pub max_sensing_passes: Option<u32>,
}

impl Default for BinControllerConfig {
    fn default() -> Self {
        Self {
            bin_id: "bin-1".to_string(),
            original_level_cm: 100,
            fill_threshold_cm: 10,
            gas_threshold: 400,
            efficiency_threshold: 8.0,
            tick_interval: Duration::from_millis(1500),
            compaction_settle: Duration::from_secs(2),
            sensing_interval: Duration::from_millis(250),
            max_sensing_passes: Some(40),
        }
    }
}

/// Result of one sensing pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenseStep {
    /// Keep sensing.
    Continue,
    /// The bin reached a resolved state (full or biohazardous).
    Exit,
}

/// What reconciliation decided for the rest of the tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reconcile {
    Monitor,
    Hold,
}

#[derive(Serialize)]
struct UserRecord<'a> {
    name: &'a str,
    voted: bool,
}

/// The bin control orchestrator. Build once at startup.
pub struct BinController {
    device: DeviceOps,
    state: StateAdapter,
    config: BinControllerConfig,
    status: BinStatus,
    /// Sticky: recomputed after every successful compaction stroke.
    compaction_enabled: bool,
    /// Set by a fingerprint approval while biohazardous.
    biometric_cleared: bool,
    compactions: u64,
    last_collected: Option<DateTime<Utc>>,
    reported_collection_hours: Option<i64>,
    shutdown: Arc<AtomicBool>,
}

impl BinController {
    pub fn new(device: DeviceOps, state: StateAdapter, config: BinControllerConfig) -> Self {
        Self {
            device,
            state,
            config,
            status: BinStatus::Normal,
            compaction_enabled: true,
            biometric_cleared: false,
            compactions: 0,
            last_collected: None,
            reported_collection_hours: None,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn status(&self) -> BinStatus {
        self.status
    }

    pub fn compaction_enabled(&self) -> bool {
        self.compaction_enabled
    }

    pub fn is_biometric_cleared(&self) -> bool {
        self.biometric_cleared
    }

    pub fn device(&self) -> &DeviceOps {
        &self.device
    }

    /// Flag that stops [`run`][Self::run] at the next tick or sensing pass.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    fn shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Close the lid and publish the initial status.
    ///
    /// # Errors
    ///
    /// Returns [`BinError::Transport`] if the close command cannot be sent.
    pub async fn startup(&mut self) -> Result<(), BinError> {
        self.device.close_lid().await?;
        self.set_status(self.status).await;
        info!(bin_id = %self.config.bin_id, "bin controller started");
        Ok(())
    }

    /// Tick until the shutdown flag is raised, then close the lid.
    ///
    /// Never returns early on error: a failed tick is logged and the next one
    /// starts from the current state.
    pub async fn run(&mut self) {
        while !self.shutting_down() {
            if let Err(e) = self.tick().await {
                error!(error = %e, status = %self.status, "tick aborted");
            }
            if self.shutting_down() {
                break;
            }
            tokio::time::sleep(self.config.tick_interval).await;
        }
        self.shutdown_safely().await;
    }

    /// Best-effort lid close on the way out.
    pub async fn shutdown_safely(&self) {
        match self.device.close_lid().await {
            Ok(()) => info!("lid closed for shutdown"),
            Err(e) => warn!(error = %e, "could not close lid during shutdown"),
        }
    }

    /// Run one outer tick: registration, reconciliation, sensing.
    ///
    /// # Errors
    ///
    /// Returns [`BinError::Transport`] when a command cannot be published; the
    /// rest of the tick is skipped.
    pub async fn tick(&mut self) -> Result<(), BinError> {
        self.handle_registration().await?;
        self.report_collection_age().await;
        match self.reconcile_status().await? {
            Reconcile::Monitor => self.run_sensing().await,
            Reconcile::Hold => Ok(()),
        }
    }

    // -------------------------------------------------------------------------
    // 1. Registration
    // -------------------------------------------------------------------------

    async fn handle_registration(&mut self) -> Result<(), BinError> {
        let request = self.state.get_text(paths::REGISTER_REQUEST).await;
        if request.as_deref() != Some(REGISTER_REQUESTED) {
            return Ok(());
        }

        let user_id = self.state.get_text(paths::NEXT_USER_ID).await;
        let user_name = self.state.get_text(paths::NEXT_USER_NAME).await;
        let (Some(user_id), Some(user_name)) = (user_id, user_name) else {
            warn!("registration requested but user id or name is missing");
            return Ok(());
        };

        info!(%user_id, "starting fingerprint registration");
        if !self.device.register_fingerprint(&user_id).await? {
            warn!(%user_id, "fingerprint registration unsuccessful; will retry next tick");
            return Ok(());
        }

        let record = UserRecord {
            name: &user_name,
            voted: false,
        };
        if self.state.set(&paths::user(&user_id), &record).await
            && self
                .state
                .set(paths::REGISTER_REQUEST, REGISTER_CLEARED)
                .await
        {
            info!(%user_id, name = %user_name, "registration complete");
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // 2. Reconciliation
    // -------------------------------------------------------------------------

    async fn reconcile_status(&mut self) -> Result<Reconcile, BinError> {
        match self.status {
            BinStatus::Full => self.publish_status().await,
            BinStatus::Biohazard => {
                self.publish_status().await;
                if !self.biometric_cleared {
                    self.gate_on_fingerprint().await?;
                }
            }
            BinStatus::Normal | BinStatus::Sterilizing => {}
        }
        self.check_collection().await
    }

    /// While biohazardous and not yet cleared, the lid opens only after an
    /// armed, successful fingerprint verification.
    async fn gate_on_fingerprint(&mut self) -> Result<(), BinError> {
        let armed = self.state.get_text(paths::VERIFY).await;
        if armed.as_deref() != Some(VERIFY_ARMED) {
            debug!("biohazard: waiting for verification request");
            return Ok(());
        }

        info!("verifying fingerprint");
        if self.device.verify_fingerprint().await? {
            self.device.open_lid().await?;
            self.state.set(paths::VERIFY, VERIFY_DISARMED).await;
            self.biometric_cleared = true;
            info!("user verified; lid opened for collection");
        } else {
            warn!("fingerprint verification failed after maximum attempts");
        }
        Ok(())
    }

    async fn check_collection(&mut self) -> Result<Reconcile, BinError> {
        let collection = self.state.get_text(paths::COLLECTION_STATUS).await;
        if collection.as_deref() != Some(paths::WASTE_COLLECTED) {
            if matches!(self.status, BinStatus::Full | BinStatus::Biohazard) {
                info!(status = %self.status, "please collect waste");
            }
            return Ok(Reconcile::Monitor);
        }
        if self.status == BinStatus::Biohazard && !self.biometric_cleared {
            info!("waste marked collected; sterilisation waits for fingerprint approval");
            return Ok(Reconcile::Monitor);
        }

        info!("waste collected; starting UV sterilisation");
        let previous = self.status;
        self.set_status(BinStatus::Sterilizing).await;
        let sterilised = match self.device.sterilize().await {
            Ok(done) => done,
            Err(e) => {
                self.set_status(previous).await;
                return Err(e);
            }
        };

        if !sterilised {
            warn!("sterilisation did not complete");
            self.set_status(previous).await;
            return Ok(Reconcile::Hold);
        }

        self.state
            .set(paths::COLLECTION_STATUS, paths::READY_FOR_USE)
            .await;
        let now = Utc::now();
        self.state
            .set(
                &paths::bin_history(&self.config.bin_id, "lastCollectedAt"),
                &now.to_rfc3339(),
            )
            .await;
        self.last_collected = Some(now);
        self.reported_collection_hours = None;
        self.report_collection_age().await;
        self.compaction_enabled = true;
        self.biometric_cleared = false;
        self.set_status(BinStatus::Normal).await;
        info!("sterilisation complete; bin ready for use");
        Ok(Reconcile::Monitor)
    }

    // -------------------------------------------------------------------------
    // 3. Sensing
    // -------------------------------------------------------------------------

    async fn run_sensing(&mut self) -> Result<(), BinError> {
        let mut passes = 0u32;
        while !self.shutting_down() {
            if self.sense_once().await? == SenseStep::Exit {
                return Ok(());
            }
            passes += 1;
            if let Some(max) = self.config.max_sensing_passes
                && passes >= max
            {
                debug!(passes, "yielding sensing loop back to the tick");
                return Ok(());
            }
            tokio::time::sleep(self.config.sensing_interval).await;
        }
        Ok(())
    }

    /// One pass of the sensing sub-loop.
    ///
    /// # Errors
    ///
    /// Returns [`BinError::Transport`] when a command cannot be published.
    pub async fn sense_once(&mut self) -> Result<SenseStep, BinError> {
        if self.status == BinStatus::Biohazard {
            return self.sense_while_biohazardous().await;
        }

        match self.device.read_presence().await? {
            Presence::Detected => self.device.open_lid().await?,
            Presence::NotDetected => self.device.close_lid().await?,
        }

        let distance = self.read_distance().await?;
        let gas = self.read_gas().await?;
        debug!(gas = ?gas, distance_cm = ?distance, "sensor readings");

        let step = if let Some(level) = gas.filter(|g| *g >= self.config.gas_threshold) {
            self.device.close_lid().await?;
            warn!(gas = level, "gas threshold exceeded; bin is biohazardous");
            self.biometric_cleared = false;
            self.set_status(BinStatus::Biohazard).await;
            SenseStep::Exit
        } else if let Some(before) = distance.filter(|d| *d < self.config.fill_threshold_cm) {
            self.handle_full_reading(before).await?
        } else {
            if distance.is_some() {
                self.state
                    .set(paths::COLLECTION_STATUS, paths::NOT_FULL)
                    .await;
            }
            SenseStep::Continue
        };

        self.poll_manual_control().await?;
        Ok(step)
    }

    /// Readings and overrides only. Escalation already happened, so the lid
    /// and the clearance are left alone.
    async fn sense_while_biohazardous(&mut self) -> Result<SenseStep, BinError> {
        let distance = self.read_distance().await?;
        let gas = self.read_gas().await?;
        debug!(gas = ?gas, distance_cm = ?distance, "sensor readings while biohazardous");
        self.poll_manual_control().await?;
        Ok(SenseStep::Exit)
    }

    async fn handle_full_reading(&mut self, before: u32) -> Result<SenseStep, BinError> {
        self.device.close_lid().await?;
        tokio::time::sleep(self.config.compaction_settle).await;

        if !self.compaction_enabled {
            info!(distance_cm = before, "compaction disabled; bin is full");
            self.mark_full().await;
            return Ok(SenseStep::Exit);
        }

        if !self.device.compact().await? {
            warn!("compaction did not complete");
            return Ok(SenseStep::Continue);
        }
        self.record_compaction().await;

        let Some(after) = self.read_distance().await? else {
            warn!("no distance reading after compaction");
            return Ok(SenseStep::Continue);
        };

        let efficiency = compaction_efficiency(self.config.original_level_cm, before, after);
        self.compaction_enabled = efficiency >= self.config.efficiency_threshold;
        info!(
            before_cm = before,
            after_cm = after,
            efficiency,
            compaction_enabled = self.compaction_enabled,
            "compaction efficiency measured"
        );
        if !self.compaction_enabled {
            warn!("compaction efficiency low; disabling compaction");
        }

        if after < self.config.fill_threshold_cm {
            self.mark_full().await;
            Ok(SenseStep::Exit)
        } else {
            self.state
                .set(paths::COLLECTION_STATUS, paths::NOT_FULL)
                .await;
            Ok(SenseStep::Continue)
        }
    }

    /// Apply an operator override from the store, then clear it.
    async fn poll_manual_control(&mut self) -> Result<(), BinError> {
        let Some(raw) = self.state.get_text(paths::MANUAL_CONTROL).await else {
            return Ok(());
        };
        let Some(control) = ManualControl::parse(&raw) else {
            warn!(value = %raw, "ignoring unknown manual control");
            return Ok(());
        };

        info!(?control, "applying manual control");
        match control {
            ManualControl::Compaction => {
                if self.device.compact().await? {
                    self.record_compaction().await;
                } else {
                    warn!("manual compaction did not complete");
                }
            }
            ManualControl::OpenLid => self.device.open_lid().await?,
            ManualControl::CloseLid => self.device.close_lid().await?,
        }
        self.state.remove(paths::MANUAL_CONTROL).await;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    async fn read_distance(&mut self) -> Result<Option<u32>, BinError> {
        let distance = self.device.read_distance().await?;
        if let Some(d) = distance {
            self.state.set(paths::WASTE_LEVEL, &d).await;
            let fill = fill_percent(self.config.original_level_cm, d);
            self.state
                .set(&paths::bin_history(&self.config.bin_id, "fillLevel"), &fill)
                .await;
        }
        Ok(distance)
    }

    async fn read_gas(&mut self) -> Result<Option<u32>, BinError> {
        let gas = self.device.read_gas().await?;
        if let Some(level) = gas {
            self.state.set(paths::GAS_LEVEL, &level).await;
        }
        Ok(gas)
    }

    /// Whole hours since the last sterilised collection, written when the
    /// value changes. Nothing is written before the first collection.
    async fn report_collection_age(&mut self) {
        let Some(collected) = self.last_collected else {
            return;
        };
        let hours = (Utc::now() - collected).num_hours();
        if self.reported_collection_hours == Some(hours) {
            return;
        }
        if self
            .state
            .set(
                &paths::bin_history(&self.config.bin_id, "lastCollectedHours"),
                &hours,
            )
            .await
        {
            self.reported_collection_hours = Some(hours);
        }
    }

    async fn record_compaction(&mut self) {
        self.compactions += 1;
        self.state
            .set(
                &paths::bin_history(&self.config.bin_id, "compactions"),
                &self.compactions,
            )
            .await;
    }

    /// Full never overrides a pending biohazard.
    async fn mark_full(&mut self) {
        if self.status != BinStatus::Biohazard {
            self.set_status(BinStatus::Full).await;
        }
    }

    async fn set_status(&mut self, status: BinStatus) {
        if self.status != status {
            info!(from = %self.status, to = %status, "bin status changed");
        }
        self.status = status;
        self.publish_status().await;
    }

    async fn publish_status(&self) {
        self.state
            .set(paths::BIN_STATUS, self.status.display_text())
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use smartbin_hal::SimDevice;
    use smartbin_store::MemoryStore;
    use smartbin_transport::LoopbackBus;

    struct Rig {
        controller: BinController,
        device: SimDevice,
        store: Arc<MemoryStore>,
    }

    fn test_config() -> BinControllerConfig {
        BinControllerConfig {
            max_sensing_passes: Some(1),
            ..BinControllerConfig::default()
        }
    }

    fn rig(script: impl FnOnce(SimDevice) -> SimDevice) -> Rig {
        let bus = LoopbackBus::default();
        let device = script(SimDevice::healthy(&bus));
        device.spawn();
        let (transport, _receive) = bus.connect();
        let store = Arc::new(MemoryStore::new());
        let controller = BinController::new(
            DeviceOps::new(Arc::new(transport)),
            StateAdapter::new(store.clone()),
            test_config(),
        );
        Rig {
            controller,
            device,
            store,
        }
    }

    /// Drive the rig into the biohazard state with one high gas reading.
    async fn into_biohazard(rig: &mut Rig) {
        rig.device.push_reply("get_gas", Some("450"));
        assert_eq!(rig.controller.sense_once().await.unwrap(), SenseStep::Exit);
        assert_eq!(rig.controller.status(), BinStatus::Biohazard);
        rig.device.clear_received();
    }

    #[tokio::test(start_paused = true)]
    async fn not_full_reading_publishes_not_full() {
        let mut rig = rig(|d| d);
        assert_eq!(rig.controller.sense_once().await.unwrap(), SenseStep::Continue);

        assert_eq!(
            rig.device.received(),
            ["get_ir", "close_lid", "get_ultra", "get_gas"]
        );
        assert_eq!(
            rig.store.peek(paths::COLLECTION_STATUS).await,
            Some(json!(paths::NOT_FULL))
        );
        assert_eq!(rig.store.peek(paths::WASTE_LEVEL).await, Some(json!(60)));
        assert_eq!(rig.store.peek(paths::GAS_LEVEL).await, Some(json!(120)));
        assert_eq!(
            rig.store.peek("Dustbins/bin-1/fillLevel").await,
            Some(json!(40))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn presence_opens_the_lid() {
        let mut rig = rig(|d| d.queue_reply("get_ir", Some("Detected")));
        rig.controller.sense_once().await.unwrap();
        assert_eq!(rig.device.received()[..2], ["get_ir", "open_lid"]);
    }

    #[tokio::test(start_paused = true)]
    async fn full_reading_compacts_and_keeps_sensing_when_space_is_freed() {
        let mut rig = rig(|d| {
            d.queue_reply("get_ultra", Some("5"))
                .queue_reply("get_ultra", Some("45"))
        });

        let step = rig.controller.sense_once().await.unwrap();

        assert_eq!(step, SenseStep::Continue);
        assert_eq!(
            rig.device.received(),
            [
                "get_ir",
                "close_lid",
                "get_ultra",
                "get_gas",
                "close_lid",
                "compaction",
                "get_ultra"
            ]
        );
        assert_eq!(
            rig.store.writes_to(paths::WASTE_LEVEL).await,
            [json!(5), json!(45)]
        );
        assert_eq!(
            rig.store.peek(paths::COLLECTION_STATUS).await,
            Some(json!(paths::NOT_FULL))
        );
        // 95 / 55 × 100 ≈ 172 %.
        assert!(rig.controller.compaction_enabled());
        assert_eq!(rig.controller.status(), BinStatus::Normal);
        assert_eq!(
            rig.store.peek("Dustbins/bin-1/compactions").await,
            Some(json!(1))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn full_after_compaction_marks_bin_full() {
        let mut rig = rig(|d| {
            d.queue_reply("get_ultra", Some("5"))
                .queue_reply("get_ultra", Some("8"))
        });

        assert_eq!(rig.controller.sense_once().await.unwrap(), SenseStep::Exit);
        assert_eq!(rig.controller.status(), BinStatus::Full);
        assert_eq!(
            rig.store.peek(paths::BIN_STATUS).await,
            Some(json!("Dustbin Full. Please Collect!"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn ineffective_compaction_disables_the_next_stroke() {
        // A reading beyond the empty level yields a negative efficiency.
        let mut rig = rig(|d| {
            d.queue_reply("get_ultra", Some("5"))
                .queue_reply("get_ultra", Some("150"))
                .queue_reply("get_ultra", Some("5"))
        });

        assert_eq!(rig.controller.sense_once().await.unwrap(), SenseStep::Continue);
        assert!(!rig.controller.compaction_enabled());

        assert_eq!(rig.controller.sense_once().await.unwrap(), SenseStep::Exit);
        assert_eq!(rig.controller.status(), BinStatus::Full);
        assert_eq!(rig.device.count("compaction"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_compaction_keeps_sensing() {
        let mut rig = rig(|d| {
            d.queue_reply("get_ultra", Some("5"))
                .with_reply("compaction", "jammed")
        });
        assert_eq!(rig.controller.sense_once().await.unwrap(), SenseStep::Continue);
        assert_eq!(rig.controller.status(), BinStatus::Normal);
        assert_eq!(rig.device.count("get_ultra"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn gas_over_threshold_is_biohazard_regardless_of_distance() {
        let mut rig = rig(|d| {
            d.queue_reply("get_ultra", Some("5"))
                .queue_reply("get_gas", Some("400"))
        });

        assert_eq!(rig.controller.sense_once().await.unwrap(), SenseStep::Exit);
        assert_eq!(rig.controller.status(), BinStatus::Biohazard);
        assert_eq!(
            rig.device.received(),
            ["get_ir", "close_lid", "get_ultra", "get_gas", "close_lid"]
        );
        assert_eq!(
            rig.store.peek(paths::BIN_STATUS).await,
            Some(json!("Dustbin is biohazardous. Please Collect!"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn missing_readings_skip_their_branches() {
        let mut rig = rig(|d| {
            d.queue_reply("get_ultra", None)
                .queue_reply("get_gas", Some("smoke"))
        });
        assert_eq!(rig.controller.sense_once().await.unwrap(), SenseStep::Continue);
        assert_eq!(rig.store.peek(paths::COLLECTION_STATUS).await, None);
        assert_eq!(rig.store.peek(paths::WASTE_LEVEL).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_override_is_applied_and_cleared_once() {
        let mut rig = rig(|d| d);
        rig.store.seed(paths::MANUAL_CONTROL, json!("OpenLid")).await;

        rig.controller.sense_once().await.unwrap();
        rig.controller.sense_once().await.unwrap();

        assert_eq!(rig.device.count("open_lid"), 1);
        assert_eq!(rig.store.removals_of(paths::MANUAL_CONTROL).await, 1);
        assert_eq!(rig.store.peek(paths::MANUAL_CONTROL).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_compaction_runs_the_compactor() {
        let mut rig = rig(|d| d);
        rig.store
            .seed(paths::MANUAL_CONTROL, json!("Compaction"))
            .await;
        rig.controller.sense_once().await.unwrap();
        assert_eq!(rig.device.count("compaction"), 1);
        assert_eq!(rig.store.removals_of(paths::MANUAL_CONTROL).await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_manual_control_is_left_alone() {
        let mut rig = rig(|d| d);
        rig.store.seed(paths::MANUAL_CONTROL, json!("Dance")).await;
        rig.controller.sense_once().await.unwrap();
        assert_eq!(rig.store.removals_of(paths::MANUAL_CONTROL).await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn registration_writes_user_and_clears_request() {
        let mut rig = rig(|d| d);
        rig.store.seed(paths::REGISTER_REQUEST, json!("true")).await;
        rig.store.seed(paths::NEXT_USER_ID, json!(7)).await;
        rig.store.seed(paths::NEXT_USER_NAME, json!("Ada")).await;

        rig.controller.tick().await.unwrap();

        assert_eq!(rig.device.count("register7"), 1);
        assert_eq!(
            rig.store.peek("users/7").await,
            Some(json!({"name": "Ada", "voted": false}))
        );
        assert_eq!(
            rig.store.peek(paths::REGISTER_REQUEST).await,
            Some(json!("false"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failed_registration_leaves_request_pending() {
        let mut rig = rig(|d| d.with_reply("register7", "registration_failed"));
        rig.store.seed(paths::REGISTER_REQUEST, json!("true")).await;
        rig.store.seed(paths::NEXT_USER_ID, json!("7")).await;
        rig.store.seed(paths::NEXT_USER_NAME, json!("Ada")).await;

        rig.controller.tick().await.unwrap();

        assert_eq!(rig.device.count("register7"), 3);
        assert_eq!(rig.store.peek("users/7").await, None);
        assert_eq!(
            rig.store.peek(paths::REGISTER_REQUEST).await,
            Some(json!("true"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn registration_without_name_is_skipped() {
        let mut rig = rig(|d| d);
        rig.store.seed(paths::REGISTER_REQUEST, json!("true")).await;
        rig.store.seed(paths::NEXT_USER_ID, json!("7")).await;

        rig.controller.tick().await.unwrap();
        assert_eq!(rig.device.count("register7"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn biohazard_holds_until_fingerprint_verified_then_sterilises() {
        let mut rig = rig(|d| d);
        into_biohazard(&mut rig).await;

        // Not armed: readings only, the lid is never touched.
        rig.controller.tick().await.unwrap();
        assert_eq!(rig.device.received(), ["get_ultra", "get_gas"]);
        rig.device.clear_received();

        // A boolean `true` is not the armed string.
        rig.store.seed(paths::VERIFY, json!(true)).await;
        rig.controller.tick().await.unwrap();
        assert_eq!(rig.device.received(), ["get_ultra", "get_gas"]);
        rig.device.clear_received();

        rig.store.seed(paths::VERIFY, json!("True")).await;
        rig.controller.tick().await.unwrap();
        assert_eq!(
            rig.device.received(),
            ["verify", "open_lid", "get_ultra", "get_gas"]
        );
        assert!(rig.controller.is_biometric_cleared());
        assert_eq!(rig.store.peek(paths::VERIFY).await, Some(json!("False")));
        assert_eq!(rig.controller.status(), BinStatus::Biohazard);

        rig.store
            .seed(paths::COLLECTION_STATUS, json!(paths::WASTE_COLLECTED))
            .await;
        rig.device.clear_received();
        rig.controller.tick().await.unwrap();

        assert_eq!(rig.device.received()[0], "uv_led");
        assert_eq!(rig.controller.status(), BinStatus::Normal);
        assert!(!rig.controller.is_biometric_cleared());
        assert!(
            rig.store
                .writes_to(paths::COLLECTION_STATUS)
                .await
                .contains(&json!(paths::READY_FOR_USE))
        );
        assert!(
            rig.store
                .writes_to(paths::BIN_STATUS)
                .await
                .contains(&json!("Dustbin Sterilizing"))
        );
        assert!(rig.store.peek("Dustbins/bin-1/lastCollectedAt").await.is_some());
        assert_eq!(
            rig.store.peek("Dustbins/bin-1/lastCollectedHours").await,
            Some(json!(0))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn clearance_survives_persistent_gas_until_collection() {
        let mut rig = rig(|d| d.with_reply("get_gas", "450"));
        into_biohazard(&mut rig).await;

        rig.store.seed(paths::VERIFY, json!("True")).await;
        rig.controller.tick().await.unwrap();
        assert!(rig.controller.is_biometric_cleared());

        // Gas is still high, but the crew must keep access until collection.
        rig.device.clear_received();
        rig.controller.tick().await.unwrap();
        rig.controller.tick().await.unwrap();
        assert!(rig.controller.is_biometric_cleared());
        assert_eq!(rig.device.count("close_lid"), 0);
        assert_eq!(rig.device.count("verify"), 0);
        assert_eq!(rig.controller.status(), BinStatus::Biohazard);

        rig.store
            .seed(paths::COLLECTION_STATUS, json!(paths::WASTE_COLLECTED))
            .await;
        rig.controller.tick().await.unwrap();
        assert_eq!(rig.device.count("uv_led"), 1);
        assert!(
            rig.store
                .writes_to(paths::COLLECTION_STATUS)
                .await
                .contains(&json!(paths::READY_FOR_USE))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn collection_without_approval_does_not_sterilise() {
        let mut rig = rig(|d| d);
        into_biohazard(&mut rig).await;
        rig.store
            .seed(paths::COLLECTION_STATUS, json!(paths::WASTE_COLLECTED))
            .await;

        rig.controller.tick().await.unwrap();

        assert_eq!(rig.device.count("uv_led"), 0);
        assert_eq!(rig.controller.status(), BinStatus::Biohazard);
        assert_eq!(
            rig.store.peek(paths::COLLECTION_STATUS).await,
            Some(json!(paths::WASTE_COLLECTED))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn manual_override_is_served_while_biohazardous() {
        let mut rig = rig(|d| d);
        into_biohazard(&mut rig).await;
        rig.store.seed(paths::MANUAL_CONTROL, json!("OpenLid")).await;

        rig.controller.tick().await.unwrap();

        assert_eq!(rig.device.count("open_lid"), 1);
        assert_eq!(rig.store.removals_of(paths::MANUAL_CONTROL).await, 1);
        assert!(!rig.controller.is_biometric_cleared());
    }

    #[tokio::test(start_paused = true)]
    async fn denied_fingerprint_keeps_bin_locked() {
        let mut rig = rig(|d| d.with_reply("verify", "denied"));
        into_biohazard(&mut rig).await;
        rig.store.seed(paths::VERIFY, json!("True")).await;

        rig.controller.tick().await.unwrap();

        assert_eq!(rig.device.count("verify"), 5);
        assert_eq!(rig.device.count("open_lid"), 0);
        assert!(!rig.controller.is_biometric_cleared());
        assert_eq!(rig.store.peek(paths::VERIFY).await, Some(json!("True")));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_sterilisation_restores_previous_status() {
        let mut rig = rig(|d| {
            d.queue_reply("get_ultra", Some("5"))
                .queue_reply("get_ultra", Some("8"))
        });
        rig.controller.sense_once().await.unwrap();
        assert_eq!(rig.controller.status(), BinStatus::Full);

        rig.device.silence("uv_led");
        rig.store
            .seed(paths::COLLECTION_STATUS, json!(paths::WASTE_COLLECTED))
            .await;
        rig.device.clear_received();
        rig.controller.tick().await.unwrap();

        assert_eq!(rig.device.received(), ["uv_led"]);
        assert_eq!(rig.controller.status(), BinStatus::Full);
    }

    #[tokio::test(start_paused = true)]
    async fn store_outage_does_not_stop_sensing() {
        let mut rig = rig(|d| d);
        rig.store.set_failing(true);
        rig.controller.tick().await.unwrap();
        assert_eq!(rig.device.count("get_ultra"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failure_aborts_tick_but_not_the_loop() {
        // No device listening: every publish fails.
        let bus = LoopbackBus::default();
        let (transport, _receive) = bus.connect();
        let store = Arc::new(MemoryStore::new());
        let mut controller = BinController::new(
            DeviceOps::new(Arc::new(transport)),
            StateAdapter::new(store),
            test_config(),
        );

        assert!(matches!(
            controller.tick().await,
            Err(BinError::Transport(_))
        ));

        let shutdown = controller.shutdown_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            shutdown.store(true, Ordering::Release);
        });
        controller.run().await;
        assert_eq!(controller.status(), BinStatus::Normal);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_closes_the_lid() {
        let mut rig = rig(|d| d);
        rig.controller.shutdown_handle().store(true, Ordering::Release);
        rig.controller.run().await;
        assert_eq!(rig.device.received(), ["close_lid"]);
    }

    #[tokio::test(start_paused = true)]
    async fn startup_closes_lid_and_publishes_status() {
        let mut rig = rig(|d| d);
        rig.controller.startup().await.unwrap();
        assert_eq!(rig.device.received(), ["close_lid"]);
        assert_eq!(
            rig.store.peek(paths::BIN_STATUS).await,
            Some(json!("Dustbin Ready"))
        );
    }
}
