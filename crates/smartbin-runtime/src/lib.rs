//! `smartbin-runtime` – the bin control loop.
//!
//! # Modules
//!
//! - [`controller`] – [`BinController`][controller::BinController]: the state
//!   machine that sequences registration, status reconciliation, sensing,
//!   compaction feedback, biohazard escalation and sterilisation on a fixed
//!   cadence.
//! - [`compaction`] – the efficiency and fill-level arithmetic that feeds the
//!   sticky compaction flag.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: global
//!   `tracing` subscriber with an optional OTLP span exporter.

pub mod compaction;
pub mod controller;
pub mod telemetry;

pub use compaction::{compaction_efficiency, fill_percent};
pub use controller::{BinController, BinControllerConfig, SenseStep};
pub use telemetry::{LogFormat, TracerProviderGuard, init_tracing};
