//! `smartbin` – the smart waste bin controller.
//!
//! This binary:
//!
//! 1. Loads `~/.smartbin/config.toml` (or `$SMARTBIN_CONFIG`) and applies
//!    `SMARTBIN_*` environment overrides.
//! 2. Connects to the MQTT broker and the Realtime Database, or, with
//!    `simulate = true`, to an in-process simulated device and memory store.
//! 3. Closes the lid, optionally wipes enrolled fingerprints, and runs the bin
//!    controller until **Ctrl-C**, after which the lid is closed again.

mod config;

use colored::Colorize;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use smartbin_hal::{DeviceOps, SimDevice};
use smartbin_runtime::{BinController, init_tracing};
use smartbin_store::{FirebaseStore, MemoryStore, SharedStore, StateAdapter};
use smartbin_transport::{LoopbackBus, MqttLink, Transport};
use smartbin_types::BinError;

/// Live connections the controller runs on.
struct Wiring {
    transport: Transport,
    store: Arc<dyn SharedStore>,
    mqtt: Option<MqttLink>,
    tasks: Vec<JoinHandle<()>>,
}

fn main() {
    let _telemetry = init_tracing("smartbin");

    print_banner();

    let cfg = match config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{}: {}", "Config error".red(), e);
            std::process::exit(1);
        }
    };
    if let Err(e) = cfg.validate() {
        eprintln!("{}: {}", "Config error".red(), e);
        eprintln!(
            "  Edit {} or set {}.",
            config::config_path().display().to_string().bold(),
            "SMARTBIN_DATABASE_URL".bold()
        );
        std::process::exit(1);
    }
    info!(config = ?cfg, "configuration loaded");

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: {}", "Failed to start async runtime".red(), e);
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(cfg)) {
        error!(error = %e, "controller stopped with an error");
        std::process::exit(1);
    }
}

async fn run(cfg: config::Config) -> Result<(), BinError> {
    let wiring = if cfg.simulate {
        println!("  Mode: {}", "simulated device + in-memory store".yellow());
        wire_simulation()
    } else {
        println!(
            "  Broker: {}  Database: {}",
            format!("{}:{}", cfg.mqtt_broker, cfg.mqtt_port).bold(),
            cfg.database_url.bold()
        );
        wire_live(&cfg)?
    };

    let device = DeviceOps::new(Arc::new(wiring.transport));
    let state = StateAdapter::new(wiring.store);
    let mut controller = BinController::new(device, state, cfg.controller_config());

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let shutdown = controller.shutdown_handle();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – closing the lid and stopping …".yellow().bold());
        shutdown.store(true, Ordering::Release);
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler; stop the process to exit");
    }

    if let Err(e) = controller.startup().await {
        warn!(error = %e, "startup lid close failed; continuing");
    }

    if cfg.clear_users_on_start {
        match controller.device().clear_users().await {
            Ok(response) => info!(response = ?response, "fingerprint database wipe requested"),
            Err(e) => warn!(error = %e, "could not wipe fingerprint database"),
        }
    }

    println!("  {} Controller running. Press Ctrl-C to stop.\n", "✓".green().bold());
    controller.run().await;

    if let Some(link) = wiring.mqtt
        && let Err(e) = link.disconnect().await
    {
        warn!(error = %e, "MQTT disconnect failed");
    }
    for task in wiring.tasks {
        task.abort();
    }
    println!("{}", "  ✓ Lid closed. Exiting smartbin.".green());
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Wiring
// ─────────────────────────────────────────────────────────────────────────────

fn wire_live(cfg: &config::Config) -> Result<Wiring, BinError> {
    let client_id = format!("smartbin-{}", uuid::Uuid::new_v4());
    let settings = cfg.mqtt_settings(&client_id);
    let (transport, link, receive) = MqttLink::transport(&settings);

    let store = FirebaseStore::new(cfg.database_url.clone(), cfg.database_auth())?;

    Ok(Wiring {
        transport,
        store: Arc::new(store),
        mqtt: Some(link),
        tasks: vec![receive],
    })
}

fn wire_simulation() -> Wiring {
    let bus = LoopbackBus::default();
    let device = SimDevice::healthy(&bus).spawn();
    let (transport, receive) = bus.connect();
    Wiring {
        transport,
        store: Arc::new(MemoryStore::new()),
        mqtt: None,
        tasks: vec![device, receive],
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("  {} {}",
        "smartbin".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Smart waste bin controller");
    println!();
}
