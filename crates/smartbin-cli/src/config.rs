//! Controller configuration – reads `~/.smartbin/config.toml`.

use serde::Deserialize;
use smartbin_runtime::BinControllerConfig;
use smartbin_transport::MqttSettings;
use smartbin_types::BinError;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Persisted controller configuration. Every field has a default, so a
/// missing file and an empty file behave the same.
#[derive(Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_mqtt_broker")]
    pub mqtt_broker: String,

    #[serde(default = "default_mqtt_port")]
    pub mqtt_port: u16,

    /// MQTT client id. Empty means `smartbin-{random uuid}`.
    #[serde(default)]
    pub mqtt_client_id: String,

    #[serde(default = "default_command_topic")]
    pub command_topic: String,

    #[serde(default = "default_response_topic")]
    pub response_topic: String,

    /// Realtime Database base URL, e.g. `https://<project>.firebaseio.com`.
    #[serde(default)]
    pub database_url: String,

    /// Database secret or ID token sent as the `auth` query parameter.
    #[serde(default)]
    pub database_auth: String,

    #[serde(default = "default_bin_id")]
    pub bin_id: String,

    #[serde(default = "default_original_level_cm")]
    pub original_level_cm: u32,

    #[serde(default = "default_fill_threshold_cm")]
    pub fill_threshold_cm: u32,

    #[serde(default = "default_gas_threshold")]
    pub gas_threshold: u32,

    #[serde(default = "default_efficiency_threshold")]
    pub efficiency_threshold: f64,

    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    #[serde(default = "default_compaction_settle_ms")]
    pub compaction_settle_ms: u64,

    #[serde(default = "default_sensing_interval_ms")]
    pub sensing_interval_ms: u64,

    /// Sensing passes per tick before registration is checked again.
    /// `0` senses until the bin is full or biohazardous.
    #[serde(default = "default_max_sensing_passes")]
    pub max_sensing_passes: u32,

    /// Run against the simulated device and an in-memory store.
    #[serde(default)]
    pub simulate: bool,

    /// Wipe the fingerprint database once at startup.
    #[serde(default)]
    pub clear_users_on_start: bool,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("mqtt_broker", &self.mqtt_broker)
            .field("mqtt_port", &self.mqtt_port)
            .field("mqtt_client_id", &self.mqtt_client_id)
            .field("command_topic", &self.command_topic)
            .field("response_topic", &self.response_topic)
            .field("database_url", &self.database_url)
            .field(
                "database_auth",
                if self.database_auth.is_empty() { &"<not set>" } else { &"<redacted>" },
            )
            .field("bin_id", &self.bin_id)
            .field("original_level_cm", &self.original_level_cm)
            .field("fill_threshold_cm", &self.fill_threshold_cm)
            .field("gas_threshold", &self.gas_threshold)
            .field("efficiency_threshold", &self.efficiency_threshold)
            .field("tick_interval_ms", &self.tick_interval_ms)
            .field("compaction_settle_ms", &self.compaction_settle_ms)
            .field("sensing_interval_ms", &self.sensing_interval_ms)
            .field("max_sensing_passes", &self.max_sensing_passes)
            .field("simulate", &self.simulate)
            .field("clear_users_on_start", &self.clear_users_on_start)
            .finish()
    }
}

fn default_mqtt_broker() -> String {
    "broker.hivemq.com".to_string()
}
fn default_mqtt_port() -> u16 {
    1883
}
fn default_command_topic() -> String {
    "smartdustbin/commands".to_string()
}
fn default_response_topic() -> String {
    "smartdustbin/responses".to_string()
}
fn default_bin_id() -> String {
    "bin-1".to_string()
}
fn default_original_level_cm() -> u32 {
    100
}
fn default_fill_threshold_cm() -> u32 {
    10
}
fn default_gas_threshold() -> u32 {
    400
}
fn default_efficiency_threshold() -> f64 {
    8.0
}
fn default_tick_interval_ms() -> u64 {
    1500
}
fn default_compaction_settle_ms() -> u64 {
    2000
}
fn default_sensing_interval_ms() -> u64 {
    250
}
fn default_max_sensing_passes() -> u32 {
    40
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mqtt_broker: default_mqtt_broker(),
            mqtt_port: default_mqtt_port(),
            mqtt_client_id: String::new(),
            command_topic: default_command_topic(),
            response_topic: default_response_topic(),
            database_url: String::new(),
            database_auth: String::new(),
            bin_id: default_bin_id(),
            original_level_cm: default_original_level_cm(),
            fill_threshold_cm: default_fill_threshold_cm(),
            gas_threshold: default_gas_threshold(),
            efficiency_threshold: default_efficiency_threshold(),
            tick_interval_ms: default_tick_interval_ms(),
            compaction_settle_ms: default_compaction_settle_ms(),
            sensing_interval_ms: default_sensing_interval_ms(),
            max_sensing_passes: default_max_sensing_passes(),
            simulate: false,
            clear_users_on_start: false,
        }
    }
}

impl Config {
    pub fn controller_config(&self) -> BinControllerConfig {
        BinControllerConfig {
            bin_id: self.bin_id.clone(),
            original_level_cm: self.original_level_cm,
            fill_threshold_cm: self.fill_threshold_cm,
            gas_threshold: self.gas_threshold,
            efficiency_threshold: self.efficiency_threshold,
            tick_interval: Duration::from_millis(self.tick_interval_ms),
            compaction_settle: Duration::from_millis(self.compaction_settle_ms),
            sensing_interval: Duration::from_millis(self.sensing_interval_ms),
            max_sensing_passes: (self.max_sensing_passes > 0).then_some(self.max_sensing_passes),
        }
    }

    /// Broker settings; `fallback_client_id` is used when none is configured.
    pub fn mqtt_settings(&self, fallback_client_id: &str) -> MqttSettings {
        let client_id = if self.mqtt_client_id.is_empty() {
            fallback_client_id.to_string()
        } else {
            self.mqtt_client_id.clone()
        };
        MqttSettings {
            broker: self.mqtt_broker.clone(),
            port: self.mqtt_port,
            client_id,
            command_topic: self.command_topic.clone(),
            response_topic: self.response_topic.clone(),
            ..MqttSettings::default()
        }
    }

    pub fn database_auth(&self) -> Option<String> {
        (!self.database_auth.is_empty()).then(|| self.database_auth.clone())
    }

    /// Reject settings the controller cannot start with.
    ///
    /// # Errors
    ///
    /// Returns [`BinError::Config`] naming the offending field.
    pub fn validate(&self) -> Result<(), BinError> {
        if !self.simulate && self.database_url.is_empty() {
            return Err(BinError::Config(
                "database_url must be set unless simulate = true".to_string(),
            ));
        }
        if self.fill_threshold_cm >= self.original_level_cm {
            return Err(BinError::Config(format!(
                "fill_threshold_cm ({}) must be below original_level_cm ({})",
                self.fill_threshold_cm, self.original_level_cm
            )));
        }
        if self.bin_id.is_empty() {
            return Err(BinError::Config("bin_id must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Path of the config file: `SMARTBIN_CONFIG` if set, else
/// `~/.smartbin/config.toml`.
pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("SMARTBIN_CONFIG") {
        return PathBuf::from(path);
    }
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".smartbin").join("config.toml")
}

/// Load the config from [`config_path`], falling back to defaults when the
/// file does not exist. Environment overrides are applied either way.
pub fn load() -> Result<Config, BinError> {
    let mut cfg = load_from(&config_path())?.unwrap_or_default();
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Parse a config file. Returns `None` if it does not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, BinError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        BinError::Config(format!("failed to read config at {}: {}", path.display(), e))
    })?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| BinError::Config(format!("failed to parse config: {}", e)))?;
    Ok(Some(cfg))
}

/// Apply `SMARTBIN_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `SMARTBIN_MQTT_BROKER` | `mqtt_broker` |
/// | `SMARTBIN_MQTT_PORT` | `mqtt_port` |
/// | `SMARTBIN_DATABASE_URL` | `database_url` |
/// | `SMARTBIN_DATABASE_AUTH` | `database_auth` |
/// | `SMARTBIN_BIN_ID` | `bin_id` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("SMARTBIN_MQTT_BROKER") {
        cfg.mqtt_broker = v;
    }
    if let Ok(v) = std::env::var("SMARTBIN_MQTT_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.mqtt_port = port;
    }
    if let Ok(v) = std::env::var("SMARTBIN_DATABASE_URL") {
        cfg.database_url = v;
    }
    if let Ok(v) = std::env::var("SMARTBIN_DATABASE_AUTH") {
        cfg.database_auth = v;
    }
    if let Ok(v) = std::env::var("SMARTBIN_BIN_ID") {
        cfg.bin_id = v;
    }
}
