//! Shared vocabulary for the SmartBin workspace: the device command set, the
//! bin status machine states, and the workspace-wide error type.

use std::fmt;

use thiserror::Error;

/// Commands understood by the bin firmware.
///
/// The rendered tokens are the wire contract with the device and must not
/// change shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeviceCommand {
    /// Ultrasonic distance to the waste surface (`get_ultra`).
    GetUltra,
    /// Gas sensor level (`get_gas`).
    GetGas,
    /// Infrared presence sensor (`get_ir`).
    GetIr,
    OpenLid,
    CloseLid,
    Compaction,
    /// Sterilisation lamp cycle (`uv_led`).
    UvLed,
    /// Enrol a fingerprint for the given user id (`register{id}`).
    Register(String),
    /// Match a presented fingerprint (`verify`).
    Verify,
    /// Wipe every enrolled fingerprint (`clear_all_users`).
    ClearAllUsers,
}

impl DeviceCommand {
    /// The exact text published on the command topic.
    pub fn token(&self) -> String {
        match self {
            DeviceCommand::GetUltra => "get_ultra".to_string(),
            DeviceCommand::GetGas => "get_gas".to_string(),
            DeviceCommand::GetIr => "get_ir".to_string(),
            DeviceCommand::OpenLid => "open_lid".to_string(),
            DeviceCommand::CloseLid => "close_lid".to_string(),
            DeviceCommand::Compaction => "compaction".to_string(),
            DeviceCommand::UvLed => "uv_led".to_string(),
            DeviceCommand::Register(id) => format!("register{id}"),
            DeviceCommand::Verify => "verify".to_string(),
            DeviceCommand::ClearAllUsers => "clear_all_users".to_string(),
        }
    }

    /// Parse a wire token back into a command.
    pub fn from_token(token: &str) -> Option<Self> {
        let command = match token {
            "get_ultra" => DeviceCommand::GetUltra,
            "get_gas" => DeviceCommand::GetGas,
            "get_ir" => DeviceCommand::GetIr,
            "open_lid" => DeviceCommand::OpenLid,
            "close_lid" => DeviceCommand::CloseLid,
            "compaction" => DeviceCommand::Compaction,
            "uv_led" => DeviceCommand::UvLed,
            "verify" => DeviceCommand::Verify,
            "clear_all_users" => DeviceCommand::ClearAllUsers,
            other => {
                let id = other.strip_prefix("register")?;
                if id.is_empty() {
                    return None;
                }
                DeviceCommand::Register(id.to_string())
            }
        };
        Some(command)
    }
}

impl fmt::Display for DeviceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token())
    }
}

/// Infrared presence reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Presence {
    Detected,
    #[default]
    NotDetected,
}

impl Presence {
    /// Map a raw `get_ir` response. Anything other than the two known tokens
    /// (including no response at all) reads as [`Presence::NotDetected`].
    pub fn from_response(response: Option<&str>) -> Self {
        match response {
            Some("Detected") => Presence::Detected,
            _ => Presence::NotDetected,
        }
    }
}

/// Externally visible state of the bin, mutated only by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BinStatus {
    /// Accepting waste.
    #[default]
    Normal,
    /// Full even after compaction; waiting for collection.
    Full,
    /// Gas threshold exceeded; access is gated on fingerprint approval.
    Biohazard,
    /// UV sterilisation in progress after a collection.
    Sterilizing,
}

impl BinStatus {
    /// Human-readable text written to the status path of the shared store.
    pub fn display_text(&self) -> &'static str {
        match self {
            BinStatus::Normal => "Dustbin Ready",
            BinStatus::Full => "Dustbin Full. Please Collect!",
            BinStatus::Biohazard => "Dustbin is biohazardous. Please Collect!",
            BinStatus::Sterilizing => "Dustbin Sterilizing",
        }
    }
}

impl fmt::Display for BinStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BinStatus::Normal => "normal",
            BinStatus::Full => "full",
            BinStatus::Biohazard => "biohazard",
            BinStatus::Sterilizing => "sterilizing",
        };
        f.write_str(label)
    }
}

/// Operator override requested through the shared store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManualControl {
    Compaction,
    OpenLid,
    CloseLid,
}

impl ManualControl {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Compaction" => Some(ManualControl::Compaction),
            "OpenLid" => Some(ManualControl::OpenLid),
            "CloseLid" => Some(ManualControl::CloseLid),
            _ => None,
        }
    }
}

/// Workspace-wide error type: transport, shared store, configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BinError {
    /// Publishing a command or talking to the broker failed.
    #[error("Transport Failure: {0}")]
    Transport(String),

    #[error("Store Failure: {0}")]
    Store(String),

    #[error("Configuration Error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_tokens_match_firmware_vocabulary() {
        let expected = [
            (DeviceCommand::GetUltra, "get_ultra"),
            (DeviceCommand::GetGas, "get_gas"),
            (DeviceCommand::GetIr, "get_ir"),
            (DeviceCommand::OpenLid, "open_lid"),
            (DeviceCommand::CloseLid, "close_lid"),
            (DeviceCommand::Compaction, "compaction"),
            (DeviceCommand::UvLed, "uv_led"),
            (DeviceCommand::Register("7".to_string()), "register7"),
            (DeviceCommand::Verify, "verify"),
            (DeviceCommand::ClearAllUsers, "clear_all_users"),
        ];
        for (command, token) in expected {
            assert_eq!(command.token(), token);
            assert_eq!(DeviceCommand::from_token(token), Some(command));
        }
    }

    #[test]
    fn bare_register_token_is_rejected() {
        assert_eq!(DeviceCommand::from_token("register"), None);
        assert_eq!(DeviceCommand::from_token("dance"), None);
    }

    #[test]
    fn presence_defaults_to_not_detected() {
        assert_eq!(Presence::from_response(Some("Detected")), Presence::Detected);
        assert_eq!(
            Presence::from_response(Some("Not Detected")),
            Presence::NotDetected
        );
        assert_eq!(Presence::from_response(Some("garbage")), Presence::NotDetected);
        assert_eq!(Presence::from_response(None), Presence::NotDetected);
    }

    #[test]
    fn manual_control_parses_known_values_only() {
        assert_eq!(
            ManualControl::parse("Compaction"),
            Some(ManualControl::Compaction)
        );
        assert_eq!(ManualControl::parse("OpenLid"), Some(ManualControl::OpenLid));
        assert_eq!(ManualControl::parse("CloseLid"), Some(ManualControl::CloseLid));
        assert_eq!(ManualControl::parse("openlid"), None);
    }

    #[test]
    fn bin_status_starts_normal_and_renders_store_text() {
        assert_eq!(BinStatus::default(), BinStatus::Normal);
        assert_eq!(BinStatus::Full.display_text(), "Dustbin Full. Please Collect!");
        assert_eq!(BinStatus::Biohazard.to_string(), "biohazard");
    }

    #[test]
    fn bin_error_display() {
        let err = BinError::Transport("broker unreachable".to_string());
        assert!(err.to_string().contains("Transport Failure"));
        assert!(
            BinError::Config("bad port".to_string())
                .to_string()
                .contains("bad port")
        );
    }
}
