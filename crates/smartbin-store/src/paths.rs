//! Key paths in the shared store.

/// Latest ultrasonic distance reading.
pub const WASTE_LEVEL: &str = "WasteLevel";
/// Latest gas sensor reading.
pub const GAS_LEVEL: &str = "GasLevel";
/// Human-readable bin status.
pub const BIN_STATUS: &str = "Dustbin/Status";
/// Biometric verification arm flag, stored as the string `"True"`/`"False"`.
pub const VERIFY: &str = "Dustbin/verify";
/// Fill / collection state shared with the collection crew.
pub const COLLECTION_STATUS: &str = "DustbinStatus";
/// Operator override: `Compaction`, `OpenLid` or `CloseLid`.
pub const MANUAL_CONTROL: &str = "ManualControl";
/// Registration request flag, stored as the string `"true"`/`"false"`.
pub const REGISTER_REQUEST: &str = "users/register";
pub const NEXT_USER_ID: &str = "users/next_user_id";
pub const NEXT_USER_NAME: &str = "users/next_user_name";

// Values of the collection field.
pub const NOT_FULL: &str = "Dustbin Not Full";
pub const WASTE_COLLECTED: &str = "Waste Collected";
pub const READY_FOR_USE: &str = "Ready for use";

/// Record for an enrolled user.
pub fn user(id: &str) -> String {
    format!("users/{id}")
}

/// Per-bin history field read by the time-to-full predictor.
pub fn bin_history(bin_id: &str, field: &str) -> String {
    format!("Dustbins/{bin_id}/{field}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dynamic_paths() {
        assert_eq!(user("17"), "users/17");
        assert_eq!(bin_history("bin-1", "fillLevel"), "Dustbins/bin-1/fillLevel");
    }
}
