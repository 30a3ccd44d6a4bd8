//! Compaction feedback arithmetic.
//!
//! Fill is measured as `original_level − distance`: the ultrasonic sensor
//! sits in the lid, so a smaller distance means more waste.
//!
//! The efficiency ratio is `fill_before / fill_after × 100`. A successful
//! stroke lowers `fill_after`, so normal operation yields values above 100
//! and the "< 8 disables compaction" branch is reached only when the second
//! reading lies beyond the original level. The formula is kept as the device
//! contract defines it.

/// Efficiency of one compaction stroke, in percent.
///
/// Returns `0.0` when `fill_after` is zero.
pub fn compaction_efficiency(original_level: u32, before: u32, after: u32) -> f64 {
    let fill_before = f64::from(original_level) - f64::from(before);
    let fill_after = f64::from(original_level) - f64::from(after);
    if fill_after == 0.0 {
        return 0.0;
    }
    fill_before / fill_after * 100.0
}

/// Fill level in percent (0–100) for a distance reading.
pub fn fill_percent(original_level: u32, distance: u32) -> u32 {
    if original_level == 0 {
        return 0;
    }
    let filled = original_level.saturating_sub(distance);
    (u64::from(filled) * 100 / u64::from(original_level)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn efficiency_matches_reference_values() {
        // 60 cm of waste before, 20 cm after.
        assert!((compaction_efficiency(100, 40, 80) - 300.0).abs() < 1e-9);
        assert!((compaction_efficiency(100, 5, 45) - 95.0 / 55.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn efficiency_guards_division_by_zero() {
        assert_eq!(compaction_efficiency(100, 5, 100), 0.0);
    }

    #[test]
    fn reading_past_the_original_level_is_negative() {
        assert!(compaction_efficiency(100, 5, 150) < 8.0);
    }

    #[test]
    fn fill_percent_is_clamped() {
        assert_eq!(fill_percent(100, 40), 60);
        assert_eq!(fill_percent(100, 0), 100);
        assert_eq!(fill_percent(100, 130), 0);
        assert_eq!(fill_percent(0, 10), 0);
    }
}
