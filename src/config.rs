// Calibration constants, topics, brick configuration
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

// Empirical timing constants (milliseconds)
// Time needed to turn approximately 1 degree
pub const TURN_MS_PER_DEGREE: u64 = 22;
// Spin-up time before a turn reaches speed, in degree units
pub const TURN_STARTUP_OFFSET: u64 = 20;
// Time needed to drive approximately 1 millimeter
pub const DRIVE_MS_PER_MM: u64 = 24;
// Spin-up time before driving reaches speed, in millimeter units
pub const DRIVE_STARTUP_OFFSET: u64 = 15;
// Time needed to raise or lower the catch bar
pub const ARM_TRAVEL_MS: u64 = 1200;

// Speeds applied once at start-up (degrees per second)
// The timing constants above are only valid at these speeds
pub const DRIVE_SPEED: u16 = 100;
pub const ARM_SPEED: u16 = 50;

// Zenoh topics
pub const TOPIC_CMD_MOTION: &str = "nxt/cmd/motion"; // commands
pub const TOPIC_MOTION_REPORT: &str = "nxt/state/motion"; // one report per executed command

// Brick configuration
// Serial port of the NXT (Bluetooth SPP)
pub const BRICK_PORT: &str = "/dev/rfcomm0";

// Enable hardware motor control (set to false for simulation/testing)
pub const MOTOR_ENABLED: bool = true;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read calibration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid calibration file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Timing calibration for one robot.
///
/// Every field is optional in a calibration file; missing keys keep the
/// compiled-in defaults above.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Calibration {
    pub turn_ms_per_degree: u64,
    pub turn_startup_offset: u64,
    pub drive_ms_per_mm: u64,
    pub drive_startup_offset: u64,
    pub arm_travel_ms: u64,
    pub drive_speed: u16,
    pub arm_speed: u16,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            turn_ms_per_degree: TURN_MS_PER_DEGREE,
            turn_startup_offset: TURN_STARTUP_OFFSET,
            drive_ms_per_mm: DRIVE_MS_PER_MM,
            drive_startup_offset: DRIVE_STARTUP_OFFSET,
            arm_travel_ms: ARM_TRAVEL_MS,
            drive_speed: DRIVE_SPEED,
            arm_speed: ARM_SPEED,
        }
    }
}

impl Calibration {
    /// Load overrides from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let calibration = Self::from_json(&text)?;
        info!("Loaded calibration from {}: {:?}", path.display(), calibration);
        Ok(calibration)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Wait for a straight drive: ms_per_mm * (distance + startup offset)
    pub fn drive_duration(&self, distance_mm: u32) -> Duration {
        linear_wait(self.drive_ms_per_mm, distance_mm, self.drive_startup_offset)
    }

    /// Wait for an in-place turn: ms_per_degree * (degrees + startup offset)
    pub fn turn_duration(&self, degrees: u32) -> Duration {
        linear_wait(self.turn_ms_per_degree, degrees, self.turn_startup_offset)
    }

    pub fn arm_duration(&self) -> Duration {
        Duration::from_millis(self.arm_travel_ms)
    }
}

fn linear_wait(ms_per_unit: u64, magnitude: u32, startup_offset: u64) -> Duration {
    let units = u64::from(magnitude).saturating_add(startup_offset);
    Duration::from_millis(ms_per_unit.saturating_mul(units))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drive_duration_matches_calibration() {
        let cal = Calibration::default();
        assert_eq!(cal.drive_duration(100), Duration::from_millis(2760));
        // Zero distance still waits for spin-up
        assert_eq!(cal.drive_duration(0), Duration::from_millis(24 * 15));
    }

    #[test]
    fn test_turn_duration_matches_calibration() {
        let cal = Calibration::default();
        assert_eq!(cal.turn_duration(90), Duration::from_millis(2420));
        assert_eq!(cal.turn_duration(0), Duration::from_millis(440));
    }

    #[test]
    fn test_arm_duration_is_fixed() {
        assert_eq!(
            Calibration::default().arm_duration(),
            Duration::from_millis(1200)
        );
    }

    #[test]
    fn test_durations_saturate() {
        let cal = Calibration {
            drive_ms_per_mm: u64::MAX,
            ..Calibration::default()
        };
        assert_eq!(cal.drive_duration(u32::MAX), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let cal = Calibration::from_json(r#"{"drive_ms_per_mm": 30, "drive_speed": 900, "arm_speed": 40}"#)
            .unwrap();
        assert_eq!(cal.drive_ms_per_mm, 30);
        assert_eq!(cal.drive_speed, 900);
        assert_eq!(cal.arm_speed, 40);
        assert_eq!(cal.turn_ms_per_degree, TURN_MS_PER_DEGREE);
        assert_eq!(cal.drive_startup_offset, DRIVE_STARTUP_OFFSET);
        assert_eq!(cal.arm_travel_ms, ARM_TRAVEL_MS);
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let err = Calibration::from_json(r#"{"drive_ms_per_mm": -3}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = Calibration::from_file("/nonexistent/calibration.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
