//! Configuration loading for DishaConsole

use crate::calibration::{AutoCalSettings, CalibrationSettings, Precision};
use crate::channel::ChannelSettings;
use crate::error::{Error, Result};
use crate::robot::{RobotSettings, MAX_WHEEL_SPEED};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub robot: RobotConfig,
    #[serde(default)]
    pub calibration: CalibrationConfig,
    #[serde(default)]
    pub mapping: MappingConfig,
}

/// Serial link settings
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SerialConfig {
    /// Serial device path (default: /dev/ttyUSB0)
    #[serde(default = "default_port")]
    pub port: String,

    /// Baud rate (default: 38400)
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Response timeout in milliseconds (default: 2000)
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,

    /// Read the firmware banner after opening the port (default: true)
    #[serde(default = "default_true")]
    pub read_greeting: bool,

    /// Transcript lines kept in memory (default: 500)
    #[serde(default = "default_transcript_capacity")]
    pub transcript_capacity: usize,
}

/// Robot motion parameters
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RobotConfig {
    /// Wheel speed used by hold-to-drive (default: 90)
    #[serde(default = "default_drive_speed")]
    pub drive_speed: i32,

    /// Angle between scan samples in degrees (default: 1.0)
    #[serde(default = "default_scan_step")]
    pub scan_angle_step_deg: f64,
}

/// Magnetometer calibration
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CalibrationConfig {
    /// Time between samples in milliseconds (default: 200)
    #[serde(default = "default_interval")]
    pub interval_ms: u64,

    /// Samples per run (default: 50)
    #[serde(default = "default_repeat_count")]
    pub repeat_count: u32,

    /// "integer" (default) or "float"
    #[serde(default)]
    pub precision: Precision,

    #[serde(default)]
    pub auto: AutoCalConfig,
}

/// Spin-and-sample calibration
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AutoCalConfig {
    /// Number of spin/sample steps (default: 10)
    #[serde(default = "default_auto_steps")]
    pub steps: u32,

    /// Spin wheel speed (default: 90)
    #[serde(default = "default_drive_speed")]
    pub spin_speed: i32,

    /// Spin time per step in milliseconds (default: 500)
    #[serde(default = "default_spin_ms")]
    pub spin_ms: u64,

    /// Pause before sampling in milliseconds (default: 200)
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

/// Scan mapping
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct MappingConfig {
    /// Readings below this are dropped (default: 15.0)
    #[serde(default = "default_min_distance")]
    pub min_distance_cm: f64,

    /// Clear the pole list before mapping each scan (default: false)
    #[serde(default)]
    pub clear_poles_on_scan: bool,

    /// Random bright colour per scan instead of magenta (default: false)
    #[serde(default)]
    pub color_per_scan: bool,
}

// Default value functions
fn default_port() -> String {
    "/dev/ttyUSB0".to_string()
}
fn default_baud_rate() -> u32 {
    38400
}
fn default_timeout() -> u64 {
    2000
}
fn default_true() -> bool {
    true
}
fn default_transcript_capacity() -> usize {
    500
}
fn default_drive_speed() -> i32 {
    90
}
fn default_scan_step() -> f64 {
    1.0
}
fn default_interval() -> u64 {
    200
}
fn default_repeat_count() -> u32 {
    50
}
fn default_auto_steps() -> u32 {
    10
}
fn default_spin_ms() -> u64 {
    500
}
fn default_settle_ms() -> u64 {
    200
}
fn default_min_distance() -> f64 {
    crate::mapping::DEFAULT_MIN_DISTANCE_CM
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            baud_rate: default_baud_rate(),
            timeout_ms: default_timeout(),
            read_greeting: default_true(),
            transcript_capacity: default_transcript_capacity(),
        }
    }
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            drive_speed: default_drive_speed(),
            scan_angle_step_deg: default_scan_step(),
        }
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval(),
            repeat_count: default_repeat_count(),
            precision: Precision::default(),
            auto: AutoCalConfig::default(),
        }
    }
}

impl Default for AutoCalConfig {
    fn default() -> Self {
        Self {
            steps: default_auto_steps(),
            spin_speed: default_drive_speed(),
            spin_ms: default_spin_ms(),
            settle_ms: default_settle_ms(),
        }
    }
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            min_distance_cm: default_min_distance(),
            clear_poles_on_scan: false,
            color_per_scan: false,
        }
    }
}

impl Config {
    /// Load and validate configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the session cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.serial.baud_rate == 0 {
            return Err(Error::Config("serial.baud_rate must be positive".into()));
        }
        if self.calibration.repeat_count == 0 {
            return Err(Error::Config(
                "calibration.repeat_count must be positive".into(),
            ));
        }
        let step = self.robot.scan_angle_step_deg;
        if step.is_nan() || step <= 0.0 {
            return Err(Error::Config(
                "robot.scan_angle_step_deg must be positive".into(),
            ));
        }
        for (name, speed) in [
            ("robot.drive_speed", self.robot.drive_speed),
            ("calibration.auto.spin_speed", self.calibration.auto.spin_speed),
        ] {
            if !(0..=MAX_WHEEL_SPEED).contains(&speed) {
                return Err(Error::Config(format!(
                    "{} must be within 0..={}",
                    name, MAX_WHEEL_SPEED
                )));
            }
        }
        Ok(())
    }

    /// Serialize back to TOML
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn channel_settings(&self) -> ChannelSettings {
        ChannelSettings {
            timeout: Duration::from_millis(self.serial.timeout_ms),
            transcript_capacity: self.serial.transcript_capacity,
        }
    }

    pub fn robot_settings(&self) -> RobotSettings {
        RobotSettings {
            scan_angle_step_deg: self.robot.scan_angle_step_deg,
        }
    }

    pub fn calibration_settings(&self) -> CalibrationSettings {
        CalibrationSettings {
            interval: Duration::from_millis(self.calibration.interval_ms),
            repeat_count: self.calibration.repeat_count,
            precision: self.calibration.precision,
        }
    }

    pub fn autocal_settings(&self) -> AutoCalSettings {
        let auto = &self.calibration.auto;
        AutoCalSettings {
            steps: auto.steps,
            spin_speed: auto.spin_speed,
            spin: Duration::from_millis(auto.spin_ms),
            settle: Duration::from_millis(auto.settle_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.serial.baud_rate, 38400);
        assert_eq!(config.serial.timeout_ms, 2000);
        assert_eq!(config.calibration.repeat_count, 50);
        assert_eq!(config.calibration.precision, Precision::Integer);
        assert_eq!(config.mapping.min_distance_cm, 15.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[serial]
port = "/dev/ttyACM0"

[calibration]
repeat_count = 20
precision = "float"

[calibration.auto]
steps = 4
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.serial.port, "/dev/ttyACM0");
        assert_eq!(config.serial.baud_rate, 38400);
        assert_eq!(config.calibration.repeat_count, 20);
        assert_eq!(config.calibration.precision, Precision::Float);
        assert_eq!(config.calibration.auto.steps, 4);
        assert_eq!(config.calibration.auto.spin_ms, 500);
        assert_eq!(config.robot.drive_speed, 90);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = Config::default();
        config.calibration.repeat_count = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = Config::default();
        config.robot.scan_angle_step_deg = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.robot.drive_speed = 150;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[serial\nport = 3").unwrap();
        assert!(matches!(
            Config::load(file.path()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_to_toml_round_trips() {
        let text = Config::default().to_toml().unwrap();
        assert!(text.contains("[calibration.auto]"));
        assert!(text.contains("precision = \"integer\""));
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back.serial.port, "/dev/ttyUSB0");
    }

    #[test]
    fn test_missing_file() {
        let err = Config::load(Path::new("/nonexistent/disha.toml")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
