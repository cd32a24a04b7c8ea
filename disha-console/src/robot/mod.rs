//! Robot controller
//!
//! Translates intents into protocol lines, runs exactly one round trip per
//! operation, parses the reply and keeps the tracked pose and wheel command.
//! State only changes after a complete response; a timeout leaves it as is.
//! A drive line that went out without an acknowledgement marks the wheels as
//! unconfirmed, since the firmware may have acted on it.

mod pose;
pub mod protocol;

pub use pose::{RobotPose, WheelCommand};
pub use protocol::{RobotCommand, MAX_WHEEL_SPEED};

use crate::calibration::MagnetometerSource;
use crate::channel::{CommandChannel, Response};
use crate::error::{ErrorKind, Result};
use crate::types::{ScanSample, Vector3};
use std::sync::Arc;

/// Controller parameters
#[derive(Debug, Clone)]
pub struct RobotSettings {
    /// Angle between consecutive scan samples (degrees)
    pub scan_angle_step_deg: f64,
}

impl Default for RobotSettings {
    fn default() -> Self {
        Self {
            scan_angle_step_deg: 1.0,
        }
    }
}

/// High-level robot operations over a [`CommandChannel`]
pub struct RobotController {
    channel: Arc<CommandChannel>,
    pose: RobotPose,
    wheels: WheelCommand,
    wheels_unconfirmed: bool,
    settings: RobotSettings,
}

impl RobotController {
    pub fn new(channel: Arc<CommandChannel>, settings: RobotSettings) -> Self {
        Self {
            channel,
            pose: RobotPose::default(),
            wheels: WheelCommand::REST,
            wheels_unconfirmed: false,
            settings,
        }
    }

    /// Validate, send and return the stripped reply text
    fn execute(&self, command: &RobotCommand) -> Result<(String, String)> {
        command.validate()?;
        let line = command.encode();
        let reply = self.channel.round_trip(&line)?.into_text()?;
        Ok((line, reply))
    }

    /// Set differential wheel speeds, each in [-100, 100]
    pub fn drive(&mut self, left: i32, right: i32) -> Result<()> {
        if let Err(e) = self.execute(&RobotCommand::Drive { left, right }) {
            // Usage errors (validation, busy channel) never reach the wire
            if e.kind() != ErrorKind::Usage {
                self.wheels_unconfirmed = true;
                log::warn!("Drive {} / {} not acknowledged: {}", left, right, e);
            }
            return Err(e);
        }
        self.wheels = WheelCommand { left, right };
        self.wheels_unconfirmed = false;
        log::debug!("Wheels now {} / {}", left, right);
        Ok(())
    }

    pub fn stop(&mut self) -> Result<()> {
        self.drive(0, 0)
    }

    /// Drive straight; negative distances reverse
    pub fn move_by(&mut self, distance_cm: f64) -> Result<()> {
        self.execute(&RobotCommand::Move(distance_cm))?;
        self.pose.advance(distance_cm);
        Ok(())
    }

    pub fn rotate(&mut self, delta_deg: f64) -> Result<()> {
        self.execute(&RobotCommand::Rotate(delta_deg))?;
        self.pose.azimuth += delta_deg;
        Ok(())
    }

    pub fn rotate_to(&mut self, absolute_deg: f64) -> Result<()> {
        self.execute(&RobotCommand::RotateTo(absolute_deg))?;
        self.pose.azimuth = absolute_deg;
        Ok(())
    }

    pub fn rotate_tower(&mut self, angle_deg: f64) -> Result<()> {
        self.execute(&RobotCommand::Tower(angle_deg))?;
        self.pose.tower_angle = angle_deg;
        Ok(())
    }

    /// Sweep the tower; the i-th distance lies at `i * scan_angle_step_deg`
    pub fn scan(&mut self) -> Result<Vec<ScanSample>> {
        let (line, reply) = self.execute(&RobotCommand::Scan)?;
        let distances = protocol::parse_numbers(&line, &reply)?;
        let step = self.settings.scan_angle_step_deg;
        let samples: Vec<ScanSample> = distances
            .into_iter()
            .enumerate()
            .map(|(i, distance)| ScanSample::new(distance, i as f64 * step))
            .collect();
        log::info!("Scan returned {} samples", samples.len());
        Ok(samples)
    }

    /// Single range reading at the current tower angle (cm)
    pub fn get_distance(&mut self) -> Result<f64> {
        let (line, reply) = self.execute(&RobotCommand::Distance)?;
        protocol::parse_scalar(&line, &reply)
    }

    /// Read the compass heading and store it in the pose
    pub fn get_azimuth(&mut self) -> Result<f64> {
        let (line, reply) = self.execute(&RobotCommand::Azimuth)?;
        let azimuth = protocol::parse_scalar(&line, &reply)?;
        self.pose.azimuth = azimuth;
        Ok(azimuth)
    }

    pub fn get_mag(&mut self) -> Result<Vector3> {
        let (line, reply) = self.execute(&RobotCommand::Mag)?;
        protocol::parse_vector(&line, &reply)
    }

    pub fn get_mag_cal(&mut self) -> Result<Vector3> {
        let (line, reply) = self.execute(&RobotCommand::MagCal)?;
        protocol::parse_vector(&line, &reply)
    }

    pub fn beep(&mut self, frequency: u32, duration: u32) -> Result<()> {
        self.execute(&RobotCommand::Beep {
            frequency,
            duration,
        })?;
        Ok(())
    }

    pub fn print(&mut self, text: &str) -> Result<()> {
        self.execute(&RobotCommand::Print(text.to_string()))?;
        Ok(())
    }

    /// Emergency stop
    pub fn kill(&mut self) -> Result<()> {
        self.execute(&RobotCommand::Kill)?;
        self.wheels = WheelCommand::REST;
        self.wheels_unconfirmed = false;
        log::warn!("Robot killed");
        Ok(())
    }

    /// Send a line as-is and hand back whatever came back
    pub fn send_raw(&mut self, text: &str) -> Result<Response> {
        self.channel.round_trip(text)
    }

    /// Accept an externally measured position
    pub fn report_odometry(&mut self, position: (f64, f64)) {
        self.pose.position = position;
    }

    /// Accept an externally measured heading
    pub fn report_azimuth(&mut self, azimuth: f64) {
        self.pose.azimuth = azimuth;
    }

    pub fn pose(&self) -> RobotPose {
        self.pose
    }

    /// Last acknowledged wheel command
    pub fn wheels(&self) -> WheelCommand {
        self.wheels
    }

    /// True unless the last wheel command was an acknowledged stop
    pub fn may_be_moving(&self) -> bool {
        self.wheels_unconfirmed || !self.wheels.is_at_rest()
    }

    pub fn channel(&self) -> &Arc<CommandChannel> {
        &self.channel
    }

    pub fn settings(&self) -> &RobotSettings {
        &self.settings
    }
}

impl MagnetometerSource for RobotController {
    fn read_mag(&mut self) -> Result<Vector3> {
        self.get_mag()
    }
}
