//! Hands-free calibration: spin in place between samples

use super::{CalibrationBounds, CalibrationEngine};
use crate::error::{Error, Result};
use crate::robot::RobotController;
use std::thread;
use std::time::Duration;

/// Spin-and-sample parameters
#[derive(Debug, Clone)]
pub struct AutoCalSettings {
    /// Number of spin/sample steps
    pub steps: u32,
    /// Wheel speed while spinning (left = +speed, right = -speed)
    pub spin_speed: i32,
    pub spin: Duration,
    /// Pause after stopping so the reading is not taken mid-motion
    pub settle: Duration,
}

impl Default for AutoCalSettings {
    fn default() -> Self {
        Self {
            steps: 10,
            spin_speed: 90,
            spin: Duration::from_millis(500),
            settle: Duration::from_millis(200),
        }
    }
}

/// Runs calibration while turning the robot through a full circle
pub struct AutoCalibration {
    settings: AutoCalSettings,
}

impl AutoCalibration {
    pub fn new(settings: AutoCalSettings) -> Self {
        Self { settings }
    }

    /// Spin, stop, settle and sample `steps` times
    ///
    /// Samples fold into the engine's current bounds. If any step fails a stop
    /// is always sent before the error is returned, whatever the wheels were
    /// last acknowledged as.
    pub fn run(
        &self,
        robot: &mut RobotController,
        engine: &mut CalibrationEngine,
    ) -> Result<CalibrationBounds> {
        if engine.is_running() {
            return Err(Error::Busy("timed calibration is running"));
        }
        log::info!("Auto-calibration: {} steps", self.settings.steps);

        for step in 1..=self.settings.steps {
            if let Err(e) = self.step(robot, engine, step) {
                log::warn!("Auto-calibration failed at step {}: {}", step, e);
                if let Err(stop_err) = robot.stop() {
                    log::error!("Failed to stop wheels: {}", stop_err);
                }
                return Err(e);
            }
        }

        engine.announce_finished();
        Ok(*engine.bounds())
    }

    fn step(
        &self,
        robot: &mut RobotController,
        engine: &mut CalibrationEngine,
        step: u32,
    ) -> Result<()> {
        let speed = self.settings.spin_speed;
        robot.drive(speed, -speed)?;
        thread::sleep(self.settings.spin);
        robot.stop()?;
        thread::sleep(self.settings.settle);
        engine.measure(robot, step, self.settings.steps)?;
        Ok(())
    }
}
