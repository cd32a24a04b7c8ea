//! Simulated robot firmware for hardware-free sessions
//!
//! Speaks the same line protocol as the real firmware so the whole console
//! stack (channel, controller, calibration, mapping) can run without a robot.
//!
//! # Model
//!
//! | Command | Simulation |
//! |---------|------------|
//! | `D l r` | Wheel speeds; opposite speeds spin the robot in place |
//! | `M/R/T/W` | Pose bookkeeping |
//! | `G`, `S` | Ray casting inside a circular room with a few round posts |
//! | `C` | Earth field rotated by heading/pitch + hard-iron offset + noise + spikes |
//! | `L` | Same field without the hard-iron offset |
//!
//! Spinning is time-free: every command handled while the wheels turn in
//! opposite directions advances the heading by a fixed quantum.
//! Each `C` read also tumbles the sensor a little, emulating the operator
//! rotating the robot by hand during calibration.

use super::Transport;
use crate::error::Result;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use std::collections::VecDeque;

/// Heading change per handled command, per unit of wheel speed difference
const SPIN_DEG_PER_UNIT: f64 = 0.1;

/// Banner printed by the firmware after reset
pub const SIM_GREETING: &str = "DISHA-SIM READY";

/// Simulation parameters
#[derive(Debug, Clone)]
pub struct SimSettings {
    /// RNG seed (0 = random each run)
    pub seed: u64,
    /// Hard-iron offset added to raw magnetometer reads (x, y, z)
    pub hard_iron: [f64; 3],
    /// Magnitude of the simulated earth field (raw units)
    pub field_strength: f64,
    /// Gaussian noise on each magnetometer axis
    pub mag_noise_stddev: f64,
    /// Probability that a raw read carries a single-axis spike
    pub spike_probability: f64,
    /// Size of a spike (raw units)
    pub spike_magnitude: f64,
    /// Heading drift per raw read (degrees)
    pub tumble_deg_per_read: f64,
    /// Radius of the circular room (cm)
    pub room_radius_cm: f64,
    /// Round posts inside the room: (x, y, radius) in cm
    pub posts: Vec<(f64, f64, f64)>,
    /// Gaussian noise on range readings (cm)
    pub range_noise_stddev: f64,
    /// Probability of a spurious near-zero range reading
    pub dropout_probability: f64,
    /// Samples per scan sweep (one per degree)
    pub scan_points: usize,
}

impl Default for SimSettings {
    fn default() -> Self {
        Self {
            seed: 0,
            hard_iron: [120.0, -80.0, 35.0],
            field_strength: 400.0,
            mag_noise_stddev: 3.0,
            spike_probability: 0.05,
            spike_magnitude: 2000.0,
            tumble_deg_per_read: 2.5,
            room_radius_cm: 150.0,
            posts: vec![(60.0, 20.0, 5.0), (-40.0, 70.0, 6.0), (10.0, -90.0, 4.0)],
            range_noise_stddev: 0.8,
            dropout_probability: 0.02,
            scan_points: 180,
        }
    }
}

/// In-memory robot answering protocol lines
pub struct SimulatedRobot {
    settings: SimSettings,
    rng: SmallRng,
    heading_deg: f64,
    position: (f64, f64),
    tower_deg: f64,
    wheels: (i32, i32),
    mag_reads: u64,
    line: Vec<u8>,
    output: VecDeque<u8>,
}

impl SimulatedRobot {
    /// Create a simulated robot that has just printed its greeting
    pub fn new(settings: SimSettings) -> Self {
        let rng = if settings.seed == 0 {
            SmallRng::from_entropy()
        } else {
            SmallRng::seed_from_u64(settings.seed)
        };
        let mut sim = Self {
            settings,
            rng,
            heading_deg: 0.0,
            position: (0.0, 0.0),
            tower_deg: 0.0,
            wheels: (0, 0),
            mag_reads: 0,
            line: Vec::new(),
            output: VecDeque::new(),
        };
        sim.emit(SIM_GREETING);
        log::info!("Simulated robot started (seed {})", sim.settings.seed);
        sim
    }

    /// Current simulated heading in degrees, normalised to [0, 360)
    pub fn heading(&self) -> f64 {
        self.heading_deg.rem_euclid(360.0)
    }

    fn emit(&mut self, reply: &str) {
        self.output.extend(reply.as_bytes());
        self.output.extend(b"\r\n");
    }

    fn gaussian(&mut self, stddev: f64) -> f64 {
        if stddev == 0.0 {
            return 0.0;
        }
        let n: f64 = self.rng.sample(StandardNormal);
        n * stddev
    }

    /// Advance the in-place spin by one command quantum
    fn step(&mut self) {
        let (left, right) = self.wheels;
        if left != right {
            self.heading_deg += f64::from(left - right) / 2.0 * SPIN_DEG_PER_UNIT;
        }
    }

    fn handle_line(&mut self, line: &str) -> String {
        self.step();

        let mut tokens = line.split_whitespace();
        let Some(cmd) = tokens.next() else {
            return "ERR empty command".to_string();
        };
        let args: Vec<f64> = tokens.filter_map(|t| t.parse().ok()).collect();
        let arg = |i: usize| args.get(i).copied();

        match (cmd, arg(0), arg(1)) {
            ("D", Some(left), Some(right)) => {
                self.wheels = (left as i32, right as i32);
                "OK".to_string()
            }
            ("M", Some(distance), _) => {
                let heading = (-self.heading_deg).to_radians();
                self.position.0 += distance * heading.cos();
                self.position.1 += distance * heading.sin();
                "OK".to_string()
            }
            ("R", Some(delta), _) => {
                self.heading_deg += delta;
                "OK".to_string()
            }
            ("T", Some(target), _) => {
                self.heading_deg = target;
                "OK".to_string()
            }
            ("W", Some(angle), _) => {
                self.tower_deg = angle;
                "OK".to_string()
            }
            ("G", _, _) => {
                let world = -(self.heading_deg + self.tower_deg);
                let distance = self.range(world);
                format!("{:.0}", distance)
            }
            ("A", _, _) => format!("{:.0}", self.heading()),
            ("C", _, _) => {
                let [x, y, z] = self.magnetometer(true);
                format!("{:.0} {:.0} {:.0}", x, y, z)
            }
            ("L", _, _) => {
                let [x, y, z] = self.magnetometer(false);
                format!("{:.0} {:.0} {:.0}", x, y, z)
            }
            ("S", _, _) => {
                let readings: Vec<String> = (0..self.settings.scan_points)
                    .map(|i| {
                        let world = i as f64 - self.heading_deg;
                        format!("{:.0}", self.range(world))
                    })
                    .collect();
                readings.join(",")
            }
            ("X", _, _) => {
                self.wheels = (0, 0);
                "OK".to_string()
            }
            ("B", _, _) | ("P", _, _) => "OK".to_string(),
            _ => format!("ERR unknown command: {}", line),
        }
    }

    /// Noisy range reading along a world-frame bearing (degrees)
    fn range(&mut self, bearing_deg: f64) -> f64 {
        if self.rng.gen_bool(self.settings.dropout_probability) {
            return self.rng.gen_range(0.0..5.0);
        }

        let (ux, uy) = (bearing_deg.to_radians().cos(), bearing_deg.to_radians().sin());
        let (px, py) = self.position;

        // Circular wall: |p + t*u| = R
        let pu = px * ux + py * uy;
        let radius = self.settings.room_radius_cm;
        let disc = (pu * pu - (px * px + py * py) + radius * radius).max(0.0);
        let mut nearest = -pu + disc.sqrt();

        for &(cx, cy, r) in &self.settings.posts {
            let t = (cx - px) * ux + (cy - py) * uy;
            if t <= 0.0 {
                continue;
            }
            let (dx, dy) = (px + t * ux - cx, py + t * uy - cy);
            let d2 = dx * dx + dy * dy;
            if d2 < r * r {
                nearest = nearest.min(t - (r * r - d2).sqrt());
            }
        }

        let noise = self.gaussian(self.settings.range_noise_stddev);
        (nearest + noise).max(0.0)
    }

    /// Body-frame magnetometer reading
    fn magnetometer(&mut self, raw: bool) -> [f64; 3] {
        self.mag_reads += 1;
        self.heading_deg += self.settings.tumble_deg_per_read;

        let heading = self.heading_deg.to_radians();
        let pitch = (50.0 * (self.mag_reads as f64 * 0.37).sin()).to_radians();
        let f = self.settings.field_strength;
        let mut field = [
            f * pitch.cos() * heading.cos(),
            -f * pitch.cos() * heading.sin(),
            f * pitch.sin(),
        ];

        let stddev = self.settings.mag_noise_stddev;
        for axis in field.iter_mut() {
            *axis += self.gaussian(stddev);
        }

        if raw {
            for (axis, offset) in field.iter_mut().zip(self.settings.hard_iron) {
                *axis += offset;
            }
            if self.rng.gen_bool(self.settings.spike_probability) {
                let axis = self.rng.gen_range(0..3);
                field[axis] += self.settings.spike_magnitude;
            }
        }

        field
    }
}

impl Transport for SimulatedRobot {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let n = self.output.len().min(buffer.len());
        for (slot, byte) in buffer.iter_mut().zip(self.output.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        for &byte in data {
            if byte == b'\n' {
                let raw = std::mem::take(&mut self.line);
                let line = String::from_utf8_lossy(&raw);
                let line = line.trim_end_matches('\r').to_string();
                log::trace!("Sim received: {}", line);
                let reply = self.handle_line(&line);
                self.emit(&reply);
            } else {
                self.line.push(byte);
            }
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.output.clear();
        self.line.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_settings() -> SimSettings {
        SimSettings {
            seed: 7,
            mag_noise_stddev: 0.0,
            spike_probability: 0.0,
            range_noise_stddev: 0.0,
            dropout_probability: 0.0,
            tumble_deg_per_read: 0.0,
            ..SimSettings::default()
        }
    }

    /// Simulator with the greeting already drained
    fn fresh(settings: SimSettings) -> SimulatedRobot {
        let mut sim = SimulatedRobot::new(settings);
        let mut buf = [0u8; 64];
        sim.read(&mut buf).unwrap();
        sim
    }

    fn exchange(sim: &mut SimulatedRobot, line: &str) -> String {
        sim.write_all(format!("{}\n", line).as_bytes()).unwrap();
        let mut buf = [0u8; 2048];
        let n = sim.read(&mut buf).unwrap();
        String::from_utf8_lossy(&buf[..n]).trim_end().to_string()
    }

    #[test]
    fn test_greeting_then_ack() {
        let mut sim = SimulatedRobot::new(quiet_settings());
        let mut buf = [0u8; 64];
        let n = sim.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"DISHA-SIM READY\r\n");
        assert_eq!(exchange(&mut sim, "D 90 90"), "OK");
    }

    #[test]
    fn test_spin_advances_heading() {
        let mut sim = fresh(quiet_settings());
        exchange(&mut sim, "D 90 -90");
        exchange(&mut sim, "D 0 0");
        assert!((sim.heading() - 9.0).abs() < 1e-9);
    }

    #[test]
    fn test_distance_to_wall_from_centre() {
        let mut settings = quiet_settings();
        settings.posts.clear();
        let mut sim = fresh(settings);
        assert_eq!(exchange(&mut sim, "G"), "150");
    }

    #[test]
    fn test_calibrated_read_has_no_offset() {
        let mut sim = fresh(quiet_settings());
        let reply = exchange(&mut sim, "L");
        let values: Vec<f64> = reply
            .split_whitespace()
            .map(|v| v.parse().unwrap())
            .collect();
        let norm = values.iter().map(|v| v * v).sum::<f64>().sqrt();
        assert!((norm - 400.0).abs() < 2.0);
    }

    #[test]
    fn test_unknown_command() {
        let mut sim = fresh(quiet_settings());
        assert!(exchange(&mut sim, "Q").starts_with("ERR"));
    }
}
