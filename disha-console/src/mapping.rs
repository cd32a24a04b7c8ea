//! Polar scan samples to world-frame poles

use crate::error::{Error, Result};
use crate::robot::RobotPose;
use crate::types::ScanSample;
use rand::Rng;
use std::fmt;
use std::str::FromStr;

/// Readings closer than this are treated as sensor noise (cm)
pub const DEFAULT_MIN_DISTANCE_CM: f64 = 15.0;

/// 24-bit RGB colour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const MAGENTA: Color = Color::rgb(0xFF, 0x00, 0xFF);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Random colour with every channel in the upper half
    pub fn random_bright<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::rgb(
            rng.gen_range(0x80..=0xFF),
            rng.gen_range(0x80..=0xFF),
            rng.gen_range(0x80..=0xFF),
        )
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::MAGENTA
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

impl FromStr for Color {
    type Err = Error;

    /// Parse `#RRGGBB` (the `#` is optional)
    fn from_str(s: &str) -> Result<Self> {
        let hex = s.trim().trim_start_matches('#');
        let invalid = || Error::InvalidParameter(format!("invalid colour '{}'", s));
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(invalid());
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());
        Ok(Color::rgb(channel(0)?, channel(2)?, channel(4)?))
    }
}

/// One mapped obstacle point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pole {
    pub x: f64,
    pub y: f64,
    pub color: Color,
}

/// Accumulates poles from scans taken at different poses
#[derive(Debug, Clone)]
pub struct PolarMapper {
    poles: Vec<Pole>,
    min_distance_cm: f64,
}

impl PolarMapper {
    pub fn new(min_distance_cm: f64) -> Self {
        Self {
            poles: Vec::new(),
            min_distance_cm,
        }
    }

    /// Place one reading relative to `pose`
    ///
    /// Returns the pole, or `None` if the reading was below the minimum
    /// distance and dropped.
    pub fn place_pole(
        &mut self,
        distance: f64,
        angle_deg: f64,
        color: Color,
        pose: &RobotPose,
    ) -> Option<Pole> {
        if distance < self.min_distance_cm {
            log::trace!("Dropping {:.1} cm reading at {:.1} deg", distance, angle_deg);
            return None;
        }
        let (x, y) = pose.to_world(distance, angle_deg);
        let pole = Pole { x, y, color };
        self.poles.push(pole);
        Some(pole)
    }

    /// Place every sample of a scan; returns the number accepted
    pub fn map_scan(&mut self, samples: &[ScanSample], pose: &RobotPose, color: Color) -> usize {
        let accepted = samples
            .iter()
            .filter_map(|s| self.place_pole(s.distance_cm, s.angle_deg, color, pose))
            .count();
        log::info!(
            "Mapped {}/{} scan samples ({} poles total)",
            accepted,
            samples.len(),
            self.poles.len()
        );
        accepted
    }

    pub fn clear_poles(&mut self) {
        self.poles.clear();
    }

    pub fn poles(&self) -> &[Pole] {
        &self.poles
    }

    pub fn min_distance_cm(&self) -> f64 {
        self.min_distance_cm
    }
}

impl Default for PolarMapper {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_DISTANCE_CM)
    }
}
