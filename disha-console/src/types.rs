//! Shared value types

use std::fmt;

/// Three-axis reading (magnetometer counts)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Components as an array, x first
    pub fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    /// Apply `f` to every component
    pub fn map(self, f: impl Fn(f64) -> f64) -> Self {
        Self::new(f(self.x), f(self.y), f(self.z))
    }
}

impl From<[f64; 3]> for Vector3 {
    fn from([x, y, z]: [f64; 3]) -> Self {
        Self::new(x, y, z)
    }
}

impl fmt::Display for Vector3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// One sample of a tower scan sweep
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanSample {
    /// Measured range in centimetres
    pub distance_cm: f64,
    /// Tower angle of the sample in degrees, robot frame
    pub angle_deg: f64,
}

impl ScanSample {
    pub fn new(distance_cm: f64, angle_deg: f64) -> Self {
        Self {
            distance_cm,
            angle_deg,
        }
    }
}
