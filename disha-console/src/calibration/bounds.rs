//! Median filtering and running per-axis bounds

use crate::types::Vector3;
use serde::{Deserialize, Serialize};

/// Numeric handling of medians and offsets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    /// Truncate toward zero, as the firmware's integer round trip does
    #[default]
    Integer,
    Float,
}

impl Precision {
    pub fn apply(self, value: f64) -> f64 {
        match self {
            Precision::Integer => value.trunc(),
            Precision::Float => value,
        }
    }
}

/// Middle value of three
pub fn median3(a: f64, b: f64, c: f64) -> f64 {
    a.max(b).min(a.min(b).max(c))
}

/// Per-axis median of three reads
pub fn median_of_three(reads: [Vector3; 3]) -> Vector3 {
    let [a, b, c] = reads;
    Vector3::new(
        median3(a.x, b.x, c.x),
        median3(a.y, b.y, c.y),
        median3(a.z, b.z, c.z),
    )
}

/// Range seen on one axis
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AxisBounds {
    pub min: f64,
    pub max: f64,
    /// Midpoint of min and max (hard-iron offset estimate)
    pub offset: f64,
}

impl AxisBounds {
    fn seed(&mut self, value: f64) {
        self.min = value;
        self.max = value;
    }

    fn include(&mut self, value: f64) {
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }
}

/// Running bounds over all calibration samples since the last reset
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationBounds {
    pub x: AxisBounds,
    pub y: AxisBounds,
    pub z: AxisBounds,
    samples: usize,
    precision: Precision,
}

impl CalibrationBounds {
    pub fn new(precision: Precision) -> Self {
        Self {
            x: AxisBounds::default(),
            y: AxisBounds::default(),
            z: AxisBounds::default(),
            samples: 0,
            precision,
        }
    }

    /// Back to {0, 0, 0} on every axis
    pub fn reset(&mut self) {
        *self = Self::new(self.precision);
    }

    /// Widen the bounds to include `sample` and recompute offsets
    ///
    /// The first sample after a reset seeds min and max.
    pub fn update(&mut self, sample: Vector3) {
        let first = self.samples == 0;
        let precision = self.precision;
        for (axis, value) in self.axes_mut().into_iter().zip(sample.to_array()) {
            if first {
                axis.seed(value);
            } else {
                axis.include(value);
            }
            axis.offset = precision.apply((axis.min + axis.max) / 2.0);
        }
        self.samples += 1;
    }

    /// Samples folded in since the last reset
    pub fn samples(&self) -> usize {
        self.samples
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    pub fn offset(&self) -> Vector3 {
        Vector3::new(self.x.offset, self.y.offset, self.z.offset)
    }

    /// Apply the offsets to a raw reading
    pub fn correct(&self, raw: Vector3) -> Vector3 {
        let offset = self.offset();
        Vector3::new(raw.x - offset.x, raw.y - offset.y, raw.z - offset.z)
    }

    pub fn axes(&self) -> [AxisBounds; 3] {
        [self.x, self.y, self.z]
    }

    fn axes_mut(&mut self) -> [&mut AxisBounds; 3] {
        [&mut self.x, &mut self.y, &mut self.z]
    }
}

impl Default for CalibrationBounds {
    fn default() -> Self {
        Self::new(Precision::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_median3() {
        assert_eq!(median3(5.0, 100.0, 6.0), 6.0);
        assert_eq!(median3(100.0, 5.0, 6.0), 6.0);
        assert_eq!(median3(6.0, 6.0, -1.0), 6.0);
        assert_eq!(median3(-3.0, -1.0, -2.0), -2.0);
    }

    #[test]
    fn test_median_of_three_per_axis() {
        let m = median_of_three([
            Vector3::new(5.0, 1.0, -10.0),
            Vector3::new(100.0, 2.0, 3.0),
            Vector3::new(6.0, 3.0, 0.0),
        ]);
        assert_eq!(m, Vector3::new(6.0, 2.0, 0.0));
    }

    #[test]
    fn test_first_sample_seeds_bounds() {
        let mut bounds = CalibrationBounds::new(Precision::Integer);
        bounds.update(Vector3::new(10.0, -20.0, 5.0));

        assert_eq!(bounds.x, AxisBounds { min: 10.0, max: 10.0, offset: 10.0 });
        assert_eq!(bounds.y.offset, -20.0);
        assert_eq!(bounds.samples(), 1);
    }

    #[test]
    fn test_offset_is_midpoint() {
        let mut bounds = CalibrationBounds::new(Precision::Float);
        for s in [[10.0, 0.0, 1.0], [-5.0, 4.0, 2.0], [3.0, -7.0, 2.0]] {
            bounds.update(s.into());
            for axis in bounds.axes() {
                assert_relative_eq!(axis.offset, (axis.min + axis.max) / 2.0);
            }
        }
        assert_relative_eq!(bounds.x.offset, 2.5);
        assert_relative_eq!(bounds.y.offset, -1.5);
    }

    #[test]
    fn test_integer_offsets_truncate_toward_zero() {
        let mut bounds = CalibrationBounds::new(Precision::Integer);
        bounds.update(Vector3::new(0.0, 0.0, 0.0));
        bounds.update(Vector3::new(5.0, -3.0, 1.0));

        assert_eq!(bounds.offset(), Vector3::new(2.0, -1.0, 0.0));
    }

    #[test]
    fn test_reset_and_correct() {
        let mut bounds = CalibrationBounds::new(Precision::Integer);
        bounds.update(Vector3::new(100.0, 50.0, 10.0));
        assert_eq!(
            bounds.correct(Vector3::new(110.0, 50.0, 0.0)),
            Vector3::new(10.0, 0.0, -10.0)
        );

        bounds.reset();
        assert_eq!(bounds.axes(), [AxisBounds::default(); 3]);
        assert_eq!(bounds.samples(), 0);
        assert_eq!(bounds.precision(), Precision::Integer);
    }
}
