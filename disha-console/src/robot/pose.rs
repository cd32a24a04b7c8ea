//! Robot pose and wheel command state

/// Tracked robot pose
///
/// Azimuth is a compass heading in degrees. World-frame bearings are taken
/// as `angle - azimuth`, so a sample straight ahead (angle 0) of a robot at
/// azimuth 90 lies along world angle -90.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RobotPose {
    /// World position in centimetres
    pub position: (f64, f64),
    /// Heading in degrees
    pub azimuth: f64,
    /// Range-finder tower angle in degrees
    pub tower_angle: f64,
}

impl RobotPose {
    pub fn new(position: (f64, f64), azimuth: f64) -> Self {
        Self {
            position,
            azimuth,
            tower_angle: 0.0,
        }
    }

    /// World-frame point at `distance` along robot-frame bearing `angle_deg`
    pub fn to_world(&self, distance: f64, angle_deg: f64) -> (f64, f64) {
        let relative = (angle_deg - self.azimuth).to_radians();
        (
            distance * relative.cos() + self.position.0,
            distance * relative.sin() + self.position.1,
        )
    }

    /// Move `distance` straight ahead (negative = backwards)
    pub fn advance(&mut self, distance: f64) {
        self.position = self.to_world(distance, 0.0);
    }
}

/// Last acknowledged differential wheel command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WheelCommand {
    pub left: i32,
    pub right: i32,
}

impl WheelCommand {
    pub const REST: WheelCommand = WheelCommand { left: 0, right: 0 };

    pub fn is_at_rest(&self) -> bool {
        *self == Self::REST
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_advance_follows_heading() {
        let mut pose = RobotPose::default();
        pose.advance(10.0);
        assert_relative_eq!(pose.position.0, 10.0);
        assert_relative_eq!(pose.position.1, 0.0);

        pose.azimuth = 90.0;
        pose.advance(5.0);
        assert_relative_eq!(pose.position.0, 10.0, epsilon = 1e-9);
        assert_relative_eq!(pose.position.1, -5.0, epsilon = 1e-9);
    }

    #[test]
    fn test_to_world_offsets_by_position() {
        let pose = RobotPose::new((3.0, 4.0), 0.0);
        let (x, y) = pose.to_world(20.0, 90.0);
        assert_relative_eq!(x, 3.0, epsilon = 1e-9);
        assert_relative_eq!(y, 24.0, epsilon = 1e-9);
    }
}
