// Differential-drive inverse kinematics
// Converts a body velocity command (linear, angular) to per-wheel angular velocities.

use crate::config::WheelGeometry;
use crate::messages::VelocityCommand;

/// Target angular velocity for each wheel, rad/s
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WheelTargets {
    pub left: f32,
    pub right: f32,
}

impl WheelTargets {
    pub fn zero() -> Self {
        Self::default()
    }

    /// Returns targets as array [left, right]
    pub fn as_array(&self) -> [f32; 2] {
        [self.left, self.right]
    }
}

/// Convert a body velocity command to wheel targets
///
/// # Arguments
/// * `cmd` - linear velocity in m/s (positive = forward), angular velocity in
///   rad/s (positive = counter-clockwise seen from above)
/// * `geometry` - wheel radius and separation in meters
pub fn body_to_wheel(cmd: &VelocityCommand, geometry: &WheelGeometry) -> WheelTargets {
    let half_track = cmd.angular * geometry.separation / 2.0;

    WheelTargets {
        left: (cmd.linear + half_track) / geometry.radius,
        right: (cmd.linear - half_track) / geometry.radius,
    }
}
