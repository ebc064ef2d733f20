// Define message types exchanged with the external controller

use serde::{Deserialize, Serialize};

// Command from teleop/planner -> runtime
// linear is m/s along the forward axis, angular is rad/s about the vertical axis
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct VelocityCommand {
    pub linear: f32,
    pub angular: f32,
}

impl VelocityCommand {
    pub fn new(linear: f32, angular: f32) -> Self {
        Self { linear, angular }
    }
}

/// Measured wheel speeds published by runtime, rad/s
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct WheelSpeeds {
    pub left: f32,
    pub right: f32,
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
}
