// Timeouts, topics, gains and robot geometry
use std::time::Duration;

// Runtime loop period (one link step + watchdog check per tick)
pub const LOOP_PERIOD: Duration = Duration::from_millis(10);

// Minimum wall-clock time between two control computations
pub const CONTROL_PERIOD_MS: u32 = 100;

// Bounded wait for a single poll of the command channel
pub const POLL_WAIT: Duration = Duration::from_millis(10);

// Command timeout for watchdog
pub const CMD_TIMEOUT_MS: u32 = 500;

// Link is considered lost after this long without a healthy exchange
pub const LINK_HEALTH_TIMEOUT_MS: u32 = 1000;

// Spacing between two connection attempts
pub const RECONNECT_DELAY_MS: u32 = 1000;

// Encoder: 30 (gear ratio) x 11 (magnet poles) x 4 (quadrature edges)
pub const ENCODER_CPR: u32 = 1320;

// Robot dimensions, meters
pub const WHEEL_RADIUS: f32 = 0.034;
pub const WHEEL_SEPARATION: f32 = 0.194;

// Drive command range is symmetric: [-DRIVE_LIMIT, DRIVE_LIMIT]
pub const DRIVE_LIMIT: i32 = 100;

// PID gains, per second. Equal to 10 / 0.1 / 0.05 per call at the 100 ms cadence.
pub const PID_KP: f32 = 10.0;
pub const PID_KI: f32 = 1.0;
pub const PID_KD: f32 = 0.005;

// Zenoh topics
pub const TOPIC_CMD_VEL: &str = "diffbot/cmd_vel"; // commands
pub const TOPIC_LEFT_WHEEL_SPEED: &str = "diffbot/state/left_wheel_speed"; // rad/s
pub const TOPIC_RIGHT_WHEEL_SPEED: &str = "diffbot/state/right_wheel_speed"; // rad/s
pub const TOPIC_HEALTH: &str = "diffbot/state/health"; // health status

// Serial port of the motor bridge board
pub const MOTOR_PORT: &str = "/dev/ttyUSB0";

/// Gains and output bounds of one wheel controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidGains {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    pub min_output: i32,
    pub max_output: i32,
}

impl Default for PidGains {
    fn default() -> Self {
        Self {
            kp: PID_KP,
            ki: PID_KI,
            kd: PID_KD,
            min_output: -DRIVE_LIMIT,
            max_output: DRIVE_LIMIT,
        }
    }
}

/// Wheel geometry used by the kinematic decomposition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelGeometry {
    pub radius: f32,
    pub separation: f32,
}

impl Default for WheelGeometry {
    fn default() -> Self {
        Self {
            radius: WHEEL_RADIUS,
            separation: WHEEL_SEPARATION,
        }
    }
}

/// Everything the control core needs, bundled so tests can build isolated
/// instances. `Default` is the build-time configuration above.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlConfig {
    pub gains: PidGains,
    pub geometry: WheelGeometry,
    pub counts_per_revolution: u32,
    pub control_period_ms: u32,
    pub cmd_timeout_ms: u32,
    pub link_health_timeout_ms: u32,
    pub reconnect_delay_ms: u32,
    pub poll_wait: Duration,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            gains: PidGains::default(),
            geometry: WheelGeometry::default(),
            counts_per_revolution: ENCODER_CPR,
            control_period_ms: CONTROL_PERIOD_MS,
            cmd_timeout_ms: CMD_TIMEOUT_MS,
            link_health_timeout_ms: LINK_HEALTH_TIMEOUT_MS,
            reconnect_delay_ms: RECONNECT_DELAY_MS,
            poll_wait: POLL_WAIT,
        }
    }
}
