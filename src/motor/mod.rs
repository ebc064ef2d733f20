// Motor and encoder module for the differential-drive base
//
// Provides:
// - Quadrature tick counters shared with the asynchronous tick source
// - Differential-drive inverse kinematics (body velocity -> wheel targets)
// - Actuator interface with serial bridge and simulated implementations

pub mod bridge;
mod driver;
pub mod encoder;
pub mod kinematics;
pub mod sim;

pub use bridge::{BridgeError, MotorBridge};
pub use driver::{Actuator, Direction, DriveCommand, MotorDriver, Side};
pub use encoder::TickCounter;
pub use kinematics::{WheelTargets, body_to_wheel};
pub use sim::SimulatedBase;
