// Closed-loop wheel control
//
// Provides:
// - Velocity estimation from encoder tick deltas
// - Per-wheel PID controller
// - Command watchdog

pub mod estimator;
pub mod pid;
pub mod watchdog;

pub use estimator::VelocityEstimator;
pub use pid::PidController;
pub use watchdog::CommandWatchdog;
