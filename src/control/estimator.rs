// Wheel angular velocity from encoder ticks

use std::f32::consts::TAU;

/// Converts a tick delta over an interval to rad/s
#[derive(Debug, Clone, Copy)]
pub struct VelocityEstimator {
    counts_per_revolution: u32,
}

impl VelocityEstimator {
    pub fn new(counts_per_revolution: u32) -> Self {
        debug_assert!(counts_per_revolution > 0);
        Self {
            counts_per_revolution,
        }
    }

    /// Angular velocity in rad/s
    ///
    /// `elapsed_seconds` must be strictly positive; the control loop only calls
    /// this once the cadence threshold has been met. Negative `tick_delta`
    /// means reverse rotation and is passed through unclamped.
    pub fn estimate(&self, tick_delta: i32, elapsed_seconds: f32) -> f32 {
        debug_assert!(
            elapsed_seconds > 0.0,
            "velocity estimate over a non-positive interval"
        );
        let revolutions = tick_delta as f32 / self.counts_per_revolution as f32;
        revolutions * TAU / elapsed_seconds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quarter_turn_in_100ms() {
        let estimator = VelocityEstimator::new(1320);
        let velocity = estimator.estimate(330, 0.1);
        assert!((velocity - 15.708).abs() < 1e-3, "velocity = {}", velocity);
    }

    #[test]
    fn test_linear_in_ticks_and_inverse_in_time() {
        let estimator = VelocityEstimator::new(1320);
        let base = estimator.estimate(100, 0.1);
        assert!((estimator.estimate(300, 0.1) - 3.0 * base).abs() < 1e-4);
        assert!((estimator.estimate(100, 0.2) - base / 2.0).abs() < 1e-4);
        assert!((estimator.estimate(-100, 0.1) + base).abs() < 1e-6);
        assert_eq!(estimator.estimate(0, 0.1), 0.0);
    }
}
