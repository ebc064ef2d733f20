// Per-wheel velocity PID controller
//
// Gains are expressed per second: the integral accumulates `error * dt` and
// the derivative is `(error - previous_error) / dt`, with `dt` supplied by
// the caller on every call. The integral accumulator is clamped so the
// integral term alone can never exceed the output range.

use crate::config::PidGains;

/// Closed-loop controller for one wheel
#[derive(Debug, Clone)]
pub struct PidController {
    gains: PidGains,
    integral: f32,
    previous_error: f32,
    last_output: i32,
}

impl PidController {
    pub fn new(gains: PidGains) -> Self {
        debug_assert!(gains.min_output <= gains.max_output);
        Self {
            gains,
            integral: 0.0,
            previous_error: 0.0,
            last_output: 0,
        }
    }

    /// Compute the bounded drive output for one control period
    ///
    /// A non-positive `dt` is a caller error; the integral and derivative
    /// terms are skipped for that call rather than dividing by it.
    pub fn compute(&mut self, target: f32, measured: f32, dt: f32) -> i32 {
        // Stored state stays finite even when the inputs are extreme
        let error = saturate(target - measured);

        let derivative = if dt > 0.0 {
            self.integral = self.clamp_integral(saturate(self.integral + error * dt));
            let slope = (error - self.previous_error) / dt;
            // An overflowing slope carries no usable rate for this call
            if slope.is_finite() { slope } else { 0.0 }
        } else {
            0.0
        };

        let raw = self.gains.kp * error
            + self.gains.ki * self.integral
            + self.gains.kd * derivative;
        self.previous_error = error;

        // NaN collapses to 0 in the cast, so the result is always in range
        let output = raw
            .clamp(self.gains.min_output as f32, self.gains.max_output as f32)
            .round() as i32;
        self.last_output = output;
        output
    }

    /// Forget accumulated state; configuration is kept
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.previous_error = 0.0;
        self.last_output = 0;
    }

    pub fn last_output(&self) -> i32 {
        self.last_output
    }

    pub fn integral(&self) -> f32 {
        self.integral
    }

    fn clamp_integral(&self, integral: f32) -> f32 {
        if self.gains.ki == 0.0 {
            return integral;
        }
        let span = self
            .gains
            .max_output
            .unsigned_abs()
            .max(self.gains.min_output.unsigned_abs()) as f32;
        let limit = span / self.gains.ki.abs();
        integral.clamp(-limit, limit)
    }
}

/// Clamp to the finite `f32` range; NaN becomes zero
fn saturate(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(-f32::MAX, f32::MAX)
    }
}
