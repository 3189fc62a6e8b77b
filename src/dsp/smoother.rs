//! # Parameter Smoother
//!
//! Level and mix changes at the plugin boundary ramp toward their new value
//! instead of jumping, which would click. Each call to
//! [`next`](ParameterSmoother::next) covers a fixed fraction of the
//! remaining distance, so the approach is exponential: fast at first, then
//! gently landing on the target.
//!
//! The fraction is chosen so that after the configured duration only 0.1 %
//! of the original distance is left:
//!
//! ```text
//! step     = 1 / max(1, sample_rate * seconds)
//! fraction = 1 - e^(ln(0.001) * step)
//! ```

/// Natural log of the residual left after the configured duration (0.1 %).
const SETTLED_RESIDUAL_LN: f32 = -6.907_755;

/// One-pole ramp toward a target value.
#[derive(Debug, Clone)]
pub struct ParameterSmoother {
    current: f32,
    target: f32,
    /// Per-sample step, `1 / duration_in_samples`.
    step: f32,
    /// Fraction of the remaining distance covered per call.
    fraction: f32,
}

impl Default for ParameterSmoother {
    fn default() -> Self {
        Self {
            current: 0.0,
            target: 0.0,
            step: 1.0,
            fraction: 1.0,
        }
    }
}

impl ParameterSmoother {
    /// Jump to `initial` (current and target) and set the ramp duration.
    pub fn reset(&mut self, sample_rate: f32, seconds: f32, initial: f32) {
        self.current = initial;
        self.target = initial;

        let duration_samples = (sample_rate * seconds.max(0.0)).max(1.0);
        self.step = 1.0 / duration_samples;
        self.fraction = if duration_samples <= 1.0 {
            1.0
        } else {
            1.0 - (SETTLED_RESIDUAL_LN * self.step).exp()
        };
    }

    /// Move the target. The current value is untouched, so there is no
    /// discontinuity.
    pub fn set_target(&mut self, target: f32) {
        self.target = target;
    }

    /// Advance one sample and return the new current value.
    #[inline]
    pub fn next(&mut self) -> f32 {
        self.current += (self.target - self.current) * self.fraction;
        self.current
    }

    pub fn current(&self) -> f32 {
        self.current
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    /// Per-sample step derived from the ramp duration.
    pub fn step(&self) -> f32 {
        self.step
    }
}
