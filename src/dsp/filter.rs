//! # Filters
//!
//! Every filter in the chip model lives here:
//!
//! - [`ToneFilter`]: a two-pole (12 dB/octave) lowpass biquad. The chip
//!   has one in front of the modulator (anti-aliasing / input conditioning)
//!   and one after the demodulator (reconstruction).
//! - [`OnePoleFilter`]: a 6 dB/octave lowpass that follows the input
//!   biquad, completing the third-order input rolloff.
//! - [`DcBlocker`]: removes the offset the one-bit stream leaves behind.
//! - [`OnePoleHighpass`]: shapes the tone of the feedback path.
//!
//! All of them are reconfigured in place. Changing a cutoff recomputes the
//! coefficients but keeps the state registers, so a knob turn never clicks.

use std::f32::consts::PI;

use super::util::clamp;

/// Keep every cutoff below this fraction of the sample rate. Right at
/// Nyquist the coefficient math degenerates.
const MAX_CUTOFF_RATIO: f32 = 0.49;

/// A two-pole lowpass biquad (RBJ cookbook design).
///
/// Runs in transposed direct form II: two state registers, five
/// coefficients normalised by `a0`, no branches in [`process`](Self::process).
///
/// ```text
/// y  = b0*x + z1
/// z1 = b1*x - a1*y + z2
/// z2 = b2*x - a2*y
/// ```
#[derive(Debug, Clone)]
pub struct ToneFilter {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    z1: f32,
    z2: f32,
}

impl Default for ToneFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl ToneFilter {
    /// A filter that passes its input through unchanged until
    /// [`set_lowpass`](Self::set_lowpass) is called.
    pub fn new() -> Self {
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            z1: 0.0,
            z2: 0.0,
        }
    }

    /// Recompute the coefficients for a lowpass at `cutoff_hz` with the
    /// given resonance.
    ///
    /// The cutoff is held inside `[1, 0.49 * sample_rate]` and `q` is floored
    /// at a tiny positive value. The state registers are left alone.
    pub fn set_lowpass(&mut self, sample_rate: f32, cutoff_hz: f32, q: f32) {
        let sample_rate = sample_rate.max(1.0);
        let nyquist_safe = (sample_rate * MAX_CUTOFF_RATIO).max(1.0);
        let freq = clamp(cutoff_hz, 1.0, nyquist_safe);
        let q = q.max(1.0e-6);

        let w0 = 2.0 * PI * freq / sample_rate;
        let (sin_w0, cos_w0) = w0.sin_cos();
        let alpha = sin_w0 / (2.0 * q);

        let a0 = 1.0 + alpha;
        let b1 = 1.0 - cos_w0;
        let b0 = b1 * 0.5;

        self.b0 = b0 / a0;
        self.b1 = b1 / a0;
        self.b2 = b0 / a0;
        self.a1 = (-2.0 * cos_w0) / a0;
        self.a2 = (1.0 - alpha) / a0;
    }

    /// Filter one sample.
    #[inline]
    pub fn process(&mut self, x: f32) -> f32 {
        let y = self.b0 * x + self.z1;
        self.z1 = self.b1 * x - self.a1 * y + self.z2;
        self.z2 = self.b2 * x - self.a2 * y;
        y
    }

    /// Zero the state registers. Coefficients are kept.
    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }
}

/// A one-pole (6 dB/octave) lowpass filter.
///
/// It sits right after the input [`ToneFilter`] at the same cutoff. The
/// biquad alone falls at 12 dB/octave; the extra pole makes the input
/// rolloff third order, which is what keeps clock-rate aliases out of the
/// modulator at the slowest delay settings.
///
/// ```text
/// y[n] = (1 - a) * x[n] + a * y[n-1],   a = e^(-2π * cutoff / sample_rate)
/// ```
///
/// Each output is a weighted average of the new input and the previous
/// output. With `a = 0` the input passes unchanged; as `a` approaches 1 the
/// output barely moves and only slow (low-frequency) changes get through.
#[derive(Debug, Clone)]
pub struct OnePoleFilter {
    /// Weight of the previous output. Higher values = more filtering
    /// (lower cutoff). Range: 0.0 (none) to just below 1.0.
    coefficient: f32,

    /// The previous output sample, the filter's only state.
    prev_output: f32,
}

impl Default for OnePoleFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl OnePoleFilter {
    /// Create a new filter initialized to passthrough (no filtering).
    ///
    /// With `coefficient = 0.0` the equation reduces to `y[n] = x[n]`.
    pub fn new() -> Self {
        Self {
            coefficient: 0.0,
            prev_output: 0.0,
        }
    }

    /// Update the coefficient for a given cutoff frequency.
    ///
    /// # Arguments
    /// * `cutoff_hz` - Cutoff in Hertz. Held inside `[1, 0.49 * sample_rate]`.
    /// * `sample_rate` - Audio sample rate in Hertz (floored at 1).
    ///
    /// # The Math
    ///
    /// ```text
    /// coefficient = e^(-2π * cutoff / sample_rate)
    /// ```
    ///
    /// A higher cutoff gives a larger negative exponent and a coefficient
    /// nearer 0 (less filtering). At 48 kHz:
    /// - cutoff = 14000 Hz → coeff ≈ 0.16 (brightness fully up)
    /// - cutoff = 7000 Hz  → coeff ≈ 0.40 (brightness at zero)
    /// - cutoff = 100 Hz   → coeff ≈ 0.99 (heavy filtering)
    ///
    /// The stored output is kept, so a brightness sweep never clicks.
    pub fn set_cutoff(&mut self, cutoff_hz: f32, sample_rate: f32) {
        let sample_rate = sample_rate.max(1.0);
        // Right at Nyquist the coefficient stops meaning a lowpass.
        let safe_cutoff = clamp(cutoff_hz, 1.0, (sample_rate * MAX_CUTOFF_RATIO).max(1.0));
        self.coefficient = (-2.0 * PI * safe_cutoff / sample_rate).exp();
    }

    /// Process one sample through the filter.
    ///
    /// # The Algorithm
    ///
    /// ```text
    /// output      = (1 - a) * input + a * prev_output
    /// prev_output = output
    /// ```
    ///
    /// One multiply-add each way and no branches, so it is cheap enough to
    /// run on every sample of every channel.
    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let output = (1.0 - self.coefficient) * input + self.coefficient * self.prev_output;
        self.prev_output = output;
        output
    }

    /// Clear the filter's memory.
    ///
    /// Without this, the first output after a transport restart would still
    /// carry the tail of whatever was playing before.
    pub fn reset(&mut self) {
        self.prev_output = 0.0;
    }
}

/// DC-blocking filter: a differentiator followed by a leaky integrator.
///
/// The one-bit stream averages to the input only approximately. Integrator
/// leakage and dither leave a small bias in the decoded signal, and this
/// filter removes it before the output trim. It is the last stage of the
/// wet path, so the feedback loop never accumulates an offset either.
///
/// ```text
/// y[n] = x[n] - x[n-1] + r * y[n-1],   r = 1 - 2π * corner / sample_rate
/// ```
///
/// The `x[n] - x[n-1]` term has a zero exactly at DC; the `r * y[n-1]` term
/// puts a pole just inside it, so everything well above `corner` passes at
/// unity gain. A constant input step therefore comes out as a spike that
/// decays by `r` per sample (time constant `1 / (1 - r)` samples, about
/// 764 samples for 10 Hz at 48 kHz).
#[derive(Debug, Clone)]
pub struct DcBlocker {
    /// Pole radius. Closer to 1 = lower corner, slower settling.
    r: f32,
    /// Previous input.
    x1: f32,
    /// Previous output.
    y1: f32,
}

impl Default for DcBlocker {
    fn default() -> Self {
        Self::new()
    }
}

impl DcBlocker {
    pub fn new() -> Self {
        Self {
            r: 0.999,
            x1: 0.0,
            y1: 0.0,
        }
    }

    /// Place the corner frequency. At 48 kHz a 10 Hz corner gives
    /// `r ≈ 0.99869`.
    ///
    /// `r` is held inside `[0, 0.999999]`: a pole on the unit circle would
    /// never forget an offset.
    pub fn set_corner(&mut self, corner_hz: f32, sample_rate: f32) {
        let sample_rate = sample_rate.max(1.0);
        self.r = clamp(1.0 - 2.0 * PI * corner_hz / sample_rate, 0.0, 0.999_999);
    }

    /// Process one sample.
    ///
    /// # The Algorithm
    ///
    /// ```text
    /// y  = x - x1 + r * y1
    /// x1 = x
    /// y1 = y
    /// ```
    #[inline]
    pub fn process(&mut self, x: f32) -> f32 {
        let y = x - self.x1 + self.r * self.y1;
        self.x1 = x;
        self.y1 = y;
        y
    }

    /// Forget the previous input and output. The corner is kept.
    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.y1 = 0.0;
    }
}

/// One-pole RC highpass, discretised from the analog RC time constant.
///
/// ```text
/// a    = rc / (rc + dt),   rc = 1 / (2π * cutoff),  dt = 1 / sample_rate
/// y[n] = a * (y[n-1] + x[n] - x[n-1])
/// ```
#[derive(Debug, Clone)]
pub struct OnePoleHighpass {
    a: f32,
    x1: f32,
    y1: f32,
}

impl Default for OnePoleHighpass {
    fn default() -> Self {
        Self::new()
    }
}

impl OnePoleHighpass {
    /// Passthrough until a cutoff is set.
    pub fn new() -> Self {
        Self {
            a: 1.0,
            x1: 0.0,
            y1: 0.0,
        }
    }

    pub fn set_cutoff(&mut self, cutoff_hz: f32, sample_rate: f32) {
        if sample_rate <= 0.0 || cutoff_hz <= 0.0 {
            self.a = 1.0;
            return;
        }
        let rc = 1.0 / (2.0 * PI * cutoff_hz);
        let dt = 1.0 / sample_rate;
        self.a = rc / (rc + dt);
    }

    #[inline]
    pub fn process(&mut self, x: f32) -> f32 {
        let y = self.a * (self.y1 + x - self.x1);
        self.x1 = x;
        self.y1 = y;
        y
    }

    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.y1 = 0.0;
    }
}
