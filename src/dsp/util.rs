//! # Scalar Helpers
//!
//! Small pure functions shared by every stage of the engine: range
//! saturation, decibel conversion, log-domain interpolation and the soft
//! clipper that sits in front of the modulator.

/// Level (in dB) at or below which a gain is treated as silence.
pub const MINUS_INFINITY_DB: f32 = -96.0;

/// Saturate `value` into `[lo, hi]`.
///
/// Unlike [`f32::clamp`], a NaN input saturates to `lo` instead of
/// propagating. Host automation occasionally delivers garbage and the
/// engine setters must never reject a value.
#[inline]
pub fn clamp(value: f32, lo: f32, hi: f32) -> f32 {
    if value.is_nan() {
        lo
    } else {
        value.clamp(lo, hi)
    }
}

/// Convert decibels to a linear gain factor.
///
/// ```text
/// gain = 10^(dB / 20)
/// ```
///
/// Anything at or below [`MINUS_INFINITY_DB`] maps to exactly `0.0`, so a
/// fader pulled all the way down is truly silent.
#[inline]
pub fn db_to_gain(db: f32) -> f32 {
    if db.is_nan() || db <= MINUS_INFINITY_DB {
        return 0.0;
    }
    10.0_f32.powf(db * 0.05)
}

/// Interpolate between `a` and `b` on a logarithmic scale.
///
/// `t = 0` gives `a`, `t = 1` gives `b`, `t = 0.5` gives the geometric
/// mean. Used for the brightness control, where equal knob travel should
/// feel like equal musical steps in frequency.
#[inline]
pub fn interp_log(a: f32, b: f32, t: f32) -> f32 {
    let a = a.max(1.0e-6);
    let b = b.max(1.0e-6);
    a * (b / a).powf(clamp(t, 0.0, 1.0))
}

/// `tanh` saturation normalised so that small signals pass at unity gain.
///
/// ```text
/// y = tanh(drive * x) / drive
/// ```
///
/// The output magnitude never exceeds `1 / drive`. Drive is floored at
/// `1e-3` to keep the division finite.
#[inline]
pub fn soft_clip(x: f32, drive: f32) -> f32 {
    let drive = drive.max(1.0e-3);
    (drive * x).tanh() / drive
}
