//! # Level Follower
//!
//! A simple downward compressor on the wet signal. The chip's companding
//! stages keep the echo level in check; this stage plays that role.
//!
//! An envelope follower tracks `|x|` with a fast attack and slow release.
//! Above the threshold the gain falls so that the output rises only
//! `1 / ratio` dB per input dB. There is no knee.

use super::util::db_to_gain;

const THRESHOLD_DB: f32 = -18.0;
const RATIO: f32 = 4.0;
const ATTACK_MS: f32 = 8.0;
const RELEASE_MS: f32 = 220.0;

/// Envelope follower driving a fixed-threshold gain computer.
#[derive(Debug, Clone)]
pub struct LevelFollower {
    threshold: f32,
    attack_coeff: f32,
    release_coeff: f32,
    envelope: f32,
}

impl Default for LevelFollower {
    fn default() -> Self {
        let mut follower = Self {
            threshold: db_to_gain(THRESHOLD_DB),
            attack_coeff: 0.0,
            release_coeff: 0.0,
            envelope: 0.0,
        };
        follower.prepare(48000.0);
        follower
    }
}

impl LevelFollower {
    /// Derive the smoothing coefficients for `sample_rate` and clear the
    /// envelope.
    pub fn prepare(&mut self, sample_rate: f32) {
        let sample_rate = sample_rate.max(1.0);
        self.threshold = db_to_gain(THRESHOLD_DB);
        self.attack_coeff = time_constant_coeff(ATTACK_MS, sample_rate);
        self.release_coeff = time_constant_coeff(RELEASE_MS, sample_rate);
        self.envelope = 0.0;
    }

    pub fn reset(&mut self) {
        self.envelope = 0.0;
    }

    #[inline]
    pub fn process(&mut self, x: f32) -> f32 {
        let level = x.abs();
        let coeff = if level > self.envelope {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.envelope = coeff * self.envelope + (1.0 - coeff) * level;

        x * self.gain()
    }

    /// Gain the computer applies at the current envelope.
    fn gain(&self) -> f32 {
        if self.envelope <= self.threshold {
            return 1.0;
        }
        (self.envelope / self.threshold).powf(1.0 / RATIO - 1.0)
    }
}

/// `exp(-1 / (sample_rate * t))`, with `t` floored at 10 µs.
fn time_constant_coeff(ms: f32, sample_rate: f32) -> f32 {
    let seconds = (ms * 0.001).max(1.0e-5);
    (-1.0 / (sample_rate * seconds)).exp()
}
