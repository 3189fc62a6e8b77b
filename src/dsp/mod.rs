//! # DSP (Digital Signal Processing) Primitives
//!
//! Everything the delay chip model is built from, leaf to root:
//!
//! - **`util`**: clamping, dB conversion, log interpolation, soft clipping.
//! - **`filter`**: the two-pole tone filter and the one-pole sections
//!   (lowpass, DC blocker, feedback highpass).
//! - **`smoother`**: click-free ramps for level and mix changes.
//! - **`level_follower`**: the envelope-driven gain stage on the wet path.
//! - **`bit_ring`**: the one-bit circular memory that realizes the delay.
//! - **`modulator`**: the delta-sigma encoder and its dither source.
//! - **`engine`**: the chip itself, tying all of the above together.

pub mod bit_ring;
pub mod engine;
pub mod filter;
pub mod level_follower;
pub mod modulator;
pub mod smoother;
pub mod util;
