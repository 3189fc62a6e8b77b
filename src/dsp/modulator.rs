//! # Delta-Sigma Modulator
//!
//! The analog core of the chip: two leaky integrators feeding a one-bit
//! quantizer, with the quantizer's output fed back through a one-bit DAC.
//!
//! ```text
//!              dither
//!                │
//! input ──►(+)──(+)──► ∫ leak1 ──► ∫ leak2 ──► [≥ 0 ?] ──┬──► bit
//!           ▲ -                                          │
//!           └────────────── ±DAC_LEVEL ◄─────────────────┘
//! ```
//!
//! The density of ones in the output stream tracks the input amplitude.
//! The leak coefficients keep the integrators bounded when the loop is
//! overloaded. A small amount of dither keeps a silent input from settling
//! into a short repeating bit pattern, which would be heard as an idle tone.

/// Analog level the one-bit DAC produces for a `1` (and negated for `0`).
pub const DAC_LEVEL: f32 = 0.7;

const K1: f32 = 0.8;
const K2: f32 = 0.4;
const LEAK1: f32 = 0.9995;
const LEAK2: f32 = 0.9990;
const DITHER_AMOUNT: f32 = 0.02;

/// Seed used after construction and whenever no explicit seed was given.
pub const DEFAULT_DITHER_SEED: u32 = 0x1234_5678;

/// Zero-order-hold level for a stored bit.
#[inline]
pub fn bit_level(bit: bool) -> f32 {
    if bit {
        DAC_LEVEL
    } else {
        -DAC_LEVEL
    }
}

/// Marsaglia's 32-bit xorshift generator.
#[derive(Debug, Clone)]
pub struct Xorshift32 {
    state: u32,
}

impl Xorshift32 {
    /// A zero seed would lock the generator at zero forever, so it is
    /// replaced by [`DEFAULT_DITHER_SEED`].
    pub fn new(seed: u32) -> Self {
        Self {
            state: if seed == 0 { DEFAULT_DITHER_SEED } else { seed },
        }
    }

    #[inline]
    pub fn next_u32(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        x
    }

    /// Next draw mapped to `[-1, 1)`.
    #[inline]
    pub fn next_bipolar(&mut self) -> f32 {
        self.next_u32() as i32 as f32 * (1.0 / 2_147_483_648.0)
    }
}

/// The modulator's integrators, quantizer state and dither source.
#[derive(Debug, Clone)]
pub struct DeltaSigmaModulator {
    integrator1: f32,
    integrator2: f32,
    bit: bool,
    seed: u32,
    rng: Xorshift32,
}

impl Default for DeltaSigmaModulator {
    fn default() -> Self {
        Self::new(DEFAULT_DITHER_SEED)
    }
}

impl DeltaSigmaModulator {
    pub fn new(seed: u32) -> Self {
        Self {
            integrator1: 0.0,
            integrator2: 0.0,
            bit: false,
            seed,
            rng: Xorshift32::new(seed),
        }
    }

    /// Change the dither seed and restart the generator from it. Later
    /// calls to [`reset`](Self::reset) return to this seed.
    pub fn set_seed(&mut self, seed: u32) {
        self.seed = seed;
        self.rng = Xorshift32::new(seed);
    }

    /// Zero the integrators and the output bit and restart the dither
    /// sequence from the configured seed.
    pub fn reset(&mut self) {
        self.integrator1 = 0.0;
        self.integrator2 = 0.0;
        self.bit = false;
        self.rng = Xorshift32::new(self.seed);
    }

    /// Triangular-ish dither: the mean of two uniform draws, scaled down.
    #[inline]
    fn dither(&mut self) -> f32 {
        let u1 = self.rng.next_bipolar();
        let u2 = self.rng.next_bipolar();
        (u1 + u2) * 0.5 * DITHER_AMOUNT
    }

    /// Run one modulator tick on an already scaled input and return the
    /// new output bit.
    ///
    /// `integrator_gain` is the first integrator's gain, set by the
    /// integrating capacitor.
    #[inline]
    pub fn tick(&mut self, input: f32, integrator_gain: f32) -> bool {
        let error = input - bit_level(self.bit) + self.dither();

        self.integrator1 = (self.integrator1 + error * K1 * integrator_gain) * LEAK1;
        self.integrator2 = (self.integrator2 + self.integrator1 * K2) * LEAK2;

        self.bit = self.integrator2 >= 0.0;
        self.bit
    }

    /// Most recent output bit.
    pub fn bit(&self) -> bool {
        self.bit
    }
}
