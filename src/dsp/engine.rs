//! # Delay Chip Engine
//!
//! A parametric model of a one-bit delay chip. The chip encodes its input
//! with a delta-sigma modulator, clocks the resulting bit stream through a
//! shift memory, and decodes the bits back into audio. Everything
//! characteristic about its sound follows from that:
//!
//! - The delay time is set by the clock rate. Longer delays mean a slower
//!   clock, so fewer bits per audio sample, so more noise, less bandwidth
//!   and earlier clipping.
//! - The one-bit stream carries dither noise and quantization hash that
//!   the output filters only partly remove.
//!
//! ## Signal Flow (one audio sample)
//!
//! ```text
//! x ─►(+)─► [ToneFilter] ─► [one-pole LP] ─► [soft clip] ─┐
//!      ▲                                                  │ interpolate
//!      │                                 ┌────────────────┘ per tick
//!      │                                 ▼
//!      │            ┌───── N ticks: modulator ─► ring (read oldest,
//!      │            │                            write new) ─► ZOH ─► 2× LP
//!      │            └──────────────────────────────────────────┬─────────┘
//!      │                                              average of N ticks
//!      │                                                       ▼
//!      │                                    [ToneFilter] ─► [DC block] ─┬─► × trim ─► y
//!      │                                                                │
//!      └── × feedback ◄── [feedback HPF] ◄── × compensation ◄───────────┘
//! ```
//!
//! ## The Internal Clock
//!
//! The modulator runs at `clock_hz`, usually hundreds of times faster than
//! the audio rate and not an integer multiple of it. A double-precision
//! phase accumulator advances by `clock_hz / sample_rate` each audio sample
//! and one modulator tick runs for every whole unit it crosses. Each tick
//! sees the input linearly interpolated to the moment it happened.

use std::collections::TryReserveError;
use std::f64::consts::PI as PI_F64;

use super::bit_ring::BitDelayRing;
use super::filter::{DcBlocker, OnePoleFilter, OnePoleHighpass, ToneFilter};
use super::modulator::{bit_level, DeltaSigmaModulator, DEFAULT_DITHER_SEED};
use super::util::{clamp, interp_log, soft_clip};

/// Shortest delay the chip can be driven to, in ms.
pub const MIN_DELAY_MS: f32 = 35.0;
/// Longest delay the chip can be driven to, in ms.
pub const MAX_DELAY_MS: f32 = 1175.0;

const MIN_RESISTANCE_KOHM: f32 = 0.5;
const MAX_RESISTANCE_KOHM: f32 = 100.0;

/// `delay_ms = DELAY_MS_PER_KOHM * R + DELAY_MS_OFFSET`
const DELAY_MS_PER_KOHM: f32 = 11.46;
const DELAY_MS_OFFSET: f32 = 29.7;

/// VCO frequency times delay time: `f_vco = 683.21 / delay_ms * 1e6` Hz.
const VCO_HZ_MS: f64 = 683.21e6;
/// The shift memory is clocked at the VCO rate divided by this ratio.
const VCO_TO_RING_CLOCK: f64 = 15.5;

/// Ring bits per unit of oversampling. With the clock law above,
/// `capacity / tick_rate` equals the nominal delay time within 0.2 %.
const RING_BITS_PER_OVERSAMPLE: usize = 44_000;

/// Delay range over which the input scale and clip drive laws are
/// normalised. Longer delays extrapolate past 1.
const NORM_DELAY_MIN_MS: f32 = 31.0;
const NORM_DELAY_MAX_MS: f32 = 346.0;

const BASE_TONE_HZ: f32 = 7000.0;
const MAX_TONE_HZ: f32 = 14000.0;
const BASE_DEMOD_FC_SCALE: f32 = 220_000.0;
const MAX_DEMOD_FC_SCALE: f32 = 250_000.0;

const INPUT_FILTER_Q: f32 = 0.9;
const OUTPUT_FILTER_Q: f32 = 0.707;
const DC_BLOCK_HZ: f32 = 10.0;
const OUTPUT_TRIM: f32 = 1.45;

/// Oversampling multipliers indexed by the host selector. Index 2 has no
/// multiplier of its own and falls back to the default, like any index
/// outside the table.
const OVERSAMPLING_BY_INDEX: [Option<u32>; 7] =
    [Some(1), Some(2), None, Some(4), Some(8), Some(16), Some(32)];

/// Multiplier used when the selector index has no entry.
pub const DEFAULT_OVERSAMPLING: u32 = 16;

/// Map the host's oversampling selector index to a multiplier.
///
/// ```text
/// index:  0  1  2   3  4  5   6   other
/// factor: 1  2  16  4  8  16  32  16
/// ```
pub fn oversampling_factor(index: i32) -> u32 {
    usize::try_from(index)
        .ok()
        .and_then(|i| OVERSAMPLING_BY_INDEX.get(i).copied().flatten())
        .unwrap_or(DEFAULT_OVERSAMPLING)
}

/// Convert a delay time in ms to the chip's delay resistance in kΩ.
///
/// ```text
/// R = (clamp(delay_ms, 35, 1175) - 29.7) / 11.46
/// ```
pub fn delay_ms_to_resistance_kohm(delay_ms: f32) -> f32 {
    let delay_ms = clamp(delay_ms, MIN_DELAY_MS, MAX_DELAY_MS);
    clamp(
        (delay_ms - DELAY_MS_OFFSET) / DELAY_MS_PER_KOHM,
        MIN_RESISTANCE_KOHM,
        MAX_RESISTANCE_KOHM,
    )
}

/// Nominal delay in ms for a delay resistance in kΩ.
pub fn resistance_kohm_to_delay_ms(resistance_kohm: f32) -> f32 {
    DELAY_MS_PER_KOHM * resistance_kohm + DELAY_MS_OFFSET
}

/// Modulator tick rate for a delay resistance and oversampling factor.
pub fn internal_clock_hz(resistance_kohm: f32, oversampling: u32) -> f64 {
    let delay_ms = f64::from(resistance_kohm_to_delay_ms(resistance_kohm));
    let vco_hz = VCO_HZ_MS / delay_ms;
    vco_hz / VCO_TO_RING_CLOCK * f64::from(oversampling)
}

/// One channel of the delay chip.
///
/// Call [`prepare`](Self::prepare) before processing. Until it succeeds
/// the engine is inert and [`process_sample`](Self::process_sample)
/// returns silence.
#[derive(Debug, Clone)]
pub struct DelayChipEngine {
    oversampling: u32,
    sample_rate: f64,

    // ─── Controls ───
    resistance_kohm: f32,
    feedback_gain: f32,
    feedback_hpf_hz: f32,
    c3_nf: f32,
    c6_nf: f32,
    brightness: f32,
    boost: bool,

    // ─── Derived constants ───
    clock_hz: f64,
    input_scale: f32,
    feedback_compensation: f32,
    clip_drive: f32,
    integrator_gain: f32,
    tone_hz: f32,
    demod_fc_scale: f32,
    demod_alpha: f32,

    // ─── Run-time state ───
    phase: f64,
    modulator: DeltaSigmaModulator,
    ring: BitDelayRing,
    /// Ticks run since the last reset, saturating at the ring capacity.
    /// Until it gets there the slot being read was never written.
    ticks_since_reset: usize,
    demod: [f32; 2],
    input_filter: ToneFilter,
    input_pole: OnePoleFilter,
    output_filter: ToneFilter,
    dc_blocker: DcBlocker,
    feedback_hpf: OnePoleHighpass,
    feedback_sample: f32,
    prev_input: f32,
}

impl Default for DelayChipEngine {
    fn default() -> Self {
        Self::new(DEFAULT_OVERSAMPLING)
    }
}

impl DelayChipEngine {
    /// Create an engine with a fixed oversampling factor (floored at 1).
    ///
    /// No memory is allocated here; the bit ring is sized by
    /// [`prepare`](Self::prepare).
    pub fn new(oversampling: u32) -> Self {
        let mut engine = Self {
            oversampling: oversampling.max(1),
            sample_rate: 48000.0,

            resistance_kohm: 10.0,
            feedback_gain: 0.0,
            feedback_hpf_hz: 10.0,
            c3_nf: 100.0,
            c6_nf: 100.0,
            brightness: 0.0,
            boost: false,

            clock_hz: 0.0,
            input_scale: 0.6,
            feedback_compensation: 1.0 / 0.6,
            clip_drive: 1.5,
            integrator_gain: 1.0,
            tone_hz: BASE_TONE_HZ,
            demod_fc_scale: BASE_DEMOD_FC_SCALE,
            demod_alpha: 0.01,

            phase: 0.0,
            modulator: DeltaSigmaModulator::new(DEFAULT_DITHER_SEED),
            ring: BitDelayRing::new(),
            ticks_since_reset: 0,
            demod: [0.0; 2],
            input_filter: ToneFilter::new(),
            input_pole: OnePoleFilter::new(),
            output_filter: ToneFilter::new(),
            dc_blocker: DcBlocker::new(),
            feedback_hpf: OnePoleHighpass::new(),
            feedback_sample: 0.0,
            prev_input: 0.0,
        };
        engine.recompute_all();
        engine
    }

    /// Size the bit ring, derive every constant for `sample_rate` and the
    /// current controls, and reset the run-time state.
    ///
    /// If the ring cannot be allocated the engine is left inert (silent)
    /// and the error is returned.
    pub fn prepare(&mut self, sample_rate: f64) -> Result<(), TryReserveError> {
        self.sample_rate = sample_rate.max(1.0);
        self.recompute_all();

        let allocation = self
            .ring
            .resize(RING_BITS_PER_OVERSAMPLE * self.oversampling as usize);
        self.reset();
        allocation
    }

    /// Clear integrators, filters, ring contents and clock phase, and
    /// restart the dither sequence. Controls and storage are kept.
    pub fn reset(&mut self) {
        self.phase = 0.0;
        self.modulator.reset();
        self.ring.reset();
        self.ticks_since_reset = 0;
        self.demod = [0.0; 2];
        self.input_filter.reset();
        self.input_pole.reset();
        self.output_filter.reset();
        self.dc_blocker.reset();
        self.feedback_hpf.reset();
        self.feedback_sample = 0.0;
        self.prev_input = 0.0;
    }

    /// Seed the dither generator (for reproducible runs) and restart it.
    /// The seed survives [`reset`](Self::reset).
    pub fn set_dither_seed(&mut self, seed: u32) {
        self.modulator.set_seed(seed);
    }

    // ─────────────────────────────────────────────────────────────────
    // Controls
    // ─────────────────────────────────────────────────────────────────

    /// Delay resistance in kΩ, clamped to `[0.5, 100]`.
    pub fn set_delay_resistance_kohm(&mut self, resistance_kohm: f32) {
        let r = clamp(resistance_kohm, MIN_RESISTANCE_KOHM, MAX_RESISTANCE_KOHM);
        if r == self.resistance_kohm {
            return;
        }
        self.resistance_kohm = r;
        self.update_clock();
        self.update_demod_alpha();
    }

    /// Feedback amount, clamped to `[0, 2]`.
    pub fn set_feedback(&mut self, gain: f32) {
        self.feedback_gain = clamp(gain, 0.0, 2.0);
    }

    /// Feedback highpass cutoff in Hz, clamped to `[10, 440]`.
    pub fn set_feedback_high_pass_hz(&mut self, hz: f32) {
        let hz = clamp(hz, 10.0, 440.0);
        if hz == self.feedback_hpf_hz {
            return;
        }
        self.feedback_hpf_hz = hz;
        self.update_feedback_hpf();
    }

    /// Integrating capacitor in nF, clamped to `[22, 150]`. Sets the first
    /// integrator's gain.
    pub fn set_c3_nf(&mut self, nf: f32) {
        self.c3_nf = clamp(nf, 22.0, 150.0);
        self.integrator_gain = 100.0 / self.c3_nf;
    }

    /// Demodulator capacitor in nF, clamped to `[22, 150]`. Sets the
    /// demodulation cutoff.
    pub fn set_c6_nf(&mut self, nf: f32) {
        let nf = clamp(nf, 22.0, 150.0);
        if nf == self.c6_nf {
            return;
        }
        self.c6_nf = nf;
        self.update_demod_alpha();
    }

    /// Brightness in `[0, 1]`. Opens the input/output filters and the
    /// demodulator together.
    pub fn set_brightness(&mut self, amount: f32) {
        let amount = clamp(amount, 0.0, 1.0);
        if amount == self.brightness {
            return;
        }
        self.brightness = amount;
        self.update_tone();
        self.update_demod_alpha();
    }

    /// Boost switches the clip drive law to a hotter one.
    pub fn set_boost_activated(&mut self, enabled: bool) {
        if enabled == self.boost {
            return;
        }
        self.boost = enabled;
        self.update_clock();
    }

    // ─────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────

    pub fn oversampling(&self) -> u32 {
        self.oversampling
    }

    pub fn delay_resistance_kohm(&self) -> f32 {
        self.resistance_kohm
    }

    /// Nominal delay in ms for the current resistance.
    pub fn delay_ms(&self) -> f32 {
        resistance_kohm_to_delay_ms(self.resistance_kohm)
    }

    /// Modulator tick rate in Hz (oversampling included).
    pub fn internal_clock_hz(&self) -> f64 {
        self.clock_hz
    }

    pub fn clip_drive(&self) -> f32 {
        self.clip_drive
    }

    /// Ring size in bits, zero while inert.
    pub fn ring_capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// `false` until [`prepare`](Self::prepare) has allocated the ring.
    pub fn is_prepared(&self) -> bool {
        !self.ring.is_empty()
    }

    // ─────────────────────────────────────────────────────────────────
    // Processing
    // ─────────────────────────────────────────────────────────────────

    /// Process one audio sample and return the wet output.
    pub fn process_sample(&mut self, input: f32) -> f32 {
        if self.ring.is_empty() {
            return 0.0;
        }

        // Feedback injection and input conditioning.
        let summed = input + self.feedback_sample * self.feedback_gain;
        let filtered = self.input_pole.process(self.input_filter.process(summed));
        let conditioned = soft_clip(filtered, self.clip_drive);

        // Advance the internal clock and run every tick it crosses.
        let phase_step = self.clock_hz / self.sample_rate;
        self.phase += phase_step;

        let mut acc = 0.0_f32;
        let mut ticks = 0_u32;
        while self.phase >= 1.0 {
            self.phase -= 1.0;

            // How far through this sample the tick happened.
            let t = clamp((1.0 - self.phase / phase_step) as f32, 0.0, 1.0);
            let interpolated = self.prev_input + t * (conditioned - self.prev_input);

            acc += self.run_tick(interpolated);
            ticks += 1;
        }
        nih_plug::nih_debug_assert!((0.0..1.0).contains(&self.phase));

        self.prev_input = conditioned;

        let wet = if ticks > 0 {
            acc / ticks as f32
        } else {
            self.demod[1]
        };

        // Reconstruction.
        let wet = self.dc_blocker.process(self.output_filter.process(wet));

        self.feedback_sample = self
            .feedback_hpf
            .process(wet * self.feedback_compensation);

        wet * OUTPUT_TRIM
    }

    /// One modulator tick: encode, delay by one ring lap, decode.
    ///
    /// Slots not yet written since the last reset decode as mid-scale. An
    /// all-zero ring read as bits would be a full-scale negative level for
    /// the first lap and a step into the DC blocker when real bits arrive.
    #[inline]
    fn run_tick(&mut self, input: f32) -> f32 {
        let bit = self
            .modulator
            .tick(input * self.input_scale, self.integrator_gain);

        let oldest = self.ring.read_oldest();
        self.ring.write_bit(bit);

        let held = if self.ticks_since_reset < self.ring.capacity() {
            self.ticks_since_reset += 1;
            0.0
        } else {
            bit_level(oldest)
        };
        self.demod[0] += self.demod_alpha * (held - self.demod[0]);
        self.demod[1] += self.demod_alpha * (self.demod[0] - self.demod[1]);
        self.demod[1]
    }

    // ─────────────────────────────────────────────────────────────────
    // Derived constants
    // ─────────────────────────────────────────────────────────────────

    fn recompute_all(&mut self) {
        self.integrator_gain = 100.0 / self.c3_nf;
        self.dc_blocker
            .set_corner(DC_BLOCK_HZ, self.sample_rate as f32);
        self.update_clock();
        self.update_tone();
        self.update_demod_alpha();
        self.update_feedback_hpf();
    }

    /// Clock rate plus everything that follows the delay time.
    fn update_clock(&mut self) {
        self.clock_hz = internal_clock_hz(self.resistance_kohm, self.oversampling);

        let delay_norm =
            (self.delay_ms() - NORM_DELAY_MIN_MS) / (NORM_DELAY_MAX_MS - NORM_DELAY_MIN_MS);
        self.input_scale = 0.68 - 0.08 * delay_norm;
        self.feedback_compensation = 1.0 / self.input_scale.max(0.06);
        self.clip_drive = if self.boost {
            1.0 + 2.0 * delay_norm
        } else {
            0.5 + 0.9 * delay_norm
        };
    }

    /// Input and output filter cutoffs follow the brightness control.
    fn update_tone(&mut self) {
        let sample_rate = self.sample_rate as f32;
        self.tone_hz = interp_log(BASE_TONE_HZ, MAX_TONE_HZ, self.brightness);
        self.demod_fc_scale = interp_log(BASE_DEMOD_FC_SCALE, MAX_DEMOD_FC_SCALE, self.brightness);

        self.input_filter
            .set_lowpass(sample_rate, self.tone_hz, INPUT_FILTER_Q);
        self.input_pole.set_cutoff(self.tone_hz, sample_rate);
        self.output_filter
            .set_lowpass(sample_rate, self.tone_hz, OUTPUT_FILTER_Q);
    }

    /// Per-tick coefficient of the demodulator lowpass. Computed in double
    /// precision because the tick rate can be tens of MHz.
    fn update_demod_alpha(&mut self) {
        let fc = f64::from(self.demod_fc_scale / self.c6_nf);
        self.demod_alpha = if self.clock_hz > 0.0 {
            (1.0 - (-2.0 * PI_F64 * fc / self.clock_hz).exp()) as f32
        } else {
            1.0
        };
    }

    fn update_feedback_hpf(&mut self) {
        self.feedback_hpf
            .set_cutoff(self.feedback_hpf_hz, self.sample_rate as f32);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: f64 = 48000.0;

    fn prepared(oversampling: u32, delay_ms: f32) -> DelayChipEngine {
        let mut engine = DelayChipEngine::new(oversampling);
        engine.set_delay_resistance_kohm(delay_ms_to_resistance_kohm(delay_ms));
        engine.set_feedback(0.0);
        engine.prepare(SAMPLE_RATE).unwrap();
        engine.set_dither_seed(0xDEAD_BEEF);
        engine.reset();
        engine
    }

    fn run(engine: &mut DelayChipEngine, input: impl Fn(usize) -> f32, n: usize) -> Vec<f32> {
        (0..n).map(|i| engine.process_sample(input(i))).collect()
    }

    #[test]
    fn test_resistance_mapping() {
        let r = delay_ms_to_resistance_kohm(100.0);
        assert!((r - 6.134).abs() < 1e-3, "Expected ~6.134 kΩ, got {r}");

        // The delay range is clamped before conversion.
        assert_eq!(
            delay_ms_to_resistance_kohm(0.0),
            delay_ms_to_resistance_kohm(MIN_DELAY_MS)
        );
        assert_eq!(
            delay_ms_to_resistance_kohm(5000.0),
            delay_ms_to_resistance_kohm(MAX_DELAY_MS)
        );
        assert!(delay_ms_to_resistance_kohm(0.0) >= MIN_RESISTANCE_KOHM);
        assert!(delay_ms_to_resistance_kohm(5000.0) <= MAX_RESISTANCE_KOHM);

        let round_trip = resistance_kohm_to_delay_ms(r);
        assert!((round_trip - 100.0).abs() < 1e-3);
    }

    /// Shorter delay ⇒ faster clock, across the whole range.
    #[test]
    fn test_clock_monotonicity() {
        let mut engine = DelayChipEngine::new(16);
        let mut previous = f64::INFINITY;
        for step in 0..=200 {
            let r = 0.5 + step as f32 * 0.4975;
            engine.set_delay_resistance_kohm(r);
            let clock = engine.internal_clock_hz();
            assert!(clock < previous, "Clock not decreasing at {r} kΩ");
            previous = clock;
        }
    }

    #[test]
    fn test_clock_law() {
        // 100 ms: VCO 6.8321 MHz, ring clock /15.5, 16× oversampling.
        let expected = 683.21e6 / 100.0 / 15.5 * 16.0;
        let clock = internal_clock_hz(delay_ms_to_resistance_kohm(100.0), 16);
        assert!((clock / expected - 1.0).abs() < 1e-5, "Got {clock} Hz");
    }

    /// The ring lap time is the nominal delay time.
    #[test]
    fn test_ring_lap_matches_delay_time() {
        for oversampling in [1, 4, 16, 32] {
            let mut engine = DelayChipEngine::new(oversampling);
            engine.prepare(SAMPLE_RATE).unwrap();
            for delay_ms in [MIN_DELAY_MS, 100.0, 500.0, MAX_DELAY_MS] {
                engine.set_delay_resistance_kohm(delay_ms_to_resistance_kohm(delay_ms));
                let lap_ms = engine.ring_capacity() as f64 / engine.internal_clock_hz() * 1000.0;
                let error = (lap_ms / f64::from(engine.delay_ms()) - 1.0).abs();
                assert!(error < 2e-3, "{delay_ms} ms: ring lap {lap_ms} ms");
            }
        }
    }

    #[test]
    fn test_oversampling_index_mapping() {
        let expected = [1, 2, 16, 4, 8, 16, 32];
        for (index, factor) in expected.iter().enumerate() {
            assert_eq!(oversampling_factor(index as i32), *factor, "index {index}");
        }
        assert_eq!(oversampling_factor(-1), 16);
        assert_eq!(oversampling_factor(7), 16);
        assert_eq!(oversampling_factor(i32::MAX), 16);
    }

    #[test]
    fn test_prepare_sizes_ring_by_oversampling() {
        let mut engine = DelayChipEngine::new(8);
        assert!(!engine.is_prepared());
        engine.prepare(44100.0).unwrap();
        assert!(engine.is_prepared());
        assert_eq!(engine.ring_capacity(), 44_000 * 8);
    }

    #[test]
    fn test_setters_clamp() {
        let mut engine = DelayChipEngine::new(16);
        engine.set_delay_resistance_kohm(1000.0);
        assert_eq!(engine.delay_resistance_kohm(), 100.0);
        engine.set_delay_resistance_kohm(-3.0);
        assert_eq!(engine.delay_resistance_kohm(), 0.5);
        engine.set_delay_resistance_kohm(f32::NAN);
        assert_eq!(engine.delay_resistance_kohm(), 0.5);

        engine.set_feedback(9.0);
        assert_eq!(engine.feedback_gain, 2.0);
        engine.set_feedback_high_pass_hz(1.0);
        assert_eq!(engine.feedback_hpf_hz, 10.0);
        engine.set_c3_nf(1000.0);
        assert_eq!(engine.c3_nf, 150.0);
        assert!((engine.integrator_gain - 100.0 / 150.0).abs() < 1e-6);
        engine.set_c6_nf(0.0);
        assert_eq!(engine.c6_nf, 22.0);
        engine.set_brightness(2.0);
        assert_eq!(engine.brightness, 1.0);
        assert!((engine.tone_hz - MAX_TONE_HZ).abs() < 0.1);
    }

    #[test]
    fn test_boost_raises_clip_drive() {
        let mut engine = DelayChipEngine::new(16);
        engine.set_delay_resistance_kohm(delay_ms_to_resistance_kohm(300.0));
        let normal = engine.clip_drive();
        engine.set_boost_activated(true);
        let boosted = engine.clip_drive();
        assert!(boosted > normal, "Boost {boosted} should exceed {normal}");
        engine.set_boost_activated(false);
        assert_eq!(engine.clip_drive(), normal);
    }

    /// Brightness and C6 both feed the demodulator cutoff; the coefficient
    /// must move on the very next call, not a sample late.
    #[test]
    fn test_demod_coefficient_tracks_controls() {
        let mut engine = DelayChipEngine::new(16);
        let dark = engine.demod_alpha;
        engine.set_brightness(1.0);
        assert!(engine.demod_alpha > dark);

        let bright = engine.demod_alpha;
        engine.set_c6_nf(22.0);
        assert!(engine.demod_alpha > bright);
    }

    #[test]
    fn test_unprepared_engine_is_silent() {
        let mut engine = DelayChipEngine::new(16);
        for i in 0..1000 {
            let x = if i % 2 == 0 { 1.0 } else { -1.0 };
            assert_eq!(engine.process_sample(x), 0.0);
        }
    }

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|y| y * y).sum::<f32>() / samples.len() as f32).sqrt()
    }

    #[test]
    fn test_silence_in_settles() {
        let mut engine = prepared(16, MIN_DELAY_MS);
        let output = run(&mut engine, |_| 0.0, 10_000);

        assert!(output.iter().all(|y| y.is_finite()));
        for (i, y) in output[output.len() - 100..].iter().enumerate() {
            assert!(y.abs() < 1e-3, "Sample {}: {y} has not settled", 9900 + i);
        }
    }

    /// Longer delays clock the modulator slower, so the idle dither noise
    /// left after decoding is higher, but there is still no offset or
    /// start-up step in it.
    #[test]
    fn test_silence_in_settles_at_longer_delays() {
        let default_delay = DelayChipEngine::default().delay_ms();
        for delay_ms in [default_delay, 100.0, 190.0] {
            let mut engine = prepared(16, delay_ms);
            let output = run(&mut engine, |_| 0.0, 10_000);
            let tail = &output[output.len() - 100..];

            let peak = tail.iter().fold(0.0_f32, |m, y| m.max(y.abs()));
            assert!(peak < 2.5e-3, "{delay_ms} ms: tail peak {peak}");
            assert!(rms(tail) < 1e-3, "{delay_ms} ms: tail rms {}", rms(tail));
        }
    }

    /// A reset must not leave anything in the ring that decodes as signal:
    /// silence stays quiet through the first lap, the moment the first
    /// written bits come back, and the DC blocker's settle time after it.
    #[test]
    fn test_no_step_when_first_lap_comes_back() {
        let mut engine = prepared(16, 190.0);
        // 190 ms is ~9100 samples; then about five DC-blocker time constants.
        let output = run(&mut engine, |_| 0.0, 13_000);
        for (i, y) in output.iter().enumerate() {
            assert!(y.abs() < 1e-2, "Sample {i}: {y} after reset");
        }

        engine.set_delay_resistance_kohm(delay_ms_to_resistance_kohm(100.0));
        engine.reset();
        let output = run(&mut engine, |_| 0.0, 10_000);
        let peak = output.iter().fold(0.0_f32, |m, y| m.max(y.abs()));
        assert!(peak < 1e-2, "Peak {peak} after a second reset");
    }

    #[test]
    fn test_clock_phase_stays_in_unit_interval() {
        let mut engine = prepared(1, MAX_DELAY_MS);
        for i in 0..2000 {
            engine.process_sample((i as f32 * 0.01).sin() * 0.5);
            assert!((0.0..1.0).contains(&engine.phase));
        }
    }

    /// Nothing leaves the ring before one full lap, so the raw output is
    /// exactly zero until the delay time has passed. The echo itself is
    /// located by comparing against an identical silent run, which carries
    /// the same dither noise.
    #[test]
    fn test_impulse_response_arrives_after_delay() {
        const N: usize = 10_000;

        let mut silent = prepared(16, 100.0);
        let mut excited = prepared(16, 100.0);

        let reference = run(&mut silent, |_| 0.0, N);
        let response = run(&mut excited, |i| if i == 0 { 1.0 } else { 0.0 }, N);

        assert_eq!(response[0], 0.0, "Impulse leaked through at sample 0");
        // 100 ms at 48 kHz is 4800 samples.
        assert!(
            response[..4700].iter().all(|y| *y == 0.0),
            "Output before the first ring lap"
        );

        let first = reference
            .iter()
            .zip(&response)
            .position(|(a, b)| a != b)
            .expect("Impulse never came out of the delay");
        assert!(
            (4700..=4900).contains(&first),
            "Echo arrived at sample {first}, expected near 4800"
        );

        let energy: f32 = response.iter().map(|y| y * y).sum();
        assert!(energy.is_finite());
        assert!(energy < N as f32, "Runaway output energy {energy}");
    }

    /// A sustained tone comes back as a tone after the delay.
    #[test]
    fn test_tone_passes_through_delay() {
        let mut engine = prepared(16, MIN_DELAY_MS);
        let input = |i: usize| 0.3 * (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 48000.0).sin();
        let output = run(&mut engine, input, 12_000);

        let tail = rms(&output[8000..]);
        assert!(tail > 0.05, "Expected the tone to come through, rms {tail}");
        assert!(tail < 1.0, "Unexpectedly hot output, rms {tail}");
    }

    /// With feedback the echo repeats; without it, it does not.
    #[test]
    fn test_feedback_produces_repeats() {
        // Start once the ring holds real bits.
        const PRE_ROLL: usize = 20_000;

        let burst = |i: usize| {
            if (PRE_ROLL..PRE_ROLL + 480).contains(&i) {
                0.5 * (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 48000.0).sin()
            } else {
                0.0
            }
        };
        let second_echo_energy = |feedback: f32| {
            let mut engine = prepared(4, MIN_DELAY_MS);
            engine.set_feedback_high_pass_hz(10.0);
            engine.set_feedback(feedback);
            let output = run(&mut engine, burst, PRE_ROLL + 6000);
            // The second repeat lands near 2 × 35.43 ms ≈ 3400 samples.
            output[PRE_ROLL + 3300..PRE_ROLL + 4000]
                .iter()
                .map(|y| y * y)
                .sum::<f32>()
        };

        let dry = second_echo_energy(0.0);
        let wet = second_echo_energy(0.8);
        assert!(wet > 1.0, "Expected an audible second repeat, got {wet}");
        assert!(wet > dry * 100.0, "Feedback {wet} vs none {dry}");
    }

    #[test]
    fn test_reset_is_deterministic() {
        let mut engine = prepared(4, 200.0);
        let input = |i: usize| ((i * 37 % 101) as f32 / 101.0 - 0.5) * 0.8;

        let first = run(&mut engine, input, 3000);
        engine.reset();
        let second = run(&mut engine, input, 3000);
        assert_eq!(first, second);
    }

    #[test]
    fn test_instances_are_independent() {
        let mut a = prepared(4, 200.0);
        let mut b = prepared(4, 200.0);
        b.set_dither_seed(1);
        b.reset();

        let input = |_| 0.0;
        let ya = run(&mut a, input, 12_000);
        let yb = run(&mut b, input, 12_000);
        assert!(ya.iter().zip(&yb).any(|(x, y)| x != y));

        // Running one engine does not disturb the other.
        let mut c = prepared(4, 200.0);
        assert_eq!(run(&mut c, input, 12_000), ya);
    }
}
