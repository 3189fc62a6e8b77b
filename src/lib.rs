//! # One-Bit Delay — An AU/VST3/CLAP Delay Chip Emulation
//!
//! Emulates the classic one-bit echo chip: the input is encoded by a
//! delta-sigma modulator into a dense bit stream, clocked through a bit
//! memory, and decoded back into audio. The delay time sets the chip's
//! clock rate, so every delay setting has its own bandwidth, noise floor
//! and clipping behavior. Built with [nih-plug](https://github.com/robbert-vdh/nih-plug).
//!
//! ## Signal Flow
//!
//! ```text
//! Input ──┬──────────────────────────────────────── × dry ──────┐
//!         │                                                     │
//!         └─► × input ─► [Delay Chip Engine] ─► [Level Follower] ─► × wet ─►(+)─┐
//!                                                                               │
//!         passthrough crossfade: out = fx + (input - fx) × pass ◄───────────────┘
//! ```
//!
//! The chip engine lives in [`dsp::engine`]. This file is the host
//! boundary: parameters in, per-channel engines, level smoothing and the
//! dry/wet/passthrough mix.

pub mod dsp;
mod params;

use std::num::NonZeroU32;
use std::sync::Arc;

use dsp::engine::{delay_ms_to_resistance_kohm, oversampling_factor, DelayChipEngine};
use dsp::level_follower::LevelFollower;
use dsp::smoother::ParameterSmoother;
use dsp::util::db_to_gain;
use nih_plug::prelude::*;
use params::PluginParams;

/// Ramp time for the input, dry and wet level changes.
const LEVEL_SMOOTHING_SECONDS: f32 = 0.2;
/// Ramp time for the passthrough crossfade.
const PASSTHROUGH_SMOOTHING_SECONDS: f32 = 0.1;

/// The main plugin struct.
///
/// Parameters are shared with the host through an `Arc`. Everything else
/// is owned by the audio thread: one engine and one level follower per
/// channel, and one set of level smoothers advanced once per sample frame.
struct OnebitDelay {
    params: Arc<PluginParams>,
    sample_rate: f32,

    /// One delay chip per channel. Channels share nothing.
    engines: Vec<DelayChipEngine>,
    followers: Vec<LevelFollower>,

    input_gain: ParameterSmoother,
    dry_gain: ParameterSmoother,
    wet_gain: ParameterSmoother,
    passthrough: ParameterSmoother,
}

impl Default for OnebitDelay {
    fn default() -> Self {
        Self {
            params: Arc::new(PluginParams::default()),
            sample_rate: 44100.0,
            engines: Vec::new(),
            followers: Vec::new(),
            input_gain: ParameterSmoother::default(),
            dry_gain: ParameterSmoother::default(),
            wet_gain: ParameterSmoother::default(),
            passthrough: ParameterSmoother::default(),
        }
    }
}

impl OnebitDelay {
    /// Push the current control values into one engine. The setters skip
    /// any recomputation when a value has not changed.
    fn apply_controls(engine: &mut DelayChipEngine, controls: &Controls) {
        engine.set_brightness(controls.brightness);
        engine.set_boost_activated(controls.boost);
        engine.set_feedback_high_pass_hz(controls.feedback_hpf_hz);
        engine.set_delay_resistance_kohm(delay_ms_to_resistance_kohm(controls.delay_ms));
        engine.set_feedback(controls.feedback);
        engine.set_c3_nf(controls.c3_nf);
        engine.set_c6_nf(controls.c6_nf);
    }
}

/// One sample frame's worth of engine controls.
#[derive(Debug, Clone, Copy)]
struct Controls {
    delay_ms: f32,
    feedback: f32,
    feedback_hpf_hz: f32,
    c3_nf: f32,
    c6_nf: f32,
    /// Normalised to `[0, 1]`.
    brightness: f32,
    boost: bool,
}

impl Controls {
    /// Current (unsmoothed) values, used when (re)building the engines.
    fn current(params: &PluginParams) -> Self {
        Self {
            delay_ms: params.delay_time.value(),
            feedback: params.feedback.value(),
            feedback_hpf_hz: params.feedback_hpf.value(),
            c3_nf: params.c3.value(),
            c6_nf: params.c6.value(),
            brightness: params.brightness.value() * 0.01,
            boost: params.boost.value(),
        }
    }

    /// Next smoothed values. Call once per sample frame.
    fn next_smoothed(params: &PluginParams) -> Self {
        Self {
            delay_ms: params.delay_time.smoothed.next(),
            feedback: params.feedback.smoothed.next(),
            feedback_hpf_hz: params.feedback_hpf.smoothed.next(),
            c3_nf: params.c3.smoothed.next(),
            c6_nf: params.c6.smoothed.next(),
            brightness: params.brightness.smoothed.next() * 0.01,
            boost: params.boost.value(),
        }
    }
}

/// Final output mix for one sample.
///
/// ```text
/// fx  = dry_gain * dry + wet_gain * wet
/// out = fx + (dry - fx) * pass
/// ```
///
/// `pass = 1` is a clean bypass; in between it crossfades.
#[inline]
fn mix_output(dry: f32, wet: f32, dry_gain: f32, wet_gain: f32, pass: f32) -> f32 {
    let fx = dry_gain * dry + wet_gain * wet;
    fx + (dry - fx) * pass
}

fn passthrough_target(enabled: bool) -> f32 {
    if enabled {
        1.0
    } else {
        0.0
    }
}

impl Plugin for OnebitDelay {
    const NAME: &'static str = "One-Bit Delay";
    const VENDOR: &'static str = "Loveless Audio";
    const URL: &'static str = "";
    const EMAIL: &'static str = "steve.loveless@gmail.com";
    const VERSION: &'static str = env!("CARGO_PKG_VERSION");

    const AUDIO_IO_LAYOUTS: &'static [AudioIOLayout] = &[
        // The chip is mono; stereo runs two independent chips.
        AudioIOLayout {
            main_input_channels: NonZeroU32::new(2),
            main_output_channels: NonZeroU32::new(2),
            aux_input_ports: &[],
            aux_output_ports: &[],
            names: PortNames::const_default(),
        },
        AudioIOLayout {
            main_input_channels: NonZeroU32::new(1),
            main_output_channels: NonZeroU32::new(1),
            aux_input_ports: &[],
            aux_output_ports: &[],
            names: PortNames::const_default(),
        },
    ];

    const MIDI_INPUT: MidiConfig = MidiConfig::None;
    const SAMPLE_ACCURATE_AUTOMATION: bool = true;

    type SysExMessage = ();
    type BackgroundTask = ();

    fn params(&self) -> Arc<dyn Params> {
        self.params.clone()
    }

    /// Build one engine per channel. This is the only place the engines
    /// allocate (their bit rings), and the only place the oversampling
    /// selector is read.
    ///
    /// A ring that cannot be allocated leaves its engine inert: that
    /// channel's echo is silent but the plugin still loads.
    fn initialize(
        &mut self,
        audio_io_layout: &AudioIOLayout,
        buffer_config: &BufferConfig,
        _context: &mut impl InitContext<Self>,
    ) -> bool {
        self.sample_rate = buffer_config.sample_rate;

        let num_channels = audio_io_layout
            .main_input_channels
            .map(|c| c.get() as usize)
            .unwrap_or(2);

        let oversampling = oversampling_factor(self.params.oversampling.value());
        let controls = Controls::current(&self.params);

        self.engines = (0..num_channels)
            .map(|channel| {
                let mut engine = DelayChipEngine::new(oversampling);
                Self::apply_controls(&mut engine, &controls);
                if let Err(err) = engine.prepare(f64::from(self.sample_rate)) {
                    nih_log!("Channel {channel}: bit ring allocation failed ({err}), echo muted");
                }
                engine
            })
            .collect();

        self.followers = (0..num_channels)
            .map(|_| {
                let mut follower = LevelFollower::default();
                follower.prepare(self.sample_rate);
                follower
            })
            .collect();

        self.input_gain.reset(
            self.sample_rate,
            LEVEL_SMOOTHING_SECONDS,
            db_to_gain(self.params.input_level.value()),
        );
        self.dry_gain.reset(
            self.sample_rate,
            LEVEL_SMOOTHING_SECONDS,
            db_to_gain(self.params.dry_level.value()),
        );
        self.wet_gain.reset(
            self.sample_rate,
            LEVEL_SMOOTHING_SECONDS,
            db_to_gain(self.params.wet_level.value()),
        );
        self.passthrough.reset(
            self.sample_rate,
            PASSTHROUGH_SMOOTHING_SECONDS,
            passthrough_target(self.params.passthrough.value()),
        );

        nih_log!(
            "Initialized at {} Hz, {} channel(s), {}x oversampling, {} ring bits per channel",
            self.sample_rate,
            num_channels,
            oversampling,
            self.engines.first().map_or(0, DelayChipEngine::ring_capacity)
        );

        true
    }

    /// Clear every chip and follower so stale echoes don't bleed into the
    /// next playback.
    fn reset(&mut self) {
        for engine in &mut self.engines {
            engine.reset();
        }
        for follower in &mut self.followers {
            follower.reset();
        }
    }

    fn process(
        &mut self,
        buffer: &mut Buffer,
        _aux: &mut AuxiliaryBuffers,
        _context: &mut impl ProcessContext<Self>,
    ) -> ProcessStatus {
        for mut channel_samples in buffer.iter_samples() {
            let controls = Controls::next_smoothed(&self.params);

            self.input_gain
                .set_target(db_to_gain(self.params.input_level.value()));
            self.dry_gain
                .set_target(db_to_gain(self.params.dry_level.value()));
            self.wet_gain
                .set_target(db_to_gain(self.params.wet_level.value()));
            self.passthrough
                .set_target(passthrough_target(self.params.passthrough.value()));

            let input_gain = self.input_gain.next();
            let dry_gain = self.dry_gain.next();
            let wet_gain = self.wet_gain.next();
            let pass = self.passthrough.next();

            for (channel_idx, sample) in channel_samples.iter_mut().enumerate() {
                let Some(engine) = self.engines.get_mut(channel_idx) else {
                    continue;
                };
                let Some(follower) = self.followers.get_mut(channel_idx) else {
                    continue;
                };

                Self::apply_controls(engine, &controls);

                let dry = *sample;
                let wet = follower.process(engine.process_sample(dry * input_gain));
                *sample = mix_output(dry, wet, dry_gain, wet_gain, pass);
            }
        }

        // Keep the host calling us while echoes are still ringing out.
        let delay_ms = self.params.delay_time.value();
        let feedback = self.params.feedback.value();
        match tail_samples(delay_ms, feedback, self.sample_rate) {
            Some(samples) => ProcessStatus::Tail(samples),
            None => ProcessStatus::KeepAlive,
        }
    }
}

const fn calculate_delay_samples(delay_ms: f32, sample_rate: f32) -> f32 {
    delay_ms * sample_rate / 1000.0
}

/// How long the echoes take to fall to −60 dB, in samples.
///
/// Each repeat is scaled by roughly `feedback`, so after `N` repeats the
/// level is `feedback^N`; solving `feedback^N = 0.001` gives
/// `N = -3 / log10(feedback)`. At or above unity feedback the loop can
/// sustain itself, so there is no finite tail (`None`).
fn tail_samples(delay_ms: f32, feedback: f32, sample_rate: f32) -> Option<u32> {
    let delay_samps = calculate_delay_samples(delay_ms, sample_rate);
    if feedback >= 1.0 {
        return None;
    }
    if feedback > 0.001 {
        let repeats = -3.0 / feedback.log10();
        Some((repeats * delay_samps) as u32)
    } else {
        Some(delay_samps as u32)
    }
}

impl ClapPlugin for OnebitDelay {
    const CLAP_ID: &'static str = "com.loveless-audio.onebit-delay";
    const CLAP_DESCRIPTION: Option<&'static str> =
        Some("One-bit delay chip emulation with delta-sigma encoding");
    const CLAP_MANUAL_URL: Option<&'static str> = None;
    const CLAP_SUPPORT_URL: Option<&'static str> = None;
    const CLAP_FEATURES: &'static [ClapFeature] = &[
        ClapFeature::AudioEffect,
        ClapFeature::Mono,
        ClapFeature::Stereo,
        ClapFeature::Delay,
    ];
}

impl Vst3Plugin for OnebitDelay {
    const VST3_CLASS_ID: [u8; 16] = *b"LvlssOneBitDly01";
    const VST3_SUBCATEGORIES: &'static [Vst3SubCategory] =
        &[Vst3SubCategory::Fx, Vst3SubCategory::Delay];
}

nih_export_clap!(OnebitDelay);
nih_export_vst3!(OnebitDelay);

// AUv2 entry point for Logic Pro, wrapped around the CLAP export.
clap_wrapper::export_auv2!();
