//! # Plugin Parameters
//!
//! Each parameter has a stable string ID (`#[id = "..."]`) that hosts use to
//! save and recall presets. Once published, never change these IDs.
//!
//! Continuous engine controls use nih-plug's own smoothers. The level and
//! passthrough controls are smoothed in the plugin with
//! [`ParameterSmoother`](crate::dsp::smoother::ParameterSmoother) instead,
//! so they carry no smoother here.

use std::sync::Arc;

use nih_plug::prelude::*;

use crate::dsp::engine::{oversampling_factor, MAX_DELAY_MS, MIN_DELAY_MS};
use crate::dsp::util::MINUS_INFINITY_DB;

/// Upper bound of the three level faders.
const MAX_LEVEL_DB: f32 = 12.0;

/// All user-facing parameters.
#[derive(Params)]
pub struct PluginParams {
    /// **Input Level** — drive into the chip, in dB. −96 dB is silence.
    #[id = "in"]
    pub input_level: FloatParam,

    /// **Dry Level** — unprocessed signal in the output, in dB.
    #[id = "dry"]
    pub dry_level: FloatParam,

    /// **Wet Level** — echo signal in the output, in dB.
    #[id = "wet"]
    pub wet_level: FloatParam,

    /// **Delay Time** — 35 ms to 1175 ms. Longer delays slow the chip's
    /// clock, so they are also noisier, darker and clip earlier.
    #[id = "delay"]
    pub delay_time: FloatParam,

    /// **Feedback HPF** — highpass corner on the feedback path. Raising it
    /// thins out successive repeats.
    #[id = "fbhp"]
    pub feedback_hpf: FloatParam,

    /// **Feedback** — amount of echo fed back into the chip. Above roughly
    /// 1.0 the loop self-oscillates.
    #[id = "fdbk"]
    pub feedback: FloatParam,

    /// **C3** — integrating capacitor of the modulator, in nF.
    #[id = "c3"]
    pub c3: FloatParam,

    /// **C6** — demodulator capacitor, in nF. Smaller values brighten the
    /// decoded signal and let more clock hash through.
    #[id = "c6"]
    pub c6: FloatParam,

    /// **Brightness** — opens the input, output and demodulator filters.
    #[id = "brt"]
    pub brightness: FloatParam,

    /// **Boost** — hotter input clipping.
    #[id = "boost"]
    pub boost: BoolParam,

    /// **Passthrough** — crossfades the output to the untouched input.
    #[id = "pass"]
    pub passthrough: BoolParam,

    /// **Oversampling** — selector index for the modulator's oversampling
    /// factor. Only read when the plugin initializes.
    #[id = "os"]
    pub oversampling: IntParam,
}

fn level_param(name: &str) -> FloatParam {
    FloatParam::new(
        name,
        0.0,
        FloatRange::Linear {
            min: MINUS_INFINITY_DB,
            max: MAX_LEVEL_DB,
        },
    )
    .with_unit(" dB")
    .with_step_size(0.1)
}

fn capacitor_param(name: &str) -> FloatParam {
    FloatParam::new(name, 100.0, FloatRange::Linear { min: 22.0, max: 150.0 })
        .with_unit(" nF")
        .with_smoother(SmoothingStyle::Linear(20.0))
        .with_step_size(1.0)
}

impl Default for PluginParams {
    fn default() -> Self {
        Self {
            input_level: level_param("Input Level"),
            dry_level: level_param("Dry Level"),
            wet_level: level_param("Wet Level"),

            delay_time: FloatParam::new(
                "Delay Time",
                300.0,
                FloatRange::Skewed {
                    min: MIN_DELAY_MS,
                    max: MAX_DELAY_MS,
                    factor: FloatRange::skew_factor(-1.0),
                },
            )
            .with_unit(" ms")
            // The chip's clock glides rather than jumps, which gives the
            // familiar pitch bend when the knob is turned.
            .with_smoother(SmoothingStyle::Linear(50.0))
            .with_step_size(0.1),

            feedback_hpf: FloatParam::new(
                "Feedback HPF",
                40.0,
                FloatRange::Skewed {
                    min: 10.0,
                    max: 440.0,
                    factor: FloatRange::skew_factor(-1.0),
                },
            )
            .with_unit(" Hz")
            .with_smoother(SmoothingStyle::Linear(50.0))
            .with_step_size(1.0),

            feedback: FloatParam::new("Feedback", 0.4, FloatRange::Linear { min: 0.0, max: 2.0 })
                .with_smoother(SmoothingStyle::Linear(20.0))
                .with_step_size(0.01),

            c3: capacitor_param("C3"),
            c6: capacitor_param("C6"),

            brightness: FloatParam::new(
                "Brightness",
                0.0,
                FloatRange::Linear {
                    min: 0.0,
                    max: 100.0,
                },
            )
            .with_unit("%")
            .with_smoother(SmoothingStyle::Linear(20.0))
            .with_step_size(0.1),

            boost: BoolParam::new("Boost", false),
            passthrough: BoolParam::new("Passthrough", false),

            oversampling: IntParam::new("Oversampling", 5, IntRange::Linear { min: 0, max: 6 })
                .with_value_to_string(Arc::new(|index| {
                    format!("{}x", oversampling_factor(index))
                }))
                .non_automatable(),
        }
    }
}
