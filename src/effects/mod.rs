// src/effects/mod.rs

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::audio::AudioBuffer;
use crate::dsp::{self, eq, ops};

/// Declarative record of every enabled non-destructive stage. The pipeline
/// replays this against the pristine source buffer, so stages can be
/// toggled off exactly and never compound.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ActiveEffects {
    pub fade_in: Option<f64>,
    pub fade_out: Option<f64>,
    pub normalize: bool,
    pub reverse: bool,
    pub playback_rate: Option<f64>,
    pub preserve_pitch: bool,
    pub eq_preset: Option<String>,
    pub vocal_remover: bool,
    pub vocal_isolator: bool,
}

impl ActiveEffects {
    pub fn is_empty(&self) -> bool {
        *self == ActiveEffects::default()
    }
}

/// A single user-facing toggle/adjustment of one stage. `None`/`false`
/// removes the stage from the chain.
#[derive(Clone, Debug, PartialEq)]
pub enum EffectChange {
    FadeIn(Option<f64>),
    FadeOut(Option<f64>),
    EqPreset(Option<String>),
    /// Rate plus the preserve-pitch flag; `None` restores normal speed.
    Speed(Option<(f64, bool)>),
    Normalize(bool),
    Reverse(bool),
    VocalRemover(bool),
    VocalIsolator(bool),
}

impl ActiveEffects {
    pub fn with_change(&self, change: &EffectChange) -> ActiveEffects {
        let mut fx = self.clone();
        match change {
            EffectChange::FadeIn(d) => fx.fade_in = *d,
            EffectChange::FadeOut(d) => fx.fade_out = *d,
            EffectChange::EqPreset(p) => fx.eq_preset = p.clone(),
            EffectChange::Speed(s) => match s {
                Some((rate, preserve)) => {
                    fx.playback_rate = Some(*rate);
                    fx.preserve_pitch = *preserve;
                }
                None => {
                    fx.playback_rate = None;
                    fx.preserve_pitch = false;
                }
            },
            EffectChange::Normalize(on) => fx.normalize = *on,
            EffectChange::Reverse(on) => fx.reverse = *on,
            EffectChange::VocalRemover(on) => fx.vocal_remover = *on,
            EffectChange::VocalIsolator(on) => fx.vocal_isolator = *on,
        }
        fx
    }
}

/// Replay the full chain from the pristine source. Stage order is fixed
/// regardless of the order the user toggled things in:
/// reverse -> speed -> EQ -> vocal -> normalize -> fades.
/// Pure with respect to `source`; a failing stage leaves nothing committed.
pub fn render_pipeline(source: &AudioBuffer, fx: &ActiveEffects) -> Result<AudioBuffer> {
    let mut buffer = source.clone();

    if fx.reverse {
        buffer = ops::reverse(&buffer);
    }

    if let Some(rate) = fx.playback_rate
        && rate != 1.0
    {
        buffer = if fx.preserve_pitch {
            dsp::granular_stretch(&buffer, rate)
        } else {
            dsp::change_speed(&buffer, rate)?
        };
    }

    if let Some(preset) = &fx.eq_preset {
        buffer = eq::apply_preset(&buffer, preset);
    }

    // Isolation takes precedence if both flags somehow end up set.
    if fx.vocal_isolator {
        buffer = ops::isolate_vocals(&buffer);
    } else if fx.vocal_remover {
        buffer = ops::remove_vocals(&buffer);
    }

    if fx.normalize {
        buffer = ops::normalize(&buffer);
    }

    if let Some(duration) = fx.fade_in {
        buffer = ops::fade_in(&buffer, duration);
    }
    if let Some(duration) = fx.fade_out {
        buffer = ops::fade_out(&buffer, duration);
    }

    Ok(buffer)
}
