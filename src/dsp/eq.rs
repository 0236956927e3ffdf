// src/dsp/eq.rs

use biquad::*;

use crate::audio::AudioBuffer;

/// One filter stage of a preset.
#[derive(Clone, Copy, Debug)]
struct Stage {
    kind: StageKind,
    freq: f32,
    gain_db: f32,
    q: f32,
}

#[derive(Clone, Copy, Debug)]
enum StageKind {
    LowPass,
    HighPass,
    LowShelf,
    HighShelf,
    Peaking,
}

const fn stage(kind: StageKind, freq: f32, gain_db: f32, q: f32) -> Stage {
    Stage { kind, freq, gain_db, q }
}

/// Named preset -> filter cascade. An unknown name is a passthrough.
fn preset_stages(preset: &str) -> Option<Vec<Stage>> {
    use StageKind::*;
    let stages = match preset {
        "Telephone" => vec![stage(HighPass, 400.0, 0.0, 1.0), stage(LowPass, 3000.0, 0.0, 1.0)],
        "Bass Boost" => vec![stage(LowShelf, 100.0, 8.0, 0.707)],
        "Treble Boost" => vec![stage(HighShelf, 3000.0, 8.0, 0.707)],
        "Bass Cut" => vec![stage(LowShelf, 100.0, -12.0, 0.707)],
        "Treble Cut" => vec![stage(HighShelf, 3000.0, -12.0, 0.707)],
        "Mid Boost" => vec![stage(Peaking, 1000.0, 6.0, 1.0)],
        "V-Shape" => vec![
            stage(LowShelf, 100.0, 4.0, 0.707),
            stage(Peaking, 1000.0, -6.0, 1.0),
            stage(HighShelf, 3000.0, 4.0, 0.707),
        ],
        "Lo-Fi Radio" => vec![
            stage(HighPass, 200.0, 0.0, 1.0),
            stage(LowPass, 2000.0, 0.0, 1.0),
            stage(Peaking, 1000.0, 10.0, 2.0),
        ],
        _ => return None,
    };
    Some(stages)
}

pub fn known_preset(preset: &str) -> bool {
    preset_stages(preset).is_some()
}

/// Run the preset's cascade over every channel. Unknown presets return the
/// input unchanged.
pub fn apply_preset(buffer: &AudioBuffer, preset: &str) -> AudioBuffer {
    let Some(stages) = preset_stages(preset) else {
        return buffer.clone();
    };
    let sample_rate = buffer.sample_rate();
    let mut out = buffer.clone();
    for stage in stages {
        let Some(coeffs) = stage_coefficients(&stage, sample_rate) else {
            continue;
        };
        for c in 0..out.channel_count() {
            let mut filter = DirectForm2Transposed::<f32>::new(coeffs);
            for s in out.channel_mut(c) {
                let y = filter.run(*s);
                // Denormal protection
                *s = if y.abs() < 1e-20 { 0.0 } else { y };
            }
        }
    }
    out
}

fn stage_coefficients(stage: &Stage, sample_rate: u32) -> Option<Coefficients<f32>> {
    // Cutoff must stay below Nyquist for the coefficient math.
    let safe_freq = stage.freq.clamp(20.0, sample_rate as f32 / 2.0 - 1.0);
    let kind = match stage.kind {
        StageKind::LowPass => Type::LowPass,
        StageKind::HighPass => Type::HighPass,
        StageKind::LowShelf => Type::LowShelf(stage.gain_db),
        StageKind::HighShelf => Type::HighShelf(stage.gain_db),
        StageKind::Peaking => Type::PeakingEQ(stage.gain_db),
    };
    Coefficients::<f32>::from_params(kind, sample_rate.hz(), safe_freq.hz(), stage.q.max(0.1)).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(freq: f32, frames: usize, rate: u32) -> AudioBuffer {
        let data: Vec<f32> = (0..frames)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / rate as f32).sin() * 0.5)
            .collect();
        AudioBuffer::new(vec![data.clone(), data], rate)
    }

    fn rms(buf: &AudioBuffer) -> f32 {
        let data = buf.channel(0);
        (data.iter().map(|&s| s * s).sum::<f32>() / data.len() as f32).sqrt()
    }

    #[test]
    fn unknown_preset_is_passthrough() {
        let buf = tone(440.0, 4096, 44100);
        assert_eq!(apply_preset(&buf, "Does Not Exist"), buf);
    }

    #[test]
    fn telephone_attenuates_lows() {
        let low = tone(60.0, 44100, 44100);
        let filtered = apply_preset(&low, "Telephone");
        assert!(rms(&filtered) < rms(&low) * 0.5);
    }

    #[test]
    fn bass_boost_raises_low_band() {
        let low = tone(80.0, 44100, 44100);
        let boosted = apply_preset(&low, "Bass Boost");
        assert!(rms(&boosted) > rms(&low) * 1.5);
    }
}
