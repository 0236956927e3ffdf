// src/generator/mod.rs
//
// Procedural clip sources: step-sequenced drum loops and short synth
// phrases. Everything renders straight to an AudioBuffer at the requested
// rate so generated clips go through the same pipeline as imported audio.

use rand::Rng;

use crate::audio::AudioBuffer;

pub const STEPS_PER_BAR: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrumStyle {
    Rock,
    HipHop,
    Techno,
    Metronome,
}

impl DrumStyle {
    pub fn label(&self) -> &'static str {
        match self {
            DrumStyle::Rock => "Rock Beat",
            DrumStyle::HipHop => "Hip-Hop Beat",
            DrumStyle::Techno => "Techno Beat",
            DrumStyle::Metronome => "Metronome",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SynthPreset {
    AnalogBass,
    ChiptuneLead,
    DreamyPad,
    Pluck,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotePattern {
    OneShot,
    Bassline,
    Arpeggio,
    RandomMelody,
    Chords,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scale {
    MajorPentatonic,
    MinorPentatonic,
}

impl Scale {
    /// Scale degrees as semitone offsets above the root.
    fn intervals(&self) -> [f64; 5] {
        match self {
            Scale::MajorPentatonic => [0.0, 2.0, 4.0, 7.0, 9.0],
            Scale::MinorPentatonic => [0.0, 3.0, 5.0, 7.0, 10.0],
        }
    }
}

/// Sixteenth-note grids per style, one bar long.
struct DrumGrid {
    kick: [bool; STEPS_PER_BAR],
    snare: [bool; STEPS_PER_BAR],
    hat: [bool; STEPS_PER_BAR],
}

fn grid(style: DrumStyle) -> DrumGrid {
    const O: bool = true;
    const X: bool = false;
    match style {
        DrumStyle::Rock => DrumGrid {
            kick: [O, X, X, X, X, X, X, X, O, X, O, X, X, X, X, X],
            snare: [X, X, X, X, O, X, X, X, X, X, X, X, O, X, X, X],
            hat: [O, X, O, X, O, X, O, X, O, X, O, X, O, X, O, X],
        },
        DrumStyle::HipHop => DrumGrid {
            kick: [O, X, X, X, X, X, O, X, X, X, O, X, X, X, X, X],
            snare: [X, X, X, X, O, X, X, X, X, X, X, X, O, X, X, O],
            hat: [O, O, O, O, O, O, O, O, O, O, O, O, O, O, O, O],
        },
        DrumStyle::Techno => DrumGrid {
            kick: [O, X, X, X, O, X, X, X, O, X, X, X, O, X, X, X],
            snare: [X, X, X, X, X, X, X, X, X, X, X, X, X, X, X, X],
            hat: [X, X, O, X, X, X, O, X, X, X, O, X, X, X, O, X],
        },
        DrumStyle::Metronome => DrumGrid {
            kick: [X; STEPS_PER_BAR],
            snare: [X; STEPS_PER_BAR],
            hat: [X; STEPS_PER_BAR],
        },
    }
}

/// Render a drum loop. Output length is exactly `bars` bars of 4/4 at
/// `bpm`, so generated loops butt-join and loop cleanly.
pub fn drum_loop(style: DrumStyle, bpm: u32, bars: usize, sample_rate: u32) -> AudioBuffer {
    let step_secs = 60.0 / bpm as f64 / 4.0;
    let total_frames = (step_secs * (STEPS_PER_BAR * bars) as f64 * sample_rate as f64).round()
        as usize;
    let mut data = vec![0.0f32; total_frames];
    let grid = grid(style);

    for bar in 0..bars {
        for step in 0..STEPS_PER_BAR {
            let at = ((bar * STEPS_PER_BAR + step) as f64 * step_secs * sample_rate as f64)
                .round() as usize;
            if let DrumStyle::Metronome = style {
                // Quarter-note ticks, accented on the downbeat.
                if step % 4 == 0 {
                    let freq = if step == 0 { 1500.0 } else { 1000.0 };
                    add_tick(&mut data, at, sample_rate, freq);
                }
                continue;
            }
            if grid.kick[step] {
                add_kick(&mut data, at, sample_rate);
            }
            if grid.snare[step] {
                add_snare(&mut data, at, sample_rate);
            }
            if grid.hat[step] {
                add_hat(&mut data, at, sample_rate);
            }
        }
    }

    AudioBuffer::new(vec![data.clone(), data], sample_rate)
}

/// Render a synth phrase over a pentatonic scale rooted on A. Length
/// follows the same exact-bars law as `drum_loop`.
pub fn synth_phrase(
    preset: SynthPreset,
    pattern: NotePattern,
    scale: Scale,
    bpm: u32,
    bars: usize,
    sample_rate: u32,
) -> AudioBuffer {
    let intervals = scale.intervals();
    let root = match preset {
        SynthPreset::AnalogBass => 55.0,
        SynthPreset::ChiptuneLead => 440.0,
        SynthPreset::DreamyPad | SynthPreset::Pluck => 220.0,
    };
    let beat_secs = 60.0 / bpm as f64;
    let total_frames = (beat_secs * (4 * bars) as f64 * sample_rate as f64).round() as usize;
    let mut data = vec![0.0f32; total_frames];
    let mut rng = rand::rng();

    let degree_freq = |degree: usize| root * 2f64.powf(intervals[degree % intervals.len()] / 12.0);

    match pattern {
        NotePattern::OneShot => {
            add_note(&mut data, 0, total_frames, root, preset, sample_rate);
        }
        NotePattern::Bassline => {
            // Root on every beat, a fifth on the last beat of each bar.
            for beat in 0..4 * bars {
                let degree = if beat % 4 == 3 { 3 } else { 0 };
                let at = (beat as f64 * beat_secs * sample_rate as f64).round() as usize;
                let len = (beat_secs * 0.9 * sample_rate as f64) as usize;
                add_note(&mut data, at, len, degree_freq(degree), preset, sample_rate);
            }
        }
        NotePattern::Arpeggio => {
            // Eighth notes walking up the scale.
            for eighth in 0..8 * bars {
                let at = (eighth as f64 * beat_secs / 2.0 * sample_rate as f64).round() as usize;
                let len = (beat_secs / 2.0 * 0.9 * sample_rate as f64) as usize;
                add_note(&mut data, at, len, degree_freq(eighth), preset, sample_rate);
            }
        }
        NotePattern::RandomMelody => {
            for eighth in 0..8 * bars {
                if rng.random_bool(0.75) {
                    let degree = rng.random_range(0..intervals.len());
                    let octave = rng.random_range(0..2) as i32;
                    let freq = degree_freq(degree) * 2f64.powi(octave);
                    let at =
                        (eighth as f64 * beat_secs / 2.0 * sample_rate as f64).round() as usize;
                    let len = (beat_secs / 2.0 * 0.9 * sample_rate as f64) as usize;
                    add_note(&mut data, at, len, freq, preset, sample_rate);
                }
            }
        }
        NotePattern::Chords => {
            // Whole-bar triads built from scale degrees 0-2-4.
            for bar in 0..bars {
                let at = (bar as f64 * 4.0 * beat_secs * sample_rate as f64).round() as usize;
                let len = (4.0 * beat_secs * 0.95 * sample_rate as f64) as usize;
                for degree in [0usize, 2, 4] {
                    add_note(&mut data, at, len, degree_freq(degree), preset, sample_rate);
                }
            }
        }
    }

    normalize_in_place(&mut data);
    AudioBuffer::new(vec![data.clone(), data], sample_rate)
}

fn add_note(
    data: &mut [f32],
    at: usize,
    len: usize,
    freq: f64,
    preset: SynthPreset,
    sample_rate: u32,
) {
    let sr = sample_rate as f64;
    for i in 0..len {
        let Some(slot) = data.get_mut(at + i) else { break };
        let t = i as f64 / sr;
        let phase = (t * freq).fract();
        let raw = match preset {
            // Bright saw with a fast-decaying body.
            SynthPreset::AnalogBass => 2.0 * phase - 1.0,
            SynthPreset::ChiptuneLead => {
                if phase < 0.5 { 1.0 } else { -1.0 }
            }
            SynthPreset::DreamyPad => (2.0 * std::f64::consts::PI * t * freq).sin(),
            SynthPreset::Pluck => {
                let fundamental = (2.0 * std::f64::consts::PI * t * freq).sin();
                let second = (4.0 * std::f64::consts::PI * t * freq).sin() * 0.4;
                fundamental + second
            }
        };
        let env = envelope(preset, i, len, sample_rate);
        *slot += (raw * env) as f32 * 0.35;
    }
}

fn envelope(preset: SynthPreset, i: usize, len: usize, sample_rate: u32) -> f64 {
    let attack = match preset {
        SynthPreset::DreamyPad => (sample_rate as usize / 10).max(1),
        _ => (sample_rate as usize / 200).max(1),
    };
    let rise = (i as f64 / attack as f64).min(1.0);
    let fall = match preset {
        SynthPreset::Pluck | SynthPreset::AnalogBass => (-4.0 * i as f64 / len as f64).exp(),
        _ => 1.0 - (i as f64 / len as f64).powi(2),
    };
    rise * fall
}

fn add_kick(data: &mut [f32], at: usize, sample_rate: u32) {
    let sr = sample_rate as f64;
    let len = (0.15 * sr) as usize;
    let mut phase = 0.0f64;
    for i in 0..len {
        let Some(slot) = data.get_mut(at + i) else { break };
        let t = i as f64 / sr;
        // Pitch sweep 150 -> 50 Hz.
        let freq = 150.0 * (-t * 20.0).exp() + 50.0;
        phase += freq / sr;
        let env = (-t * 25.0).exp();
        *slot += ((2.0 * std::f64::consts::PI * phase).sin() * env) as f32 * 0.9;
    }
}

fn add_snare(data: &mut [f32], at: usize, sample_rate: u32) {
    let sr = sample_rate as f64;
    let len = (0.2 * sr) as usize;
    let mut rng = rand::rng();
    for i in 0..len {
        let Some(slot) = data.get_mut(at + i) else { break };
        let t = i as f64 / sr;
        let noise: f64 = rng.random_range(-1.0..1.0);
        let body = (2.0 * std::f64::consts::PI * 180.0 * t).sin() * 0.4;
        let env = (-t * 30.0).exp();
        *slot += ((noise * 0.6 + body) * env) as f32 * 0.6;
    }
}

fn add_hat(data: &mut [f32], at: usize, sample_rate: u32) {
    let sr = sample_rate as f64;
    let len = (0.05 * sr) as usize;
    let mut rng = rand::rng();
    let mut prev = 0.0f64;
    for i in 0..len {
        let Some(slot) = data.get_mut(at + i) else { break };
        let noise: f64 = rng.random_range(-1.0..1.0);
        // First difference brightens the noise toward a hat-like hiss.
        let hp = noise - prev;
        prev = noise;
        let env = (-(i as f64 / sr) * 80.0).exp();
        *slot += (hp * env) as f32 * 0.3;
    }
}

fn add_tick(data: &mut [f32], at: usize, sample_rate: u32, freq: f64) {
    let sr = sample_rate as f64;
    let len = (0.03 * sr) as usize;
    for i in 0..len {
        let Some(slot) = data.get_mut(at + i) else { break };
        let t = i as f64 / sr;
        let env = 1.0 - i as f64 / len as f64;
        *slot += ((2.0 * std::f64::consts::PI * freq * t).sin() * env) as f32 * 0.7;
    }
}

fn normalize_in_place(data: &mut [f32]) {
    let peak = data.iter().fold(0.0f32, |m, s| m.max(s.abs()));
    if peak > 1.0 {
        let scale = 0.98 / peak;
        for s in data.iter_mut() {
            *s *= scale;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drum_loop_length_is_exact_bars() {
        for bpm in [90u32, 120, 174] {
            let out = drum_loop(DrumStyle::Rock, bpm, 2, 44_100);
            let expected = (60.0 / bpm as f64 / 4.0 * 32.0 * 44_100.0).round() as usize;
            assert_eq!(out.len(), expected);
            assert_eq!(out.channel_count(), 2);
        }
    }

    #[test]
    fn synth_phrase_length_matches_drum_loop() {
        let drums = drum_loop(DrumStyle::Techno, 128, 1, 44_100);
        let synth = synth_phrase(
            SynthPreset::AnalogBass,
            NotePattern::Bassline,
            Scale::MinorPentatonic,
            128,
            1,
            44_100,
        );
        assert_eq!(drums.len(), synth.len());
    }

    #[test]
    fn generated_audio_is_bounded_and_nonsilent() {
        let patterns = [
            NotePattern::OneShot,
            NotePattern::Bassline,
            NotePattern::Arpeggio,
            NotePattern::RandomMelody,
            NotePattern::Chords,
        ];
        for pattern in patterns {
            let out =
                synth_phrase(SynthPreset::Pluck, pattern, Scale::MajorPentatonic, 120, 1, 22_050);
            let ch = out.channel(0);
            let peak = ch.iter().fold(0.0f32, |m, &s| m.max(s.abs()));
            assert!(peak <= 1.0, "{pattern:?} clipped: {peak}");
            if pattern != NotePattern::RandomMelody {
                assert!(peak > 0.01, "{pattern:?} is silent");
            }
        }
    }

    #[test]
    fn metronome_ticks_on_quarters_only() {
        let out = drum_loop(DrumStyle::Metronome, 120, 1, 44_100);
        let ch = out.channel(0);
        let step = (60.0 / 120.0 / 4.0 * 44_100.0) as usize;
        // Energy at beats, silence between the off-beat sixteenths.
        let energy = |from: usize| -> f32 {
            ch[from..(from + 200).min(ch.len())]
                .iter()
                .map(|s| s.abs())
                .sum()
        };
        assert!(energy(0) > 1.0);
        assert!(energy(step * 4) > 1.0);
        assert!(energy(step * 2 + 400) < 1e-6);
    }
}
