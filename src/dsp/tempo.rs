// src/dsp/tempo.rs

use biquad::*;

use crate::audio::AudioBuffer;

const MIN_BPM: f64 = 60.0;
const MAX_BPM: f64 = 180.0;
/// Onset envelope frame length in seconds.
const ENV_FRAME: f64 = 0.005;
/// Analysis window cap for long clips.
const ANALYSIS_SECONDS: f64 = 40.0;
/// Onset frames considered by the autocorrelation.
const SEARCH_FRAMES: usize = 3000;

/// Estimate tempo by autocorrelating an onset-strength envelope of the
/// band-limited (70-400 Hz) signal. Returns None when the clip carries no
/// usable onsets; callers treat that as "tempo unknown", never as an error.
pub fn estimate_bpm(buffer: &AudioBuffer) -> Option<u32> {
    let sample_rate = buffer.sample_rate();
    if buffer.is_empty() || sample_rate == 0 {
        return None;
    }

    // Long material is represented by a window around its midpoint.
    let mut mono = buffer.downmix_mono();
    if buffer.duration() > ANALYSIS_SECONDS {
        let start = ((buffer.duration() / 2.0 - ANALYSIS_SECONDS / 2.0).floor()
            * sample_rate as f64) as usize;
        let end = (start + (ANALYSIS_SECONDS * sample_rate as f64) as usize).min(mono.len());
        mono = mono[start..end].to_vec();
    }

    band_pass_inplace(&mut mono, sample_rate)?;

    // Short-window RMS energy envelope.
    let window = ((sample_rate as f64 * ENV_FRAME) as usize).max(1);
    let mut energy = Vec::with_capacity(mono.len() / window + 1);
    for chunk in mono.chunks(window) {
        let sum: f32 = chunk.iter().map(|&s| s * s).sum();
        energy.push((sum / window as f32).sqrt());
    }

    // Rising energy only.
    let onsets: Vec<f32> = energy
        .windows(2)
        .map(|w| (w[1] - w[0]).max(0.0))
        .collect();
    if onsets.len() < 4 {
        return None;
    }

    let min_lag = (60.0 / (MAX_BPM * ENV_FRAME)).floor() as usize;
    let max_lag = (60.0 / (MIN_BPM * ENV_FRAME)).ceil() as usize;
    let search_len = onsets.len().min(SEARCH_FRAMES);

    let mut candidates: Vec<(f64, f32)> = Vec::with_capacity(max_lag - min_lag + 1);
    for lag in min_lag..=max_lag {
        let mut strength = 0.0f32;
        for i in 0..search_len.saturating_sub(lag) {
            strength += onsets[i] * onsets[i + lag];
        }
        candidates.push((60.0 / (lag as f64 * ENV_FRAME), strength));
    }
    candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let (mut chosen, best_strength) = candidates.first().copied()?;
    if best_strength <= 0.0 {
        return None;
    }

    // Octave-error correction: a strong runner-up wins when the leader sits
    // outside the typical range, or when the leader is almost exactly its
    // double. Thresholds are tuned by ear, not by theory.
    for &(bpm, strength) in candidates.iter().take(5).skip(1) {
        if strength > best_strength * 0.75 {
            let winner_is_extreme = chosen < 90.0 || chosen > 160.0;
            let candidate_is_normal = (90.0..=160.0).contains(&bpm);
            if winner_is_extreme && candidate_is_normal {
                chosen = bpm;
            }
            if (bpm - 2.0 * chosen).abs() < 5.0 {
                chosen = bpm;
            }
        }
    }

    Some(chosen.round() as u32)
}

/// Cascaded low-pass (400 Hz) + high-pass (70 Hz) to emphasize percussive
/// and bass onsets before envelope extraction.
fn band_pass_inplace(signal: &mut [f32], sample_rate: u32) -> Option<()> {
    let lp = Coefficients::<f32>::from_params(
        Type::LowPass,
        sample_rate.hz(),
        400.0.hz(),
        1.0,
    )
    .ok()?;
    let hp = Coefficients::<f32>::from_params(
        Type::HighPass,
        sample_rate.hz(),
        70.0.hz(),
        1.0,
    )
    .ok()?;
    let mut lp_filter = DirectForm2Transposed::<f32>::new(lp);
    let mut hp_filter = DirectForm2Transposed::<f32>::new(hp);
    for s in signal.iter_mut() {
        *s = hp_filter.run(lp_filter.run(*s));
    }
    Some(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Click track: short decaying 150 Hz bursts at the beat interval.
    fn click_track(bpm: f64, seconds: f64, sample_rate: u32) -> AudioBuffer {
        let frames = (seconds * sample_rate as f64) as usize;
        let mut data = vec![0.0f32; frames];
        let beat_frames = (60.0 / bpm * sample_rate as f64) as usize;
        let burst = (0.04 * sample_rate as f64) as usize;
        let mut pos = 0;
        while pos + burst < frames {
            for i in 0..burst {
                let t = i as f32 / sample_rate as f32;
                let env = 1.0 - i as f32 / burst as f32;
                data[pos + i] = (2.0 * std::f32::consts::PI * 150.0 * t).sin() * env;
            }
            pos += beat_frames;
        }
        AudioBuffer::new(vec![data.clone(), data], sample_rate)
    }

    #[test]
    fn click_track_within_three_bpm() {
        let buf = click_track(120.0, 12.0, 44100);
        let bpm = estimate_bpm(&buf).expect("click track should yield a tempo");
        assert!((117..=123).contains(&bpm), "estimated {bpm}");
    }

    #[test]
    fn silence_yields_none() {
        let buf = AudioBuffer::silent(2, 44100 * 4, 44100);
        assert_eq!(estimate_bpm(&buf), None);
    }

    #[test]
    fn long_clips_are_windowed() {
        // 60 s click track still resolves; only the middle 40 s is analyzed.
        let buf = click_track(100.0, 60.0, 22050);
        let bpm = estimate_bpm(&buf).expect("tempo");
        assert!((97..=103).contains(&bpm), "estimated {bpm}");
    }
}
