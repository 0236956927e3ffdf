// src/dsp/stretch.rs

use anyhow::{Result, bail};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
    calculate_cutoff,
};

use crate::audio::AudioBuffer;
use crate::dsp::ops;

/// Grain length for the overlap-add stretcher, in seconds.
const GRAIN_SECONDS: f64 = 0.08;

/// Duration change without pitch change: fixed-size grains are copied 1:1
/// from source to destination, but the read head advances `rate` times
/// faster than the write head. Overlapping grain edges get a triangular
/// window and are summed, then the whole result is normalized because the
/// summation can exceed unit amplitude.
pub fn granular_stretch(input: &AudioBuffer, rate: f64) -> AudioBuffer {
    if rate == 1.0 {
        return input.clone();
    }

    let sample_rate = input.sample_rate();
    let input_len = input.len();
    let output_len = (input_len as f64 / rate).floor() as usize;

    let grain = (sample_rate as f64 * GRAIN_SECONDS) as usize;
    let overlap = grain / 2;
    let hop = grain - overlap;

    let mut channels = Vec::with_capacity(input.channel_count());
    for c in 0..input.channel_count() {
        let src = input.channel(c);
        let mut dst = vec![0.0f32; output_len];

        let mut input_offset = 0.0f64;
        let mut output_offset = 0usize;

        while output_offset + grain < output_len && (input_offset as usize) + grain < input_len {
            let read_base = input_offset as usize;
            for i in 0..grain {
                let in_idx = read_base + i;
                let out_idx = output_offset + i;
                if in_idx >= input_len || out_idx >= output_len {
                    break;
                }
                let gain = if i < overlap {
                    i as f32 / overlap as f32
                } else if i > grain - overlap {
                    (grain - i) as f32 / overlap as f32
                } else {
                    1.0
                };
                dst[out_idx] += src[in_idx] * gain;
            }
            output_offset += hop;
            input_offset += hop as f64 * rate;
        }
        channels.push(dst);
    }

    ops::normalize(&AudioBuffer::new(channels, sample_rate))
}

/// Playback-rate speed change without pitch preservation: the signal is
/// resampled by 1/rate and kept at its original sample rate, so duration
/// and pitch shift together.
pub fn change_speed(input: &AudioBuffer, rate: f64) -> Result<AudioBuffer> {
    if !(rate.is_finite() && rate > 0.0) {
        bail!("invalid playback rate {rate}");
    }
    if rate == 1.0 {
        return Ok(input.clone());
    }
    let channels = resample_channels(input.channels(), 1.0 / rate)?;
    Ok(AudioBuffer::new(channels, input.sample_rate()))
}

/// Sample-rate conversion to `target_rate`, preserving duration.
pub fn resample(input: &AudioBuffer, target_rate: u32) -> Result<AudioBuffer> {
    if input.sample_rate() == target_rate {
        return Ok(input.clone());
    }
    let ratio = target_rate as f64 / input.sample_rate() as f64;
    let channels = resample_channels(input.channels(), ratio)?;
    Ok(AudioBuffer::new(channels, target_rate))
}

/// Sinc resampler pass over planar data. Output is padded/truncated to
/// round(len * ratio) frames.
fn resample_channels(channels: &[Vec<f32>], ratio: f64) -> Result<Vec<Vec<f32>>> {
    let n = channels[0].len();
    let expected = (n as f64 * ratio).round() as usize;
    if n == 0 || expected == 0 {
        return Ok(vec![Vec::new(); channels.len()]);
    }

    let sinc_len = 256usize;
    let window = WindowFunction::BlackmanHarris2;
    let params = SincInterpolationParameters {
        sinc_len,
        f_cutoff: calculate_cutoff(sinc_len, window),
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 128,
        window,
    };
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, 1024, channels.len())?;

    let mut out: Vec<Vec<f32>> = vec![Vec::with_capacity(expected); channels.len()];
    let mut pos = 0usize;
    while pos < n {
        let need = resampler.input_frames_next();
        let produced = if pos + need <= n {
            let block: Vec<&[f32]> = channels.iter().map(|c| &c[pos..pos + need]).collect();
            pos += need;
            resampler.process(&block, None)?
        } else {
            let block: Vec<&[f32]> = channels.iter().map(|c| &c[pos..]).collect();
            pos = n;
            resampler.process_partial(Some(&block), None)?
        };
        for (c, chunk) in produced.into_iter().enumerate() {
            out[c].extend_from_slice(&chunk);
        }
    }

    // Flush the resampler tail.
    while out[0].len() < expected {
        let produced = resampler.process_partial::<&[f32]>(None, None)?;
        if produced[0].is_empty() {
            break;
        }
        for (c, chunk) in produced.into_iter().enumerate() {
            out[c].extend_from_slice(&chunk);
        }
    }

    Ok(out
        .into_iter()
        .map(|mut c| {
            c.resize(expected, 0.0);
            c
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(frames: usize, rate: u32) -> AudioBuffer {
        let data: Vec<f32> = (0..frames)
            .map(|i| (i as f32 * 2.0 * std::f32::consts::PI * 220.0 / rate as f32).sin() * 0.5)
            .collect();
        AudioBuffer::new(vec![data.clone(), data], rate)
    }

    #[test]
    fn stretch_length_law() {
        let input = tone(44100, 44100);
        for rate in [0.5, 0.75, 1.25, 2.0] {
            let out = granular_stretch(&input, rate);
            assert_eq!(out.len(), (input.len() as f64 / rate).floor() as usize);
            assert_eq!(out.sample_rate(), input.sample_rate());
        }
    }

    #[test]
    fn stretch_unit_rate_is_identity() {
        let input = tone(4096, 44100);
        assert_eq!(granular_stretch(&input, 1.0), input);
    }

    #[test]
    fn change_speed_scales_duration() {
        let input = tone(44100, 44100);
        let out = change_speed(&input, 2.0).unwrap();
        assert_eq!(out.len(), 22050);
        assert_eq!(out.sample_rate(), 44100);
        let out = change_speed(&input, 0.5).unwrap();
        assert_eq!(out.len(), 88200);
    }

    #[test]
    fn change_speed_rejects_bad_rate() {
        let input = tone(1024, 44100);
        assert!(change_speed(&input, 0.0).is_err());
        assert!(change_speed(&input, f64::NAN).is_err());
    }

    #[test]
    fn resample_keeps_head_of_signal() {
        // Impulse markers, including one near the very start, must come
        // through at their scaled positions rather than being shifted or
        // dropped by filter latency.
        let rate = 1_000u32;
        let mut src = vec![0.0f32; 3 * rate as usize];
        for m in [10usize, 1010, 2010] {
            src[m] = 1.0;
        }
        let out = resample(&AudioBuffer::new(vec![src], rate), 44_100).unwrap();
        let ch = out.channel(0);
        for m in [10usize, 1010, 2010] {
            let center = m * 44_100 / 1000;
            let lo = center.saturating_sub(200);
            let hi = (center + 200).min(ch.len());
            let peak = ch[lo..hi].iter().fold(0.0f32, |a, &s| a.max(s.abs()));
            assert!(peak > 0.5, "marker near frame {center} lost");
        }
    }

    #[test]
    fn resample_changes_rate_keeps_duration() {
        let input = tone(44100, 44100);
        let out = resample(&input, 22050).unwrap();
        assert_eq!(out.sample_rate(), 22050);
        assert_eq!(out.len(), 22050);
        assert!((out.duration() - input.duration()).abs() < 1e-6);
    }
}
