// src/mixdown.rs
//
// Offline summing of an arrangement into a single stereo buffer, plus the
// crossfade concatenation used when two adjacent clips are merged.

use anyhow::{Result, bail};

use crate::arrangement::Clip;
use crate::audio::AudioBuffer;
use crate::dsp;

pub const MIX_CHANNELS: usize = 2;
pub const MIN_MIX_RATE: u32 = 44_100;

/// Sample rate a set of clips mixes at: the highest clip rate, floored at
/// 44.1 kHz so low-rate material is upsampled rather than the reverse.
pub fn mix_rate(clips: &[Clip]) -> u32 {
    clips
        .iter()
        .map(|c| c.current_buffer.sample_rate())
        .max()
        .unwrap_or(MIN_MIX_RATE)
        .max(MIN_MIX_RATE)
}

/// Render all unmuted clips into one stereo buffer. Each clip contributes
/// its trimmed window (wrapping over the source when looping), scaled by
/// clip volume and the automation curve, resampled to the mix rate, and
/// summed at its timeline offset. No limiting is applied.
pub fn mix_clips(clips: &[Clip]) -> Result<AudioBuffer> {
    let audible: Vec<&Clip> = clips.iter().filter(|c| !c.muted && c.duration > 0.0).collect();
    if audible.is_empty() {
        bail!("nothing to mix");
    }

    let rate = mix_rate(clips);
    let end = audible
        .iter()
        .map(|c| c.end_time())
        .fold(0.0, f64::max);
    let total_frames = (end * rate as f64).ceil() as usize;
    let mut out = vec![vec![0.0f32; total_frames]; MIX_CHANNELS];

    for clip in audible {
        let window = clip_window(clip);
        let window = if window.sample_rate() != rate {
            dsp::resample(&window, rate)?
        } else {
            window
        };
        let offset = (clip.start_time * rate as f64).round() as usize;
        for (ch, out_ch) in out.iter_mut().enumerate() {
            let src = window.channel_or_last(ch);
            for (i, &s) in src.iter().enumerate() {
                if let Some(slot) = out_ch.get_mut(offset + i) {
                    *slot += s;
                }
            }
        }
    }

    Ok(AudioBuffer::new(out, rate))
}

/// Like [`mix_clips`], then resampled to an explicit output rate. Used
/// when an export target asks for a rate below the natural mix rate.
pub fn mix_clips_at(clips: &[Clip], target_rate: u32) -> Result<AudioBuffer> {
    let mix = mix_clips(clips)?;
    dsp::resample(&mix, target_rate)
}

/// The audible slice of a clip at its native rate, with volume and
/// automation applied. Looping clips wrap over the source buffer; others
/// pad with silence past the end.
fn clip_window(clip: &Clip) -> AudioBuffer {
    let buffer = &clip.current_buffer;
    let rate = buffer.sample_rate();
    let src_len = buffer.len();
    let start = (clip.trim_start * rate as f64).round() as usize;
    let frames = (clip.duration * rate as f64).round() as usize;

    let mut channels = Vec::with_capacity(buffer.channel_count());
    for ch in buffer.channels() {
        let mut data = Vec::with_capacity(frames);
        for i in 0..frames {
            let gain = clip.volume * clip.automation_gain(i as f64 / rate as f64);
            let idx = start + i;
            let sample = if clip.is_looping && src_len > 0 {
                ch[idx % src_len]
            } else {
                ch.get(idx).copied().unwrap_or(0.0)
            };
            data.push(sample * gain);
        }
        channels.push(data);
    }
    AudioBuffer::new(channels, rate)
}

/// Concatenate two buffers with a linear crossfade: the left fades out over
/// its tail while the right fades in over its head, overlapping for
/// `fade_duration` seconds. Output length is `len(l) + len(r) - fade`.
pub fn crossfade_merge_buffers(
    left: &AudioBuffer,
    right: &AudioBuffer,
    fade_duration: f64,
) -> Result<AudioBuffer> {
    if !fade_duration.is_finite() || fade_duration < 0.0 {
        bail!("invalid crossfade duration {fade_duration}");
    }
    let rate = left.sample_rate();
    let right = if right.sample_rate() != rate {
        dsp::resample(right, rate)?
    } else {
        right.clone()
    };

    let left_len = left.len();
    let right_len = right.len();
    let fade = ((fade_duration * rate as f64).round() as usize)
        .min(left_len)
        .min(right_len);
    let total = left_len + right_len - fade;
    let channels = left.channel_count().max(right.channel_count());
    let right_offset = left_len - fade;

    let mut out = Vec::with_capacity(channels);
    for ch in 0..channels {
        let l = left.channel_or_last(ch);
        let r = right.channel_or_last(ch);
        let mut data = vec![0.0f32; total];
        for (i, &s) in l.iter().enumerate() {
            let gain = if i >= right_offset && fade > 0 {
                (left_len - i) as f32 / fade as f32
            } else {
                1.0
            };
            data[i] += s * gain;
        }
        for (i, &s) in r.iter().enumerate() {
            let gain = if i < fade { i as f32 / fade as f32 } else { 1.0 };
            data[right_offset + i] += s * gain;
        }
        out.push(data);
    }
    Ok(AudioBuffer::new(out, rate))
}
