// src/dsp/ops.rs

use crate::audio::AudioBuffer;

/// Peak target for normalization; leaves a little headroom below 0 dBFS.
pub const NORMALIZE_PEAK: f32 = 0.98;

pub fn reverse(buffer: &AudioBuffer) -> AudioBuffer {
    let channels = buffer
        .channels()
        .iter()
        .map(|c| c.iter().rev().copied().collect())
        .collect();
    AudioBuffer::new(channels, buffer.sample_rate())
}

/// Scale so the global peak lands on NORMALIZE_PEAK. Silence passes through.
pub fn normalize(buffer: &AudioBuffer) -> AudioBuffer {
    let mut peak = 0.0f32;
    for c in buffer.channels() {
        for &s in c {
            peak = peak.max(s.abs());
        }
    }
    if peak == 0.0 {
        return buffer.clone();
    }
    let amp = NORMALIZE_PEAK / peak;
    let channels = buffer
        .channels()
        .iter()
        .map(|c| c.iter().map(|&s| s * amp).collect())
        .collect();
    AudioBuffer::new(channels, buffer.sample_rate())
}

/// Linear gain ramp 0 -> 1 over the first `duration` seconds, clamped to
/// the buffer length.
pub fn fade_in(buffer: &AudioBuffer, duration: f64) -> AudioBuffer {
    let fade_frames = fade_frames(buffer, duration);
    let mut out = buffer.clone();
    for c in 0..out.channel_count() {
        let data = out.channel_mut(c);
        for i in 0..fade_frames {
            data[i] *= i as f32 / fade_frames as f32;
        }
    }
    out
}

/// Linear gain ramp 1 -> 0 over the last `duration` seconds.
pub fn fade_out(buffer: &AudioBuffer, duration: f64) -> AudioBuffer {
    let fade_frames = fade_frames(buffer, duration);
    let len = buffer.len();
    let mut out = buffer.clone();
    for c in 0..out.channel_count() {
        let data = out.channel_mut(c);
        for i in 0..fade_frames {
            let idx = len - fade_frames + i;
            data[idx] *= (fade_frames - i) as f32 / fade_frames as f32;
        }
    }
    out
}

fn fade_frames(buffer: &AudioBuffer, duration: f64) -> usize {
    let clamped = duration.clamp(0.0, buffer.duration());
    ((clamped * buffer.sample_rate() as f64) as usize).min(buffer.len())
}

/// Center cancellation: L - R written to both channels. Mono passes through.
pub fn remove_vocals(buffer: &AudioBuffer) -> AudioBuffer {
    if buffer.channel_count() < 2 {
        return buffer.clone();
    }
    let left = buffer.channel(0);
    let right = buffer.channel(1);
    let side: Vec<f32> = left.iter().zip(right).map(|(&l, &r)| l - r).collect();
    AudioBuffer::new(vec![side.clone(), side], buffer.sample_rate())
}

/// Center isolation (approximation): (L + R) / 2 to both channels.
pub fn isolate_vocals(buffer: &AudioBuffer) -> AudioBuffer {
    if buffer.channel_count() < 2 {
        return buffer.clone();
    }
    let left = buffer.channel(0);
    let right = buffer.channel(1);
    let mid: Vec<f32> = left.iter().zip(right).map(|(&l, &r)| (l + r) * 0.5).collect();
    AudioBuffer::new(vec![mid.clone(), mid], buffer.sample_rate())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stereo(l: Vec<f32>, r: Vec<f32>) -> AudioBuffer {
        AudioBuffer::new(vec![l, r], 44100)
    }

    #[test]
    fn reverse_twice_is_identity() {
        let buf = stereo(vec![0.1, 0.2, 0.3], vec![-0.1, -0.2, -0.3]);
        assert_eq!(reverse(&reverse(&buf)), buf);
    }

    #[test]
    fn normalize_hits_target_peak() {
        let buf = stereo(vec![0.25, -0.5], vec![0.1, 0.0]);
        let out = normalize(&buf);
        let peak = out
            .channels()
            .iter()
            .flatten()
            .fold(0.0f32, |m, &s| m.max(s.abs()));
        assert!((peak - NORMALIZE_PEAK).abs() < 1e-6);
    }

    #[test]
    fn normalize_silence_is_noop() {
        let buf = AudioBuffer::silent(2, 100, 44100);
        assert_eq!(normalize(&buf), buf);
    }

    #[test]
    fn fade_durations_clamp_to_buffer() {
        let buf = stereo(vec![1.0; 100], vec![1.0; 100]);
        let out = fade_in(&buf, 100.0);
        assert_eq!(out.channel(0)[0], 0.0);
        assert!(out.channel(0)[99] < 1.0);
        let out = fade_out(&buf, 100.0);
        assert!(out.channel(0)[99] < 0.02);
    }

    #[test]
    fn remove_vocals_cancels_center() {
        let center = vec![0.4, 0.4, 0.4];
        let buf = stereo(center.clone(), center);
        let out = remove_vocals(&buf);
        assert!(out.channel(0).iter().all(|&s| s == 0.0));
        assert!(out.channel(1).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn vocal_ops_pass_mono_through() {
        let buf = AudioBuffer::new(vec![vec![0.3, 0.2]], 44100);
        assert_eq!(remove_vocals(&buf), buf);
        assert_eq!(isolate_vocals(&buf), buf);
    }
}
