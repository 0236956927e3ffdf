// src/audio.rs

/// Planar multi-channel sample storage. Every DSP function and the mix
/// engine operate on this type; channel vectors always have equal length.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioBuffer {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(channels: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        debug_assert!(!channels.is_empty());
        debug_assert!(channels.iter().all(|c| c.len() == channels[0].len()));
        Self { channels, sample_rate }
    }

    pub fn silent(channel_count: usize, frames: usize, sample_rate: u32) -> Self {
        Self {
            channels: vec![vec![0.0; frames]; channel_count.max(1)],
            sample_rate,
        }
    }

    pub fn from_interleaved(samples: &[f32], channel_count: usize, sample_rate: u32) -> Self {
        let channel_count = channel_count.max(1);
        let frames = samples.len() / channel_count;
        let mut channels = vec![Vec::with_capacity(frames); channel_count];
        for frame in samples.chunks_exact(channel_count) {
            for (c, &s) in frame.iter().enumerate() {
                channels[c].push(s);
            }
        }
        Self { channels, sample_rate }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of frames per channel.
    pub fn len(&self) -> usize {
        self.channels[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn duration(&self) -> f64 {
        self.len() as f64 / self.sample_rate as f64
    }

    pub fn channel(&self, c: usize) -> &[f32] {
        &self.channels[c]
    }

    pub fn channel_mut(&mut self, c: usize) -> &mut [f32] {
        &mut self.channels[c]
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    /// Channel accessor with WebAudio-style up-mix: a mono buffer answers
    /// for any requested channel.
    pub fn channel_or_last(&self, c: usize) -> &[f32] {
        &self.channels[c.min(self.channels.len() - 1)]
    }

    pub fn interleaved(&self) -> Vec<f32> {
        let ch = self.channels.len();
        let mut out = Vec::with_capacity(self.len() * ch);
        for i in 0..self.len() {
            for c in 0..ch {
                out.push(self.channels[c][i]);
            }
        }
        out
    }

    pub fn downmix_mono(&self) -> Vec<f32> {
        if self.channels.len() == 1 {
            return self.channels[0].clone();
        }
        let scale = 1.0 / self.channels.len() as f32;
        (0..self.len())
            .map(|i| self.channels.iter().map(|c| c[i]).sum::<f32>() * scale)
            .collect()
    }

    /// Copy out the `[start, end)` window in seconds. Out-of-range edges are
    /// clamped; an inverted window yields a single silent frame.
    pub fn trim(&self, start: f64, end: f64) -> AudioBuffer {
        let rate = self.sample_rate as f64;
        let a = ((start * rate) as usize).min(self.len());
        let b = ((end * rate) as usize).clamp(a, self.len());
        if b == a {
            return AudioBuffer::silent(self.channels.len(), 1, self.sample_rate);
        }
        self.slice_frames(a, b)
    }

    /// Copy out the `[a, b)` frame range, clamped to the buffer.
    pub fn slice_frames(&self, a: usize, b: usize) -> AudioBuffer {
        let a = a.min(self.len());
        let b = b.clamp(a, self.len());
        let channels = self.channels.iter().map(|c| c[a..b].to_vec()).collect();
        AudioBuffer::new(channels, self.sample_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interleave_round_trip() {
        let buf = AudioBuffer::from_interleaved(&[0.1, 0.2, 0.3, 0.4], 2, 44100);
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.channel(0), &[0.1, 0.3]);
        assert_eq!(buf.channel(1), &[0.2, 0.4]);
        assert_eq!(buf.interleaved(), vec![0.1, 0.2, 0.3, 0.4]);
    }

    #[test]
    fn trim_clamps_to_buffer() {
        let buf = AudioBuffer::silent(2, 44100, 44100);
        let cut = buf.trim(0.5, 2.0);
        assert_eq!(cut.len(), 22050);
        let empty = buf.trim(3.0, 4.0);
        assert_eq!(empty.len(), 1);
    }

    #[test]
    fn downmix_averages_channels() {
        let buf = AudioBuffer::new(vec![vec![1.0, 0.0], vec![0.0, 1.0]], 48000);
        assert_eq!(buf.downmix_mono(), vec![0.5, 0.5]);
    }
}
