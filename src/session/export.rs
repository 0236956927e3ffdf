// src/session/export.rs
//
// WAV encoding. Project files embed clip audio as 32-bit float WAV so
// restores are bit-exact; the final mixdown exports as 16-bit PCM.

use std::io::Cursor;
use std::path::Path;

use anyhow::{Context, Result, bail};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use crate::arrangement::Clip;
use crate::audio::AudioBuffer;
use crate::mixdown;

/// Encode to an in-memory 32-bit float WAV, preserving samples exactly.
pub fn encode_wav_f32(buffer: &AudioBuffer) -> Result<Vec<u8>> {
    if buffer.channel_count() == 0 {
        bail!("cannot encode a buffer with no channels");
    }
    let spec = WavSpec {
        channels: buffer.channel_count() as u16,
        sample_rate: buffer.sample_rate(),
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut cursor = Cursor::new(Vec::new());
    let mut writer = WavWriter::new(&mut cursor, spec)?;
    for sample in buffer.interleaved() {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(cursor.into_inner())
}

/// Decode a WAV produced by [`encode_wav_f32`] (or any PCM/float WAV).
pub fn decode_wav(bytes: &[u8]) -> Result<AudioBuffer> {
    let mut reader = WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();
    let channels = spec.channels as usize;
    if channels == 0 {
        bail!("wav has no channels");
    }
    let mut planar: Vec<Vec<f32>> = vec![Vec::new(); channels];
    match spec.sample_format {
        SampleFormat::Float => {
            for (i, sample) in reader.samples::<f32>().enumerate() {
                planar[i % channels].push(sample?);
            }
        }
        SampleFormat::Int => {
            let scale = 1.0 / (1i64 << (spec.bits_per_sample - 1)) as f32;
            for (i, sample) in reader.samples::<i32>().enumerate() {
                planar[i % channels].push(sample? as f32 * scale);
            }
        }
    }
    Ok(AudioBuffer::new(planar, spec.sample_rate))
}

/// Write a buffer to disk as 16-bit PCM WAV, hard-clipping out-of-range
/// samples.
pub fn write_wav_16(buffer: &AudioBuffer, path: &Path) -> Result<()> {
    let spec = WavSpec {
        channels: buffer.channel_count() as u16,
        sample_rate: buffer.sample_rate(),
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)
        .with_context(|| format!("creating {}", path.display()))?;
    for sample in buffer.interleaved() {
        let clamped = sample.clamp(-1.0, 1.0);
        writer.write_sample((clamped * i16::MAX as f32) as i16)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Encodings the exporter can write itself. Compressed formats go through
/// an external encoder fed by the mixed buffer instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    Wav,
}

/// Mix an arrangement and export it in one step.
pub fn export_mixdown(clips: &[Clip], path: &Path, format: ExportFormat) -> Result<()> {
    let mix = mixdown::mix_clips(clips)?;
    match format {
        ExportFormat::Wav => write_wav_16(&mix, path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone() -> AudioBuffer {
        let left: Vec<f32> = (0..4410)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 44100.0).sin() * 0.6)
            .collect();
        let right: Vec<f32> = left.iter().map(|s| s * 0.5).collect();
        AudioBuffer::new(vec![left, right], 44_100)
    }

    #[test]
    fn float_wav_round_trip_is_exact() {
        let original = tone();
        let bytes = encode_wav_f32(&original).unwrap();
        let decoded = decode_wav(&bytes).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn pcm_export_is_readable_and_close() {
        let original = tone();
        let path = std::env::temp_dir().join(format!("arranger-export-{}.wav", std::process::id()));
        write_wav_16(&original, &path).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        let decoded = decode_wav(&bytes).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(decoded.sample_rate(), 44_100);
        assert_eq!(decoded.len(), original.len());
        for (a, b) in decoded
            .channel(0)
            .iter()
            .zip(original.channel(0))
        {
            assert!((a - b).abs() < 1.0 / 16_384.0);
        }
    }

    #[test]
    fn zero_length_buffer_round_trips() {
        let empty = AudioBuffer::silent(2, 0, 44_100);
        let decoded = decode_wav(&encode_wav_f32(&empty).unwrap()).unwrap();
        assert_eq!(decoded.channel_count(), 2);
        assert!(decoded.is_empty());
    }
}
