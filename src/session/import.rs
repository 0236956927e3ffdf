// src/session/import.rs
//
// Decoding audio files into planar buffers via symphonia, plus the
// multi-file import flow: failures are collected per file instead of
// aborting the batch, and each decoded clip gets a best-effort tempo
// estimate before being placed on the timeline.

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::arrangement::{Arrangement, ClipId};
use crate::audio::AudioBuffer;
use crate::dsp;

/// Outcome of one file in a batch import.
pub enum ImportOutcome {
    Added(ClipId),
    Failed { path: PathBuf, error: anyhow::Error },
}

/// Decode a whole file to a planar buffer at its native sample rate.
pub fn decode_file(path: &Path) -> Result<AudioBuffer> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .with_context(|| format!("probing {}", path.display()))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .context("no decodable audio track")?;
    let track_id = track.id;
    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())?;

    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(44_100);
    let mut planar: Vec<Vec<f32>> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(e.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }
        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate = spec.rate;
                let channel_count = spec.channels.count();
                if planar.is_empty() {
                    planar = vec![Vec::new(); channel_count];
                }
                let mut samples =
                    SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                samples.copy_interleaved_ref(decoded);
                for (i, &s) in samples.samples().iter().enumerate() {
                    planar[i % channel_count].push(s);
                }
            }
            // Recoverable per symphonia's contract: skip the bad packet.
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => return Err(e.into()),
        }
    }

    if planar.first().is_none_or(|ch| ch.is_empty()) {
        bail!("no audio frames in {}", path.display());
    }
    Ok(AudioBuffer::new(planar, sample_rate))
}

/// Import a batch of files. Each file decodes independently; a failure is
/// reported in its slot and the rest of the batch proceeds. Clips land at
/// the smart insertion point, tagged with a tempo estimate when the
/// detector finds one.
pub fn import_files(
    arrangement: &mut Arrangement,
    paths: &[PathBuf],
    playhead: f64,
    selected: Option<ClipId>,
) -> Vec<ImportOutcome> {
    let mut outcomes = Vec::with_capacity(paths.len());
    let mut selected = selected;
    for path in paths {
        match import_one(arrangement, path, playhead, selected) {
            Ok(id) => {
                // Chain placements so a batch lines up end to end.
                selected = Some(id);
                outcomes.push(ImportOutcome::Added(id));
            }
            Err(error) => outcomes.push(ImportOutcome::Failed {
                path: path.clone(),
                error,
            }),
        }
    }
    outcomes
}

fn import_one(
    arrangement: &mut Arrangement,
    path: &Path,
    playhead: f64,
    selected: Option<ClipId>,
) -> Result<ClipId> {
    let buffer = decode_file(path)?;
    let bpm = dsp::estimate_bpm(&buffer);
    let name = clip_name(path, bpm);
    let (lane, start) =
        arrangement.smart_insertion_point(buffer.duration(), playhead, selected);
    let id = arrangement.add_clip(name, buffer, lane, start)?;
    if let Some(bpm) = bpm {
        arrangement.set_bpm_hint(id, bpm);
    }
    Ok(id)
}

fn clip_name(path: &Path, bpm: Option<u32>) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Imported Clip");
    match bpm {
        Some(bpm) => format!("{stem} ({bpm} BPM)"),
        None => stem.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::export;

    fn temp_wav(name: &str, buffer: &AudioBuffer) -> PathBuf {
        let path =
            std::env::temp_dir().join(format!("arranger-{}-{name}", std::process::id()));
        let bytes = export::encode_wav_f32(buffer).unwrap();
        std::fs::write(&path, bytes).unwrap();
        path
    }

    fn tone(seconds: f64, rate: u32) -> AudioBuffer {
        let frames = (seconds * rate as f64) as usize;
        let data: Vec<f32> = (0..frames)
            .map(|i| (2.0 * std::f32::consts::PI * 220.0 * i as f32 / rate as f32).sin() * 0.5)
            .collect();
        AudioBuffer::new(vec![data.clone(), data], rate)
    }

    #[test]
    fn wav_decode_round_trip() {
        let original = tone(0.5, 48_000);
        let path = temp_wav("roundtrip.wav", &original);
        let decoded = decode_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(decoded.sample_rate(), 48_000);
        assert_eq!(decoded.channel_count(), 2);
        assert_eq!(decoded.len(), original.len());
        for (a, b) in decoded
            .channel(0)
            .iter()
            .zip(original.channel(0))
        {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn batch_import_skips_failures() {
        let good = temp_wav("good.wav", &tone(0.3, 44_100));
        let missing = std::env::temp_dir().join("arranger-does-not-exist.wav");

        let mut arr = Arrangement::new();
        let outcomes = import_files(&mut arr, &[good.clone(), missing], 0.0, None);
        std::fs::remove_file(&good).ok();

        assert_eq!(outcomes.len(), 2);
        assert!(matches!(outcomes[0], ImportOutcome::Added(_)));
        assert!(matches!(outcomes[1], ImportOutcome::Failed { .. }));
        assert_eq!(arr.clips().len(), 1);
        // The stem carries a per-process prefix from the fixture helper.
        assert!(arr.clips()[0].name.contains("good"));
    }

    #[test]
    fn batch_placements_chain_end_to_end() {
        let a = temp_wav("chain-a.wav", &tone(0.4, 44_100));
        let b = temp_wav("chain-b.wav", &tone(0.4, 44_100));

        let mut arr = Arrangement::new();
        let outcomes = import_files(&mut arr, &[a.clone(), b.clone()], 0.0, None);
        std::fs::remove_file(&a).ok();
        std::fs::remove_file(&b).ok();

        assert_eq!(outcomes.len(), 2);
        let clips = arr.clips();
        assert_eq!(clips.len(), 2);
        assert_eq!(clips[0].lane, clips[1].lane);
        assert!((clips[1].start_time - clips[0].end_time()).abs() < 1e-9);
    }
}
