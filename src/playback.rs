// src/playback.rs
//
// Real-time preview. A dedicated thread owns the cpal output stream (it is
// not Send) and keeps a ring buffer topped up from the active voices; the
// device callback only drains the ring. The context starts suspended and
// opens the device lazily on the first resume.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use anyhow::{Context as _, Result, anyhow, bail};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::HeapRb;
use ringbuf::traits::{Consumer, Producer, Split};

use crate::arrangement::Clip;
use crate::audio::AudioBuffer;
use crate::dsp;

const RING_CAPACITY_FRAMES: usize = 8192;
const OUTPUT_CHANNELS: usize = 2;
const TOPUP_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackState {
    Suspended,
    Running,
}

/// One playing buffer: a read head over an already-rendered clip window.
struct Voice {
    buffer: Arc<AudioBuffer>,
    frame: usize,
    gain: f32,
}

enum Command {
    Resume(mpsc::Sender<Result<u32>>),
    Suspend,
    Shutdown,
}

pub struct PlaybackContext {
    tx: mpsc::Sender<Command>,
    state: Mutex<PlaybackState>,
    voices: Arc<Mutex<Vec<Voice>>>,
    sample_rate: Arc<AtomicU32>,
}

static CONTEXT: OnceLock<PlaybackContext> = OnceLock::new();

/// Process-wide playback context, created suspended on first use.
pub fn context() -> &'static PlaybackContext {
    CONTEXT.get_or_init(PlaybackContext::new)
}

impl PlaybackContext {
    pub fn new() -> Self {
        let voices: Arc<Mutex<Vec<Voice>>> = Arc::default();
        let sample_rate = Arc::new(AtomicU32::new(0));
        let (tx, rx) = mpsc::channel();
        {
            let voices = Arc::clone(&voices);
            let sample_rate = Arc::clone(&sample_rate);
            std::thread::spawn(move || audio_thread(rx, voices, sample_rate));
        }
        Self {
            tx,
            state: Mutex::new(PlaybackState::Suspended),
            voices,
            sample_rate,
        }
    }

    pub fn state(&self) -> PlaybackState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Open the output device if needed and start draining voices. Device
    /// errors surface here, not at context creation.
    pub fn resume(&self) -> Result<()> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(Command::Resume(reply_tx))
            .map_err(|_| anyhow!("audio thread is gone"))?;
        let rate = reply_rx
            .recv()
            .map_err(|_| anyhow!("audio thread dropped its reply"))??;
        self.sample_rate.store(rate, Ordering::Release);
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = PlaybackState::Running;
        Ok(())
    }

    pub fn suspend(&self) -> Result<()> {
        self.tx
            .send(Command::Suspend)
            .map_err(|_| anyhow!("audio thread is gone"))?;
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = PlaybackState::Suspended;
        Ok(())
    }

    /// Queue a clip's current buffer for immediate playback, resampled to
    /// the device rate. Rejected while suspended.
    pub fn schedule_clip(&self, clip: &Clip) -> Result<()> {
        if self.state() != PlaybackState::Running {
            bail!("playback is suspended; resume before scheduling");
        }
        let rate = self.sample_rate.load(Ordering::Acquire);
        let buffer = if rate != 0 && clip.current_buffer.sample_rate() != rate {
            Arc::new(dsp::resample(&clip.current_buffer, rate)?)
        } else {
            Arc::clone(&clip.current_buffer)
        };
        let start = (clip.trim_start * buffer.sample_rate() as f64).round() as usize;
        self.voices
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Voice {
                buffer,
                frame: start,
                gain: clip.volume,
            });
        Ok(())
    }

    /// Drop every active voice. Takes effect before this call returns; the
    /// ring buffer drains the few milliseconds it already holds.
    pub fn stop(&self) {
        self.voices.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    pub fn active_voices(&self) -> usize {
        self.voices.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Drop for PlaybackContext {
    fn drop(&mut self) {
        let _ = self.tx.send(Command::Shutdown);
    }
}

impl Default for PlaybackContext {
    fn default() -> Self {
        Self::new()
    }
}

fn audio_thread(
    rx: mpsc::Receiver<Command>,
    voices: Arc<Mutex<Vec<Voice>>>,
    sample_rate: Arc<AtomicU32>,
) {
    // The stream and ring producer live here because cpal streams must stay
    // on one thread.
    let mut stream: Option<cpal::Stream> = None;
    let mut producer = None;
    let mut running = false;

    loop {
        match rx.recv_timeout(TOPUP_INTERVAL) {
            Ok(Command::Resume(reply)) => {
                let result = match (&stream, &producer) {
                    (Some(_), Some(_)) => Ok(sample_rate.load(Ordering::Acquire)),
                    _ => match open_stream() {
                        Ok((s, p, rate)) => {
                            stream = Some(s);
                            producer = Some(p);
                            Ok(rate)
                        }
                        Err(e) => Err(e),
                    },
                };
                if let (Ok(_), Some(s)) = (&result, &stream) {
                    running = s.play().is_ok();
                }
                let _ = reply.send(result);
            }
            Ok(Command::Suspend) => {
                running = false;
                if let Some(s) = &stream {
                    let _ = s.pause();
                }
            }
            Ok(Command::Shutdown) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
            Err(mpsc::RecvTimeoutError::Timeout) => {}
        }

        if running && let Some(prod) = producer.as_mut() {
            let mut voices = voices.lock().unwrap_or_else(|e| e.into_inner());
            top_up(prod, &mut voices);
        }
    }
}

type RingProducer = <HeapRb<f32> as Split>::Prod;

/// Open the default output device as an interleaved f32 stereo stream whose
/// callback drains the ring buffer, underrunning to silence.
fn open_stream() -> Result<(cpal::Stream, RingProducer, u32)> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .context("no default output device")?;
    let config = device
        .default_output_config()
        .context("querying default output config")?;
    let rate = config.sample_rate().0;
    let stream_config = cpal::StreamConfig {
        channels: OUTPUT_CHANNELS as u16,
        sample_rate: config.sample_rate(),
        buffer_size: cpal::BufferSize::Default,
    };

    let ring = HeapRb::<f32>::new(RING_CAPACITY_FRAMES * OUTPUT_CHANNELS);
    let (producer, mut consumer) = ring.split();

    let stream = device.build_output_stream(
        &stream_config,
        move |data: &mut [f32], _| {
            for sample in data.iter_mut() {
                *sample = consumer.try_pop().unwrap_or(0.0);
            }
        },
        |err| eprintln!("output stream error: {err}"),
        None,
    )?;
    Ok((stream, producer, rate))
}

/// Fill whatever space the ring has with the sum of all voices, retiring
/// voices that ran past their buffer.
fn top_up(producer: &mut RingProducer, voices: &mut Vec<Voice>) {
    use ringbuf::traits::Observer;
    let space = producer.vacant_len() / OUTPUT_CHANNELS;
    if space == 0 {
        return;
    }
    let mut frame = vec![0.0f32; OUTPUT_CHANNELS];
    for _ in 0..space {
        mix_frame(voices, &mut frame);
        for &s in &frame {
            if producer.try_push(s).is_err() {
                return;
            }
        }
        voices.retain(|v| v.frame < v.buffer.len());
    }
}

/// One interleaved output frame: sum of every voice at its read head.
fn mix_frame(voices: &mut [Voice], frame: &mut [f32]) {
    frame.fill(0.0);
    for voice in voices.iter_mut() {
        if voice.frame >= voice.buffer.len() {
            continue;
        }
        for (ch, slot) in frame.iter_mut().enumerate() {
            *slot += voice.buffer.channel_or_last(ch)[voice.frame] * voice.gain;
        }
        voice.frame += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrangement::ClipId;

    fn voice(samples: Vec<f32>, gain: f32) -> Voice {
        Voice {
            buffer: Arc::new(AudioBuffer::new(vec![samples], 44_100)),
            frame: 0,
            gain,
        }
    }

    #[test]
    fn frames_sum_voices_with_gain() {
        let mut voices = vec![voice(vec![0.5, 0.5], 1.0), voice(vec![0.25, 0.25], 2.0)];
        let mut frame = [0.0f32; 2];
        mix_frame(&mut voices, &mut frame);
        // Mono voices feed both output channels.
        assert!((frame[0] - 1.0).abs() < 1e-6);
        assert!((frame[1] - 1.0).abs() < 1e-6);
        assert_eq!(voices[0].frame, 1);
    }

    #[test]
    fn exhausted_voices_go_silent() {
        let mut voices = vec![voice(vec![0.5], 1.0)];
        let mut frame = [0.0f32; 2];
        mix_frame(&mut voices, &mut frame);
        mix_frame(&mut voices, &mut frame);
        assert_eq!(frame, [0.0, 0.0]);
    }

    #[test]
    fn scheduling_while_suspended_is_rejected() {
        let ctx = PlaybackContext::new();
        let clip = Clip::new(
            ClipId(1),
            "A",
            AudioBuffer::silent(2, 100, 44_100),
            0,
            0.0,
        );
        assert_eq!(ctx.state(), PlaybackState::Suspended);
        assert!(ctx.schedule_clip(&clip).is_err());
    }

    #[test]
    fn stop_clears_voices_synchronously() {
        let ctx = PlaybackContext::new();
        ctx.voices
            .lock()
            .unwrap()
            .push(voice(vec![0.0; 128], 1.0));
        assert_eq!(ctx.active_voices(), 1);
        ctx.stop();
        assert_eq!(ctx.active_voices(), 0);
    }
}
