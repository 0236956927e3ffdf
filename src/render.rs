// src/render.rs
//
// Offline renders (mixdowns, effect chains) run on the blocking thread
// pool so the async side stays responsive. A job hands back its result
// over a oneshot channel.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::oneshot;

use crate::arrangement::Clip;
use crate::audio::AudioBuffer;
use crate::effects::{self, ActiveEffects};
use crate::mixdown;

pub struct RenderJob<T> {
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> RenderJob<T> {
    /// Wait for the job. A worker that panicked reports as an error rather
    /// than propagating the panic.
    pub async fn wait(self) -> Result<T> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(anyhow::anyhow!("render worker dropped its result")),
        }
    }
}

/// Run `work` on the blocking pool. Must be called from within a tokio
/// runtime.
pub fn spawn<T, F>(work: F) -> RenderJob<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    tokio::task::spawn_blocking(move || {
        let _ = tx.send(work());
    });
    RenderJob { rx }
}

/// Mix a snapshot of the arrangement in the background.
pub fn mix_job(clips: Vec<Clip>) -> RenderJob<AudioBuffer> {
    spawn(move || mixdown::mix_clips(&clips))
}

/// Re-render an effect chain from a pristine source in the background.
pub fn effects_job(source: Arc<AudioBuffer>, fx: ActiveEffects) -> RenderJob<AudioBuffer> {
    spawn(move || effects::render_pipeline(&source, &fx))
}

/// Estimate a clip's tempo in the background. `None` means no usable
/// onsets, not a failure.
pub fn tempo_job(buffer: Arc<AudioBuffer>) -> RenderJob<Option<u32>> {
    spawn(move || Ok(crate::dsp::estimate_bpm(&buffer)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrangement::ClipId;
    use crate::effects::EffectChange;

    #[tokio::test]
    async fn mix_job_matches_inline_mix() {
        let buffer = AudioBuffer::new(vec![vec![0.25; 44_100]; 2], 44_100);
        let clips = vec![Clip::new(ClipId(1), "A", buffer, 0, 0.0)];
        let from_job = mix_job(clips.clone()).wait().await.unwrap();
        let inline = mixdown::mix_clips(&clips).unwrap();
        assert_eq!(from_job, inline);
    }

    #[tokio::test]
    async fn effects_job_reports_errors() {
        let source = Arc::new(AudioBuffer::silent(1, 100, 44_100));
        let fx = ActiveEffects::default().with_change(&EffectChange::Speed(Some((0.0, false))));
        assert!(effects_job(source, fx).wait().await.is_err());
    }

    #[tokio::test]
    async fn tempo_job_yields_none_for_silence() {
        let silence = Arc::new(AudioBuffer::silent(2, 44_100, 44_100));
        assert_eq!(tempo_job(silence).wait().await.unwrap(), None);
    }

    #[tokio::test]
    async fn jobs_run_concurrently() {
        let buffer = AudioBuffer::new(vec![vec![0.1; 22_050]; 2], 44_100);
        let clips = vec![Clip::new(ClipId(1), "A", buffer, 0, 0.0)];
        let a = mix_job(clips.clone());
        let b = mix_job(clips);
        let (ra, rb) = tokio::join!(a.wait(), b.wait());
        assert_eq!(ra.unwrap(), rb.unwrap());
    }
}
