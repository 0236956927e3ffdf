// src/arrangement/clip.rs

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::audio::AudioBuffer;
use crate::effects::ActiveEffects;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClipId(pub u64);

/// A gain control point. Time is in seconds relative to the start of the
/// clip's audible window, spanning `[0, duration]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AutomationPoint {
    pub time: f64,
    pub value: f32,
}

/// The two original clips a crossfade merge consumed, kept by value so a
/// restore is a pure structural copy-out. Children never point back at the
/// merged clip.
#[derive(Clone, Debug)]
pub struct CrossfadeLineage {
    pub left: Clip,
    pub right: Clip,
    pub duration: f64,
}

/// A placed, trimmed region of an audio source on the timeline.
///
/// `source_buffer` is pristine and never mutated after creation;
/// `current_buffer` is wholly derived from it by the effect pipeline and
/// replaced wholesale on every effect change.
#[derive(Clone, Debug)]
pub struct Clip {
    pub id: ClipId,
    pub name: String,
    pub source_buffer: Arc<AudioBuffer>,
    pub current_buffer: Arc<AudioBuffer>,
    pub lane: usize,
    pub start_time: f64,
    pub trim_start: f64,
    pub duration: f64,
    pub volume: f32,
    pub muted: bool,
    pub bpm: Option<u32>,
    pub is_looping: bool,
    pub active_effects: ActiveEffects,
    pub volume_automation: Vec<AutomationPoint>,
    pub crossfade: Option<Box<CrossfadeLineage>>,
}

impl Clip {
    pub fn new(id: ClipId, name: impl Into<String>, buffer: AudioBuffer, lane: usize, start_time: f64) -> Self {
        let buffer = Arc::new(buffer);
        let duration = buffer.duration();
        Self {
            id,
            name: name.into(),
            source_buffer: buffer.clone(),
            current_buffer: buffer,
            lane,
            start_time,
            trim_start: 0.0,
            duration,
            volume: 1.0,
            muted: false,
            bpm: None,
            is_looping: false,
            active_effects: ActiveEffects::default(),
            volume_automation: Vec::new(),
            crossfade: None,
        }
    }

    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }

    /// Timeline-interval intersection with another clip.
    pub fn overlaps(&self, other: &Clip) -> bool {
        self.start_time < other.end_time() && other.start_time < self.end_time()
    }

    /// Piecewise-linear automation gain at `time` (current-buffer seconds).
    /// Before the first point the first value holds, after the last point
    /// the last value holds; no points means unity.
    pub fn automation_gain(&self, time: f64) -> f32 {
        let points = &self.volume_automation;
        if points.is_empty() {
            return 1.0;
        }
        if time <= points[0].time {
            return points[0].value;
        }
        for pair in points.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if time <= b.time {
                let span = b.time - a.time;
                if span <= 0.0 {
                    return b.value;
                }
                let t = ((time - a.time) / span) as f32;
                return a.value + (b.value - a.value) * t;
            }
        }
        points[points.len() - 1].value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(start: f64, duration: f64) -> Clip {
        let mut c = Clip::new(ClipId(1), "X", AudioBuffer::silent(2, 44100 * 8, 44100), 0, start);
        c.duration = duration;
        c
    }

    #[test]
    fn overlap_is_half_open() {
        let a = clip(0.0, 5.0);
        let b = clip(5.0, 5.0);
        assert!(!a.overlaps(&b));
        let c = clip(4.999, 5.0);
        assert!(a.overlaps(&c));
    }

    #[test]
    fn automation_interpolates_and_clamps() {
        let mut c = clip(0.0, 4.0);
        c.volume_automation = vec![
            AutomationPoint { time: 1.0, value: 0.0 },
            AutomationPoint { time: 3.0, value: 1.0 },
        ];
        assert_eq!(c.automation_gain(0.0), 0.0);
        assert!((c.automation_gain(2.0) - 0.5).abs() < 1e-6);
        assert_eq!(c.automation_gain(5.0), 1.0);
    }

    #[test]
    fn no_points_is_unity() {
        assert_eq!(clip(0.0, 1.0).automation_gain(0.5), 1.0);
    }
}
