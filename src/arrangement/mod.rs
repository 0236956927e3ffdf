// src/arrangement/mod.rs
//
// Owns the clip set and every timeline mutation: collision-aware moves,
// snapping, trims, splits, crossfade merge/restore, bounded undo history.
// Placement works on clip geometry only; buffer content is touched only
// where a merge or an effect re-render demands it.

pub mod clip;
pub mod naming;

pub use clip::{AutomationPoint, Clip, ClipId, CrossfadeLineage};

use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::{Result, bail};

use crate::audio::AudioBuffer;
use crate::effects::{self, EffectChange};
use crate::mixdown;

pub const SNAP_THRESHOLD_PX: f64 = 15.0;
pub const MIN_ZOOM: f64 = 10.0;
pub const MAX_ZOOM: f64 = 300.0;
pub const MIN_CLIP_DURATION: f64 = 0.1;
pub const SPLIT_EDGE_TOLERANCE: f64 = 0.05;
pub const CROSSFADE_ADJACENCY_TOLERANCE: f64 = 0.1;
pub const MAX_HISTORY: usize = 20;

/// Slack when judging whether a gap can hold a clip, absorbing float jitter
/// from repeated trims and moves.
const GAP_TOLERANCE: f64 = 0.01;
const SNAP_FIT_EPS: f64 = 1e-3;

/// Beat-grid snapping only engages once the user has zoomed in far enough
/// for single beats to be meaningfully wide on screen.
const SNAP_ZOOM_THRESHOLD: f64 = MIN_ZOOM + (MAX_ZOOM - MIN_ZOOM) * 0.25;

/// Pointer state for one move step, with time values already resolved by
/// the UI layer. `zoom` is pixels per second and drives both the snap
/// tolerance and whether the beat grid participates.
#[derive(Clone, Copy, Debug)]
pub struct DragContext {
    pub proposed_start: f64,
    pub target_lane: usize,
    pub playhead: f64,
    pub zoom: f64,
    /// Project tempo in BPM, for beat-grid candidates.
    pub tempo: Option<f64>,
}

impl DragContext {
    pub fn snap_tolerance(&self) -> f64 {
        SNAP_THRESHOLD_PX / self.zoom.max(f64::MIN_POSITIVE)
    }
}

/// Vertical pointer position -> lane row (10 px header offset, clamped at 0).
pub fn lane_for_y(pointer_y: f64, lane_height: f64) -> usize {
    (((pointer_y - 10.0) / lane_height).floor()).max(0.0) as usize
}

#[derive(Clone, Copy, Debug)]
struct Gap {
    start: f64,
    end: f64, // f64::INFINITY for the trailing gap
}

impl Gap {
    fn holds(&self, start: f64, duration: f64) -> bool {
        self.end - self.start >= duration - GAP_TOLERANCE
            && start >= self.start - SNAP_FIT_EPS
            && start <= self.end - duration + SNAP_FIT_EPS
    }
}

#[derive(Default)]
pub struct Arrangement {
    clips: Vec<Clip>,
    next_id: u64,
    history: VecDeque<Vec<Clip>>,
}

impl Arrangement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clips(&self) -> &[Clip] {
        &self.clips
    }

    pub fn clip(&self, id: ClipId) -> Option<&Clip> {
        self.clips.iter().find(|c| c.id == id)
    }

    fn require(&self, id: ClipId) -> Result<&Clip> {
        self.clip(id)
            .ok_or_else(|| anyhow::anyhow!("no clip with id {id:?}"))
    }

    fn require_mut(&mut self, id: ClipId) -> Result<&mut Clip> {
        self.clips
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| anyhow::anyhow!("no clip with id {id:?}"))
    }

    pub fn alloc_id(&mut self) -> ClipId {
        self.next_id += 1;
        ClipId(self.next_id)
    }

    /// Latest clip end across all lanes.
    pub fn timeline_end(&self) -> f64 {
        self.clips.iter().map(Clip::end_time).fold(0.0, f64::max)
    }

    // ---- history -------------------------------------------------------

    /// Snapshot the current clip set. Mutating operations call this before
    /// touching anything; streamed operations (drags) are bracketed by the
    /// caller instead, one push per gesture.
    pub fn push_history(&mut self) {
        self.history.push_back(self.clips.clone());
        if self.history.len() > MAX_HISTORY {
            self.history.pop_front();
        }
    }

    pub fn undo(&mut self) -> bool {
        match self.history.pop_back() {
            Some(snapshot) => {
                self.clips = snapshot;
                true
            }
            None => false,
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.history.is_empty()
    }

    // ---- insertion / removal -------------------------------------------

    /// Place a new clip; rejected if it would overlap anything in its lane.
    pub fn add_clip(
        &mut self,
        name: impl Into<String>,
        buffer: AudioBuffer,
        lane: usize,
        start_time: f64,
    ) -> Result<ClipId> {
        let id = self.alloc_id();
        let clip = Clip::new(id, name, buffer, lane, start_time);
        if self
            .clips
            .iter()
            .any(|c| c.lane == lane && c.overlaps(&clip))
        {
            bail!("clip would overlap an existing clip in lane {lane}");
        }
        self.push_history();
        self.clips.push(clip);
        Ok(id)
    }

    pub fn insert_clip(&mut self, clip: Clip) -> Result<()> {
        if self
            .clips
            .iter()
            .any(|c| c.lane == clip.lane && c.overlaps(&clip))
        {
            bail!("clip would overlap an existing clip in lane {}", clip.lane);
        }
        self.next_id = self.next_id.max(clip.id.0);
        self.clips.push(clip);
        Ok(())
    }

    pub fn remove_clip(&mut self, id: ClipId) -> Result<()> {
        self.require(id)?;
        self.push_history();
        self.clips.retain(|c| c.id != id);
        Ok(())
    }

    /// Where a freshly created clip should land: right after the selected
    /// clip if its lane has room, else at the end of that lane, else on a
    /// fresh lane at the playhead.
    pub fn smart_insertion_point(
        &self,
        new_duration: f64,
        playhead: f64,
        selected: Option<ClipId>,
    ) -> (usize, f64) {
        let fresh_lane = self.clips.iter().map(|c| c.lane + 1).max().unwrap_or(0);
        let Some(sel) = selected.and_then(|id| self.clip(id)) else {
            return (fresh_lane, playhead);
        };

        let lane = sel.lane;
        let after_sel = sel.end_time();
        if self.lane_is_free(lane, after_sel, new_duration, None) {
            return (lane, after_sel);
        }
        let lane_end = self
            .clips
            .iter()
            .filter(|c| c.lane == lane)
            .map(Clip::end_time)
            .fold(0.0, f64::max);
        if self.lane_is_free(lane, lane_end, new_duration, None) {
            return (lane, lane_end);
        }
        (fresh_lane, playhead)
    }

    fn lane_is_free(
        &self,
        lane: usize,
        start: f64,
        duration: f64,
        exclude: Option<ClipId>,
    ) -> bool {
        !self.clips.iter().any(|c| {
            c.lane == lane
                && Some(c.id) != exclude
                && start < c.end_time() - SNAP_FIT_EPS
                && c.start_time < start + duration - SNAP_FIT_EPS
        })
    }

    // ---- move ----------------------------------------------------------

    /// Constrained move: the raw pointer position is clamped into the
    /// nearest free gap that can hold the clip, then snap candidates are
    /// tried. A candidate that would break the no-overlap invariant is
    /// skipped even if it is closer. The timeline is unbounded on the
    /// right, so a fitting gap always exists past the last clip.
    pub fn move_clip(&mut self, id: ClipId, drag: &DragContext) -> Result<()> {
        let clip = self.require(id)?;
        let duration = clip.duration;
        let lane = drag.target_lane;

        let gaps = self.free_gaps(lane, Some(id));

        // Clamp into the gap that displaces the pointer position least.
        let mut best_start = None;
        let mut min_displacement = f64::INFINITY;
        for gap in &gaps {
            if gap.end - gap.start < duration - GAP_TOLERANCE {
                continue;
            }
            // With the fit tolerance, gap.end - duration can sit slightly
            // below gap.start; degrade to gap.start rather than panic.
            let clamped = gap.start.max(drag.proposed_start.min(gap.end - duration));
            let displacement = (clamped - drag.proposed_start).abs();
            if displacement < min_displacement {
                min_displacement = displacement;
                best_start = Some(clamped);
            }
        }
        let Some(mut start) = best_start else {
            bail!("no gap in lane {lane} can hold a {duration:.2}s clip");
        };

        // Snap candidates: origin, playhead, gap boundaries, edges of clips
        // on adjacent lanes, and (zoomed in) the beat grid.
        let mut candidates = vec![0.0, drag.playhead];
        for gap in &gaps {
            candidates.push(gap.start);
            if gap.end.is_finite() {
                candidates.push(gap.end - duration);
            }
        }
        for other in &self.clips {
            if other.id != id && other.lane.abs_diff(lane) == 1 {
                candidates.push(other.start_time);
                candidates.push(other.end_time());
            }
        }
        if drag.zoom > SNAP_ZOOM_THRESHOLD
            && let Some(tempo) = drag.tempo
            && tempo > 0.0
        {
            let beat = 60.0 / tempo;
            candidates.push((start / beat).round() * beat);
        }

        let tolerance = drag.snap_tolerance();
        let mut best_snap = None;
        let mut min_diff = f64::INFINITY;
        for &cand in &candidates {
            // Align clip start to the candidate.
            let diff_start = (start - cand).abs();
            if diff_start < tolerance
                && diff_start < min_diff
                && gaps.iter().any(|g| g.holds(cand, duration))
            {
                best_snap = Some(cand);
                min_diff = diff_start;
            }
            // Align clip end to the candidate.
            let diff_end = (start + duration - cand).abs();
            let aligned = cand - duration;
            if diff_end < tolerance
                && diff_end < min_diff
                && gaps.iter().any(|g| g.holds(aligned, duration))
            {
                best_snap = Some(aligned);
                min_diff = diff_end;
            }
        }
        if let Some(snap) = best_snap {
            start = snap;
        }

        let clip = self.require_mut(id)?;
        clip.start_time = start;
        clip.lane = lane;
        debug_assert!(self.no_overlaps());
        Ok(())
    }

    /// Free intervals in a lane (complement of its clips, sorted), ending
    /// with an unbounded gap to +inf.
    fn free_gaps(&self, lane: usize, exclude: Option<ClipId>) -> Vec<Gap> {
        let mut others: Vec<&Clip> = self
            .clips
            .iter()
            .filter(|c| c.lane == lane && Some(c.id) != exclude)
            .collect();
        others.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));

        let mut gaps = Vec::with_capacity(others.len() + 1);
        let mut last_end = 0.0f64;
        for clip in others {
            if clip.start_time > last_end {
                gaps.push(Gap { start: last_end, end: clip.start_time });
            }
            last_end = last_end.max(clip.end_time());
        }
        gaps.push(Gap { start: last_end, end: f64::INFINITY });
        gaps
    }

    // ---- trim ----------------------------------------------------------

    /// Move the start edge by `delta` seconds (positive = later). The delta
    /// is floored so `trim_start` stays non-negative and the clip keeps its
    /// minimum duration; an extension that would collide is rejected.
    pub fn trim_start_edge(&mut self, id: ClipId, delta: f64) -> Result<()> {
        let clip = self.require(id)?;
        let mut delta = delta;
        if clip.trim_start + delta < 0.0 {
            delta = -clip.trim_start;
        }
        if clip.duration - delta < MIN_CLIP_DURATION {
            delta = clip.duration - MIN_CLIP_DURATION;
        }
        let new_start = clip.start_time + delta;
        let new_duration = clip.duration - delta;
        if !self.lane_is_free(clip.lane, new_start, new_duration, Some(id)) {
            bail!("trim would overlap a neighboring clip");
        }
        self.push_history();
        let clip = self.require_mut(id)?;
        clip.start_time = new_start;
        clip.trim_start += delta;
        clip.duration = new_duration;
        debug_assert!(self.no_overlaps());
        Ok(())
    }

    /// Move the end edge by `delta` seconds (positive = longer). Duration is
    /// floored at the minimum and, for non-looping clips, capped at the
    /// underlying buffer's remaining length.
    pub fn trim_end_edge(&mut self, id: ClipId, delta: f64) -> Result<()> {
        let clip = self.require(id)?;
        let mut delta = delta;
        if clip.duration + delta < MIN_CLIP_DURATION {
            delta = MIN_CLIP_DURATION - clip.duration;
        }
        let buffer_len = clip.current_buffer.duration();
        if !clip.is_looping && clip.trim_start + clip.duration + delta > buffer_len {
            delta = buffer_len - (clip.trim_start + clip.duration);
        }
        let new_duration = clip.duration + delta;
        if !self.lane_is_free(clip.lane, clip.start_time, new_duration, Some(id)) {
            bail!("trim would overlap a neighboring clip");
        }
        self.push_history();
        let clip = self.require_mut(id)?;
        clip.duration = new_duration;
        debug_assert!(self.no_overlaps());
        Ok(())
    }

    // ---- split ---------------------------------------------------------

    /// Split at the playhead. Rejected unless the playhead is strictly
    /// inside the clip (with a small edge tolerance). Both halves are new
    /// clips sharing the parent's buffers; names follow the A/B/... suffix
    /// scheme over siblings with the same base name.
    pub fn split_at(&mut self, id: ClipId, playhead: f64) -> Result<(ClipId, ClipId)> {
        let clip = self.require(id)?;
        let rel = playhead - clip.start_time;
        if rel <= SPLIT_EDGE_TOLERANCE || rel >= clip.duration - SPLIT_EDGE_TOLERANCE {
            bail!("playhead is not inside the clip");
        }

        let (left_name, right_name) =
            naming::split_names(&clip.name, self.clips.iter().map(|c| c.name.as_str()));

        let index = self
            .clips
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| anyhow::anyhow!("no clip with id {id:?}"))?;
        self.push_history();
        let parent = self.clips.remove(index);

        let left_id = self.alloc_id();
        let right_id = self.alloc_id();

        let mut left = parent.clone();
        left.id = left_id;
        left.name = left_name;
        left.duration = rel;

        let mut right = parent;
        right.id = right_id;
        right.name = right_name;
        right.start_time += rel;
        right.trim_start += rel;
        right.duration -= rel;

        self.clips.insert(index, right);
        self.clips.insert(index, left);
        debug_assert!(self.no_overlaps());
        Ok((left_id, right_id))
    }

    // ---- crossfade merge / restore -------------------------------------

    /// Merge the two clips meeting at `boundary_time` in `lane` into one
    /// clip with a linear crossfade. The originals are retained by value in
    /// the merged clip's lineage so the merge can be undone exactly.
    pub fn crossfade_merge(
        &mut self,
        lane: usize,
        boundary_time: f64,
        fade_duration: f64,
    ) -> Result<ClipId> {
        let left = self
            .clips
            .iter()
            .find(|c| {
                c.lane == lane
                    && (c.end_time() - boundary_time).abs() < CROSSFADE_ADJACENCY_TOLERANCE
            })
            .cloned();
        let right = self
            .clips
            .iter()
            .find(|c| {
                c.lane == lane
                    && (c.start_time - boundary_time).abs() < CROSSFADE_ADJACENCY_TOLERANCE
            })
            .cloned();
        let (Some(left), Some(right)) = (left, right) else {
            bail!("no adjacent clip pair at {boundary_time:.2}s in lane {lane}");
        };

        let merged_buffer = mixdown::crossfade_merge_buffers(
            &left.current_buffer,
            &right.current_buffer,
            fade_duration,
        )?;

        self.push_history();
        let id = self.alloc_id();
        let mut merged = Clip::new(
            id,
            format!("Merged ({} + {})", left.name, right.name),
            merged_buffer,
            lane,
            left.start_time,
        );
        merged.bpm = if left.bpm == right.bpm { left.bpm } else { None };
        merged.crossfade = Some(Box::new(CrossfadeLineage {
            left: left.clone(),
            right: right.clone(),
            duration: fade_duration,
        }));

        self.clips.retain(|c| c.id != left.id && c.id != right.id);
        self.clips.push(merged);
        debug_assert!(self.no_overlaps());
        Ok(id)
    }

    /// Undo a merge: delete the merged clip and reinsert both originals
    /// exactly as they were, ids included.
    pub fn crossfade_restore(&mut self, id: ClipId) -> Result<(ClipId, ClipId)> {
        let clip = self.require(id)?;
        let Some(lineage) = clip.crossfade.clone() else {
            bail!("clip {id:?} was not created by a crossfade merge");
        };
        self.push_history();
        self.clips.retain(|c| c.id != id);
        let ids = (lineage.left.id, lineage.right.id);
        self.clips.push(lineage.left);
        self.clips.push(lineage.right);
        debug_assert!(self.no_overlaps());
        Ok(ids)
    }

    // ---- effects -------------------------------------------------------

    /// Toggle or adjust one effect stage. The full chain is re-rendered
    /// from the pristine source and committed atomically; a failing render
    /// leaves the clip exactly as it was.
    pub fn apply_effect(&mut self, id: ClipId, change: EffectChange) -> Result<()> {
        let clip = self.require(id)?;
        let new_fx = clip.active_effects.with_change(&change);
        // Render first: it is pure, so the history push and commit below
        // only happen once success is certain.
        let rendered = effects::render_pipeline(&clip.source_buffer, &new_fx)?;

        let renamed = match (&change, clip.bpm) {
            (EffectChange::Speed(_), Some(bpm)) => {
                let rate = new_fx.playback_rate.unwrap_or(1.0);
                Some(retag_bpm(&clip.name, (bpm as f64 * rate).round() as u32))
            }
            _ => None,
        };

        // A slower rate can outgrow the room before the next clip in the
        // lane; the audible window is clamped so the lane stays legal while
        // the buffer keeps the full render.
        let (lane, start) = (clip.lane, clip.start_time);
        let room = self
            .clips
            .iter()
            .filter(|c| c.id != id && c.lane == lane && c.start_time > start)
            .map(|c| c.start_time - start)
            .fold(f64::INFINITY, f64::min);
        let new_duration = rendered.duration().min(room);

        self.push_history();
        let clip = self.require_mut(id)?;
        clip.current_buffer = Arc::new(rendered);
        clip.active_effects = new_fx;
        clip.duration = new_duration;
        clip.trim_start = 0.0;
        if let Some(name) = renamed {
            clip.name = name;
        }
        Ok(())
    }

    // ---- simple setters -------------------------------------------------

    pub fn set_volume(&mut self, id: ClipId, volume: f32) -> Result<()> {
        self.require(id)?;
        self.push_history();
        self.require_mut(id)?.volume = volume.max(0.0);
        Ok(())
    }

    pub fn set_muted(&mut self, id: ClipId, muted: bool) -> Result<()> {
        self.require(id)?;
        self.push_history();
        self.require_mut(id)?.muted = muted;
        Ok(())
    }

    /// Replace the automation curve. Points are sorted by time and their
    /// values clamped to [0, 1].
    pub fn set_automation(&mut self, id: ClipId, mut points: Vec<AutomationPoint>) -> Result<()> {
        self.require(id)?;
        points.sort_by(|a, b| a.time.total_cmp(&b.time));
        for p in &mut points {
            p.value = p.value.clamp(0.0, 1.0);
        }
        self.push_history();
        self.require_mut(id)?.volume_automation = points;
        Ok(())
    }

    /// Record a tempo estimate. Metadata only, so it bypasses history.
    pub fn set_bpm_hint(&mut self, id: ClipId, bpm: u32) {
        if let Some(clip) = self.clips.iter_mut().find(|c| c.id == id) {
            clip.bpm = Some(bpm);
        }
    }

    /// Invariant check used by tests and debug assertions: no two clips in
    /// any lane intersect by more than the gap-fit tolerance. The slack
    /// mirrors the fit check in `move_clip`, which admits a gap up to
    /// `GAP_TOLERANCE` narrower than the clip.
    pub fn no_overlaps(&self) -> bool {
        for (i, a) in self.clips.iter().enumerate() {
            for b in &self.clips[i + 1..] {
                if a.lane == b.lane {
                    let overlap =
                        a.end_time().min(b.end_time()) - a.start_time.max(b.start_time);
                    if overlap > GAP_TOLERANCE {
                        return false;
                    }
                }
            }
        }
        true
    }
}

fn retag_bpm(name: &str, bpm: u32) -> String {
    let tag = format!("({bpm} BPM)");
    // Replace an existing "(N BPM)" tag in place if one exists.
    let mut search = 0;
    while let Some(open) = name[search..].find('(') {
        let open = search + open;
        if let Some(close) = name[open..].find(')') {
            let inner = &name[open + 1..open + close];
            if inner
                .strip_suffix(" BPM")
                .is_some_and(|n| n.chars().all(|c| c.is_ascii_digit()) && !n.is_empty())
            {
                return format!("{}{}{}", &name[..open], tag, &name[open + close + 1..]);
            }
            search = open + 1;
        } else {
            break;
        }
    }
    format!("{name} {tag}")
}
