use std::collections::BTreeMap;

use crate::foundation::core::{Canvas, Fps};
use crate::foundation::error::{CutlineError, CutlineResult};
use crate::model::animation::{
    AnimatedProperty, AnimationTrack, AnimationTrackId, Keyframe, KeyframeId,
};
use crate::model::clip::{Clip, ClipId, ClipTransform, ColorFilters, CropMode, TextContent};
use crate::model::effect::{EffectEnvelope, EffectId, EffectInstance, EffectKind};
use crate::model::material::{Material, MaterialId};
use crate::model::track::{Track, TrackId, TrackKind};
use crate::model::transition::{Transition, TransitionId, TransitionKind};
use crate::animation::ease::Easing;

/// Mutation notifications for consumers that want reactivity. The engine core
/// never depends on these; they exist for UI layers and caches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeEvent {
    TrackAdded(TrackId),
    TrackRemoved(TrackId),
    TrackUpdated(TrackId),
    ClipAdded(ClipId),
    ClipRemoved(ClipId),
    ClipUpdated(ClipId),
    TransitionAdded(TransitionId),
    TransitionRemoved(TransitionId),
    MaterialAdded(MaterialId),
    MaterialRemoved(MaterialId),
    ProjectUpdated,
}

#[derive(Default)]
struct ChangeBus {
    subscribers: Vec<Box<dyn FnMut(&ChangeEvent)>>,
}

/// Construction parameters for a new clip. Effects are seeded without ids; the
/// timeline assigns ids and chain order on insert.
#[derive(Clone, Debug)]
pub struct ClipSpec {
    pub material: Option<MaterialId>,
    pub start_time: f64,
    pub duration: f64,
    pub in_point: f64,
    pub out_point: f64,
    pub effects: Vec<EffectSeed>,
    pub transform: ClipTransform,
    pub filters: ColorFilters,
    pub crop: CropMode,
    pub text: Option<TextContent>,
    pub volume: f32,
}

impl Default for ClipSpec {
    fn default() -> Self {
        Self {
            material: None,
            start_time: 0.0,
            duration: 0.0,
            in_point: 0.0,
            out_point: 0.0,
            effects: Vec::new(),
            transform: ClipTransform::default(),
            filters: ColorFilters::default(),
            crop: CropMode::default(),
            text: None,
            volume: 1.0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct EffectSeed {
    pub kind: EffectKind,
    pub start_time: f64,
    pub duration: f64,
    pub intensity: f64,
    pub enter: Option<EffectEnvelope>,
    pub exit: Option<EffectEnvelope>,
}

/// Partial clip update. Applying a patch returns the inverse patch carrying
/// old values for exactly the touched fields, which is what update commands
/// snapshot for undo and merge.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClipPatch {
    pub start_time: Option<f64>,
    pub duration: Option<f64>,
    pub in_point: Option<f64>,
    pub out_point: Option<f64>,
    pub transform: Option<ClipTransform>,
    pub filters: Option<ColorFilters>,
    pub crop: Option<CropMode>,
    pub text: Option<Option<TextContent>>,
    pub volume: Option<f32>,
}

impl ClipPatch {
    pub fn is_empty(&self) -> bool {
        self.start_time.is_none()
            && self.duration.is_none()
            && self.in_point.is_none()
            && self.out_point.is_none()
            && self.transform.is_none()
            && self.filters.is_none()
            && self.crop.is_none()
            && self.text.is_none()
            && self.volume.is_none()
    }

    /// Field-wise union; `self` wins where both patches touch a field. Used by
    /// command merging, where `self` is the older command's old-values.
    pub fn union_keep_first(mut self, other: ClipPatch) -> ClipPatch {
        self.start_time = self.start_time.or(other.start_time);
        self.duration = self.duration.or(other.duration);
        self.in_point = self.in_point.or(other.in_point);
        self.out_point = self.out_point.or(other.out_point);
        self.transform = self.transform.or(other.transform);
        self.filters = self.filters.or(other.filters);
        self.crop = self.crop.or(other.crop);
        self.text = self.text.or(other.text);
        self.volume = self.volume.or(other.volume);
        self
    }

    /// Field-wise union; `other` wins. Used for merged new-values.
    pub fn union_keep_second(self, other: ClipPatch) -> ClipPatch {
        other.union_keep_first(self)
    }
}

/// Snapshot of a removed track for undo.
#[derive(Clone, Debug)]
pub struct RemovedTrack {
    pub index: usize,
    pub track: Track,
    pub clips: Vec<(ClipId, Clip)>,
    pub transitions: Vec<(TransitionId, Transition)>,
}

/// The project timeline: a set of entity stores keyed by stable ids.
///
/// Ids are monotonic and never recycled, so a stale handle can only miss, not
/// alias a different entity. All mutation goes through the `*_direct` methods;
/// they never record history (commands do that on top).
pub struct Timeline {
    pub name: String,
    pub canvas: Canvas,
    pub frame_rate: Fps,
    tracks: BTreeMap<TrackId, Track>,
    track_order: Vec<TrackId>,
    clips: BTreeMap<ClipId, Clip>,
    transitions: BTreeMap<TransitionId, Transition>,
    materials: BTreeMap<MaterialId, Material>,
    next_id: u64,
    bus: ChangeBus,
}

impl Timeline {
    pub fn new(name: impl Into<String>, canvas: Canvas, frame_rate: Fps) -> Self {
        Self {
            name: name.into(),
            canvas,
            frame_rate,
            tracks: BTreeMap::new(),
            track_order: Vec::new(),
            clips: BTreeMap::new(),
            transitions: BTreeMap::new(),
            materials: BTreeMap::new(),
            next_id: 1,
            bus: ChangeBus::default(),
        }
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Bump the id counter past `id` so restored snapshots never collide with
    /// future allocations.
    fn reserve_id(&mut self, id: u64) {
        self.next_id = self.next_id.max(id + 1);
    }

    pub fn subscribe(&mut self, f: impl FnMut(&ChangeEvent) + 'static) {
        self.bus.subscribers.push(Box::new(f));
    }

    fn emit(&mut self, ev: ChangeEvent) {
        let mut subs = std::mem::take(&mut self.bus.subscribers);
        for s in &mut subs {
            s(&ev);
        }
        // A subscriber added during dispatch lands behind the existing ones.
        subs.append(&mut self.bus.subscribers);
        self.bus.subscribers = subs;
    }

    // ---- accessors ----------------------------------------------------------

    pub fn track(&self, id: TrackId) -> Option<&Track> {
        self.tracks.get(&id)
    }

    pub fn clip(&self, id: ClipId) -> Option<&Clip> {
        self.clips.get(&id)
    }

    pub fn transition(&self, id: TransitionId) -> Option<&Transition> {
        self.transitions.get(&id)
    }

    pub fn material(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(&id)
    }

    pub fn tracks_in_order(&self) -> impl Iterator<Item = (TrackId, &Track)> {
        self.track_order
            .iter()
            .filter_map(|id| self.tracks.get(id).map(|t| (*id, t)))
    }

    pub fn track_count(&self) -> usize {
        self.track_order.len()
    }

    pub fn clip_count(&self) -> usize {
        self.clips.len()
    }

    pub fn materials(&self) -> impl Iterator<Item = (MaterialId, &Material)> {
        self.materials.iter().map(|(id, m)| (*id, m))
    }

    pub fn transitions(&self) -> impl Iterator<Item = (TransitionId, &Transition)> {
        self.transitions.iter().map(|(id, t)| (*id, t))
    }

    pub fn clips_of(&self, track: TrackId) -> Vec<ClipId> {
        self.tracks
            .get(&track)
            .map(|t| t.clips.clone())
            .unwrap_or_default()
    }

    // ---- queries ------------------------------------------------------------

    /// Total timeline duration: the latest clip end.
    pub fn duration(&self) -> f64 {
        self.clips
            .values()
            .map(Clip::end_time)
            .fold(0.0, f64::max)
    }

    /// All clips active at `t`, in track order then start order.
    pub fn active_clips(&self, t: f64) -> Vec<ClipId> {
        let mut out = Vec::new();
        for (_, track) in self.tracks_in_order() {
            for &cid in &track.clips {
                if let Some(clip) = self.clips.get(&cid)
                    && clip.contains(t)
                {
                    out.push(cid);
                }
            }
        }
        out
    }

    fn clip_at_on(&self, track: &Track, t: f64) -> Option<ClipId> {
        track
            .clips
            .iter()
            .copied()
            .find(|cid| self.clips.get(cid).is_some_and(|c| c.contains(t)))
    }

    /// The unique main-video clip at `t`: the first unmuted video track wins.
    pub fn video_clip_at(&self, t: f64) -> Option<ClipId> {
        self.tracks_in_order()
            .filter(|(_, tr)| tr.kind == TrackKind::Video && !tr.muted)
            .find_map(|(_, tr)| self.clip_at_on(tr, t))
    }

    /// Sticker/overlay clips at `t`, in track Z order.
    pub fn sticker_clips_at(&self, t: f64) -> Vec<ClipId> {
        self.tracks_in_order()
            .filter(|(_, tr)| tr.kind == TrackKind::Sticker && !tr.muted)
            .filter_map(|(_, tr)| self.clip_at_on(tr, t))
            .collect()
    }

    /// Subtitle/text clips at `t`, in track Z order.
    pub fn text_clips_at(&self, t: f64) -> Vec<ClipId> {
        self.tracks_in_order()
            .filter(|(_, tr)| tr.kind == TrackKind::Text && !tr.muted)
            .filter_map(|(_, tr)| self.clip_at_on(tr, t))
            .collect()
    }

    /// The active clip on the first unmuted audio track.
    pub fn audio_clip_at(&self, t: f64) -> Option<ClipId> {
        self.tracks_in_order()
            .filter(|(_, tr)| tr.kind == TrackKind::Audio && !tr.muted)
            .find_map(|(_, tr)| self.clip_at_on(tr, t))
    }

    /// The transition whose active region contains `t`, with raw progress.
    pub fn transition_at(&self, t: f64) -> Option<(TransitionId, f64)> {
        for (&id, tr) in &self.transitions {
            let Some(to) = self.clips.get(&tr.to) else {
                continue;
            };
            let region = tr.region(to.start_time);
            if region.contains(t) {
                return Some((id, tr.progress(to.start_time, t)));
            }
        }
        None
    }

    /// Materials currently referenced by a clip; these must never be evicted.
    pub fn pinned_materials(&self) -> std::collections::BTreeSet<MaterialId> {
        self.clips.values().filter_map(|c| c.material).collect()
    }

    pub fn material_referenced(&self, id: MaterialId) -> bool {
        self.clips.values().any(|c| c.material == Some(id))
    }

    // ---- material mutators --------------------------------------------------

    pub fn add_material_direct(&mut self, material: Material) -> MaterialId {
        let id = MaterialId(self.next_id());
        self.materials.insert(id, material);
        self.emit(ChangeEvent::MaterialAdded(id));
        id
    }

    /// Re-insert a removed material under its original id (undo path).
    pub fn insert_material_direct(&mut self, id: MaterialId, material: Material) {
        self.reserve_id(id.0);
        self.materials.insert(id, material);
        self.emit(ChangeEvent::MaterialAdded(id));
    }

    pub fn remove_material_direct(&mut self, id: MaterialId) -> Option<Material> {
        let removed = self.materials.remove(&id);
        if removed.is_some() {
            self.emit(ChangeEvent::MaterialRemoved(id));
        }
        removed
    }

    // ---- track mutators -----------------------------------------------------

    pub fn add_track_direct(&mut self, kind: TrackKind, name: Option<String>) -> TrackId {
        let id = TrackId(self.next_id());
        let name = name.unwrap_or_else(|| {
            format!("{} {}", kind.display_name(), self.track_order.len() + 1)
        });
        self.tracks.insert(id, Track::new(kind, name));
        self.track_order.push(id);
        self.emit(ChangeEvent::TrackAdded(id));
        id
    }

    /// Restore a removed track (and its cascade) at its original position.
    pub fn insert_track_direct(&mut self, id: TrackId, removed: RemovedTrack) {
        self.reserve_id(id.0);
        self.tracks.insert(id, removed.track);
        let index = removed.index.min(self.track_order.len());
        self.track_order.insert(index, id);
        for (cid, clip) in removed.clips {
            self.reserve_id(cid.0);
            self.clips.insert(cid, clip);
        }
        for (tid, tr) in removed.transitions {
            self.reserve_id(tid.0);
            self.transitions.insert(tid, tr);
        }
        self.emit(ChangeEvent::TrackAdded(id));
    }

    pub fn remove_track_direct(&mut self, id: TrackId) -> Option<RemovedTrack> {
        let index = self.track_order.iter().position(|&t| t == id)?;
        let track = self.tracks.remove(&id)?;
        self.track_order.remove(index);

        let mut clips = Vec::with_capacity(track.clips.len());
        for &cid in &track.clips {
            if let Some(clip) = self.clips.remove(&cid) {
                clips.push((cid, clip));
            }
        }
        let clip_ids: std::collections::BTreeSet<ClipId> =
            clips.iter().map(|(cid, _)| *cid).collect();
        let stale: Vec<TransitionId> = self
            .transitions
            .iter()
            .filter(|(_, tr)| clip_ids.contains(&tr.from) || clip_ids.contains(&tr.to))
            .map(|(tid, _)| *tid)
            .collect();
        let mut transitions = Vec::with_capacity(stale.len());
        for tid in stale {
            if let Some(tr) = self.transitions.remove(&tid) {
                transitions.push((tid, tr));
            }
        }

        self.emit(ChangeEvent::TrackRemoved(id));
        Some(RemovedTrack {
            index,
            track,
            clips,
            transitions,
        })
    }

    /// Returns the previous value, or `None` for an unknown track.
    pub fn set_track_muted_direct(&mut self, id: TrackId, muted: bool) -> Option<bool> {
        let track = self.tracks.get_mut(&id)?;
        let old = std::mem::replace(&mut track.muted, muted);
        self.emit(ChangeEvent::TrackUpdated(id));
        Some(old)
    }

    pub fn set_track_locked_direct(&mut self, id: TrackId, locked: bool) -> Option<bool> {
        let track = self.tracks.get_mut(&id)?;
        let old = std::mem::replace(&mut track.locked, locked);
        self.emit(ChangeEvent::TrackUpdated(id));
        Some(old)
    }

    // ---- clip mutators ------------------------------------------------------

    /// First start >= `desired` at which `[start, start+duration)` fits on the
    /// track. Collisions push the clip right, past the last overlapping sibling.
    fn resolve_start(
        &self,
        track: &Track,
        desired: f64,
        duration: f64,
        exclude: Option<ClipId>,
    ) -> f64 {
        let mut start = desired.max(0.0);
        loop {
            let conflict = track
                .clips
                .iter()
                .filter(|&&cid| Some(cid) != exclude)
                .filter_map(|cid| self.clips.get(cid))
                .filter(|c| c.start_time < start + duration && start < c.end_time())
                .map(Clip::end_time)
                .fold(None::<f64>, |acc, end| {
                    Some(acc.map_or(end, |a: f64| a.max(end)))
                });
            match conflict {
                Some(end) => start = end,
                None => return start,
            }
        }
    }

    fn resort_track_clips(&mut self, track_id: TrackId) {
        let Some(track) = self.tracks.get(&track_id) else {
            return;
        };
        let mut ids = track.clips.clone();
        ids.sort_by(|a, b| {
            let sa = self.clips.get(a).map_or(0.0, |c| c.start_time);
            let sb = self.clips.get(b).map_or(0.0, |c| c.start_time);
            sa.partial_cmp(&sb).unwrap_or(std::cmp::Ordering::Equal)
        });
        if let Some(track) = self.tracks.get_mut(&track_id) {
            track.clips = ids;
        }
    }

    fn validate_clip_spec(&self, spec: &ClipSpec) -> CutlineResult<()> {
        if !(spec.duration > 0.0) {
            return Err(CutlineError::timeline("clip duration must be > 0"));
        }
        if spec.start_time < 0.0 {
            return Err(CutlineError::timeline("clip start_time must be >= 0"));
        }
        if spec.in_point < 0.0 || spec.in_point > spec.out_point {
            return Err(CutlineError::timeline(
                "clip requires 0 <= in_point <= out_point",
            ));
        }
        if let Some(mid) = spec.material {
            let material = self
                .materials
                .get(&mid)
                .ok_or_else(|| CutlineError::timeline("clip references unknown material"))?;
            if spec.out_point > material.clip_duration_limit() {
                return Err(CutlineError::timeline(
                    "clip out_point exceeds material duration",
                ));
            }
        }
        Ok(())
    }

    pub fn add_clip_direct(&mut self, track_id: TrackId, spec: ClipSpec) -> CutlineResult<ClipId> {
        self.validate_clip_spec(&spec)?;
        let track = self
            .tracks
            .get(&track_id)
            .ok_or_else(|| CutlineError::timeline("unknown track"))?;
        if track.locked {
            return Err(CutlineError::timeline("track is locked"));
        }
        let start = self.resolve_start(track, spec.start_time, spec.duration, None);

        let mut effects = Vec::with_capacity(spec.effects.len());
        for (order, seed) in spec.effects.iter().enumerate() {
            let id = EffectId(self.next_id());
            effects.push(EffectInstance {
                id,
                kind: seed.kind,
                start_time: seed.start_time.max(0.0),
                duration: seed
                    .duration
                    .min(spec.duration - seed.start_time.max(0.0))
                    .max(0.0),
                intensity: seed.intensity,
                enter: seed.enter,
                exit: seed.exit,
                enabled: true,
                order: order as u32,
            });
        }

        let id = ClipId(self.next_id());
        let clip = Clip {
            track: track_id,
            material: spec.material,
            start_time: start,
            duration: spec.duration,
            in_point: spec.in_point,
            out_point: spec.out_point,
            effects,
            transform: spec.transform,
            filters: spec.filters,
            animation: Default::default(),
            crop: spec.crop,
            text: spec.text,
            volume: spec.volume,
        };
        self.clips.insert(id, clip);
        if let Some(track) = self.tracks.get_mut(&track_id) {
            track.clips.push(id);
        }
        self.resort_track_clips(track_id);
        self.emit(ChangeEvent::ClipAdded(id));
        Ok(id)
    }

    /// Re-insert a removed clip under its original id (undo/redo path). The
    /// snapshot is restored verbatim; it was overlap-free when captured.
    pub fn insert_clip_direct(&mut self, id: ClipId, clip: Clip) -> CutlineResult<()> {
        let track_id = clip.track;
        if !self.tracks.contains_key(&track_id) {
            return Err(CutlineError::timeline("clip snapshot references unknown track"));
        }
        self.reserve_id(id.0);
        self.clips.insert(id, clip);
        if let Some(track) = self.tracks.get_mut(&track_id)
            && !track.clips.contains(&id)
        {
            track.clips.push(id);
        }
        self.resort_track_clips(track_id);
        self.emit(ChangeEvent::ClipAdded(id));
        Ok(())
    }

    /// Remove a clip and any transition touching it.
    pub fn remove_clip_direct(
        &mut self,
        id: ClipId,
    ) -> Option<(Clip, Vec<(TransitionId, Transition)>)> {
        let clip = self.clips.remove(&id)?;
        if let Some(track) = self.tracks.get_mut(&clip.track) {
            track.clips.retain(|&c| c != id);
        }
        let stale: Vec<TransitionId> = self
            .transitions
            .iter()
            .filter(|(_, tr)| tr.from == id || tr.to == id)
            .map(|(tid, _)| *tid)
            .collect();
        let mut transitions = Vec::with_capacity(stale.len());
        for tid in stale {
            if let Some(tr) = self.transitions.remove(&tid) {
                transitions.push((tid, tr));
            }
        }
        self.emit(ChangeEvent::ClipRemoved(id));
        Some((clip, transitions))
    }

    /// Apply a partial update; returns the inverse patch (old values for the
    /// touched fields only).
    pub fn update_clip_direct(&mut self, id: ClipId, patch: &ClipPatch) -> Option<ClipPatch> {
        let clip = self.clips.get_mut(&id)?;
        let mut old = ClipPatch::default();
        if let Some(v) = patch.start_time {
            old.start_time = Some(std::mem::replace(&mut clip.start_time, v.max(0.0)));
        }
        if let Some(v) = patch.duration {
            old.duration = Some(std::mem::replace(&mut clip.duration, v));
        }
        if let Some(v) = patch.in_point {
            old.in_point = Some(std::mem::replace(&mut clip.in_point, v));
        }
        if let Some(v) = patch.out_point {
            old.out_point = Some(std::mem::replace(&mut clip.out_point, v));
        }
        if let Some(v) = patch.transform {
            old.transform = Some(std::mem::replace(&mut clip.transform, v));
        }
        if let Some(v) = patch.filters {
            old.filters = Some(std::mem::replace(&mut clip.filters, v));
        }
        if let Some(v) = patch.crop {
            old.crop = Some(std::mem::replace(&mut clip.crop, v));
        }
        if let Some(v) = &patch.text {
            old.text = Some(std::mem::replace(&mut clip.text, v.clone()));
        }
        if let Some(v) = patch.volume {
            old.volume = Some(std::mem::replace(&mut clip.volume, v));
        }
        let track_id = clip.track;
        // Effects outliving a shortened clip are truncated, not dropped.
        if patch.duration.is_some() {
            let duration = clip.duration;
            for e in &mut clip.effects {
                if e.start_time + e.duration > duration {
                    e.duration = (duration - e.start_time).max(0.0);
                }
            }
        }
        self.resort_track_clips(track_id);
        self.emit(ChangeEvent::ClipUpdated(id));
        Some(old)
    }

    /// Move on the same track with overlap resolution. Returns the old start.
    pub fn move_clip_direct(&mut self, id: ClipId, new_start: f64) -> Option<f64> {
        let clip = self.clips.get(&id)?;
        let track_id = clip.track;
        let duration = clip.duration;
        let old_start = clip.start_time;
        let track = self.tracks.get(&track_id)?;
        let resolved = self.resolve_start(track, new_start, duration, Some(id));
        self.clips.get_mut(&id)?.start_time = resolved;
        self.resort_track_clips(track_id);
        self.emit(ChangeEvent::ClipUpdated(id));
        Some(old_start)
    }

    /// Move across tracks; `new_start` of `None` keeps the current start as the
    /// desired position. Returns the previous (track, start).
    pub fn move_clip_to_track_direct(
        &mut self,
        id: ClipId,
        dest: TrackId,
        new_start: Option<f64>,
    ) -> Option<(TrackId, f64)> {
        if !self.tracks.contains_key(&dest) {
            return None;
        }
        let clip = self.clips.get(&id)?;
        let old_track = clip.track;
        let old_start = clip.start_time;
        let duration = clip.duration;
        let desired = new_start.unwrap_or(old_start);

        let dest_track = self.tracks.get(&dest)?;
        let resolved = self.resolve_start(dest_track, desired, duration, Some(id));

        if let Some(track) = self.tracks.get_mut(&old_track) {
            track.clips.retain(|&c| c != id);
        }
        {
            let clip = self.clips.get_mut(&id)?;
            clip.track = dest;
            clip.start_time = resolved;
        }
        if let Some(track) = self.tracks.get_mut(&dest) {
            track.clips.push(id);
        }
        self.resort_track_clips(dest);
        self.emit(ChangeEvent::ClipUpdated(id));
        Some((old_track, old_start))
    }

    /// Split at `split_time` (timeline seconds, strictly inside the clip).
    /// The original clip is removed; two fresh clips cover its exact range.
    pub fn split_clip_direct(&mut self, id: ClipId, split_time: f64) -> Option<(ClipId, ClipId)> {
        let clip = self.clips.get(&id)?;
        if split_time <= clip.start_time || split_time >= clip.end_time() {
            return None;
        }
        let offset = split_time - clip.start_time;

        let (original, transitions) = self.remove_clip_direct(id)?;
        // Dropped transitions are the command's concern; a split invalidates
        // the adjacency they referenced.
        let _ = transitions;

        let mut left = original.clone();
        left.duration = offset;
        left.out_point = original.in_point + offset;
        left.effects = split_effects_left(&original.effects, offset);
        left.animation.tracks = split_animation_left(&original.animation.tracks, offset);

        let mut right = original.clone();
        right.start_time = split_time;
        right.duration = original.duration - offset;
        right.in_point = original.in_point + offset;
        right.effects = split_effects_right(&original.effects, offset);
        right.animation.tracks = split_animation_right(&original.animation.tracks, offset);

        let left_id = ClipId(self.next_id());
        let right_id = ClipId(self.next_id());
        self.clips.insert(left_id, left);
        self.clips.insert(right_id, right);
        if let Some(track) = self.tracks.get_mut(&original.track) {
            track.clips.push(left_id);
            track.clips.push(right_id);
        }
        self.resort_track_clips(original.track);
        self.emit(ChangeEvent::ClipAdded(left_id));
        self.emit(ChangeEvent::ClipAdded(right_id));
        Some((left_id, right_id))
    }

    // ---- transition mutators ------------------------------------------------

    pub fn add_transition_direct(
        &mut self,
        from: ClipId,
        to: ClipId,
        kind: TransitionKind,
        duration: f64,
    ) -> CutlineResult<TransitionId> {
        let a = self
            .clips
            .get(&from)
            .ok_or_else(|| CutlineError::timeline("transition 'from' clip not found"))?;
        let b = self
            .clips
            .get(&to)
            .ok_or_else(|| CutlineError::timeline("transition 'to' clip not found"))?;
        if a.track != b.track {
            return Err(CutlineError::timeline(
                "transitions require both clips on the same track",
            ));
        }
        if b.start_time < a.end_time() {
            return Err(CutlineError::timeline(
                "transition 'to' clip must follow 'from' clip",
            ));
        }
        if self
            .transitions
            .values()
            .any(|tr| tr.from == from && tr.to == to)
        {
            return Err(CutlineError::timeline(
                "a transition already exists for this clip pair",
            ));
        }
        if !(duration > 0.0) {
            return Err(CutlineError::timeline("transition duration must be > 0"));
        }
        let duration = duration.min(a.duration).min(b.duration);

        let id = TransitionId(self.next_id());
        self.transitions.insert(
            id,
            Transition {
                from,
                to,
                kind,
                duration,
            },
        );
        self.emit(ChangeEvent::TransitionAdded(id));
        Ok(id)
    }

    pub fn insert_transition_direct(&mut self, id: TransitionId, tr: Transition) {
        self.reserve_id(id.0);
        self.transitions.insert(id, tr);
        self.emit(ChangeEvent::TransitionAdded(id));
    }

    pub fn remove_transition_direct(&mut self, id: TransitionId) -> Option<Transition> {
        let removed = self.transitions.remove(&id);
        if removed.is_some() {
            self.emit(ChangeEvent::TransitionRemoved(id));
        }
        removed
    }

    // ---- effect mutators ----------------------------------------------------

    pub fn add_effect_direct(
        &mut self,
        clip_id: ClipId,
        kind: EffectKind,
        start_time: f64,
        duration: Option<f64>,
    ) -> Option<EffectId> {
        let id = EffectId(self.next_id());
        let clip = self.clips.get_mut(&clip_id)?;
        let start_time = start_time.max(0.0);
        if start_time >= clip.duration {
            return None;
        }
        let duration = duration
            .unwrap_or(clip.duration - start_time)
            .min(clip.duration - start_time);
        let order = clip.effects.iter().map(|e| e.order + 1).max().unwrap_or(0);
        clip.effects.push(EffectInstance {
            id,
            kind,
            start_time,
            duration,
            intensity: 1.0,
            enter: None,
            exit: None,
            enabled: true,
            order,
        });
        self.emit(ChangeEvent::ClipUpdated(clip_id));
        Some(id)
    }

    pub fn insert_effect_direct(&mut self, clip_id: ClipId, effect: EffectInstance) -> bool {
        self.reserve_id(effect.id.0);
        let Some(clip) = self.clips.get_mut(&clip_id) else {
            return false;
        };
        clip.effects.push(effect);
        clip.effects.sort_by_key(|e| e.order);
        self.emit(ChangeEvent::ClipUpdated(clip_id));
        true
    }

    pub fn remove_effect_direct(
        &mut self,
        clip_id: ClipId,
        effect_id: EffectId,
    ) -> Option<EffectInstance> {
        let clip = self.clips.get_mut(&clip_id)?;
        let i = clip.effects.iter().position(|e| e.id == effect_id)?;
        let removed = clip.effects.remove(i);
        self.emit(ChangeEvent::ClipUpdated(clip_id));
        Some(removed)
    }

    /// Replace an effect's timing/intensity/envelopes. Returns the old instance.
    pub fn update_effect_direct(
        &mut self,
        clip_id: ClipId,
        effect_id: EffectId,
        start_time: Option<f64>,
        duration: Option<f64>,
        intensity: Option<f64>,
        enter: Option<Option<EffectEnvelope>>,
        exit: Option<Option<EffectEnvelope>>,
    ) -> Option<EffectInstance> {
        let clip = self.clips.get_mut(&clip_id)?;
        let clip_duration = clip.duration;
        let e = clip.effects.iter_mut().find(|e| e.id == effect_id)?;
        let old = e.clone();
        if let Some(v) = start_time {
            e.start_time = v.max(0.0);
        }
        if let Some(v) = duration {
            e.duration = v;
        }
        if let Some(v) = intensity {
            e.intensity = v.max(0.0);
        }
        if let Some(v) = enter {
            e.enter = v;
        }
        if let Some(v) = exit {
            e.exit = v;
        }
        if e.start_time + e.duration > clip_duration {
            e.duration = (clip_duration - e.start_time).max(0.0);
        }
        self.emit(ChangeEvent::ClipUpdated(clip_id));
        Some(old)
    }

    /// Replace an effect's parameter payload. Returns the old kind.
    pub fn set_effect_params_direct(
        &mut self,
        clip_id: ClipId,
        effect_id: EffectId,
        kind: EffectKind,
    ) -> Option<EffectKind> {
        let clip = self.clips.get_mut(&clip_id)?;
        let e = clip.effects.iter_mut().find(|e| e.id == effect_id)?;
        let old = std::mem::replace(&mut e.kind, kind);
        self.emit(ChangeEvent::ClipUpdated(clip_id));
        Some(old)
    }

    /// Flip the enabled flag; returns the new value.
    pub fn toggle_effect_direct(&mut self, clip_id: ClipId, effect_id: EffectId) -> Option<bool> {
        let clip = self.clips.get_mut(&clip_id)?;
        let e = clip.effects.iter_mut().find(|e| e.id == effect_id)?;
        e.enabled = !e.enabled;
        let enabled = e.enabled;
        self.emit(ChangeEvent::ClipUpdated(clip_id));
        Some(enabled)
    }

    /// Reassign chain order to match `order`. Ids absent from `order` keep
    /// their relative position after the listed ones. Returns the old order.
    pub fn reorder_effects_direct(
        &mut self,
        clip_id: ClipId,
        order: &[EffectId],
    ) -> Option<Vec<EffectId>> {
        let clip = self.clips.get_mut(&clip_id)?;
        let mut old: Vec<(u32, EffectId)> =
            clip.effects.iter().map(|e| (e.order, e.id)).collect();
        old.sort_by_key(|&(o, _)| o);
        let old: Vec<EffectId> = old.into_iter().map(|(_, id)| id).collect();

        let mut next = 0u32;
        for &eid in order {
            if let Some(e) = clip.effects.iter_mut().find(|e| e.id == eid) {
                e.order = next;
                next += 1;
            }
        }
        for e in &mut clip.effects {
            if !order.contains(&e.id) {
                e.order = next;
                next += 1;
            }
        }
        clip.effects.sort_by_key(|e| e.order);
        self.emit(ChangeEvent::ClipUpdated(clip_id));
        Some(old)
    }

    // ---- keyframe mutators --------------------------------------------------

    /// Insert (or replace, at equal time) a keyframe. Returns the new id and
    /// the replaced key when the time collided.
    pub fn add_keyframe_direct(
        &mut self,
        clip_id: ClipId,
        property: AnimatedProperty,
        time: f64,
        value: f64,
        easing: Easing,
    ) -> Option<(KeyframeId, Option<Keyframe>)> {
        let track_id = AnimationTrackId(self.next_id());
        let id = KeyframeId(self.next_id());
        let clip = self.clips.get_mut(&clip_id)?;
        if time < 0.0 || time > clip.duration {
            return None;
        }
        let track = match clip.animation.track_mut(property) {
            Some(tr) => tr,
            None => {
                clip.animation
                    .tracks
                    .push(AnimationTrack::new(track_id, property));
                clip.animation
                    .track_mut(property)
                    .expect("track was just added")
            }
        };
        let replaced = track.upsert(Keyframe {
            id,
            time,
            value,
            easing,
        });
        self.emit(ChangeEvent::ClipUpdated(clip_id));
        Some((id, replaced))
    }

    /// Re-insert a keyframe snapshot under its original id (undo path).
    pub fn insert_keyframe_direct(
        &mut self,
        clip_id: ClipId,
        property: AnimatedProperty,
        kf: Keyframe,
    ) -> bool {
        self.reserve_id(kf.id.0);
        let track_id = AnimationTrackId(self.next_id());
        let Some(clip) = self.clips.get_mut(&clip_id) else {
            return false;
        };
        let track = match clip.animation.track_mut(property) {
            Some(tr) => tr,
            None => {
                clip.animation
                    .tracks
                    .push(AnimationTrack::new(track_id, property));
                clip.animation
                    .track_mut(property)
                    .expect("track was just added")
            }
        };
        track.upsert(kf);
        self.emit(ChangeEvent::ClipUpdated(clip_id));
        true
    }

    pub fn remove_keyframe_direct(
        &mut self,
        clip_id: ClipId,
        id: KeyframeId,
    ) -> Option<(AnimatedProperty, Keyframe)> {
        let clip = self.clips.get_mut(&clip_id)?;
        for track in &mut clip.animation.tracks {
            if let Some(kf) = track.remove(id) {
                let property = track.property;
                self.emit(ChangeEvent::ClipUpdated(clip_id));
                return Some((property, kf));
            }
        }
        None
    }

    pub fn update_keyframe_direct(
        &mut self,
        clip_id: ClipId,
        id: KeyframeId,
        time: Option<f64>,
        value: Option<f64>,
        easing: Option<Easing>,
    ) -> Option<(AnimatedProperty, Keyframe)> {
        let clip = self.clips.get_mut(&clip_id)?;
        for track in &mut clip.animation.tracks {
            if track.get(id).is_some() {
                let property = track.property;
                let old = track.update(id, time, value, easing)?;
                self.emit(ChangeEvent::ClipUpdated(clip_id));
                return Some((property, old));
            }
        }
        None
    }

    // ---- project mutators ---------------------------------------------------

    pub fn set_canvas_size_direct(&mut self, width: u32, height: u32) -> Canvas {
        let old = self.canvas;
        self.canvas = Canvas { width, height };
        self.emit(ChangeEvent::ProjectUpdated);
        old
    }

    pub fn set_frame_rate_direct(&mut self, fps: Fps) -> Fps {
        let old = self.frame_rate;
        self.frame_rate = fps;
        self.emit(ChangeEvent::ProjectUpdated);
        old
    }

    pub fn rename_direct(&mut self, name: impl Into<String>) -> String {
        let old = std::mem::replace(&mut self.name, name.into());
        self.emit(ChangeEvent::ProjectUpdated);
        old
    }

    /// Verify the track-local non-overlap invariant; test support.
    pub fn assert_no_overlaps(&self) -> CutlineResult<()> {
        for (tid, track) in &self.tracks {
            let mut prev_end = f64::NEG_INFINITY;
            for &cid in &track.clips {
                let clip = self
                    .clips
                    .get(&cid)
                    .ok_or_else(|| CutlineError::timeline("track references missing clip"))?;
                if clip.start_time < prev_end {
                    return Err(CutlineError::timeline(format!(
                        "track {tid:?} has overlapping clips at {}",
                        clip.start_time
                    )));
                }
                prev_end = clip.end_time();
            }
        }
        Ok(())
    }
}

fn split_effects_left(effects: &[EffectInstance], offset: f64) -> Vec<EffectInstance> {
    effects
        .iter()
        .filter(|e| e.start_time < offset)
        .map(|e| {
            let mut e = e.clone();
            e.duration = e.duration.min(offset - e.start_time);
            e
        })
        .collect()
}

fn split_effects_right(effects: &[EffectInstance], offset: f64) -> Vec<EffectInstance> {
    effects
        .iter()
        .filter(|e| e.start_time + e.duration > offset)
        .map(|e| {
            let mut out = e.clone();
            out.start_time = (e.start_time - offset).max(0.0);
            let end = e.start_time + e.duration - offset;
            out.duration = (end - out.start_time).max(0.0);
            out
        })
        .collect()
}

fn split_animation_left(tracks: &[AnimationTrack], offset: f64) -> Vec<AnimationTrack> {
    tracks
        .iter()
        .map(|tr| {
            let mut tr = tr.clone();
            tr.keyframes.retain(|k| k.time <= offset);
            tr
        })
        .filter(|tr| !tr.keyframes.is_empty())
        .collect()
}

fn split_animation_right(tracks: &[AnimationTrack], offset: f64) -> Vec<AnimationTrack> {
    tracks
        .iter()
        .map(|tr| {
            let mut tr = tr.clone();
            tr.keyframes.retain(|k| k.time >= offset);
            for k in &mut tr.keyframes {
                k.time -= offset;
            }
            tr
        })
        .filter(|tr| !tr.keyframes.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::material::MaterialKind;

    fn timeline() -> Timeline {
        Timeline::new(
            "test",
            Canvas {
                width: 640,
                height: 360,
            },
            Fps::new(30, 1).unwrap(),
        )
    }

    fn video_material(tl: &mut Timeline, duration: f64) -> MaterialId {
        tl.add_material_direct(Material {
            name: "m".to_string(),
            kind: MaterialKind::Video,
            duration,
            width: 1280,
            height: 720,
            source: "media/m.mp4".to_string(),
            alt_sources: vec![],
            thumbnail: None,
        })
    }

    fn spec(material: MaterialId, start: f64, duration: f64) -> ClipSpec {
        ClipSpec {
            material: Some(material),
            start_time: start,
            duration,
            in_point: 0.0,
            out_point: duration,
            volume: 1.0,
            ..Default::default()
        }
    }

    #[test]
    fn insert_pushes_past_overlapping_clip() {
        let mut tl = timeline();
        let m = video_material(&mut tl, 60.0);
        let track = tl.add_track_direct(TrackKind::Video, None);
        tl.add_clip_direct(track, spec(m, 2.0, 3.0)).unwrap();
        let c2 = tl.add_clip_direct(track, spec(m, 3.0, 2.0)).unwrap();
        assert_eq!(tl.clip(c2).unwrap().start_time, 5.0);
        tl.assert_no_overlaps().unwrap();
    }

    #[test]
    fn move_resolves_overlaps() {
        let mut tl = timeline();
        let m = video_material(&mut tl, 60.0);
        let track = tl.add_track_direct(TrackKind::Video, None);
        let c1 = tl.add_clip_direct(track, spec(m, 0.0, 4.0)).unwrap();
        let c2 = tl.add_clip_direct(track, spec(m, 10.0, 4.0)).unwrap();
        let old = tl.move_clip_direct(c2, 2.0).unwrap();
        assert_eq!(old, 10.0);
        assert_eq!(tl.clip(c2).unwrap().start_time, 4.0);
        let _ = c1;
        tl.assert_no_overlaps().unwrap();
    }

    #[test]
    fn split_preserves_coverage_and_source_mapping() {
        let mut tl = timeline();
        let m = video_material(&mut tl, 60.0);
        let track = tl.add_track_direct(TrackKind::Video, None);
        let mut s = spec(m, 1.0, 6.0);
        s.in_point = 2.0;
        s.out_point = 8.0;
        let c = tl.add_clip_direct(track, s).unwrap();

        let (left, right) = tl.split_clip_direct(c, 3.5).unwrap();
        assert!(tl.clip(c).is_none());
        let l = tl.clip(left).unwrap();
        let r = tl.clip(right).unwrap();
        assert_eq!(l.start_time, 1.0);
        assert_eq!(l.duration, 2.5);
        assert_eq!(l.in_point, 2.0);
        assert_eq!(l.out_point, 4.5);
        assert_eq!(r.start_time, 3.5);
        assert_eq!(r.duration, 3.5);
        assert_eq!(r.in_point, 4.5);
        assert_eq!(r.out_point, 8.0);
        tl.assert_no_overlaps().unwrap();
    }

    #[test]
    fn split_outside_clip_is_refused() {
        let mut tl = timeline();
        let m = video_material(&mut tl, 60.0);
        let track = tl.add_track_direct(TrackKind::Video, None);
        let c = tl.add_clip_direct(track, spec(m, 1.0, 2.0)).unwrap();
        assert!(tl.split_clip_direct(c, 1.0).is_none());
        assert!(tl.split_clip_direct(c, 3.0).is_none());
        assert!(tl.split_clip_direct(c, 0.5).is_none());
    }

    #[test]
    fn transition_rejects_cross_track_pairs() {
        let mut tl = timeline();
        let m = video_material(&mut tl, 60.0);
        let t1 = tl.add_track_direct(TrackKind::Video, None);
        let t2 = tl.add_track_direct(TrackKind::Video, None);
        let a = tl.add_clip_direct(t1, spec(m, 0.0, 4.0)).unwrap();
        let b = tl.add_clip_direct(t2, spec(m, 4.0, 4.0)).unwrap();
        assert!(
            tl.add_transition_direct(a, b, TransitionKind::Fade, 1.0)
                .is_err()
        );
    }

    #[test]
    fn transition_is_unique_per_pair_and_clamped() {
        let mut tl = timeline();
        let m = video_material(&mut tl, 60.0);
        let track = tl.add_track_direct(TrackKind::Video, None);
        let a = tl.add_clip_direct(track, spec(m, 0.0, 4.0)).unwrap();
        let b = tl.add_clip_direct(track, spec(m, 4.0, 2.0)).unwrap();
        let id = tl
            .add_transition_direct(a, b, TransitionKind::Dissolve, 5.0)
            .unwrap();
        // Clamped to the shorter clip.
        assert_eq!(tl.transition(id).unwrap().duration, 2.0);
        assert!(
            tl.add_transition_direct(a, b, TransitionKind::Fade, 1.0)
                .is_err()
        );
    }

    #[test]
    fn transition_at_reports_progress() {
        let mut tl = timeline();
        let m = video_material(&mut tl, 60.0);
        let track = tl.add_track_direct(TrackKind::Video, None);
        let a = tl.add_clip_direct(track, spec(m, 0.0, 4.0)).unwrap();
        let b = tl.add_clip_direct(track, spec(m, 4.0, 4.0)).unwrap();
        tl.add_transition_direct(a, b, TransitionKind::Dissolve, 1.0)
            .unwrap();
        let (_, progress) = tl.transition_at(4.0).unwrap();
        assert_eq!(progress, 0.5);
        assert!(tl.transition_at(3.4).is_none());
        assert!(tl.transition_at(4.5).is_none());
    }

    #[test]
    fn remove_track_cascades_and_restores() {
        let mut tl = timeline();
        let m = video_material(&mut tl, 60.0);
        let track = tl.add_track_direct(TrackKind::Video, None);
        let a = tl.add_clip_direct(track, spec(m, 0.0, 4.0)).unwrap();
        let b = tl.add_clip_direct(track, spec(m, 4.0, 4.0)).unwrap();
        tl.add_transition_direct(a, b, TransitionKind::Fade, 1.0)
            .unwrap();

        let removed = tl.remove_track_direct(track).unwrap();
        assert_eq!(tl.clip_count(), 0);
        assert_eq!(tl.transitions().count(), 0);

        tl.insert_track_direct(track, removed);
        assert_eq!(tl.clip_count(), 2);
        assert_eq!(tl.transitions().count(), 1);
        assert!(tl.clip(a).is_some());
        assert!(tl.clip(b).is_some());
    }

    #[test]
    fn update_clip_returns_inverse_patch() {
        let mut tl = timeline();
        let m = video_material(&mut tl, 60.0);
        let track = tl.add_track_direct(TrackKind::Video, None);
        let c = tl.add_clip_direct(track, spec(m, 0.0, 4.0)).unwrap();

        let patch = ClipPatch {
            start_time: Some(6.0),
            volume: Some(0.5),
            ..Default::default()
        };
        let old = tl.update_clip_direct(c, &patch).unwrap();
        assert_eq!(old.start_time, Some(0.0));
        assert_eq!(old.volume, Some(1.0));
        assert!(old.duration.is_none());

        tl.update_clip_direct(c, &old).unwrap();
        assert_eq!(tl.clip(c).unwrap().start_time, 0.0);
        assert_eq!(tl.clip(c).unwrap().volume, 1.0);
    }

    #[test]
    fn keyframe_add_replaces_at_same_time() {
        let mut tl = timeline();
        let m = video_material(&mut tl, 60.0);
        let track = tl.add_track_direct(TrackKind::Video, None);
        let c = tl.add_clip_direct(track, spec(m, 0.0, 4.0)).unwrap();

        let (k1, replaced) = tl
            .add_keyframe_direct(c, AnimatedProperty::Opacity, 1.0, 0.5, Easing::Linear)
            .unwrap();
        assert!(replaced.is_none());
        let (_k2, replaced) = tl
            .add_keyframe_direct(c, AnimatedProperty::Opacity, 1.0, 0.8, Easing::Linear)
            .unwrap();
        assert_eq!(replaced.map(|k| k.id), Some(k1));

        let clip = tl.clip(c).unwrap();
        let tr = clip.animation.track(AnimatedProperty::Opacity).unwrap();
        assert_eq!(tr.keyframes.len(), 1);
        assert_eq!(tr.keyframes[0].value, 0.8);
    }

    #[test]
    fn change_bus_observes_mutations() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let mut tl = timeline();
        let seen: Rc<RefCell<Vec<ChangeEvent>>> = Rc::default();
        let sink = seen.clone();
        tl.subscribe(move |ev| sink.borrow_mut().push(*ev));

        let track = tl.add_track_direct(TrackKind::Video, None);
        tl.set_track_muted_direct(track, true);
        let events = seen.borrow();
        assert_eq!(events[0], ChangeEvent::TrackAdded(track));
        assert_eq!(events[1], ChangeEvent::TrackUpdated(track));
    }

    #[test]
    fn locked_track_refuses_clip_insert() {
        let mut tl = timeline();
        let m = video_material(&mut tl, 60.0);
        let track = tl.add_track_direct(TrackKind::Video, None);
        tl.set_track_locked_direct(track, true);
        assert!(tl.add_clip_direct(track, spec(m, 0.0, 1.0)).is_err());
    }

    #[test]
    fn out_point_beyond_material_is_refused() {
        let mut tl = timeline();
        let m = video_material(&mut tl, 5.0);
        let track = tl.add_track_direct(TrackKind::Video, None);
        let mut s = spec(m, 0.0, 6.0);
        s.out_point = 6.0;
        assert!(tl.add_clip_direct(track, s).is_err());
    }
}
