use crate::animation::ease::Easing;
use crate::foundation::core::{Canvas, Fps};
use crate::foundation::error::{CutlineError, CutlineResult};
use crate::model::animation::{AnimatedProperty, Keyframe, KeyframeId};
use crate::model::clip::{Clip, ClipId};
use crate::model::effect::{EffectId, EffectInstance, EffectKind};
use crate::model::timeline::{ClipPatch, ClipSpec, RemovedTrack, Timeline};
use crate::model::track::{TrackId, TrackKind};
use crate::model::transition::{Transition, TransitionId, TransitionKind};

/// An undoable edit. Commands capture snapshots on first execution and
/// re-resolve entities by id afterwards; they never hold live references.
#[derive(Debug)]
pub struct Command {
    pub id: u64,
    pub description: String,
    pub timestamp_ms: u64,
    pub kind: CommandKind,
}

#[derive(Debug)]
pub enum CommandKind {
    AddTrack {
        kind: TrackKind,
        name: Option<String>,
        created: Option<TrackId>,
        removed: Option<RemovedTrack>,
    },
    RemoveTrack {
        track: TrackId,
        removed: Option<RemovedTrack>,
    },
    ToggleTrackMute {
        track: TrackId,
    },
    ToggleTrackLock {
        track: TrackId,
    },
    AddClip {
        track: TrackId,
        spec: ClipSpec,
        created: Option<ClipId>,
        snapshot: Option<Clip>,
    },
    RemoveClip {
        clip: ClipId,
        removed: Option<(Clip, Vec<(TransitionId, Transition)>)>,
    },
    UpdateClip {
        clip: ClipId,
        patch: ClipPatch,
        old: Option<ClipPatch>,
    },
    MoveClip {
        clip: ClipId,
        new_start: f64,
        old_start: Option<f64>,
    },
    MoveClipToTrack {
        clip: ClipId,
        dest: TrackId,
        new_start: Option<f64>,
        old: Option<(TrackId, f64)>,
    },
    SplitClip {
        clip: ClipId,
        split_time: f64,
        original: Option<Clip>,
        parts: Option<(ClipId, ClipId)>,
        removed_transitions: Vec<(TransitionId, Transition)>,
    },
    AddTransition {
        from: ClipId,
        to: ClipId,
        kind: TransitionKind,
        duration: f64,
        created: Option<TransitionId>,
        snapshot: Option<Transition>,
    },
    RemoveTransition {
        transition: TransitionId,
        removed: Option<Transition>,
    },
    AddEffect {
        clip: ClipId,
        kind: EffectKind,
        start_time: f64,
        duration: Option<f64>,
        created: Option<EffectId>,
        snapshot: Option<EffectInstance>,
    },
    RemoveEffect {
        clip: ClipId,
        effect: EffectId,
        removed: Option<EffectInstance>,
    },
    UpdateEffect {
        clip: ClipId,
        effect: EffectId,
        start_time: Option<f64>,
        duration: Option<f64>,
        intensity: Option<f64>,
        old: Option<EffectInstance>,
    },
    UpdateEffectParam {
        clip: ClipId,
        effect: EffectId,
        kind: EffectKind,
        old: Option<EffectKind>,
    },
    ToggleEffect {
        clip: ClipId,
        effect: EffectId,
    },
    ReorderEffects {
        clip: ClipId,
        order: Vec<EffectId>,
        old: Option<Vec<EffectId>>,
    },
    AddKeyframe {
        clip: ClipId,
        property: AnimatedProperty,
        time: f64,
        value: f64,
        easing: Easing,
        created: Option<KeyframeId>,
        snapshot: Option<Keyframe>,
        replaced: Option<Keyframe>,
    },
    RemoveKeyframe {
        clip: ClipId,
        keyframe: KeyframeId,
        removed: Option<(AnimatedProperty, Keyframe)>,
    },
    UpdateKeyframe {
        clip: ClipId,
        keyframe: KeyframeId,
        time: Option<f64>,
        value: Option<f64>,
        easing: Option<Easing>,
        old: Option<(AnimatedProperty, Keyframe)>,
    },
    SetCanvasSize {
        width: u32,
        height: u32,
        old: Option<Canvas>,
    },
    SetFrameRate {
        fps: Fps,
        old: Option<Fps>,
    },
    RenameProject {
        name: String,
        old: Option<String>,
    },
    Group {
        children: Vec<Command>,
    },
}

impl Command {
    pub fn new(description: impl Into<String>, timestamp_ms: u64, kind: CommandKind) -> Self {
        Self {
            id: 0,
            description: description.into(),
            timestamp_ms,
            kind,
        }
    }

    pub fn group(description: impl Into<String>, timestamp_ms: u64) -> Self {
        Self::new(description, timestamp_ms, CommandKind::Group { children: vec![] })
    }

    pub fn execute(&mut self, timeline: &mut Timeline) -> CutlineResult<()> {
        let missing = |what: &str| CutlineError::timeline(format!("{what} not found"));
        match &mut self.kind {
            CommandKind::AddTrack {
                kind,
                name,
                created,
                removed,
            } => {
                if let (Some(id), Some(snapshot)) = (*created, removed.take()) {
                    timeline.insert_track_direct(id, snapshot);
                } else {
                    *created = Some(timeline.add_track_direct(*kind, name.clone()));
                }
                Ok(())
            }
            CommandKind::RemoveTrack { track, removed } => {
                *removed = Some(
                    timeline
                        .remove_track_direct(*track)
                        .ok_or_else(|| missing("track"))?,
                );
                Ok(())
            }
            CommandKind::ToggleTrackMute { track } => {
                let muted = timeline.track(*track).ok_or_else(|| missing("track"))?.muted;
                timeline.set_track_muted_direct(*track, !muted);
                Ok(())
            }
            CommandKind::ToggleTrackLock { track } => {
                let locked = timeline
                    .track(*track)
                    .ok_or_else(|| missing("track"))?
                    .locked;
                timeline.set_track_locked_direct(*track, !locked);
                Ok(())
            }
            CommandKind::AddClip {
                track,
                spec,
                created,
                snapshot,
            } => {
                if let (Some(id), Some(snap)) = (*created, snapshot.clone()) {
                    timeline.insert_clip_direct(id, snap)?;
                } else {
                    let id = timeline.add_clip_direct(*track, spec.clone())?;
                    *created = Some(id);
                    *snapshot = timeline.clip(id).cloned();
                }
                Ok(())
            }
            CommandKind::RemoveClip { clip, removed } => {
                *removed = Some(
                    timeline
                        .remove_clip_direct(*clip)
                        .ok_or_else(|| missing("clip"))?,
                );
                Ok(())
            }
            CommandKind::UpdateClip { clip, patch, old } => {
                let inverse = timeline
                    .update_clip_direct(*clip, patch)
                    .ok_or_else(|| missing("clip"))?;
                if old.is_none() {
                    *old = Some(inverse);
                }
                Ok(())
            }
            CommandKind::MoveClip {
                clip,
                new_start,
                old_start,
            } => {
                let previous = timeline
                    .move_clip_direct(*clip, *new_start)
                    .ok_or_else(|| missing("clip"))?;
                if old_start.is_none() {
                    *old_start = Some(previous);
                }
                Ok(())
            }
            CommandKind::MoveClipToTrack {
                clip,
                dest,
                new_start,
                old,
            } => {
                let previous = timeline
                    .move_clip_to_track_direct(*clip, *dest, *new_start)
                    .ok_or_else(|| missing("clip or track"))?;
                if old.is_none() {
                    *old = Some(previous);
                }
                Ok(())
            }
            CommandKind::SplitClip {
                clip,
                split_time,
                original,
                parts,
                removed_transitions,
            } => {
                *original = timeline.clip(*clip).cloned();
                *removed_transitions = timeline
                    .transitions()
                    .filter(|(_, tr)| tr.from == *clip || tr.to == *clip)
                    .map(|(id, tr)| (id, tr.clone()))
                    .collect();
                *parts = timeline.split_clip_direct(*clip, *split_time);
                if parts.is_none() {
                    *original = None;
                    removed_transitions.clear();
                    return Err(CutlineError::timeline("split point is outside the clip"));
                }
                Ok(())
            }
            CommandKind::AddTransition {
                from,
                to,
                kind,
                duration,
                created,
                snapshot,
            } => {
                if let (Some(id), Some(snap)) = (*created, snapshot.clone()) {
                    timeline.insert_transition_direct(id, snap);
                } else {
                    let id = timeline.add_transition_direct(*from, *to, *kind, *duration)?;
                    *created = Some(id);
                    *snapshot = timeline.transition(id).cloned();
                }
                Ok(())
            }
            CommandKind::RemoveTransition {
                transition,
                removed,
            } => {
                *removed = Some(
                    timeline
                        .remove_transition_direct(*transition)
                        .ok_or_else(|| missing("transition"))?,
                );
                Ok(())
            }
            CommandKind::AddEffect {
                clip,
                kind,
                start_time,
                duration,
                created,
                snapshot,
            } => {
                if let (Some(_id), Some(snap)) = (*created, snapshot.clone()) {
                    if !timeline.insert_effect_direct(*clip, snap) {
                        return Err(missing("clip"));
                    }
                } else {
                    let id = timeline
                        .add_effect_direct(*clip, *kind, *start_time, *duration)
                        .ok_or_else(|| missing("clip"))?;
                    *created = Some(id);
                    *snapshot = timeline
                        .clip(*clip)
                        .and_then(|c| c.effects.iter().find(|e| e.id == id).cloned());
                }
                Ok(())
            }
            CommandKind::RemoveEffect {
                clip,
                effect,
                removed,
            } => {
                *removed = Some(
                    timeline
                        .remove_effect_direct(*clip, *effect)
                        .ok_or_else(|| missing("effect"))?,
                );
                Ok(())
            }
            CommandKind::UpdateEffect {
                clip,
                effect,
                start_time,
                duration,
                intensity,
                old,
            } => {
                let previous = timeline
                    .update_effect_direct(
                        *clip, *effect, *start_time, *duration, *intensity, None, None,
                    )
                    .ok_or_else(|| missing("effect"))?;
                if old.is_none() {
                    *old = Some(previous);
                }
                Ok(())
            }
            CommandKind::UpdateEffectParam {
                clip,
                effect,
                kind,
                old,
            } => {
                let previous = timeline
                    .set_effect_params_direct(*clip, *effect, *kind)
                    .ok_or_else(|| missing("effect"))?;
                if old.is_none() {
                    *old = Some(previous);
                }
                Ok(())
            }
            CommandKind::ToggleEffect { clip, effect } => {
                timeline
                    .toggle_effect_direct(*clip, *effect)
                    .ok_or_else(|| missing("effect"))?;
                Ok(())
            }
            CommandKind::ReorderEffects { clip, order, old } => {
                let previous = timeline
                    .reorder_effects_direct(*clip, order)
                    .ok_or_else(|| missing("clip"))?;
                if old.is_none() {
                    *old = Some(previous);
                }
                Ok(())
            }
            CommandKind::AddKeyframe {
                clip,
                property,
                time,
                value,
                easing,
                created,
                snapshot,
                replaced,
            } => {
                if let (Some(_id), Some(snap)) = (*created, *snapshot) {
                    if !timeline.insert_keyframe_direct(*clip, *property, snap) {
                        return Err(missing("clip"));
                    }
                } else {
                    let (id, displaced) = timeline
                        .add_keyframe_direct(*clip, *property, *time, *value, *easing)
                        .ok_or_else(|| missing("clip"))?;
                    *created = Some(id);
                    *replaced = displaced;
                    *snapshot = timeline.clip(*clip).and_then(|c| {
                        c.animation
                            .track(*property)
                            .and_then(|tr| tr.get(id).copied())
                    });
                }
                Ok(())
            }
            CommandKind::RemoveKeyframe {
                clip,
                keyframe,
                removed,
            } => {
                *removed = Some(
                    timeline
                        .remove_keyframe_direct(*clip, *keyframe)
                        .ok_or_else(|| missing("keyframe"))?,
                );
                Ok(())
            }
            CommandKind::UpdateKeyframe {
                clip,
                keyframe,
                time,
                value,
                easing,
                old,
            } => {
                let previous = timeline
                    .update_keyframe_direct(*clip, *keyframe, *time, *value, *easing)
                    .ok_or_else(|| missing("keyframe"))?;
                if old.is_none() {
                    *old = Some(previous);
                }
                Ok(())
            }
            CommandKind::SetCanvasSize { width, height, old } => {
                let previous = timeline.set_canvas_size_direct(*width, *height);
                if old.is_none() {
                    *old = Some(previous);
                }
                Ok(())
            }
            CommandKind::SetFrameRate { fps, old } => {
                let previous = timeline.set_frame_rate_direct(*fps);
                if old.is_none() {
                    *old = Some(previous);
                }
                Ok(())
            }
            CommandKind::RenameProject { name, old } => {
                let previous = timeline.rename_direct(name.clone());
                if old.is_none() {
                    *old = Some(previous);
                }
                Ok(())
            }
            CommandKind::Group { children } => {
                for child in children.iter_mut() {
                    child.execute(timeline)?;
                }
                Ok(())
            }
        }
    }

    pub fn undo(&mut self, timeline: &mut Timeline) -> CutlineResult<()> {
        let missing = |what: &str| CutlineError::timeline(format!("{what} lost before undo"));
        match &mut self.kind {
            CommandKind::AddTrack {
                created, removed, ..
            } => {
                let id = created.ok_or_else(|| missing("track id"))?;
                *removed = timeline.remove_track_direct(id);
                Ok(())
            }
            CommandKind::RemoveTrack { track, removed } => {
                let snapshot = removed.take().ok_or_else(|| missing("track snapshot"))?;
                timeline.insert_track_direct(*track, snapshot);
                Ok(())
            }
            CommandKind::ToggleTrackMute { track } => {
                let muted = timeline.track(*track).ok_or_else(|| missing("track"))?.muted;
                timeline.set_track_muted_direct(*track, !muted);
                Ok(())
            }
            CommandKind::ToggleTrackLock { track } => {
                let locked = timeline
                    .track(*track)
                    .ok_or_else(|| missing("track"))?
                    .locked;
                timeline.set_track_locked_direct(*track, !locked);
                Ok(())
            }
            CommandKind::AddClip { created, .. } => {
                let id = created.ok_or_else(|| missing("clip id"))?;
                timeline.remove_clip_direct(id);
                Ok(())
            }
            CommandKind::RemoveClip { clip, removed } => {
                let (snapshot, transitions) =
                    removed.take().ok_or_else(|| missing("clip snapshot"))?;
                timeline.insert_clip_direct(*clip, snapshot)?;
                for (tid, tr) in transitions {
                    timeline.insert_transition_direct(tid, tr);
                }
                Ok(())
            }
            CommandKind::UpdateClip { clip, old, .. } => {
                let inverse = old.clone().ok_or_else(|| missing("old values"))?;
                timeline
                    .update_clip_direct(*clip, &inverse)
                    .ok_or_else(|| missing("clip"))?;
                Ok(())
            }
            CommandKind::MoveClip {
                clip, old_start, ..
            } => {
                let start = old_start.ok_or_else(|| missing("old start"))?;
                timeline
                    .move_clip_direct(*clip, start)
                    .ok_or_else(|| missing("clip"))?;
                Ok(())
            }
            CommandKind::MoveClipToTrack { clip, old, .. } => {
                let (track, start) = old.ok_or_else(|| missing("old placement"))?;
                timeline
                    .move_clip_to_track_direct(*clip, track, Some(start))
                    .ok_or_else(|| missing("clip or track"))?;
                Ok(())
            }
            CommandKind::SplitClip {
                clip,
                original,
                parts,
                removed_transitions,
                ..
            } => {
                let (left, right) = parts.take().ok_or_else(|| missing("split parts"))?;
                let snapshot = original.take().ok_or_else(|| missing("original clip"))?;
                timeline.remove_clip_direct(left);
                timeline.remove_clip_direct(right);
                timeline.insert_clip_direct(*clip, snapshot)?;
                for (tid, tr) in removed_transitions.drain(..) {
                    timeline.insert_transition_direct(tid, tr);
                }
                Ok(())
            }
            CommandKind::AddTransition { created, .. } => {
                let id = created.ok_or_else(|| missing("transition id"))?;
                timeline.remove_transition_direct(id);
                Ok(())
            }
            CommandKind::RemoveTransition {
                transition,
                removed,
            } => {
                let snapshot = removed.take().ok_or_else(|| missing("transition"))?;
                timeline.insert_transition_direct(*transition, snapshot);
                Ok(())
            }
            CommandKind::AddEffect { clip, created, .. } => {
                let id = created.ok_or_else(|| missing("effect id"))?;
                timeline.remove_effect_direct(*clip, id);
                Ok(())
            }
            CommandKind::RemoveEffect { clip, removed, .. } => {
                let snapshot = removed.take().ok_or_else(|| missing("effect"))?;
                timeline.insert_effect_direct(*clip, snapshot);
                Ok(())
            }
            CommandKind::UpdateEffect {
                clip, effect, old, ..
            } => {
                let snapshot = old.clone().ok_or_else(|| missing("effect snapshot"))?;
                timeline
                    .remove_effect_direct(*clip, *effect)
                    .ok_or_else(|| missing("effect"))?;
                timeline.insert_effect_direct(*clip, snapshot);
                Ok(())
            }
            CommandKind::UpdateEffectParam {
                clip, effect, old, ..
            } => {
                let kind = old.ok_or_else(|| missing("old params"))?;
                timeline
                    .set_effect_params_direct(*clip, *effect, kind)
                    .ok_or_else(|| missing("effect"))?;
                Ok(())
            }
            CommandKind::ToggleEffect { clip, effect } => {
                timeline
                    .toggle_effect_direct(*clip, *effect)
                    .ok_or_else(|| missing("effect"))?;
                Ok(())
            }
            CommandKind::ReorderEffects { clip, old, .. } => {
                let order = old.clone().ok_or_else(|| missing("old order"))?;
                timeline
                    .reorder_effects_direct(*clip, &order)
                    .ok_or_else(|| missing("clip"))?;
                Ok(())
            }
            CommandKind::AddKeyframe {
                clip,
                property,
                created,
                replaced,
                ..
            } => {
                let id = created.ok_or_else(|| missing("keyframe id"))?;
                timeline.remove_keyframe_direct(*clip, id);
                if let Some(displaced) = replaced.take() {
                    timeline.insert_keyframe_direct(*clip, *property, displaced);
                }
                Ok(())
            }
            CommandKind::RemoveKeyframe { clip, removed, .. } => {
                let (property, kf) = removed.take().ok_or_else(|| missing("keyframe"))?;
                if !timeline.insert_keyframe_direct(*clip, property, kf) {
                    return Err(missing("clip"));
                }
                Ok(())
            }
            CommandKind::UpdateKeyframe {
                clip, keyframe, old, ..
            } => {
                let (_property, kf) = old.ok_or_else(|| missing("keyframe snapshot"))?;
                timeline
                    .update_keyframe_direct(
                        *clip,
                        *keyframe,
                        Some(kf.time),
                        Some(kf.value),
                        Some(kf.easing),
                    )
                    .ok_or_else(|| missing("keyframe"))?;
                Ok(())
            }
            CommandKind::SetCanvasSize { old, .. } => {
                let canvas = old.ok_or_else(|| missing("old canvas"))?;
                timeline.set_canvas_size_direct(canvas.width, canvas.height);
                Ok(())
            }
            CommandKind::SetFrameRate { old, .. } => {
                let fps = old.ok_or_else(|| missing("old frame rate"))?;
                timeline.set_frame_rate_direct(fps);
                Ok(())
            }
            CommandKind::RenameProject { old, .. } => {
                let name = old.clone().ok_or_else(|| missing("old name"))?;
                timeline.rename_direct(name);
                Ok(())
            }
            CommandKind::Group { children } => {
                for child in children.iter_mut().rev() {
                    child.undo(timeline)?;
                }
                Ok(())
            }
        }
    }

    /// Whether `other` can collapse into this history entry.
    pub fn can_merge_with(&self, other: &Command) -> bool {
        match (&self.kind, &other.kind) {
            (
                CommandKind::UpdateClip { clip: a, .. },
                CommandKind::UpdateClip { clip: b, .. },
            ) => a == b,
            (
                CommandKind::MoveClip { clip: a, .. },
                CommandKind::MoveClip { clip: b, .. },
            ) => a == b,
            (
                CommandKind::UpdateEffectParam {
                    clip: ca,
                    effect: ea,
                    ..
                },
                CommandKind::UpdateEffectParam {
                    clip: cb,
                    effect: eb,
                    ..
                },
            ) => ca == cb && ea == eb,
            (
                CommandKind::UpdateKeyframe {
                    clip: ca,
                    keyframe: ka,
                    ..
                },
                CommandKind::UpdateKeyframe {
                    clip: cb,
                    keyframe: kb,
                    ..
                },
            ) => ca == cb && ka == kb,
            _ => false,
        }
    }

    /// Collapse `other` (already executed) into this entry. The original
    /// old-value snapshots survive; the new end state comes from `other`.
    pub fn merge_with(mut self, other: Command) -> Command {
        match (&mut self.kind, other.kind) {
            (
                CommandKind::UpdateClip { patch, old, .. },
                CommandKind::UpdateClip {
                    patch: new_patch,
                    old: new_old,
                    ..
                },
            ) => {
                // Fields first touched by `other` contribute their pre-state;
                // fields both touched keep the original snapshot.
                *old = Some(match old.take() {
                    Some(existing) => existing.union_keep_first(new_old.unwrap_or_default()),
                    None => new_old.unwrap_or_default(),
                });
                *patch = patch.clone().union_keep_second(new_patch);
            }
            (
                CommandKind::MoveClip { new_start, .. },
                CommandKind::MoveClip {
                    new_start: latest, ..
                },
            ) => {
                *new_start = latest;
            }
            (
                CommandKind::UpdateEffectParam { kind, .. },
                CommandKind::UpdateEffectParam { kind: latest, .. },
            ) => {
                *kind = latest;
            }
            (
                CommandKind::UpdateKeyframe {
                    time,
                    value,
                    easing,
                    ..
                },
                CommandKind::UpdateKeyframe {
                    time: t2,
                    value: v2,
                    easing: e2,
                    ..
                },
            ) => {
                *time = t2.or(*time);
                *value = v2.or(*value);
                *easing = e2.or(*easing);
            }
            // Engine checks can_merge_with first; anything else is a bug and
            // keeps the existing entry untouched.
            (_, _other_kind) => {
                debug_assert!(false, "merge_with on incompatible commands");
            }
        }
        // The merged entry represents the latest edit in the gesture.
        self.timestamp_ms = other.timestamp_ms;
        self
    }
}
