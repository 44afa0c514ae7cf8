use crate::animation::ease::Easing;
use crate::foundation::core::{Canvas, Fps};
use crate::foundation::error::{CutlineError, CutlineResult};
use crate::history::command::{Command, CommandKind};
use crate::history::engine::HistoryEngine;
use crate::model::animation::{AnimatedProperty, KeyframeId};
use crate::model::clip::ClipId;
use crate::model::effect::{EffectId, EffectKind};
use crate::model::material::{Material, MaterialId};
use crate::model::timeline::{ClipPatch, ClipSpec, Timeline};
use crate::model::track::{TrackId, TrackKind};
use crate::model::transition::{TransitionId, TransitionKind};
use crate::project::config::HistoryConfig;

fn wallclock_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// The user-facing edit surface. Every mutation goes through a command so it
/// lands on the history stacks; the timeline's direct mutators stay internal.
pub struct Editor {
    timeline: Timeline,
    history: HistoryEngine,
    timestamps: Box<dyn FnMut() -> u64>,
}

impl Editor {
    pub fn new(name: impl Into<String>, canvas: Canvas, frame_rate: Fps, history: HistoryConfig) -> Self {
        Self {
            timeline: Timeline::new(name, canvas, frame_rate),
            history: HistoryEngine::new(history),
            timestamps: Box::new(wallclock_ms),
        }
    }

    pub fn from_timeline(timeline: Timeline, history: HistoryConfig) -> Self {
        Self {
            timeline,
            history: HistoryEngine::new(history),
            timestamps: Box::new(wallclock_ms),
        }
    }

    /// Replace the command timestamp source (tests drive merge windows with a
    /// synthetic clock).
    pub fn set_timestamp_source(&mut self, f: impl FnMut() -> u64 + 'static) {
        self.timestamps = Box::new(f);
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn timeline_mut(&mut self) -> &mut Timeline {
        &mut self.timeline
    }

    pub fn history(&self) -> &HistoryEngine {
        &self.history
    }

    fn now(&mut self) -> u64 {
        (self.timestamps)()
    }

    fn run(&mut self, description: &str, kind: CommandKind) -> CutlineResult<()> {
        let ts = self.now();
        self.history
            .execute(Command::new(description, ts, kind), &mut self.timeline)
    }

    // ---- materials (not commanded: ingest is an IO operation, not an edit) --

    pub fn ingest_material(&mut self, material: Material) -> MaterialId {
        self.timeline.add_material_direct(material)
    }

    /// Refuses to drop a material any clip still references.
    pub fn remove_material(&mut self, id: MaterialId) -> CutlineResult<()> {
        if self.timeline.material_referenced(id) {
            return Err(CutlineError::timeline(
                "material is referenced by a clip and cannot be removed",
            ));
        }
        self.timeline
            .remove_material_direct(id)
            .map(|_| ())
            .ok_or_else(|| CutlineError::timeline("unknown material"))
    }

    // ---- tracks -------------------------------------------------------------

    pub fn add_track(&mut self, kind: TrackKind, name: Option<String>) -> CutlineResult<TrackId> {
        self.run(
            "Add track",
            CommandKind::AddTrack {
                kind,
                name,
                created: None,
                removed: None,
            },
        )?;
        self.last_created_track()
            .ok_or_else(|| CutlineError::timeline("track creation produced no id"))
    }

    pub fn remove_track(&mut self, track: TrackId) -> CutlineResult<()> {
        self.run(
            "Remove track",
            CommandKind::RemoveTrack {
                track,
                removed: None,
            },
        )
    }

    pub fn toggle_track_mute(&mut self, track: TrackId) -> CutlineResult<()> {
        self.run("Toggle track mute", CommandKind::ToggleTrackMute { track })
    }

    pub fn toggle_track_lock(&mut self, track: TrackId) -> CutlineResult<()> {
        self.run("Toggle track lock", CommandKind::ToggleTrackLock { track })
    }

    // ---- clips --------------------------------------------------------------

    pub fn add_clip(&mut self, track: TrackId, spec: ClipSpec) -> CutlineResult<ClipId> {
        self.run(
            "Add clip",
            CommandKind::AddClip {
                track,
                spec,
                created: None,
                snapshot: None,
            },
        )?;
        self.last_created_clip()
            .ok_or_else(|| CutlineError::timeline("clip creation produced no id"))
    }

    pub fn remove_clip(&mut self, clip: ClipId) -> CutlineResult<()> {
        self.run(
            "Remove clip",
            CommandKind::RemoveClip {
                clip,
                removed: None,
            },
        )
    }

    pub fn update_clip(&mut self, clip: ClipId, patch: ClipPatch) -> CutlineResult<()> {
        self.run(
            "Update clip",
            CommandKind::UpdateClip {
                clip,
                patch,
                old: None,
            },
        )
    }

    pub fn move_clip(&mut self, clip: ClipId, new_start: f64) -> CutlineResult<()> {
        self.run(
            "Move clip",
            CommandKind::MoveClip {
                clip,
                new_start,
                old_start: None,
            },
        )
    }

    pub fn move_clip_to_track(
        &mut self,
        clip: ClipId,
        dest: TrackId,
        new_start: Option<f64>,
    ) -> CutlineResult<()> {
        self.run(
            "Move clip to track",
            CommandKind::MoveClipToTrack {
                clip,
                dest,
                new_start,
                old: None,
            },
        )
    }

    /// Split at `split_time`; `None` when the point is outside the clip body.
    pub fn split_clip(&mut self, clip: ClipId, split_time: f64) -> Option<(ClipId, ClipId)> {
        let result = self.run(
            "Split clip",
            CommandKind::SplitClip {
                clip,
                split_time,
                original: None,
                parts: None,
                removed_transitions: vec![],
            },
        );
        if result.is_err() {
            return None;
        }
        match &self.history.last_executed()?.kind {
            CommandKind::SplitClip { parts, .. } => *parts,
            _ => None,
        }
    }

    // ---- transitions --------------------------------------------------------

    /// `None` when the pair violates a transition invariant.
    pub fn add_transition(
        &mut self,
        from: ClipId,
        to: ClipId,
        kind: TransitionKind,
        duration: f64,
    ) -> Option<TransitionId> {
        let result = self.run(
            "Add transition",
            CommandKind::AddTransition {
                from,
                to,
                kind,
                duration,
                created: None,
                snapshot: None,
            },
        );
        if let Err(err) = result {
            tracing::debug!(%err, "transition refused");
            return None;
        }
        match &self.history.last_executed()?.kind {
            CommandKind::AddTransition { created, .. } => *created,
            _ => None,
        }
    }

    pub fn remove_transition(&mut self, transition: TransitionId) -> CutlineResult<()> {
        self.run(
            "Remove transition",
            CommandKind::RemoveTransition {
                transition,
                removed: None,
            },
        )
    }

    // ---- effects ------------------------------------------------------------

    pub fn add_effect(
        &mut self,
        clip: ClipId,
        kind: EffectKind,
        start_time: f64,
        duration: Option<f64>,
    ) -> Option<EffectId> {
        self.run(
            "Add effect",
            CommandKind::AddEffect {
                clip,
                kind,
                start_time,
                duration,
                created: None,
                snapshot: None,
            },
        )
        .ok()?;
        match &self.history.last_executed()?.kind {
            CommandKind::AddEffect { created, .. } => *created,
            _ => None,
        }
    }

    pub fn remove_effect(&mut self, clip: ClipId, effect: EffectId) -> CutlineResult<()> {
        self.run(
            "Remove effect",
            CommandKind::RemoveEffect {
                clip,
                effect,
                removed: None,
            },
        )
    }

    pub fn update_effect(
        &mut self,
        clip: ClipId,
        effect: EffectId,
        start_time: Option<f64>,
        duration: Option<f64>,
        intensity: Option<f64>,
    ) -> CutlineResult<()> {
        self.run(
            "Update effect",
            CommandKind::UpdateEffect {
                clip,
                effect,
                start_time,
                duration,
                intensity,
                old: None,
            },
        )
    }

    pub fn update_effect_param(
        &mut self,
        clip: ClipId,
        effect: EffectId,
        kind: EffectKind,
    ) -> CutlineResult<()> {
        self.run(
            "Update effect params",
            CommandKind::UpdateEffectParam {
                clip,
                effect,
                kind,
                old: None,
            },
        )
    }

    pub fn toggle_effect(&mut self, clip: ClipId, effect: EffectId) -> CutlineResult<()> {
        self.run("Toggle effect", CommandKind::ToggleEffect { clip, effect })
    }

    pub fn reorder_effects(&mut self, clip: ClipId, order: Vec<EffectId>) -> CutlineResult<()> {
        self.run(
            "Reorder effects",
            CommandKind::ReorderEffects {
                clip,
                order,
                old: None,
            },
        )
    }

    // ---- keyframes ----------------------------------------------------------

    pub fn add_keyframe(
        &mut self,
        clip: ClipId,
        property: AnimatedProperty,
        time: f64,
        value: f64,
        easing: Option<Easing>,
    ) -> Option<KeyframeId> {
        self.run(
            "Add keyframe",
            CommandKind::AddKeyframe {
                clip,
                property,
                time,
                value,
                easing: easing.unwrap_or_default(),
                created: None,
                snapshot: None,
                replaced: None,
            },
        )
        .ok()?;
        match &self.history.last_executed()?.kind {
            CommandKind::AddKeyframe { created, .. } => *created,
            _ => None,
        }
    }

    pub fn remove_keyframe(&mut self, clip: ClipId, keyframe: KeyframeId) -> CutlineResult<()> {
        self.run(
            "Remove keyframe",
            CommandKind::RemoveKeyframe {
                clip,
                keyframe,
                removed: None,
            },
        )
    }

    pub fn update_keyframe(
        &mut self,
        clip: ClipId,
        keyframe: KeyframeId,
        time: Option<f64>,
        value: Option<f64>,
        easing: Option<Easing>,
    ) -> CutlineResult<()> {
        self.run(
            "Update keyframe",
            CommandKind::UpdateKeyframe {
                clip,
                keyframe,
                time,
                value,
                easing,
                old: None,
            },
        )
    }

    // ---- project ------------------------------------------------------------

    pub fn set_canvas_size(&mut self, width: u32, height: u32) -> CutlineResult<()> {
        if width == 0 || height == 0 {
            return Err(CutlineError::validation("canvas size must be non-zero"));
        }
        self.run(
            "Set canvas size",
            CommandKind::SetCanvasSize {
                width,
                height,
                old: None,
            },
        )
    }

    pub fn set_frame_rate(&mut self, rate: u32) -> CutlineResult<()> {
        let fps = Fps::whole(rate)?;
        self.run("Set frame rate", CommandKind::SetFrameRate { fps, old: None })
    }

    pub fn rename(&mut self, name: impl Into<String>) -> CutlineResult<()> {
        self.run(
            "Rename project",
            CommandKind::RenameProject {
                name: name.into(),
                old: None,
            },
        )
    }

    // ---- history ------------------------------------------------------------

    pub fn undo(&mut self) -> bool {
        self.history.undo(&mut self.timeline)
    }

    pub fn redo(&mut self) -> bool {
        self.history.redo(&mut self.timeline)
    }

    pub fn begin_group(&mut self, description: impl Into<String>) {
        let ts = self.now();
        self.history.begin_group(description, ts);
    }

    pub fn end_group(&mut self) {
        self.history.end_group();
    }

    pub fn cancel_group(&mut self) {
        self.history.cancel_group(&mut self.timeline);
    }

    fn last_created_track(&self) -> Option<TrackId> {
        match &self.history.last_executed()?.kind {
            CommandKind::AddTrack { created, .. } => *created,
            _ => None,
        }
    }

    fn last_created_clip(&self) -> Option<ClipId> {
        match &self.history.last_executed()?.kind {
            CommandKind::AddClip { created, .. } => *created,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::material::MaterialKind;

    fn editor() -> (Editor, MaterialId) {
        let mut e = Editor::new(
            "test",
            Canvas {
                width: 640,
                height: 360,
            },
            Fps::new(30, 1).unwrap(),
            HistoryConfig::default(),
        );
        e.set_timestamp_source({
            let mut t = 0u64;
            move || {
                t += 1000;
                t
            }
        });
        let m = e.ingest_material(Material {
            name: "m".to_string(),
            kind: MaterialKind::Video,
            duration: 60.0,
            width: 640,
            height: 360,
            source: "m.mp4".to_string(),
            alt_sources: vec![],
            thumbnail: None,
        });
        (e, m)
    }

    fn spec(m: MaterialId, start: f64, duration: f64) -> ClipSpec {
        ClipSpec {
            material: Some(m),
            start_time: start,
            duration,
            in_point: 0.0,
            out_point: duration,
            volume: 1.0,
            ..Default::default()
        }
    }

    #[test]
    fn add_clip_is_undoable() {
        let (mut e, m) = editor();
        let track = e.add_track(TrackKind::Video, None).unwrap();
        let clip = e.add_clip(track, spec(m, 0.0, 5.0)).unwrap();
        assert!(e.timeline().clip(clip).is_some());

        assert!(e.undo());
        assert!(e.timeline().clip(clip).is_none());
        assert!(e.redo());
        // Redo restores the clip under its original id.
        assert!(e.timeline().clip(clip).is_some());
    }

    #[test]
    fn split_returns_parts_and_undoes_to_original() {
        let (mut e, m) = editor();
        let track = e.add_track(TrackKind::Video, None).unwrap();
        let clip = e.add_clip(track, spec(m, 0.0, 6.0)).unwrap();

        let (left, right) = e.split_clip(clip, 2.0).unwrap();
        assert!(e.timeline().clip(clip).is_none());
        assert_eq!(e.timeline().clip(left).unwrap().duration, 2.0);
        assert_eq!(e.timeline().clip(right).unwrap().duration, 4.0);

        assert!(e.undo());
        assert!(e.timeline().clip(clip).is_some());
        assert!(e.timeline().clip(left).is_none());
        assert!(e.timeline().clip(right).is_none());
    }

    #[test]
    fn split_outside_clip_returns_none_without_history() {
        let (mut e, m) = editor();
        let track = e.add_track(TrackKind::Video, None).unwrap();
        let clip = e.add_clip(track, spec(m, 0.0, 6.0)).unwrap();
        let depth = e.history().undo_depth();
        assert!(e.split_clip(clip, 99.0).is_none());
        assert_eq!(e.history().undo_depth(), depth);
    }

    #[test]
    fn invalid_transition_returns_none() {
        let (mut e, m) = editor();
        let track = e.add_track(TrackKind::Video, None).unwrap();
        let a = e.add_clip(track, spec(m, 0.0, 4.0)).unwrap();
        let b = e.add_clip(track, spec(m, 4.0, 4.0)).unwrap();
        // Reversed order violates adjacency.
        assert!(e.add_transition(b, a, TransitionKind::Fade, 1.0).is_none());
        assert!(e.add_transition(a, b, TransitionKind::Fade, 1.0).is_some());
    }

    #[test]
    fn material_removal_respects_references() {
        let (mut e, m) = editor();
        let track = e.add_track(TrackKind::Video, None).unwrap();
        let clip = e.add_clip(track, spec(m, 0.0, 4.0)).unwrap();
        assert!(e.remove_material(m).is_err());
        e.remove_clip(clip).unwrap();
        assert!(e.remove_material(m).is_ok());
    }

    #[test]
    fn effect_param_updates_merge_within_window() {
        let (mut e, m) = editor();
        e.set_timestamp_source({
            let mut t = 0u64;
            move || {
                t += 100;
                t
            }
        });
        let track = e.add_track(TrackKind::Video, None).unwrap();
        let clip = e.add_clip(track, spec(m, 0.0, 4.0)).unwrap();
        let effect = e
            .add_effect(clip, EffectKind::Pixelate { size: 0.02 }, 0.0, None)
            .unwrap();
        let depth = e.history().undo_depth();

        e.update_effect_param(clip, effect, EffectKind::Pixelate { size: 0.05 })
            .unwrap();
        e.update_effect_param(clip, effect, EffectKind::Pixelate { size: 0.08 })
            .unwrap();
        assert_eq!(e.history().undo_depth(), depth + 1);

        e.undo();
        let clip_ref = e.timeline().clip(clip).unwrap();
        assert_eq!(
            clip_ref.effects[0].kind,
            EffectKind::Pixelate { size: 0.02 }
        );
    }
}
