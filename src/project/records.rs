use crate::foundation::core::{Canvas, Fps};
use crate::foundation::error::{CutlineError, CutlineResult};
use crate::model::animation::ClipAnimation;
use crate::model::clip::{Clip, ClipId, ClipTransform, ColorFilters, CropMode, TextContent};
use crate::model::effect::EffectInstance;
use crate::model::material::{Material, MaterialId};
use crate::model::timeline::Timeline;
use crate::model::track::{Track, TrackId, TrackKind};
use crate::model::transition::{Transition, TransitionId, TransitionKind};

/// Persistent project layout. This is the storage contract: a plain record
/// tree with stable numeric ids, round-tripped through JSON.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ProjectRecord {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub frame_rate: Fps,
    pub duration: f64,
    pub materials: Vec<MaterialRecord>,
    pub tracks: Vec<TrackRecord>,
    pub transitions: Vec<TransitionRecord>,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct MaterialRecord {
    pub id: u64,
    #[serde(flatten)]
    pub material: Material,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct TrackRecord {
    pub id: u64,
    pub kind: TrackKind,
    pub name: String,
    pub muted: bool,
    pub locked: bool,
    pub clips: Vec<ClipRecord>,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ClipRecord {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material: Option<u64>,
    pub start_time: f64,
    pub duration: f64,
    pub in_point: f64,
    pub out_point: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub effects: Vec<EffectInstance>,
    pub transform: ClipTransform,
    pub filters: ColorFilters,
    pub animation: ClipAnimation,
    pub crop: CropMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<TextContent>,
    pub volume: f32,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct TransitionRecord {
    pub id: u64,
    pub from_clip: u64,
    pub to_clip: u64,
    pub kind: TransitionKind,
    pub duration: f64,
}

impl ProjectRecord {
    pub fn from_timeline(timeline: &Timeline) -> Self {
        let materials = timeline
            .materials()
            .map(|(id, m)| MaterialRecord {
                id: id.0,
                material: m.clone(),
            })
            .collect();

        let tracks = timeline
            .tracks_in_order()
            .map(|(tid, track)| TrackRecord {
                id: tid.0,
                kind: track.kind,
                name: track.name.clone(),
                muted: track.muted,
                locked: track.locked,
                clips: track
                    .clips
                    .iter()
                    .filter_map(|cid| timeline.clip(*cid).map(|c| (cid, c)))
                    .map(|(cid, c)| ClipRecord {
                        id: cid.0,
                        material: c.material.map(|m| m.0),
                        start_time: c.start_time,
                        duration: c.duration,
                        in_point: c.in_point,
                        out_point: c.out_point,
                        effects: c.effects.clone(),
                        transform: c.transform,
                        filters: c.filters,
                        animation: c.animation.clone(),
                        crop: c.crop,
                        text: c.text.clone(),
                        volume: c.volume,
                    })
                    .collect(),
            })
            .collect();

        let transitions = timeline
            .transitions()
            .map(|(tid, tr)| TransitionRecord {
                id: tid.0,
                from_clip: tr.from.0,
                to_clip: tr.to.0,
                kind: tr.kind,
                duration: tr.duration,
            })
            .collect();

        Self {
            name: timeline.name.clone(),
            width: timeline.canvas.width,
            height: timeline.canvas.height,
            frame_rate: timeline.frame_rate,
            duration: timeline.duration(),
            materials,
            tracks,
            transitions,
        }
    }

    pub fn into_timeline(self) -> CutlineResult<Timeline> {
        let mut timeline = Timeline::new(
            self.name,
            Canvas {
                width: self.width,
                height: self.height,
            },
            self.frame_rate,
        );

        for m in self.materials {
            timeline.insert_material_direct(MaterialId(m.id), m.material);
        }

        for track in self.tracks {
            let track_id = TrackId(track.id);
            let removed = crate::model::timeline::RemovedTrack {
                index: usize::MAX, // appended in record order
                track: Track {
                    kind: track.kind,
                    name: track.name,
                    muted: track.muted,
                    locked: track.locked,
                    clips: track.clips.iter().map(|c| ClipId(c.id)).collect(),
                },
                clips: track
                    .clips
                    .into_iter()
                    .map(|c| {
                        (
                            ClipId(c.id),
                            Clip {
                                track: track_id,
                                material: c.material.map(MaterialId),
                                start_time: c.start_time,
                                duration: c.duration,
                                in_point: c.in_point,
                                out_point: c.out_point,
                                effects: c.effects,
                                transform: c.transform,
                                filters: c.filters,
                                animation: c.animation,
                                crop: c.crop,
                                text: c.text,
                                volume: c.volume,
                            },
                        )
                    })
                    .collect(),
                transitions: vec![],
            };
            timeline.insert_track_direct(track_id, removed);
        }

        for tr in self.transitions {
            timeline.insert_transition_direct(
                TransitionId(tr.id),
                Transition {
                    from: ClipId(tr.from_clip),
                    to: ClipId(tr.to_clip),
                    kind: tr.kind,
                    duration: tr.duration,
                },
            );
        }

        timeline.assert_no_overlaps()?;
        Ok(timeline)
    }

    pub fn to_json(&self) -> CutlineResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| CutlineError::serde(format!("project encode failed: {e}")))
    }

    pub fn from_json(s: &str) -> CutlineResult<Self> {
        serde_json::from_str(s).map_err(|e| CutlineError::serde(format!("project parse failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::material::MaterialKind;
    use crate::model::timeline::ClipSpec;

    fn sample_timeline() -> Timeline {
        let mut tl = Timeline::new(
            "roundtrip",
            Canvas {
                width: 1280,
                height: 720,
            },
            Fps::new(30, 1).unwrap(),
        );
        let m = tl.add_material_direct(Material {
            name: "m".to_string(),
            kind: MaterialKind::Video,
            duration: 20.0,
            width: 1280,
            height: 720,
            source: "media/m.mp4".to_string(),
            alt_sources: vec!["media/m_low.mp4".to_string()],
            thumbnail: None,
        });
        let track = tl.add_track_direct(TrackKind::Video, Some("Main".to_string()));
        let a = tl
            .add_clip_direct(
                track,
                ClipSpec {
                    material: Some(m),
                    start_time: 0.0,
                    duration: 4.0,
                    in_point: 0.0,
                    out_point: 4.0,
                    volume: 1.0,
                    ..Default::default()
                },
            )
            .unwrap();
        let b = tl
            .add_clip_direct(
                track,
                ClipSpec {
                    material: Some(m),
                    start_time: 4.0,
                    duration: 4.0,
                    in_point: 4.0,
                    out_point: 8.0,
                    volume: 1.0,
                    ..Default::default()
                },
            )
            .unwrap();
        tl.add_transition_direct(a, b, TransitionKind::Dissolve, 1.0)
            .unwrap();
        tl.add_keyframe_direct(
            a,
            crate::model::animation::AnimatedProperty::Scale,
            0.0,
            1.0,
            crate::animation::ease::Easing::EaseInOutCubic,
        );
        tl
    }

    #[test]
    fn project_roundtrips_through_json() {
        let tl = sample_timeline();
        let record = ProjectRecord::from_timeline(&tl);
        let json = record.to_json().unwrap();
        let parsed = ProjectRecord::from_json(&json).unwrap();
        let restored = parsed.into_timeline().unwrap();

        assert_eq!(restored.name, "roundtrip");
        assert_eq!(restored.canvas.width, 1280);
        assert_eq!(restored.clip_count(), 2);
        assert_eq!(restored.transitions().count(), 1);
        assert_eq!(restored.materials().count(), 1);
        assert_eq!(restored.duration(), 8.0);
    }

    #[test]
    fn restored_ids_do_not_collide_with_new_entities() {
        let tl = sample_timeline();
        let record = ProjectRecord::from_timeline(&tl);
        let mut restored = record.into_timeline().unwrap();
        let max_clip = restored
            .active_clips(0.0)
            .iter()
            .map(|c| c.0)
            .max()
            .unwrap_or(0);
        let t2 = restored.add_track_direct(TrackKind::Audio, None);
        assert!(t2.0 > max_clip);
    }
}
