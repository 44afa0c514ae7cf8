use crate::animation::ease::Easing;

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct KeyframeId(pub u64);

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct AnimationTrackId(pub u64);

/// Animatable clip property. Values are scalar; the evaluator assembles the
/// composite transform from the per-property samples.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum AnimatedProperty {
    PositionX,
    PositionY,
    Scale,
    ScaleX,
    ScaleY,
    Rotation,
    Opacity,
    AnchorX,
    AnchorY,
}

impl AnimatedProperty {
    pub fn default_value(self) -> f64 {
        match self {
            Self::PositionX | Self::PositionY | Self::AnchorX | Self::AnchorY => 0.0,
            Self::Scale | Self::ScaleX | Self::ScaleY => 1.0,
            Self::Rotation => 0.0,
            Self::Opacity => 1.0,
        }
    }

    pub fn clamp_value(self, v: f64) -> f64 {
        match self {
            Self::Opacity => v.clamp(0.0, 1.0),
            Self::Scale | Self::ScaleX | Self::ScaleY => v.max(0.0),
            _ => v,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Keyframe {
    pub id: KeyframeId,
    /// Seconds relative to the clip start.
    pub time: f64,
    pub value: f64,
    pub easing: Easing,
}

/// Keyframe set for one property. Keys are kept strictly time-sorted; inserting
/// at an existing time replaces that key rather than duplicating it.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct AnimationTrack {
    pub id: AnimationTrackId,
    pub property: AnimatedProperty,
    pub keyframes: Vec<Keyframe>,
    pub enabled: bool,
}

impl AnimationTrack {
    pub fn new(id: AnimationTrackId, property: AnimatedProperty) -> Self {
        Self {
            id,
            property,
            keyframes: Vec::new(),
            enabled: true,
        }
    }

    /// Insert or replace the keyframe at `kf.time`. Returns the replaced key if any.
    pub fn upsert(&mut self, kf: Keyframe) -> Option<Keyframe> {
        match self
            .keyframes
            .binary_search_by(|k| k.time.partial_cmp(&kf.time).expect("keyframe time is finite"))
        {
            Ok(i) => Some(std::mem::replace(&mut self.keyframes[i], kf)),
            Err(i) => {
                self.keyframes.insert(i, kf);
                None
            }
        }
    }

    pub fn remove(&mut self, id: KeyframeId) -> Option<Keyframe> {
        let i = self.keyframes.iter().position(|k| k.id == id)?;
        Some(self.keyframes.remove(i))
    }

    pub fn get(&self, id: KeyframeId) -> Option<&Keyframe> {
        self.keyframes.iter().find(|k| k.id == id)
    }

    /// Re-sort after an in-place time edit; same-time collisions keep the edited key.
    pub fn update(&mut self, id: KeyframeId, time: Option<f64>, value: Option<f64>, easing: Option<Easing>) -> Option<Keyframe> {
        let i = self.keyframes.iter().position(|k| k.id == id)?;
        let old = self.keyframes[i];
        let mut kf = old;
        if let Some(t) = time {
            kf.time = t;
        }
        if let Some(v) = value {
            kf.value = v;
        }
        if let Some(e) = easing {
            kf.easing = e;
        }
        self.keyframes.remove(i);
        self.keyframes.retain(|k| k.time != kf.time);
        let pos = self
            .keyframes
            .partition_point(|k| k.time < kf.time);
        self.keyframes.insert(pos, kf);
        Some(old)
    }

    pub fn is_active(&self) -> bool {
        self.enabled && !self.keyframes.is_empty()
    }
}

/// All animation tracks attached to one clip.
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct ClipAnimation {
    pub tracks: Vec<AnimationTrack>,
}

impl ClipAnimation {
    pub fn track(&self, property: AnimatedProperty) -> Option<&AnimationTrack> {
        self.tracks.iter().find(|t| t.property == property)
    }

    pub fn track_mut(&mut self, property: AnimatedProperty) -> Option<&mut AnimationTrack> {
        self.tracks.iter_mut().find(|t| t.property == property)
    }

    /// True when any enabled track has at least one keyframe. Drives the
    /// animated-program selection in the compositor.
    pub fn has_active_tracks(&self) -> bool {
        self.tracks.iter().any(AnimationTrack::is_active)
    }
}
