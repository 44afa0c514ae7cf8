use crate::animation::evaluator::AnimatedTransform;
use crate::foundation::core::TimeRange;
use crate::model::animation::ClipAnimation;
use crate::model::effect::EffectInstance;
use crate::model::material::MaterialId;
use crate::model::track::TrackId;

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct ClipId(pub u64);

/// How a source frame maps onto the canvas when no animation is active.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CropMode {
    /// Fill the canvas, cropping overflow.
    Cover,
    /// Preserve aspect with letterboxing.
    #[default]
    Contain,
    /// Stretch to the canvas, ignoring aspect.
    Fill,
}

/// Static transform fallback used when a clip has no active animation tracks.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ClipTransform {
    pub x: f64,
    pub y: f64,
    pub scale_x: f64,
    pub scale_y: f64,
    /// Degrees, converted to radians at evaluation time like animated rotation.
    pub rotation_deg: f64,
    pub opacity: f64,
    pub anchor_x: f64,
    pub anchor_y: f64,
}

impl Default for ClipTransform {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            rotation_deg: 0.0,
            opacity: 1.0,
            anchor_x: 0.0,
            anchor_y: 0.0,
        }
    }
}

impl ClipTransform {
    pub fn is_identity(&self) -> bool {
        *self == Self::default()
    }

    pub fn to_animated(&self) -> AnimatedTransform {
        AnimatedTransform {
            x: self.x,
            y: self.y,
            scale_x: self.scale_x,
            scale_y: self.scale_y,
            rotation_rad: self.rotation_deg * std::f64::consts::PI / 180.0,
            opacity: self.opacity.clamp(0.0, 1.0),
            anchor_x: self.anchor_x,
            anchor_y: self.anchor_y,
        }
    }
}

/// Per-clip color correction, applied by every video program.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ColorFilters {
    /// Additive, in [-1, 1]. 0 is neutral.
    pub brightness: f64,
    /// Factor in [0, 2]. 1 is neutral.
    pub contrast: f64,
    /// Factor. 1 is neutral, 0 is grayscale.
    pub saturation: f64,
    /// Hue rotation as a fractional turn in [0, 1).
    pub hue: f64,
    /// Gaussian blur radius in pixels. 0 disables.
    pub blur: f64,
}

impl Default for ColorFilters {
    fn default() -> Self {
        Self {
            brightness: 0.0,
            contrast: 1.0,
            saturation: 1.0,
            hue: 0.0,
            blur: 0.0,
        }
    }
}

impl ColorFilters {
    pub fn is_neutral(&self) -> bool {
        *self == Self::default()
    }
}

/// Text payload for subtitle/text clips.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TextContent {
    pub content: String,
    pub font_size: f32,
    pub color_rgba8: [u8; 4],
    /// Vertical anchor of the line in 0..1 screen space (1 = bottom).
    pub position_y: f32,
    /// Font family name, or empty for the renderer default.
    #[serde(default)]
    pub font_family: String,
}

impl Default for TextContent {
    fn default() -> Self {
        Self {
            content: String::new(),
            font_size: 48.0,
            color_rgba8: [255, 255, 255, 255],
            position_y: 0.9,
            font_family: String::new(),
        }
    }
}

/// A material placed on a track.
///
/// Invariants (enforced by the timeline mutators, not here):
/// duration > 0; 0 <= in_point <= out_point <= material duration;
/// start_time >= 0; no overlap with siblings on the same track.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Clip {
    pub track: TrackId,
    /// Absent for text and generated sticker clips.
    pub material: Option<MaterialId>,
    /// Timeline seconds.
    pub start_time: f64,
    pub duration: f64,
    /// Source seconds.
    pub in_point: f64,
    pub out_point: f64,
    pub effects: Vec<EffectInstance>,
    pub transform: ClipTransform,
    pub filters: ColorFilters,
    pub animation: ClipAnimation,
    pub crop: CropMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<TextContent>,
    pub volume: f32,
}

impl Clip {
    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }

    pub fn range(&self) -> TimeRange {
        TimeRange {
            start: self.start_time,
            end: self.end_time(),
        }
    }

    pub fn contains(&self, t: f64) -> bool {
        self.range().contains(t)
    }

    /// Timeline time -> seconds since clip start.
    pub fn time_in_clip(&self, t: f64) -> f64 {
        t - self.start_time
    }

    /// Timeline time -> source media time.
    pub fn source_time_at(&self, t: f64) -> f64 {
        self.in_point + self.time_in_clip(t)
    }

    pub fn has_active_animation(&self) -> bool {
        self.animation.has_active_tracks()
    }

    pub fn active_effects_at(&self, time_in_clip: f64) -> Vec<&EffectInstance> {
        let mut out: Vec<&EffectInstance> = self
            .effects
            .iter()
            .filter(|e| e.active_at(time_in_clip))
            .collect();
        out.sort_by_key(|e| e.order);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip() -> Clip {
        Clip {
            track: TrackId(1),
            material: Some(MaterialId(1)),
            start_time: 2.0,
            duration: 3.0,
            in_point: 1.0,
            out_point: 4.0,
            effects: vec![],
            transform: ClipTransform::default(),
            filters: ColorFilters::default(),
            animation: ClipAnimation::default(),
            crop: CropMode::Contain,
            text: None,
            volume: 1.0,
        }
    }

    #[test]
    fn source_time_offsets_by_in_point() {
        let c = clip();
        assert_eq!(c.source_time_at(2.0), 1.0);
        assert_eq!(c.source_time_at(4.5), 3.5);
    }

    #[test]
    fn range_is_half_open() {
        let c = clip();
        assert!(c.contains(2.0));
        assert!(c.contains(4.999));
        assert!(!c.contains(5.0));
    }

    #[test]
    fn active_effects_sort_by_order() {
        use crate::model::effect::{EffectId, EffectKind};
        let mut c = clip();
        for (id, order) in [(1u64, 2u32), (2, 0), (3, 1)] {
            c.effects.push(EffectInstance {
                id: EffectId(id),
                kind: EffectKind::Invert,
                start_time: 0.0,
                duration: 3.0,
                intensity: 1.0,
                enter: None,
                exit: None,
                enabled: true,
                order,
            });
        }
        let orders: Vec<u32> = c.active_effects_at(1.0).iter().map(|e| e.order).collect();
        assert_eq!(orders, vec![0, 1, 2]);
    }
}
