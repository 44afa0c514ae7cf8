use crate::foundation::math::Mat4;
use crate::model::animation::{AnimatedProperty, ClipAnimation, Keyframe};

/// Sampled transform + opacity for one clip at one instant.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnimatedTransform {
    pub x: f64,
    pub y: f64,
    pub scale_x: f64,
    pub scale_y: f64,
    pub rotation_rad: f64,
    pub opacity: f64,
    pub anchor_x: f64,
    pub anchor_y: f64,
}

impl Default for AnimatedTransform {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            rotation_rad: 0.0,
            opacity: 1.0,
            anchor_x: 0.0,
            anchor_y: 0.0,
        }
    }
}

/// Largest index with `keys[i].time <= t`, or `None` when `t` precedes all keys.
///
/// Keys must be time-sorted (the model keeps them that way).
pub fn binary_search_keyframe(keys: &[Keyframe], t: f64) -> Option<usize> {
    let idx = keys.partition_point(|k| k.time <= t);
    idx.checked_sub(1)
}

/// Sample one property track. Endpoint values hold rather than extrapolate.
pub fn track_value(keys: &[Keyframe], property: AnimatedProperty, t: f64) -> f64 {
    let Some(first) = keys.first() else {
        return property.default_value();
    };
    if t <= first.time {
        return property.clamp_value(first.value);
    }
    let last = keys[keys.len() - 1];
    if t >= last.time {
        return property.clamp_value(last.value);
    }

    let i = binary_search_keyframe(keys, t).unwrap_or(0);
    let prev = keys[i];
    let next = keys[(i + 1).min(keys.len() - 1)];

    let denom = next.time - prev.time;
    let p = if denom <= 0.0 { 0.0 } else { (t - prev.time) / denom };
    let eased = prev.easing.apply(p);
    property.clamp_value(prev.value + (next.value - prev.value) * eased)
}

/// Evaluate all tracks of a clip at `time_in_clip` seconds.
///
/// Pure: same inputs always yield the same transform. An enabled `Scale` track
/// with keys overrides the per-axis scale tracks uniformly. Rotation keys are
/// authored in degrees and converted to radians here, at the final step.
pub fn evaluate(anim: &ClipAnimation, time_in_clip: f64) -> AnimatedTransform {
    let sample = |prop: AnimatedProperty| -> f64 {
        match anim.track(prop) {
            Some(tr) if tr.enabled => track_value(&tr.keyframes, prop, time_in_clip),
            _ => prop.default_value(),
        }
    };

    let uniform_scale = anim
        .track(AnimatedProperty::Scale)
        .filter(|tr| tr.is_active());
    let (scale_x, scale_y) = match uniform_scale {
        Some(tr) => {
            let s = track_value(&tr.keyframes, AnimatedProperty::Scale, time_in_clip);
            (s, s)
        }
        None => (
            sample(AnimatedProperty::ScaleX),
            sample(AnimatedProperty::ScaleY),
        ),
    };

    let rotation_deg = sample(AnimatedProperty::Rotation);

    AnimatedTransform {
        x: sample(AnimatedProperty::PositionX),
        y: sample(AnimatedProperty::PositionY),
        scale_x,
        scale_y,
        rotation_rad: rotation_deg * std::f64::consts::PI / 180.0,
        opacity: sample(AnimatedProperty::Opacity),
        anchor_x: sample(AnimatedProperty::AnchorX),
        anchor_y: sample(AnimatedProperty::AnchorY),
    }
}

/// Column-major transform matrix:
/// `T(position) * T(anchor) * R(rotation) * S(scale) * T(-anchor)`.
///
/// The single source of transform math; render passes consume this (or its 2D
/// mirror below) and never re-derive the composition order.
pub fn make_matrix(t: &AnimatedTransform) -> Mat4 {
    Mat4::translate(t.x, t.y)
        * Mat4::translate(t.anchor_x, t.anchor_y)
        * Mat4::rotate_z(t.rotation_rad)
        * Mat4::scale(t.scale_x, t.scale_y)
        * Mat4::translate(-t.anchor_x, -t.anchor_y)
}

/// 2D mirror of [`make_matrix`] for the software sampler's inverse mapping.
pub fn make_affine(t: &AnimatedTransform) -> kurbo::Affine {
    kurbo::Affine::translate((t.x, t.y))
        * kurbo::Affine::translate((t.anchor_x, t.anchor_y))
        * kurbo::Affine::rotate(t.rotation_rad)
        * kurbo::Affine::scale_non_uniform(t.scale_x, t.scale_y)
        * kurbo::Affine::translate((-t.anchor_x, -t.anchor_y))
}
