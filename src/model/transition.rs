use crate::foundation::core::TimeRange;
use crate::model::clip::ClipId;

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct TransitionId(pub u64);

/// Transition styles. The discriminant doubles as the program's
/// `u_transitionType` uniform value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TransitionKind {
    Fade,
    Dissolve,
    SlideLeft,
    SlideRight,
    Wipe,
    Zoom,
    Blur,
    SlideUp,
    SlideDown,
}

impl TransitionKind {
    pub fn shader_index(self) -> i32 {
        match self {
            Self::Fade => 0,
            Self::Dissolve => 1,
            Self::SlideLeft => 2,
            Self::SlideRight => 3,
            Self::Wipe => 4,
            Self::Zoom => 5,
            Self::Blur => 6,
            Self::SlideUp => 7,
            Self::SlideDown => 8,
        }
    }
}

/// Directed blend between two adjacent clips on one track. At most one
/// transition exists per ordered (from, to) pair; duration never exceeds the
/// shorter clip.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Transition {
    pub from: ClipId,
    pub to: ClipId,
    pub kind: TransitionKind,
    pub duration: f64,
}

impl Transition {
    /// Active window, centered on the incoming clip's start.
    pub fn region(&self, to_clip_start: f64) -> TimeRange {
        TimeRange {
            start: to_clip_start - self.duration / 2.0,
            end: to_clip_start + self.duration / 2.0,
        }
    }

    /// Raw progress through the active region, in [0, 1).
    pub fn progress(&self, to_clip_start: f64, t: f64) -> f64 {
        if self.duration <= 0.0 {
            return 0.0;
        }
        let region = self.region(to_clip_start);
        ((t - region.start) / self.duration).clamp(0.0, 1.0)
    }
}
