use crate::model::clip::ClipId;

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct TrackId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TrackKind {
    Video,
    Sticker,
    Text,
    Audio,
}

impl TrackKind {
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Video => "Video",
            Self::Sticker => "Sticker",
            Self::Text => "Text",
            Self::Audio => "Audio",
        }
    }
}

/// Ordered clip container. Clip ids are kept sorted by start time; the
/// non-overlap invariant is enforced by the timeline mutators.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Track {
    pub kind: TrackKind,
    pub name: String,
    pub muted: bool,
    pub locked: bool,
    pub clips: Vec<ClipId>,
}

impl Track {
    pub fn new(kind: TrackKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            muted: false,
            locked: false,
            clips: Vec::new(),
        }
    }
}
