#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct MaterialId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum MaterialKind {
    Video,
    Audio,
    Image,
    Sticker,
}

/// Thumbnail filmstrip metadata for timeline scrubbing UIs.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ThumbnailSprite {
    pub source: String,
    pub frame_width: u32,
    pub frame_height: u32,
    pub columns: u32,
    pub frame_count: u32,
    /// Seconds of media per sprite frame.
    pub interval: f64,
}

/// An ingested media asset. Materials are shared: multiple clips may reference
/// one material, and a material stays alive while any clip does.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Material {
    pub name: String,
    pub kind: MaterialKind,
    /// Intrinsic duration in seconds. Zero for still images and stickers.
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    /// Primary playable stream (path or URL).
    pub source: String,
    /// Alternative renditions of the same asset, best first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alt_sources: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<ThumbnailSprite>,
}

impl Material {
    pub fn aspect(&self) -> f64 {
        if self.height == 0 {
            return 1.0;
        }
        f64::from(self.width) / f64::from(self.height)
    }

    /// Source duration usable by clips. Still images behave as unbounded.
    pub fn clip_duration_limit(&self) -> f64 {
        match self.kind {
            MaterialKind::Image | MaterialKind::Sticker => f64::INFINITY,
            _ => self.duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stills_have_unbounded_clip_duration() {
        let m = Material {
            name: "logo".to_string(),
            kind: MaterialKind::Image,
            duration: 0.0,
            width: 128,
            height: 64,
            source: "assets/logo.png".to_string(),
            alt_sources: vec![],
            thumbnail: None,
        };
        assert!(m.clip_duration_limit().is_infinite());
        assert_eq!(m.aspect(), 2.0);
    }
}
