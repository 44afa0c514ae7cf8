use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::foundation::error::{CutlineError, CutlineResult};
use crate::media::decode::{MediaProbe, decode_video_frame_rgba8, probe_media};
use crate::model::material::{Material, MaterialKind};
use crate::render::surface::Surface;

/// A playable media handle owned by the pool.
///
/// Elements are cooperative: nothing blocks at bind time. `poll_ready`
/// performs (or completes) acquisition; the scheduler calls it from ticks and
/// enforces the load deadline. Frame access returns shared surfaces that must
/// not be held past the current frame.
pub trait MediaElement {
    fn source(&self) -> &str;

    fn is_ready(&self) -> bool;

    /// Advance acquisition. `Ok(true)` once ready; errors are terminal.
    fn poll_ready(&mut self) -> CutlineResult<bool>;

    fn seek(&mut self, time: f64);

    fn current_time(&self) -> f64;

    /// True while a seek has not yet produced a frame at the seek target.
    fn seek_pending(&self) -> bool;

    fn play(&mut self);

    fn pause(&mut self);

    fn is_playing(&self) -> bool;

    /// The decoded frame at the element's current time, if available.
    fn current_frame(&mut self) -> Option<Arc<Surface>>;

    fn width(&self) -> u32 {
        0
    }

    fn height(&self) -> u32 {
        0
    }
}

/// Creates elements for materials. Playback and export inject the
/// ffmpeg-backed factory; tests inject synthetic ones.
pub trait MediaElementFactory {
    fn create(&self, material: &Material) -> CutlineResult<Box<dyn MediaElement>>;
}

/// Frame cache bound: at 60 ticks/s a short scrub fills this quickly, and
/// frames are large, so keep it tight.
const FRAME_CACHE_CAP: usize = 16;

/// Quantization for frame-cache keys, in milliseconds.
const FRAME_KEY_MS: u64 = 10;

/// ffmpeg-subprocess-backed element for video and audio materials.
///
/// Decoding is pull-based: a seek only records the target; the frame is
/// decoded when the compositor asks for it, then cached.
pub struct FfmpegMediaElement {
    source: PathBuf,
    kind: MaterialKind,
    probe: Option<MediaProbe>,
    failed: Option<String>,
    current_time: f64,
    playing: bool,
    decoded_at: Option<u64>,
    frames: HashMap<u64, Arc<Surface>>,
    frame_order: Vec<u64>,
}

impl FfmpegMediaElement {
    pub fn new(source: impl Into<PathBuf>, kind: MaterialKind) -> Self {
        Self {
            source: source.into(),
            kind,
            probe: None,
            failed: None,
            current_time: 0.0,
            playing: false,
            decoded_at: None,
            frames: HashMap::new(),
            frame_order: Vec::new(),
        }
    }

    fn key_for(time: f64) -> u64 {
        ((time.max(0.0) * 1000.0).round() as u64) / FRAME_KEY_MS
    }

    fn cache_frame(&mut self, key: u64, frame: Arc<Surface>) {
        if self.frames.len() >= FRAME_CACHE_CAP
            && !self.frames.contains_key(&key)
            && !self.frame_order.is_empty()
        {
            let oldest = self.frame_order.remove(0);
            self.frames.remove(&oldest);
        }
        if self.frames.insert(key, frame).is_none() {
            self.frame_order.push(key);
        }
    }
}

impl MediaElement for FfmpegMediaElement {
    fn source(&self) -> &str {
        self.source.to_str().unwrap_or("")
    }

    fn is_ready(&self) -> bool {
        self.probe.is_some() && self.failed.is_none()
    }

    fn poll_ready(&mut self) -> CutlineResult<bool> {
        if let Some(err) = &self.failed {
            return Err(CutlineError::media(err.clone()));
        }
        if self.probe.is_some() {
            return Ok(true);
        }
        match probe_media(&self.source) {
            Ok(probe) => {
                if self.kind == MaterialKind::Video && !probe.has_video {
                    let msg = format!("'{}' has no video stream", self.source.display());
                    self.failed = Some(msg.clone());
                    return Err(CutlineError::media(msg));
                }
                self.probe = Some(probe);
                Ok(true)
            }
            Err(err) => {
                let msg = err.to_string();
                self.failed = Some(msg);
                Err(err)
            }
        }
    }

    fn seek(&mut self, time: f64) {
        self.current_time = time.max(0.0);
    }

    fn current_time(&self) -> f64 {
        self.current_time
    }

    fn seek_pending(&self) -> bool {
        self.decoded_at != Some(Self::key_for(self.current_time))
    }

    fn play(&mut self) {
        self.playing = true;
    }

    fn pause(&mut self) {
        self.playing = false;
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn current_frame(&mut self) -> Option<Arc<Surface>> {
        if self.kind == MaterialKind::Audio {
            return None;
        }
        let probe = self.probe.as_ref()?;
        let key = Self::key_for(self.current_time);
        if let Some(frame) = self.frames.get(&key) {
            self.decoded_at = Some(key);
            return Some(frame.clone());
        }
        match decode_video_frame_rgba8(probe, self.current_time) {
            Ok(data) => {
                match Surface::from_rgba8_straight(probe.width, probe.height, data) {
                    Ok(surface) => {
                        let frame = Arc::new(surface);
                        self.cache_frame(key, frame.clone());
                        self.decoded_at = Some(key);
                        Some(frame)
                    }
                    Err(err) => {
                        tracing::warn!(%err, source = %self.source.display(), "bad frame buffer");
                        None
                    }
                }
            }
            Err(err) => {
                tracing::warn!(%err, source = %self.source.display(), "frame decode failed");
                None
            }
        }
    }

    fn width(&self) -> u32 {
        self.probe.as_ref().map_or(0, |p| p.width)
    }

    fn height(&self) -> u32 {
        self.probe.as_ref().map_or(0, |p| p.height)
    }
}

/// Element for still images and stickers: decoded once, time-independent.
pub struct ImageMediaElement {
    source: PathBuf,
    frame: Option<Arc<Surface>>,
    failed: Option<String>,
    current_time: f64,
    playing: bool,
}

impl ImageMediaElement {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            frame: None,
            failed: None,
            current_time: 0.0,
            playing: false,
        }
    }
}

impl MediaElement for ImageMediaElement {
    fn source(&self) -> &str {
        self.source.to_str().unwrap_or("")
    }

    fn is_ready(&self) -> bool {
        self.frame.is_some()
    }

    fn poll_ready(&mut self) -> CutlineResult<bool> {
        if let Some(err) = &self.failed {
            return Err(CutlineError::media(err.clone()));
        }
        if self.frame.is_some() {
            return Ok(true);
        }
        let img = image::open(&self.source)
            .map_err(|e| {
                let msg = format!("image decode failed for '{}': {e}", self.source.display());
                self.failed = Some(msg.clone());
                CutlineError::media(msg)
            })?
            .to_rgba8();
        let surface =
            Surface::from_rgba8_straight(img.width(), img.height(), img.into_raw())?;
        self.frame = Some(Arc::new(surface));
        Ok(true)
    }

    fn seek(&mut self, time: f64) {
        self.current_time = time.max(0.0);
    }

    fn current_time(&self) -> f64 {
        self.current_time
    }

    fn seek_pending(&self) -> bool {
        false
    }

    fn play(&mut self) {
        self.playing = true;
    }

    fn pause(&mut self) {
        self.playing = false;
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn current_frame(&mut self) -> Option<Arc<Surface>> {
        self.frame.clone()
    }

    fn width(&self) -> u32 {
        self.frame.as_ref().map_or(0, |f| f.width)
    }

    fn height(&self) -> u32 {
        self.frame.as_ref().map_or(0, |f| f.height)
    }
}

/// Default factory: ffmpeg for time-based media, `image` for stills.
#[derive(Default)]
pub struct FfmpegElementFactory;

impl MediaElementFactory for FfmpegElementFactory {
    fn create(&self, material: &Material) -> CutlineResult<Box<dyn MediaElement>> {
        match material.kind {
            MaterialKind::Video | MaterialKind::Audio => Ok(Box::new(FfmpegMediaElement::new(
                &material.source,
                material.kind,
            ))),
            MaterialKind::Image | MaterialKind::Sticker => {
                Ok(Box::new(ImageMediaElement::new(&material.source)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_element_fails_cleanly_on_missing_file() {
        let mut e = ImageMediaElement::new("definitely/not/here.png");
        assert!(!e.is_ready());
        assert!(e.poll_ready().is_err());
        // Failure is sticky.
        assert!(e.poll_ready().is_err());
        assert!(e.current_frame().is_none());
    }

    #[test]
    fn ffmpeg_element_tracks_seek_state() {
        let mut e = FfmpegMediaElement::new("clip.mp4", MaterialKind::Video);
        e.seek(3.0);
        assert_eq!(e.current_time(), 3.0);
        assert!(e.seek_pending());
        e.seek(-5.0);
        assert_eq!(e.current_time(), 0.0);
    }

    #[test]
    fn frame_cache_is_bounded() {
        let mut e = FfmpegMediaElement::new("clip.mp4", MaterialKind::Video);
        for i in 0..(FRAME_CACHE_CAP + 8) {
            e.cache_frame(i as u64, Arc::new(Surface::new(1, 1)));
        }
        assert!(e.frames.len() <= FRAME_CACHE_CAP);
    }
}
