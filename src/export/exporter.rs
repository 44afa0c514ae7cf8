use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::audio::mix::{build_audio_manifest, mix_manifest, write_mix_to_f32le_file};
use crate::export::encoder::{AudioInputConfig, EncodeConfig, FfmpegEncoder};
use crate::foundation::error::{CutlineError, CutlineResult};
use crate::media::decode::{MIX_SAMPLE_RATE, decode_audio_f32_stereo};
use crate::media::element::{MediaElement, MediaElementFactory};
use crate::model::material::MaterialId;
use crate::model::timeline::Timeline;
use crate::render::compositor::{FrameSource, Pipeline};
use crate::render::context::RenderOptions;
use crate::render::surface::Surface;

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ExportQuality {
    Low,
    Medium,
    High,
}

impl ExportQuality {
    fn crf(self) -> u8 {
        match self {
            Self::Low => 30,
            Self::Medium => 23,
            Self::High => 18,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ExportRequest {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub video_bitrate: Option<u32>,
    pub quality: ExportQuality,
}

/// Strict frame source for export: every acquisition runs the element's load
/// to completion and requires a confirmed frame at the exact seek target, so
/// output is deterministic regardless of wallclock.
struct StrictFrameSource<'a> {
    timeline: &'a Timeline,
    factory: &'a dyn MediaElementFactory,
    elements: HashMap<MaterialId, Box<dyn MediaElement>>,
    failed: std::collections::BTreeSet<MaterialId>,
}

impl<'a> StrictFrameSource<'a> {
    fn new(timeline: &'a Timeline, factory: &'a dyn MediaElementFactory) -> Self {
        Self {
            timeline,
            factory,
            elements: HashMap::new(),
            failed: std::collections::BTreeSet::new(),
        }
    }

    fn element(&mut self, material: MaterialId) -> Option<&mut Box<dyn MediaElement>> {
        if self.failed.contains(&material) {
            return None;
        }
        if !self.elements.contains_key(&material) {
            let m = self.timeline.material(material)?;
            match self.factory.create(m) {
                Ok(mut element) => {
                    // Elements are cooperative; drive the load to completion
                    // here since export has no tick loop to lean on.
                    for _ in 0..1024 {
                        match element.poll_ready() {
                            Ok(true) => break,
                            Ok(false) => continue,
                            Err(err) => {
                                tracing::warn!(?material, %err, "export media load failed");
                                self.failed.insert(material);
                                return None;
                            }
                        }
                    }
                    if !element.is_ready() {
                        tracing::warn!(?material, "export media never became ready");
                        self.failed.insert(material);
                        return None;
                    }
                    self.elements.insert(material, element);
                }
                Err(err) => {
                    tracing::warn!(?material, %err, "export element creation failed");
                    self.failed.insert(material);
                    return None;
                }
            }
        }
        self.elements.get_mut(&material)
    }
}

impl FrameSource for StrictFrameSource<'_> {
    fn frame(&mut self, material: MaterialId, source_time: f64) -> Option<Arc<Surface>> {
        let element = self.element(material)?;
        element.seek(source_time);
        let frame = element.current_frame()?;
        // Frame-callback confirmation: the element must agree it is showing
        // the seek target, not a stale frame.
        if element.seek_pending() {
            return None;
        }
        Some(frame)
    }
}

/// Deterministic frame-by-frame export into an MP4 file.
///
/// Progress reports `[0, 0.99]` during the frame loop and `1.0` after the
/// encoder finalizes. `abort` is checked once per frame; aborting kills the
/// encoder and removes the partial file.
pub fn export_to_path(
    timeline: &Timeline,
    factory: &dyn MediaElementFactory,
    request: &ExportRequest,
    out_path: &Path,
    progress: &mut dyn FnMut(f64),
    abort: &AtomicBool,
) -> CutlineResult<()> {
    let duration = timeline.duration();
    if duration <= 0.0 {
        return Err(CutlineError::export("timeline is empty; nothing to export"));
    }
    if request.frame_rate == 0 {
        return Err(CutlineError::export("export frame rate must be non-zero"));
    }
    let total_frames = (duration * f64::from(request.frame_rate)).ceil() as u64;

    // Export composes through its own pipeline so the player's device state
    // and framebuffers stay untouched.
    let mut pipeline = Pipeline::new(request.width, request.height, RenderOptions::default())?;
    let mut source = StrictFrameSource::new(timeline, factory);

    let mut audio_tmp = TempFileGuard(None);
    let audio = {
        let mut decoder = |material: &crate::model::material::Material| {
            decode_audio_f32_stereo(Path::new(&material.source), MIX_SAMPLE_RATE)
        };
        let manifest = build_audio_manifest(timeline, duration, MIX_SAMPLE_RATE, &mut decoder)?;
        if manifest.segments.is_empty() {
            None
        } else {
            let mixed = mix_manifest(&manifest);
            let path = std::env::temp_dir().join(format!(
                "cutline_audio_mix_{}_{}.f32le",
                std::process::id(),
                std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .map(|d| d.as_nanos())
                    .unwrap_or(0)
            ));
            write_mix_to_f32le_file(&mixed, &path)?;
            audio_tmp.0 = Some(path.clone());
            Some(AudioInputConfig {
                path,
                sample_rate: manifest.sample_rate,
                channels: manifest.channels,
            })
        }
    };

    let cfg = EncodeConfig {
        width: request.width,
        height: request.height,
        fps: request.frame_rate,
        out_path: out_path.to_path_buf(),
        overwrite: true,
        video_bitrate: request.video_bitrate,
        crf: request.quality.crf(),
        audio,
    };
    let mut encoder = FfmpegEncoder::new(cfg, [0, 0, 0, 255])?;

    for i in 0..total_frames {
        if abort.load(Ordering::Relaxed) {
            drop(encoder);
            let _ = std::fs::remove_file(out_path);
            return Err(CutlineError::export("export aborted"));
        }
        let t = (i as f64) / f64::from(request.frame_rate);
        pipeline.render_frame(timeline, t, &mut source)?;
        encoder.encode_frame(pipeline.backbuffer())?;
        progress((i as f64 / total_frames as f64) * 0.99);
    }

    encoder.finish()?;
    progress(1.0);
    Ok(())
}

/// Export and return the finished MP4 bytes.
pub fn export(
    timeline: &Timeline,
    factory: &dyn MediaElementFactory,
    request: &ExportRequest,
    progress: &mut dyn FnMut(f64),
    abort: &AtomicBool,
) -> CutlineResult<Vec<u8>> {
    let out_path = std::env::temp_dir().join(format!(
        "cutline_export_{}_{}.mp4",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0)
    ));
    let guard = TempFileGuard(Some(out_path.clone()));
    export_to_path(timeline, factory, request, &out_path, progress, abort)?;
    let bytes = std::fs::read(&out_path)
        .map_err(|e| CutlineError::export(format!("failed to read export output: {e}")))?;
    drop(guard);
    Ok(bytes)
}

struct TempFileGuard(Option<PathBuf>);

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if let Some(path) = self.0.take() {
            let _ = std::fs::remove_file(path);
        }
    }
}
