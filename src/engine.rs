use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Instant;

use crate::foundation::core::{Canvas, Fps};
use crate::foundation::error::CutlineResult;
use crate::export::exporter::{self, ExportRequest};
use crate::media::element::{MediaElement, MediaElementFactory};
use crate::model::material::Material;
use crate::playback::scheduler::{PlaybackScheduler, PlaybackState};
use crate::project::config::EngineConfig;
use crate::project::editor::Editor;
use crate::project::quota::QuotaManager;
use crate::render::compositor::{FrameReport, Pipeline};
use crate::render::context::RenderOptions;
use crate::render::surface::Surface;

/// Adapter so one factory serves both the player's pool and export sessions.
struct SharedFactory(Arc<dyn MediaElementFactory>);

impl MediaElementFactory for SharedFactory {
    fn create(&self, material: &Material) -> CutlineResult<Box<dyn MediaElement>> {
        self.0.create(material)
    }
}

/// Outcome of one engine tick.
pub struct EngineTick {
    /// Playback reached the end on this tick and paused.
    pub eos: bool,
    pub report: Option<FrameReport>,
}

/// The assembled editor engine: timeline + history behind the edit API, a
/// playback scheduler, and one composition pipeline presenting into its
/// backbuffer. Construct one per document; export spins up its own pipeline
/// internally so player state is never disturbed.
pub struct Engine {
    editor: Editor,
    scheduler: PlaybackScheduler,
    pipeline: Pipeline,
    quota: QuotaManager,
    factory: Arc<dyn MediaElementFactory>,
}

impl Engine {
    pub fn new(
        name: impl Into<String>,
        canvas: Canvas,
        frame_rate: Fps,
        config: EngineConfig,
        factory: Arc<dyn MediaElementFactory>,
    ) -> CutlineResult<Self> {
        let editor = Editor::new(name, canvas, frame_rate, config.history);
        Self::from_editor(editor, canvas, config, factory)
    }

    pub fn from_editor(
        editor: Editor,
        canvas: Canvas,
        config: EngineConfig,
        factory: Arc<dyn MediaElementFactory>,
    ) -> CutlineResult<Self> {
        let scheduler = PlaybackScheduler::new(
            Box::new(SharedFactory(factory.clone())),
            config.pool,
        );
        let pipeline = Pipeline::new(canvas.width, canvas.height, RenderOptions::default())?;
        Ok(Self {
            editor,
            scheduler,
            pipeline,
            quota: QuotaManager::new(config.quota),
            factory,
        })
    }

    pub fn editor(&self) -> &Editor {
        &self.editor
    }

    pub fn editor_mut(&mut self) -> &mut Editor {
        &mut self.editor
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn pipeline_mut(&mut self) -> &mut Pipeline {
        &mut self.pipeline
    }

    pub fn quota(&self) -> &QuotaManager {
        &self.quota
    }

    /// The most recently composed frame.
    pub fn frame(&self) -> &Surface {
        self.pipeline.backbuffer()
    }

    // ---- playback -----------------------------------------------------------

    pub fn play(&mut self) {
        self.scheduler.play();
    }

    pub fn pause(&mut self) {
        self.scheduler.pause();
    }

    pub fn toggle(&mut self) {
        self.scheduler.toggle();
    }

    pub fn seek(&mut self, t: f64) {
        self.scheduler.seek(t);
    }

    pub fn set_volume(&mut self, volume: f64) {
        self.scheduler.set_volume(volume);
    }

    pub fn set_playback_rate(&mut self, rate: f64) {
        self.scheduler.set_playback_rate(rate);
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.scheduler.state()
    }

    /// One cooperative tick: advance the scheduler, then compose the frame.
    pub fn render_tick(&mut self) -> CutlineResult<EngineTick> {
        self.render_tick_at(Instant::now())
    }

    pub fn render_tick_at(&mut self, now: Instant) -> CutlineResult<EngineTick> {
        let tick = self.scheduler.tick(self.editor.timeline(), now);
        if tick.eos {
            return Ok(EngineTick {
                eos: true,
                report: None,
            });
        }
        let report =
            self.pipeline
                .render_frame(self.editor.timeline(), tick.time, &mut self.scheduler)?;
        Ok(EngineTick {
            eos: false,
            report: Some(report),
        })
    }

    /// Propagate a canvas-size edit into the presentation surface.
    pub fn set_canvas_size(&mut self, width: u32, height: u32) -> CutlineResult<()> {
        self.editor.set_canvas_size(width, height)?;
        self.pipeline.resize(width, height)
    }

    // ---- export -------------------------------------------------------------

    /// Render the whole timeline to MP4 bytes through an isolated pipeline.
    pub fn export(
        &self,
        request: &ExportRequest,
        progress: &mut dyn FnMut(f64),
        abort: &AtomicBool,
    ) -> CutlineResult<Vec<u8>> {
        exporter::export(
            self.editor.timeline(),
            &*self.factory,
            request,
            progress,
            abort,
        )
    }

    pub fn export_to_path(
        &self,
        request: &ExportRequest,
        out_path: &std::path::Path,
        progress: &mut dyn FnMut(f64),
        abort: &AtomicBool,
    ) -> CutlineResult<()> {
        exporter::export_to_path(
            self.editor.timeline(),
            &*self.factory,
            request,
            out_path,
            progress,
            abort,
        )
    }
}
