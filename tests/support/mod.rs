#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use cutline::{
    Canvas, ClipSpec, CutlineResult, Fps, FrameSource, Material, MaterialId, MaterialKind,
    MediaElement, MediaElementFactory, Surface, Timeline, TrackId, TrackKind,
};

/// Deterministic per-material fill color so tests can tell frames apart.
pub fn material_color(id: MaterialId) -> [u8; 4] {
    let base = (id.0 * 53 % 200 + 40) as u8;
    [base, 255 - base, (id.0 * 17 % 255) as u8, 255]
}

pub struct StubElement {
    source: String,
    color: [u8; 4],
    width: u32,
    height: u32,
    ready: bool,
    playing: bool,
    time: f64,
}

impl MediaElement for StubElement {
    fn source(&self) -> &str {
        &self.source
    }

    fn is_ready(&self) -> bool {
        self.ready
    }

    fn poll_ready(&mut self) -> CutlineResult<bool> {
        self.ready = true;
        Ok(true)
    }

    fn seek(&mut self, time: f64) {
        self.time = time;
    }

    fn current_time(&self) -> f64 {
        self.time
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
        Some(Arc::new(Surface::solid(self.width, self.height, self.color)))
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }
}

/// Factory producing instantly-ready elements with solid frames.
pub struct StubFactory;

impl MediaElementFactory for StubFactory {
    fn create(&self, material: &Material) -> CutlineResult<Box<dyn MediaElement>> {
        // Stub ids are not observable here; derive the color from dimensions
        // plus name so distinct materials stay distinguishable.
        let seed = material.name.bytes().map(u64::from).sum::<u64>();
        Ok(Box::new(StubElement {
            source: material.source.clone(),
            color: material_color(MaterialId(seed)),
            width: material.width.max(2),
            height: material.height.max(2),
            ready: false,
            playing: false,
            time: 0.0,
        }))
    }
}

/// Frame source that serves solid frames and records every request, so tests
/// can assert which media was pulled at which source time.
pub struct RecordingSource {
    pub requests: Rc<RefCell<Vec<(MaterialId, f64)>>>,
    pub frame_size: (u32, u32),
}

impl RecordingSource {
    pub fn new(frame_size: (u32, u32)) -> Self {
        Self {
            requests: Rc::default(),
            frame_size,
        }
    }

    pub fn requests(&self) -> Vec<(MaterialId, f64)> {
        self.requests.borrow().clone()
    }
}

impl FrameSource for RecordingSource {
    fn frame(&mut self, material: MaterialId, source_time: f64) -> Option<Arc<Surface>> {
        self.requests.borrow_mut().push((material, source_time));
        Some(Arc::new(Surface::solid(
            self.frame_size.0,
            self.frame_size.1,
            material_color(material),
        )))
    }
}

pub fn test_canvas() -> Canvas {
    Canvas {
        width: 64,
        height: 36,
    }
}

pub fn new_timeline() -> Timeline {
    Timeline::new("test", test_canvas(), Fps::whole(30).unwrap())
}

pub fn video_material(tl: &mut Timeline, name: &str, duration: f64) -> MaterialId {
    tl.add_material_direct(Material {
        name: name.to_string(),
        kind: MaterialKind::Video,
        duration,
        width: 64,
        height: 36,
        source: format!("media/{name}.mp4"),
        alt_sources: vec![],
        thumbnail: None,
    })
}

pub fn add_video_track(tl: &mut Timeline) -> TrackId {
    tl.add_track_direct(TrackKind::Video, None)
}

pub fn clip_spec(material: MaterialId, start: f64, duration: f64) -> ClipSpec {
    ClipSpec {
        material: Some(material),
        start_time: start,
        duration,
        in_point: 0.0,
        out_point: duration,
        volume: 1.0,
        ..Default::default()
    }
}
