use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::media::element::{MediaElement as _, MediaElementFactory};
use crate::model::material::MaterialId;
use crate::model::timeline::Timeline;
use crate::model::track::TrackKind;
use crate::playback::clock::PlaybackClock;
use crate::playback::pool::{MediaPool, PreloadStatus};
use crate::project::config::PoolConfig;
use crate::render::compositor::FrameSource;
use crate::render::surface::Surface;

/// Allowed A/V drift before a corrective seek, by clock state.
const DRIFT_PLAYING: f64 = 0.1;
const DRIFT_PAUSED: f64 = 0.05;

/// Hard deadline on waiting for a seek to surface a frame.
const SEEK_DEADLINE: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PlaybackState {
    pub current_time: f64,
    pub is_playing: bool,
    pub duration: f64,
    pub volume: f64,
}

/// One tick's outcome for the render loop.
pub struct TickResult {
    pub time: f64,
    /// End-of-stream sentinel: playback just finished and paused.
    pub eos: bool,
    /// Current main-video frame, if one is decodable right now.
    pub frame: Option<Arc<Surface>>,
}

/// Drives playback: clock, media pool binding, drift correction, predictive
/// warmup. One cooperative tick per render frame; nothing here blocks.
pub struct PlaybackScheduler {
    clock: PlaybackClock,
    pool: MediaPool,
    factory: Box<dyn MediaElementFactory>,
    config: PoolConfig,
    volume: f64,
    bound_video: Option<MaterialId>,
    bound_audio: Option<MaterialId>,
    warmup_queue: VecDeque<MaterialId>,
    /// In-flight preload tagged with the token it was started under.
    warmup_inflight: Option<(u64, MaterialId)>,
    warmup_token: u64,
    seek_deadline: Option<Instant>,
}

impl PlaybackScheduler {
    pub fn new(factory: Box<dyn MediaElementFactory>, config: PoolConfig) -> Self {
        Self {
            clock: PlaybackClock::new(0.0),
            pool: MediaPool::new(config.capacity),
            factory,
            config,
            volume: 1.0,
            bound_video: None,
            bound_audio: None,
            warmup_queue: VecDeque::new(),
            warmup_inflight: None,
            warmup_token: 0,
            seek_deadline: None,
        }
    }

    pub fn clock(&self) -> &PlaybackClock {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut PlaybackClock {
        &mut self.clock
    }

    pub fn pool(&self) -> &MediaPool {
        &self.pool
    }

    // ---- playback API -------------------------------------------------------

    pub fn play(&mut self) {
        self.clock.play();
    }

    pub fn pause(&mut self) {
        self.clock.pause();
        self.pool.pause_all();
    }

    pub fn toggle(&mut self) {
        if self.clock.is_playing() {
            self.pause();
        } else {
            self.play();
        }
    }

    pub fn seek(&mut self, t: f64) {
        self.seek_at(t, Instant::now());
    }

    /// Seek with the belt-and-suspenders sync wait: the next ticks hold the
    /// "seek pending" state until the element confirms a frame at the target
    /// or the deadline expires.
    pub fn seek_at(&mut self, t: f64, now: Instant) {
        self.clock.seek_at(t, now);
        self.seek_deadline = Some(now + SEEK_DEADLINE);
        self.cancel_warmup();
    }

    pub fn seek_sync_pending(&self) -> bool {
        self.seek_deadline.is_some()
    }

    pub fn set_volume(&mut self, volume: f64) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    pub fn set_playback_rate(&mut self, rate: f64) {
        self.clock.set_rate(rate);
    }

    pub fn state(&self) -> PlaybackState {
        PlaybackState {
            current_time: self.clock.current_time(),
            is_playing: self.clock.is_playing(),
            duration: self.clock.duration(),
            volume: self.volume,
        }
    }

    pub fn cancel_warmup(&mut self) {
        self.warmup_token += 1;
        self.warmup_queue.clear();
        self.warmup_inflight = None;
    }

    // ---- controller tick ----------------------------------------------------

    pub fn tick(&mut self, timeline: &Timeline, now: Instant) -> TickResult {
        self.clock.set_duration(timeline.duration());

        if self.clock.check_ended_at(now) {
            self.pool.pause_all();
            return TickResult {
                time: 0.0,
                eos: true,
                frame: None,
            };
        }

        let t = self.clock.current_time_at(now);
        let playing = self.clock.is_playing();
        self.pool.poll_pending(now);

        // Bind + drift-correct the active video and audio elements.
        let video_material = timeline
            .video_clip_at(t)
            .and_then(|cid| timeline.clip(cid))
            .and_then(|c| c.material.map(|m| (m, c.source_time_at(t))));
        let audio_material = timeline
            .audio_clip_at(t)
            .and_then(|cid| timeline.clip(cid))
            .and_then(|c| c.material.map(|m| (m, c.source_time_at(t))));

        self.bound_video = self.bind_element(timeline, video_material, playing, now);
        self.bound_audio = self.bind_element(timeline, audio_material, playing, now);

        // Resolve seek-sync: cleared once the video element has the frame, or
        // the deadline passes (elements in odd states must not stall ticks).
        if let Some(deadline) = self.seek_deadline {
            let confirmed = match self.bound_video.and_then(|m| self.pool.get(m)) {
                Some(element) => !element.seek_pending(),
                None => false,
            };
            if confirmed {
                self.seek_deadline = None;
            } else if now >= deadline {
                tracing::debug!("seek sync deadline expired; continuing");
                self.seek_deadline = None;
            }
        }

        self.warmup(timeline, t, now);

        let frame = self
            .bound_video
            .and_then(|m| self.pool.get(m))
            .and_then(|element| element.current_frame());

        TickResult {
            time: t,
            eos: false,
            frame,
        }
    }

    fn bind_element(
        &mut self,
        timeline: &Timeline,
        binding: Option<(MaterialId, f64)>,
        playing: bool,
        now: Instant,
    ) -> Option<MaterialId> {
        let (material_id, desired) = binding?;
        if !self.pool.has(material_id) {
            let material = timeline.material(material_id)?;
            if let Err(err) = self.pool.preload(material_id, material, &*self.factory, now) {
                tracing::warn!(?material_id, %err, "bind preload failed");
                return None;
            }
            self.pool.poll_pending(now);
        }
        let drift = if playing { DRIFT_PLAYING } else { DRIFT_PAUSED };
        if let Some(element) = self.pool.get(material_id) {
            if (element.current_time() - desired).abs() > drift {
                element.seek(desired);
            }
            if playing {
                element.play();
            } else {
                element.pause();
            }
        }
        Some(material_id)
    }

    /// Rebuild the warmup queue from the lookahead window and pump one item.
    ///
    /// Priorities: transition-adjacent clips load first, then clips whose
    /// range intersects the window, futures before pasts, nearer first. A
    /// single in-flight preload at a time keeps the pool from thrashing.
    fn warmup(&mut self, timeline: &Timeline, t: f64, now: Instant) {
        let mut wanted: Vec<(u32, f64, MaterialId)> = Vec::new();

        for (_, tr) in timeline.transitions() {
            for cid in [tr.from, tr.to] {
                if let Some(clip) = timeline.clip(cid)
                    && let Some(m) = clip.material
                {
                    let dist = (clip.start_time - t).abs();
                    wanted.push((0, dist, m));
                }
            }
        }

        let window_start = t - self.config.look_behind;
        let window_end = t + self.config.look_ahead;
        for (_, track) in timeline.tracks_in_order() {
            if !matches!(track.kind, TrackKind::Video | TrackKind::Audio) {
                continue;
            }
            for &cid in &track.clips {
                let Some(clip) = timeline.clip(cid) else {
                    continue;
                };
                let Some(m) = clip.material else {
                    continue;
                };
                if clip.end_time() < window_start || clip.start_time > window_end {
                    continue;
                }
                // Futures rank ahead of pasts, nearer ahead of farther.
                let (bucket, dist) = if clip.end_time() <= t {
                    (2, t - clip.end_time())
                } else {
                    (1, (clip.start_time - t).max(0.0))
                };
                wanted.push((bucket, dist, m));
            }
        }

        wanted.sort_by(|a, b| {
            (a.0, a.1)
                .partial_cmp(&(b.0, b.1))
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        self.warmup_queue.clear();
        let mut seen = std::collections::BTreeSet::new();
        for (_, _, m) in wanted {
            if seen.insert(m) && !self.pool.has(m) {
                self.warmup_queue.push_back(m);
            }
        }

        // Single-task guarantee: at most one warmup preload is in flight. A
        // cancel bumps the token, so a stale in-flight load is abandoned here
        // (its pool entry survives; future consumers may still use it).
        if let Some((token, inflight)) = self.warmup_inflight {
            if token == self.warmup_token && self.pool.is_pending(inflight) {
                return;
            }
            self.warmup_inflight = None;
        }
        if let Some(next) = self.warmup_queue.pop_front()
            && let Some(material) = timeline.material(next)
        {
            match self.pool.preload(next, material, &*self.factory, now) {
                Ok(PreloadStatus::Pending) => {
                    self.warmup_inflight = Some((self.warmup_token, next));
                }
                Ok(PreloadStatus::Ready) => {}
                Err(err) => {
                    tracing::warn!(material = ?next, %err, "warmup preload failed");
                }
            }
        }
    }
}

impl FrameSource for PlaybackScheduler {
    fn frame(&mut self, material: MaterialId, source_time: f64) -> Option<Arc<Surface>> {
        let element = self.pool.get(material)?;
        if (element.current_time() - source_time).abs() > DRIFT_PAUSED {
            element.seek(source_time);
        }
        element.current_frame()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::core::{Canvas, Fps};
    use crate::foundation::error::CutlineResult;
    use crate::media::element::MediaElement;
    use crate::model::material::{Material, MaterialKind};
    use crate::model::timeline::ClipSpec;

    struct StubElement {
        source: String,
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
            Some(Arc::new(Surface::solid(4, 4, [255, 0, 0, 255])))
        }
    }

    struct StubFactory;

    impl MediaElementFactory for StubFactory {
        fn create(&self, material: &Material) -> CutlineResult<Box<dyn MediaElement>> {
            Ok(Box::new(StubElement {
                source: material.source.clone(),
                ready: false,
                playing: false,
                time: 0.0,
            }))
        }
    }

    fn timeline_with_clip() -> (Timeline, MaterialId) {
        let mut tl = Timeline::new(
            "t",
            Canvas {
                width: 64,
                height: 36,
            },
            Fps::new(30, 1).unwrap(),
        );
        let m = tl.add_material_direct(Material {
            name: "m".to_string(),
            kind: MaterialKind::Video,
            duration: 10.0,
            width: 64,
            height: 36,
            source: "m.mp4".to_string(),
            alt_sources: vec![],
            thumbnail: None,
        });
        let track = tl.add_track_direct(TrackKind::Video, None);
        tl.add_clip_direct(
            track,
            ClipSpec {
                material: Some(m),
                start_time: 0.0,
                duration: 10.0,
                in_point: 0.0,
                out_point: 10.0,
                volume: 1.0,
                ..Default::default()
            },
        )
        .unwrap();
        (tl, m)
    }

    fn scheduler() -> PlaybackScheduler {
        PlaybackScheduler::new(Box::new(StubFactory), PoolConfig::default())
    }

    #[test]
    fn tick_binds_and_returns_frame() {
        let (tl, m) = timeline_with_clip();
        let mut s = scheduler();
        let now = Instant::now();
        s.seek_at(5.0, now);
        // First tick may need to complete the preload; second must have it.
        s.tick(&tl, now);
        let result = s.tick(&tl, now);
        assert!(!result.eos);
        assert!(result.frame.is_some());
        assert!(s.pool().is_ready(m));
    }

    #[test]
    fn tick_seeks_element_to_source_time() {
        let (mut tl, m) = timeline_with_clip();
        // Shift the clip's source window.
        let cid = tl.active_clips(5.0)[0];
        tl.update_clip_direct(
            cid,
            &crate::model::timeline::ClipPatch {
                in_point: Some(2.0),
                out_point: Some(10.0),
                ..Default::default()
            },
        );
        let mut s = scheduler();
        let now = Instant::now();
        s.seek_at(5.0, now);
        s.tick(&tl, now);
        s.tick(&tl, now);
        let element = s.pool.get(m).unwrap();
        assert!((element.current_time() - 7.0).abs() < DRIFT_PAUSED + 1e-9);
    }

    #[test]
    fn ended_tick_reports_eos_once() {
        let (tl, _) = timeline_with_clip();
        let mut s = scheduler();
        let now = Instant::now();
        s.play();
        // Force the clock past the end.
        s.clock_mut().seek_at(9.999, now);
        let later = now + Duration::from_secs(1);
        let result = s.tick(&tl, later);
        assert!(result.eos);
        let result = s.tick(&tl, later);
        assert!(!result.eos);
        assert!(!s.clock().is_playing());
    }

    #[test]
    fn warmup_preloads_upcoming_clip() {
        let (mut tl, _) = timeline_with_clip();
        let m2 = tl.add_material_direct(Material {
            name: "m2".to_string(),
            kind: MaterialKind::Video,
            duration: 10.0,
            width: 64,
            height: 36,
            source: "m2.mp4".to_string(),
            alt_sources: vec![],
            thumbnail: None,
        });
        let track = tl.tracks_in_order().next().unwrap().0;
        tl.add_clip_direct(
            track,
            ClipSpec {
                material: Some(m2),
                start_time: 10.0,
                duration: 5.0,
                in_point: 0.0,
                out_point: 5.0,
                volume: 1.0,
                ..Default::default()
            },
        )
        .unwrap();

        let mut s = scheduler();
        let now = Instant::now();
        s.seek_at(8.0, now);
        s.tick(&tl, now);
        // Clip 2 starts at 10.0, within the 3 s lookahead from 8.0.
        assert!(s.pool().has(m2));
    }

    #[test]
    fn seek_sync_clears_when_element_confirms() {
        let (tl, _) = timeline_with_clip();
        let mut s = scheduler();
        let now = Instant::now();
        s.seek_at(3.0, now);
        assert!(s.seek_sync_pending());
        s.tick(&tl, now);
        s.tick(&tl, now);
        assert!(!s.seek_sync_pending());
    }

    #[test]
    fn state_reports_clock_and_volume() {
        let (tl, _) = timeline_with_clip();
        let mut s = scheduler();
        let now = Instant::now();
        s.set_volume(0.4);
        s.tick(&tl, now);
        let state = s.state();
        assert_eq!(state.volume, 0.4);
        assert_eq!(state.duration, 10.0);
        assert!(!state.is_playing);
    }
}
