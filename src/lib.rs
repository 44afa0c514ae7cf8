//! Cutline is a non-linear video editing engine.
//!
//! The core turns a timeline of clips, transitions, effects, and keyframe
//! animations into rendered frames, and makes every edit undoable.
//!
//! # Pipeline overview
//!
//! 1. **Edit**: the [`Editor`] wraps every mutation in a [`Command`] so the
//!    [`HistoryEngine`] can undo, redo, merge, and group it.
//! 2. **Schedule**: the [`PlaybackScheduler`] advances a wallclock-anchored
//!    clock, keeps a bounded LRU pool of media elements warm around the
//!    playhead, and drift-corrects them against the timeline.
//! 3. **Compose**: the [`Pipeline`] resolves what is visible at the tick time
//!    and dispatches the basic/animated/transition/overlay programs plus the
//!    ping-pong effect chain, all under a sandboxed device state.
//! 4. **Export**: a second, isolated pipeline renders frame-exactly and
//!    streams into the system `ffmpeg` binary, with offline audio mixing.
//!
//! Key design constraints:
//!
//! - **No unsafe**: `unsafe` is forbidden in this crate.
//! - **Single-threaded cooperative core**: edits, ticks, and composition run
//!   on one thread; only per-pixel kernels fan out (rayon) and media IO runs
//!   in subprocesses.
//! - **Premultiplied RGBA8** end-to-end in the render path.
//! - **Stable ids**: entity handles are never recycled, so undo/redo restores
//!   snapshots under their original identities.
#![forbid(unsafe_code)]

mod animation;
mod audio;
mod engine;
mod export;
mod foundation;
mod history;
mod media;
mod model;
mod playback;
mod project;
mod render;
mod subtitle;

pub use animation::ease::Easing;
pub use animation::evaluator::{
    AnimatedTransform, binary_search_keyframe, evaluate, make_affine, make_matrix, track_value,
};
pub use audio::mix::{AudioManifest, AudioSegment, build_audio_manifest, mix_manifest};
pub use engine::{Engine, EngineTick};
pub use export::encoder::{AudioInputConfig, EncodeConfig, FfmpegEncoder};
pub use export::exporter::{ExportQuality, ExportRequest, export, export_to_path};
pub use foundation::core::{Canvas, Fps, TimeRange};
pub use foundation::error::{CutlineError, CutlineResult};
pub use foundation::math::Mat4;
pub use history::command::{Command, CommandKind};
pub use history::engine::HistoryEngine;
pub use media::decode::{
    AudioPcm, MIX_SAMPLE_RATE, MediaProbe, decode_audio_f32_stereo, decode_video_frame_rgba8,
    is_ffmpeg_on_path, probe_media,
};
pub use media::element::{
    FfmpegElementFactory, FfmpegMediaElement, ImageMediaElement, MediaElement, MediaElementFactory,
};
pub use model::animation::{
    AnimatedProperty, AnimationTrack, AnimationTrackId, ClipAnimation, Keyframe, KeyframeId,
};
pub use model::clip::{Clip, ClipId, ClipTransform, ColorFilters, CropMode, TextContent};
pub use model::effect::{EffectEnvelope, EffectId, EffectInstance, EffectKind, EnvelopeKind};
pub use model::material::{Material, MaterialId, MaterialKind, ThumbnailSprite};
pub use model::timeline::{
    ChangeEvent, ClipPatch, ClipSpec, EffectSeed, RemovedTrack, Timeline,
};
pub use model::track::{Track, TrackId, TrackKind};
pub use model::transition::{Transition, TransitionId, TransitionKind};
pub use playback::clock::PlaybackClock;
pub use playback::pool::{MediaPool, PreloadStatus};
pub use playback::scheduler::{PlaybackScheduler, PlaybackState, TickResult};
pub use project::config::{EngineConfig, HistoryConfig, PoolConfig, QuotaConfig};
pub use project::editor::Editor;
pub use project::quota::{MaterialStore, QuotaManager, QuotaStatus, StoreEntry, SweepOutcome};
pub use project::records::{
    ClipRecord, MaterialRecord, ProjectRecord, TrackRecord, TransitionRecord,
};
pub use render::compositor::{FrameReport, FrameSource, Pipeline};
pub use render::context::{
    CompiledProgram, DeviceState, PowerPreference, ProgramId, RenderContext, RenderOptions,
    StateScope, TextureSource,
};
pub use render::effects::{EffectChain, EffectInput};
pub use render::programs::{OverlayParams, fit_rect, transition_ease};
pub use render::surface::{Surface, SurfacePool, SurfacePoolOpts};
pub use subtitle::SubtitleRenderer;
