//! End-to-end behavior of the composition pipeline against known timelines.

mod support;

use cutline::{
    AnimatedProperty, Easing, EffectEnvelope, EffectKind, EnvelopeKind, Pipeline, ProgramId,
    RenderOptions, TransitionKind, evaluate, make_matrix,
};
use support::*;

fn pipeline() -> Pipeline {
    let canvas = test_canvas();
    Pipeline::new(canvas.width, canvas.height, RenderOptions::default()).unwrap()
}

#[test]
fn single_clip_passthrough_uses_basic_program() {
    let mut tl = new_timeline();
    let m = video_material(&mut tl, "a", 10.0);
    let track = add_video_track(&mut tl);
    tl.add_clip_direct(track, clip_spec(m, 0.0, 10.0)).unwrap();

    let mut p = pipeline();
    let mut source = RecordingSource::new((64, 36));
    let report = p.render_frame(&tl, 5.0, &mut source).unwrap();

    assert_eq!(report.program, Some(ProgramId::Basic));
    assert!(report.transition.is_none());
    assert_eq!(report.effect_draws, 0);
    assert_eq!(report.overlays, 0);
    assert!(!report.media_missing);

    // The media element was asked for the exact source time.
    let requests = source.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].0, m);
    assert!((requests[0].1 - 5.0).abs() <= 0.1);

    // The frame actually contains the clip's pixels.
    let center = p.backbuffer().pixel(32, 18);
    assert_eq!(center, material_color(m));
}

#[test]
fn dissolve_transition_at_midpoint() {
    let mut tl = new_timeline();
    let m = video_material(&mut tl, "a", 20.0);
    let track = add_video_track(&mut tl);
    let a = tl.add_clip_direct(track, clip_spec(m, 0.0, 4.0)).unwrap();
    let b = {
        let mut spec = clip_spec(m, 4.0, 4.0);
        spec.in_point = 10.0;
        spec.out_point = 14.0;
        tl.add_clip_direct(track, spec).unwrap()
    };
    tl.add_transition_direct(a, b, TransitionKind::Dissolve, 1.0)
        .unwrap();

    let mut p = pipeline();
    let mut source = RecordingSource::new((64, 36));
    let report = p.render_frame(&tl, 4.0, &mut source).unwrap();

    let (kind, eased) = report.transition.unwrap();
    assert_eq!(kind, TransitionKind::Dissolve);
    // Shared cubic-in-out curve: ease(0.5) == 0.5.
    assert!((eased - 0.5).abs() < 1e-9);
    assert_eq!(report.program, Some(ProgramId::Transition));

    // Both sides were acquired at their own source times.
    let requests = source.requests();
    assert_eq!(requests.len(), 2);
    assert!((requests[0].1 - 4.0).abs() < 1e-9); // A: in 0 + (4 - 0)
    assert!((requests[1].1 - 10.0).abs() < 1e-9); // B: in 10 + (4 - 4)
}

#[test]
fn animated_scale_keyframes_drive_matrix() {
    let mut tl = new_timeline();
    let m = video_material(&mut tl, "a", 10.0);
    let track = add_video_track(&mut tl);
    let clip = tl.add_clip_direct(track, clip_spec(m, 0.0, 10.0)).unwrap();
    tl.add_keyframe_direct(clip, AnimatedProperty::Scale, 0.0, 1.0, Easing::EaseInOutCubic)
        .unwrap();
    tl.add_keyframe_direct(clip, AnimatedProperty::Scale, 2.0, 2.0, Easing::Linear)
        .unwrap();

    // Pure evaluation: ease-in-out-cubic(0.5) = 0.5, so scale is 1.5.
    let anim = &tl.clip(clip).unwrap().animation;
    let tr = evaluate(anim, 1.0);
    assert_eq!(tr.scale_x, 1.5);
    assert_eq!(tr.scale_y, 1.5);
    let mat = make_matrix(&tr);
    assert_eq!(mat.get(0, 0), 1.5);
    assert_eq!(mat.get(1, 1), 1.5);
    assert_eq!(mat.get(0, 3), 0.0);
    assert_eq!(mat.get(1, 3), 0.0);

    // And the pipeline selects the animated program for it.
    let mut p = pipeline();
    let mut source = RecordingSource::new((64, 36));
    let report = p.render_frame(&tl, 1.0, &mut source).unwrap();
    assert_eq!(report.program, Some(ProgramId::Animated));
}

#[test]
fn effect_chain_runs_after_base_pass() {
    let mut tl = new_timeline();
    let m = video_material(&mut tl, "a", 10.0);
    let track = add_video_track(&mut tl);
    let clip = tl.add_clip_direct(track, clip_spec(m, 0.0, 10.0)).unwrap();
    tl.add_effect_direct(clip, EffectKind::Invert, 0.0, None)
        .unwrap();
    tl.add_effect_direct(
        clip,
        EffectKind::Vignette {
            radius: 0.5,
            softness: 0.3,
        },
        0.0,
        None,
    )
    .unwrap();

    let mut p = pipeline();
    let mut source = RecordingSource::new((64, 36));
    let report = p.render_frame(&tl, 2.0, &mut source).unwrap();
    assert_eq!(report.program, Some(ProgramId::Basic));
    assert_eq!(report.effect_draws, 2);

    // Inverted clip color must differ from the raw material color.
    let center = p.backbuffer().pixel(32, 18);
    assert_ne!(center, material_color(m));
}

#[test]
fn effect_outside_active_window_is_not_drawn() {
    let mut tl = new_timeline();
    let m = video_material(&mut tl, "a", 10.0);
    let track = add_video_track(&mut tl);
    let clip = tl.add_clip_direct(track, clip_spec(m, 0.0, 10.0)).unwrap();
    tl.add_effect_direct(clip, EffectKind::Invert, 6.0, Some(2.0))
        .unwrap();

    let mut p = pipeline();
    let mut source = RecordingSource::new((64, 36));
    let report = p.render_frame(&tl, 2.0, &mut source).unwrap();
    assert_eq!(report.effect_draws, 0);
    // Outside the window the frame passes through untouched.
    assert_eq!(p.backbuffer().pixel(32, 18), material_color(m));
}

#[test]
fn flash_envelope_intensity_profile() {
    let effect = cutline::EffectInstance {
        id: cutline::EffectId(1),
        kind: EffectKind::Flash,
        start_time: 1.0,
        duration: 1.0,
        intensity: 1.0,
        enter: Some(EffectEnvelope {
            kind: EnvelopeKind::EaseIn,
            duration: 0.2,
        }),
        exit: Some(EffectEnvelope {
            kind: EnvelopeKind::EaseOut,
            duration: 0.2,
        }),
        enabled: true,
        order: 0,
    };
    assert!((effect.intensity_at(1.1) - 0.25).abs() < 1e-12);
    assert!((effect.intensity_at(1.5) - 1.0).abs() < 1e-12);
    assert!((effect.intensity_at(1.9) - 0.75).abs() < 1e-12);
}

#[test]
fn missing_media_renders_black_and_continues() {
    struct NoFrames;
    impl cutline::FrameSource for NoFrames {
        fn frame(
            &mut self,
            _material: cutline::MaterialId,
            _source_time: f64,
        ) -> Option<std::sync::Arc<cutline::Surface>> {
            None
        }
    }

    let mut tl = new_timeline();
    let m = video_material(&mut tl, "a", 10.0);
    let track = add_video_track(&mut tl);
    tl.add_clip_direct(track, clip_spec(m, 0.0, 10.0)).unwrap();

    let mut p = pipeline();
    let report = p.render_frame(&tl, 5.0, &mut NoFrames).unwrap();
    assert!(report.media_missing);
    assert_eq!(p.backbuffer().pixel(32, 18), [0, 0, 0, 255]);
}

#[test]
fn sticker_overlay_draws_over_video() {
    let mut tl = new_timeline();
    let m = video_material(&mut tl, "a", 10.0);
    let sticker = tl.add_material_direct(cutline::Material {
        name: "badge".to_string(),
        kind: cutline::MaterialKind::Sticker,
        duration: 0.0,
        width: 8,
        height: 8,
        source: "media/badge.png".to_string(),
        alt_sources: vec![],
        thumbnail: None,
    });
    let video_track = add_video_track(&mut tl);
    tl.add_clip_direct(video_track, clip_spec(m, 0.0, 10.0))
        .unwrap();
    let sticker_track = tl.add_track_direct(cutline::TrackKind::Sticker, None);
    tl.add_clip_direct(sticker_track, clip_spec(sticker, 0.0, 10.0))
        .unwrap();

    let mut p = pipeline();
    let mut source = RecordingSource::new((8, 8));
    let report = p.render_frame(&tl, 5.0, &mut source).unwrap();
    assert_eq!(report.overlays, 1);
    // The overlay's pixels land at screen center (default translation).
    assert_eq!(p.backbuffer().pixel(32, 18), material_color(sticker));
}

#[test]
fn engine_tick_composes_through_scheduler() {
    use std::sync::Arc;

    let mut engine = cutline::Engine::new(
        "doc",
        test_canvas(),
        cutline::Fps::new(30, 1).unwrap(),
        cutline::EngineConfig::default(),
        Arc::new(StubFactory),
    )
    .unwrap();

    let m = engine.editor_mut().ingest_material(cutline::Material {
        name: "a".to_string(),
        kind: cutline::MaterialKind::Video,
        duration: 10.0,
        width: 64,
        height: 36,
        source: "media/a.mp4".to_string(),
        alt_sources: vec![],
        thumbnail: None,
    });
    let track = engine
        .editor_mut()
        .add_track(cutline::TrackKind::Video, None)
        .unwrap();
    engine
        .editor_mut()
        .add_clip(track, clip_spec(m, 0.0, 10.0))
        .unwrap();

    engine.seek(5.0);
    // One tick to warm the pool, one to compose with a bound element.
    engine.render_tick().unwrap();
    let tick = engine.render_tick().unwrap();
    assert!(!tick.eos);
    let report = tick.report.unwrap();
    assert_eq!(report.program, Some(ProgramId::Basic));
    assert!(!report.media_missing);

    let state = engine.playback_state();
    assert!(!state.is_playing);
    assert_eq!(state.duration, 10.0);
}
