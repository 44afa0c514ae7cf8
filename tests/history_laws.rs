//! History engine laws: idempotent undo/redo traces, merge windows, bounds.

mod support;

use cutline::{
    Canvas, ClipPatch, Editor, Fps, HistoryConfig, TrackKind,
};
use support::{clip_spec, video_material};

fn editor_with_synthetic_clock(step_ms: u64) -> Editor {
    let mut e = Editor::new(
        "laws",
        Canvas {
            width: 64,
            height: 36,
        },
        Fps::new(30, 1).unwrap(),
        HistoryConfig::default(),
    );
    let mut t = 0u64;
    e.set_timestamp_source(move || {
        t += step_ms;
        t
    });
    e
}

/// Capture the observable state commands mutate, for trace comparison.
fn state_signature(e: &Editor) -> Vec<(u64, String)> {
    let tl = e.timeline();
    let mut sig = Vec::new();
    for (tid, track) in tl.tracks_in_order() {
        sig.push((tid.0, format!("track muted={} locked={}", track.muted, track.locked)));
        for &cid in &track.clips {
            let c = tl.clip(cid).unwrap();
            sig.push((
                cid.0,
                format!(
                    "clip start={:.3} dur={:.3} in={:.3} out={:.3} vol={:.3} fx={}",
                    c.start_time,
                    c.duration,
                    c.in_point,
                    c.out_point,
                    c.volume,
                    c.effects.len()
                ),
            ));
        }
    }
    sig
}

#[test]
fn undo_redo_trace_is_idempotent_at_every_depth() {
    let mut e = editor_with_synthetic_clock(10_000); // no merging
    let m = video_material(e.timeline_mut(), "a", 60.0);
    let track = e.add_track(TrackKind::Video, None).unwrap();
    let clip = e.add_clip(track, clip_spec(m, 0.0, 4.0)).unwrap();
    e.move_clip(clip, 10.0).unwrap();
    e.update_clip(
        clip,
        ClipPatch {
            volume: Some(0.5),
            ..Default::default()
        },
    )
    .unwrap();
    e.toggle_track_mute(track).unwrap();

    // Record the state after each executed command by unwinding fully.
    let final_state = state_signature(&e);
    let mut states = vec![final_state.clone()];
    while e.undo() {
        states.push(state_signature(&e));
    }
    states.reverse(); // states[depth] = state after `depth` commands

    // Redo forward: every depth must reproduce its recorded state.
    for depth in 1..states.len() {
        assert!(e.redo(), "redo exhausted at depth {depth}");
        assert_eq!(state_signature(&e), states[depth], "depth {depth}");
    }
    assert_eq!(state_signature(&e), final_state);

    // And a second full undo/redo cycle is stable.
    while e.undo() {}
    assert_eq!(state_signature(&e), states[0]);
    while e.redo() {}
    assert_eq!(state_signature(&e), final_state);
}

#[test]
fn merge_window_collapses_same_clip_moves() {
    let mut e = editor_with_synthetic_clock(100);
    let m = video_material(e.timeline_mut(), "a", 60.0);
    let track = e.add_track(TrackKind::Video, None).unwrap();
    let clip = e.add_clip(track, clip_spec(m, 0.0, 4.0)).unwrap();
    let depth = e.history().undo_depth();

    e.move_clip(clip, 5.0).unwrap();
    e.move_clip(clip, 7.0).unwrap();

    // 100 ms apart, inside the 300 ms window: one entry.
    assert_eq!(e.history().undo_depth(), depth + 1);
    assert_eq!(e.timeline().clip(clip).unwrap().start_time, 7.0);

    assert!(e.undo());
    assert_eq!(e.timeline().clip(clip).unwrap().start_time, 0.0);
    assert!(e.redo());
    assert_eq!(e.timeline().clip(clip).unwrap().start_time, 7.0);
}

#[test]
fn commands_on_different_clips_never_merge() {
    let mut e = editor_with_synthetic_clock(50);
    let m = video_material(e.timeline_mut(), "a", 60.0);
    let track = e.add_track(TrackKind::Video, None).unwrap();
    let c1 = e.add_clip(track, clip_spec(m, 0.0, 2.0)).unwrap();
    let c2 = e.add_clip(track, clip_spec(m, 5.0, 2.0)).unwrap();
    let depth = e.history().undo_depth();

    e.move_clip(c1, 10.0).unwrap();
    e.move_clip(c2, 20.0).unwrap();
    assert_eq!(e.history().undo_depth(), depth + 2);
}

#[test]
fn history_depth_is_bounded() {
    let mut e = Editor::new(
        "bounded",
        Canvas {
            width: 64,
            height: 36,
        },
        Fps::new(30, 1).unwrap(),
        HistoryConfig {
            max_stack_size: 10,
            merge_window_ms: 0,
            enable_grouping: true,
        },
    );
    let mut t = 0u64;
    e.set_timestamp_source(move || {
        t += 10_000;
        t
    });
    let m = video_material(e.timeline_mut(), "a", 60.0);
    let track = e.add_track(TrackKind::Video, None).unwrap();
    let clip = e.add_clip(track, clip_spec(m, 0.0, 2.0)).unwrap();

    for i in 0..50 {
        e.move_clip(clip, f64::from(i) * 3.0).unwrap();
    }
    assert_eq!(e.history().undo_depth(), 10);

    // Oldest entries were dropped; undo drains exactly max_stack_size steps.
    let mut undone = 0;
    while e.undo() {
        undone += 1;
    }
    assert_eq!(undone, 10);
}

#[test]
fn grouped_transaction_is_one_history_entry() {
    let mut e = editor_with_synthetic_clock(10_000);
    let m = video_material(e.timeline_mut(), "a", 60.0);
    let track = e.add_track(TrackKind::Video, None).unwrap();
    let clip = e.add_clip(track, clip_spec(m, 0.0, 2.0)).unwrap();
    let depth = e.history().undo_depth();

    e.begin_group("Composite edit");
    e.move_clip(clip, 8.0).unwrap();
    e.update_clip(
        clip,
        ClipPatch {
            volume: Some(0.25),
            ..Default::default()
        },
    )
    .unwrap();
    e.end_group();

    assert_eq!(e.history().undo_depth(), depth + 1);
    assert!(e.undo());
    let c = e.timeline().clip(clip).unwrap();
    assert_eq!(c.start_time, 0.0);
    assert_eq!(c.volume, 1.0);
}

#[test]
fn remove_clip_undo_restores_transitions() {
    let mut e = editor_with_synthetic_clock(10_000);
    let m = video_material(e.timeline_mut(), "a", 60.0);
    let track = e.add_track(TrackKind::Video, None).unwrap();
    let a = e.add_clip(track, clip_spec(m, 0.0, 4.0)).unwrap();
    let b = e.add_clip(track, clip_spec(m, 4.0, 4.0)).unwrap();
    e.add_transition(a, b, cutline::TransitionKind::Fade, 1.0)
        .unwrap();

    e.remove_clip(b).unwrap();
    assert_eq!(e.timeline().transitions().count(), 0);

    assert!(e.undo());
    assert!(e.timeline().clip(b).is_some());
    assert_eq!(e.timeline().transitions().count(), 1);
}
