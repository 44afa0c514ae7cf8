//! Structural invariants of the timeline under edit sequences.

mod support;

use cutline::{TrackId, TrackKind};
use support::*;

/// Tiny deterministic generator; keeps these property-style tests seedable.
struct Xorshift(u64);

impl Xorshift {
    fn next(&mut self) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0
    }

    fn f64_in(&mut self, lo: f64, hi: f64) -> f64 {
        let unit = (self.next() % 10_000) as f64 / 10_000.0;
        lo + unit * (hi - lo)
    }
}

#[test]
fn random_add_move_sequences_never_overlap() {
    for seed in 1..=8u64 {
        let mut rng = Xorshift(seed.wrapping_mul(0x9e37_79b9_7f4a_7c15));
        let mut tl = new_timeline();
        let m = video_material(&mut tl, "a", 1000.0);
        let tracks: Vec<TrackId> = (0..3).map(|_| add_video_track(&mut tl)).collect();
        let mut clips = Vec::new();

        for step in 0..120 {
            let track = tracks[(rng.next() % tracks.len() as u64) as usize];
            match step % 3 {
                0 => {
                    let start = rng.f64_in(0.0, 60.0);
                    let duration = rng.f64_in(0.5, 8.0);
                    let id = tl
                        .add_clip_direct(track, clip_spec(m, start, duration))
                        .unwrap();
                    clips.push(id);
                }
                1 if !clips.is_empty() => {
                    let id = clips[(rng.next() % clips.len() as u64) as usize];
                    tl.move_clip_direct(id, rng.f64_in(0.0, 60.0));
                }
                _ if !clips.is_empty() => {
                    let id = clips[(rng.next() % clips.len() as u64) as usize];
                    tl.move_clip_to_track_direct(id, track, Some(rng.f64_in(0.0, 60.0)));
                }
                _ => {}
            }
            tl.assert_no_overlaps()
                .unwrap_or_else(|e| panic!("seed {seed} step {step}: {e}"));
        }
    }
}

#[test]
fn insert_into_occupied_slot_pushes_right() {
    let mut tl = new_timeline();
    let m = video_material(&mut tl, "a", 100.0);
    let track = add_video_track(&mut tl);
    tl.add_clip_direct(track, clip_spec(m, 2.0, 3.0)).unwrap();

    // Requested [3, 5) overlaps the existing [2, 5); lands at 5.
    let c = tl.add_clip_direct(track, clip_spec(m, 3.0, 2.0)).unwrap();
    let clip = tl.clip(c).unwrap();
    assert_eq!(clip.start_time, 5.0);
    assert_eq!(clip.duration, 2.0);
    tl.assert_no_overlaps().unwrap();
}

#[test]
fn split_produces_contiguous_coverage() {
    let mut tl = new_timeline();
    let m = video_material(&mut tl, "a", 100.0);
    let track = add_video_track(&mut tl);

    for (start, duration, at) in [(0.0, 10.0, 2.5), (20.0, 4.0, 23.9), (30.0, 1.0, 30.5)] {
        let mut spec = clip_spec(m, start, duration);
        spec.in_point = 1.0;
        spec.out_point = 1.0 + duration;
        let c = tl.add_clip_direct(track, spec).unwrap();
        let (left, right) = tl.split_clip_direct(c, at).unwrap();
        let l = tl.clip(left).unwrap();
        let r = tl.clip(right).unwrap();

        assert_eq!(l.start_time, start);
        assert!((l.end_time() - at).abs() < 1e-9);
        assert!((r.start_time - at).abs() < 1e-9);
        assert!((r.end_time() - (start + duration)).abs() < 1e-9);
        // Source mapping is continuous across the cut.
        assert!((l.out_point - r.in_point).abs() < 1e-9);
    }
    tl.assert_no_overlaps().unwrap();
}

#[test]
fn split_distributes_effects_and_keyframes() {
    use cutline::{AnimatedProperty, Easing, EffectKind};

    let mut tl = new_timeline();
    let m = video_material(&mut tl, "a", 100.0);
    let track = add_video_track(&mut tl);
    let c = tl.add_clip_direct(track, clip_spec(m, 0.0, 10.0)).unwrap();

    // Effect fully before the cut, one spanning it, one after.
    tl.add_effect_direct(c, EffectKind::Invert, 0.0, Some(2.0)).unwrap();
    tl.add_effect_direct(c, EffectKind::Flash, 3.0, Some(4.0)).unwrap();
    tl.add_effect_direct(c, EffectKind::Invert, 8.0, Some(1.0)).unwrap();
    tl.add_keyframe_direct(c, AnimatedProperty::Opacity, 1.0, 0.2, Easing::Linear)
        .unwrap();
    tl.add_keyframe_direct(c, AnimatedProperty::Opacity, 9.0, 0.9, Easing::Linear)
        .unwrap();

    let (left, right) = tl.split_clip_direct(c, 4.0).unwrap();
    let l = tl.clip(left).unwrap();
    let r = tl.clip(right).unwrap();

    // Left: the early effect plus the truncated spanning one.
    assert_eq!(l.effects.len(), 2);
    assert!((l.effects[1].start_time - 3.0).abs() < 1e-9);
    assert!((l.effects[1].duration - 1.0).abs() < 1e-9);

    // Right: the spanning effect rebased to zero, plus the late one.
    assert_eq!(r.effects.len(), 2);
    assert_eq!(r.effects[0].start_time, 0.0);
    assert!((r.effects[0].duration - 3.0).abs() < 1e-9);
    assert!((r.effects[1].start_time - 4.0).abs() < 1e-9);

    // Keyframes land on their respective sides, rebased on the right.
    let l_keys = &l.animation.track(AnimatedProperty::Opacity).unwrap().keyframes;
    assert_eq!(l_keys.len(), 1);
    assert_eq!(l_keys[0].time, 1.0);
    let r_keys = &r.animation.track(AnimatedProperty::Opacity).unwrap().keyframes;
    assert_eq!(r_keys.len(), 1);
    assert_eq!(r_keys[0].time, 5.0);
}

#[test]
fn track_queries_respect_kind_and_mute() {
    let mut tl = new_timeline();
    let m = video_material(&mut tl, "a", 100.0);
    let v1 = add_video_track(&mut tl);
    let v2 = add_video_track(&mut tl);
    let audio = tl.add_track_direct(TrackKind::Audio, None);

    let c1 = tl.add_clip_direct(v1, clip_spec(m, 0.0, 10.0)).unwrap();
    let c2 = tl.add_clip_direct(v2, clip_spec(m, 0.0, 10.0)).unwrap();
    let a = tl.add_clip_direct(audio, clip_spec(m, 0.0, 10.0)).unwrap();

    // First unmuted video track wins.
    assert_eq!(tl.video_clip_at(5.0), Some(c1));
    tl.set_track_muted_direct(v1, true);
    assert_eq!(tl.video_clip_at(5.0), Some(c2));

    assert_eq!(tl.audio_clip_at(5.0), Some(a));
    assert_eq!(tl.active_clips(5.0).len(), 3);
    assert!(tl.active_clips(15.0).is_empty());
}

#[test]
fn duration_tracks_latest_clip_end() {
    let mut tl = new_timeline();
    assert_eq!(tl.duration(), 0.0);
    let m = video_material(&mut tl, "a", 100.0);
    let track = add_video_track(&mut tl);
    tl.add_clip_direct(track, clip_spec(m, 0.0, 4.0)).unwrap();
    let far = tl.add_clip_direct(track, clip_spec(m, 10.0, 5.0)).unwrap();
    assert_eq!(tl.duration(), 15.0);
    tl.remove_clip_direct(far);
    assert_eq!(tl.duration(), 4.0);
}
