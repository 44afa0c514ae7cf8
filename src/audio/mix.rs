use std::path::Path;
use std::sync::Arc;

use crate::foundation::error::{CutlineError, CutlineResult};
use crate::media::decode::AudioPcm;
use crate::model::material::{Material, MaterialKind};
use crate::model::timeline::Timeline;
use crate::model::track::TrackKind;

/// One clip's contribution to the offline mix.
#[derive(Clone, Debug)]
pub struct AudioSegment {
    pub source_interleaved_f32: Arc<Vec<f32>>,
    pub source_sample_rate: u32,
    pub source_channels: u16,
    pub timeline_start_sample: u64,
    pub timeline_end_sample: u64,
    pub source_start_sec: f64,
    pub source_end_sec: Option<f64>,
    pub volume: f32,
    pub playback_rate: f64,
}

#[derive(Clone, Debug)]
pub struct AudioManifest {
    pub sample_rate: u32,
    pub channels: u16,
    pub total_samples: u64,
    pub segments: Vec<AudioSegment>,
}

fn sec_to_sample(sec: f64, sample_rate: u32) -> u64 {
    (sec.max(0.0) * f64::from(sample_rate)).round() as u64
}

/// Collect audible clips (audio tracks plus video clips with embedded audio)
/// into mixable segments. `decoder` supplies PCM per material; export wires it
/// to the ffmpeg decode, tests to synthetic buffers.
pub fn build_audio_manifest(
    timeline: &Timeline,
    duration_secs: f64,
    sample_rate: u32,
    decoder: &mut dyn FnMut(&Material) -> CutlineResult<AudioPcm>,
) -> CutlineResult<AudioManifest> {
    let mut segments = Vec::new();

    for (_, track) in timeline.tracks_in_order() {
        if track.muted || !matches!(track.kind, TrackKind::Audio | TrackKind::Video) {
            continue;
        }
        for &cid in &track.clips {
            let Some(clip) = timeline.clip(cid) else {
                continue;
            };
            if clip.volume <= 0.0 {
                continue;
            }
            let Some(mid) = clip.material else {
                continue;
            };
            let Some(material) = timeline.material(mid) else {
                continue;
            };
            if !matches!(material.kind, MaterialKind::Audio | MaterialKind::Video) {
                continue;
            }

            let pcm = match decoder(material) {
                Ok(pcm) => pcm,
                Err(err) => {
                    tracing::warn!(%err, material = %material.name, "audio decode skipped");
                    continue;
                }
            };
            if pcm.interleaved_f32.is_empty() || pcm.channels == 0 {
                continue;
            }

            let clip_end = clip.end_time().min(duration_secs);
            if clip_end <= clip.start_time {
                continue;
            }
            segments.push(AudioSegment {
                source_interleaved_f32: Arc::new(pcm.interleaved_f32),
                source_sample_rate: pcm.sample_rate,
                source_channels: pcm.channels,
                timeline_start_sample: sec_to_sample(clip.start_time, sample_rate),
                timeline_end_sample: sec_to_sample(clip_end, sample_rate),
                source_start_sec: clip.in_point,
                source_end_sec: Some(clip.out_point),
                volume: clip.volume,
                playback_rate: 1.0,
            });
        }
    }

    Ok(AudioManifest {
        sample_rate,
        channels: 2,
        total_samples: sec_to_sample(duration_secs, sample_rate),
        segments,
    })
}

/// Mix all manifest segments into interleaved output PCM.
pub fn mix_manifest(manifest: &AudioManifest) -> Vec<f32> {
    let frames = manifest.total_samples as usize;
    let mut out = vec![0.0f32; frames * usize::from(manifest.channels)];

    for seg in &manifest.segments {
        mix_segment(&mut out, manifest, seg);
    }

    for s in &mut out {
        *s = s.clamp(-1.0, 1.0);
    }
    out
}

fn mix_segment(out: &mut [f32], manifest: &AudioManifest, seg: &AudioSegment) {
    let seg_len_samples = seg
        .timeline_end_sample
        .saturating_sub(seg.timeline_start_sample);
    if seg_len_samples == 0 {
        return;
    }

    let src = seg.source_interleaved_f32.as_ref();
    let src_frames = src.len() / usize::from(seg.source_channels);
    if src_frames == 0 {
        return;
    }

    let end_sample = seg.timeline_end_sample.min(manifest.total_samples);
    for dst_sample in seg.timeline_start_sample..end_sample {
        let rel_sample = dst_sample - seg.timeline_start_sample;
        let rel_sec = (rel_sample as f64) / f64::from(manifest.sample_rate);

        let src_sec = seg.source_start_sec + rel_sec * seg.playback_rate;
        if let Some(end_sec) = seg.source_end_sec
            && src_sec >= end_sec
        {
            break;
        }

        let src_pos = src_sec * f64::from(seg.source_sample_rate);
        if !src_pos.is_finite() || src_pos < 0.0 {
            break;
        }
        let src_frame0 = src_pos.floor() as usize;
        if src_frame0 >= src_frames {
            break;
        }
        let src_frame1 = (src_frame0 + 1).min(src_frames.saturating_sub(1));
        let frac = (src_pos - src_frame0 as f64) as f32;

        let gain = seg.volume;
        let dst_idx = dst_sample as usize * usize::from(manifest.channels);

        let (l, r) = if seg.source_channels == 1 {
            let v0 = src[src_frame0];
            let v1 = src[src_frame1];
            let v = v0 + ((v1 - v0) * frac);
            (v, v)
        } else {
            let i0 = src_frame0 * usize::from(seg.source_channels);
            let i1 = src_frame1 * usize::from(seg.source_channels);
            let l0 = src[i0];
            let l1 = src[i1];
            let r0 = src[i0 + 1];
            let r1 = src[i1 + 1];
            (l0 + ((l1 - l0) * frac), r0 + ((r1 - r0) * frac))
        };

        out[dst_idx] += l * gain;
        if manifest.channels > 1 {
            out[dst_idx + 1] += r * gain;
        }
    }
}

/// Write interleaved `f32` PCM to a raw little-endian `.f32le` file.
pub fn write_mix_to_f32le_file(samples_interleaved: &[f32], out_path: &Path) -> CutlineResult<()> {
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            CutlineError::export(format!(
                "failed to create audio mix output directory '{}': {e}",
                parent.display()
            ))
        })?;
    }

    let mut bytes = Vec::<u8>::with_capacity(samples_interleaved.len() * 4);
    for &sample in samples_interleaved {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    std::fs::write(out_path, bytes).map_err(|e| {
        CutlineError::export(format!(
            "failed to write mixed audio file '{}': {e}",
            out_path.display()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::core::{Canvas, Fps};
    use crate::model::timeline::ClipSpec;

    fn manifest_with_segment(volume: f32) -> AudioManifest {
        AudioManifest {
            sample_rate: 8,
            channels: 2,
            total_samples: 16,
            segments: vec![AudioSegment {
                source_interleaved_f32: Arc::new(vec![0.5; 64]),
                source_sample_rate: 8,
                source_channels: 2,
                timeline_start_sample: 4,
                timeline_end_sample: 12,
                source_start_sec: 0.0,
                source_end_sec: None,
                volume,
                playback_rate: 1.0,
            }],
        }
    }

    #[test]
    fn segment_mixes_into_its_window_only() {
        let mixed = mix_manifest(&manifest_with_segment(1.0));
        assert_eq!(mixed.len(), 32);
        assert_eq!(mixed[0], 0.0);
        assert_eq!(mixed[7], 0.0);
        assert!((mixed[8] - 0.5).abs() < 1e-6);
        assert!((mixed[23] - 0.5).abs() < 1e-6);
        assert_eq!(mixed[24], 0.0);
    }

    #[test]
    fn volume_scales_and_output_clamps() {
        let mixed = mix_manifest(&manifest_with_segment(0.5));
        assert!((mixed[8] - 0.25).abs() < 1e-6);

        let mut manifest = manifest_with_segment(1.0);
        manifest
            .segments
            .push(manifest.segments[0].clone());
        manifest
            .segments
            .push(manifest.segments[0].clone());
        let mixed = mix_manifest(&manifest);
        assert!(mixed[8] <= 1.0);
    }

    #[test]
    fn manifest_skips_muted_and_silent_clips() {
        let mut tl = Timeline::new(
            "t",
            Canvas {
                width: 64,
                height: 36,
            },
            Fps::new(30, 1).unwrap(),
        );
        let m = tl.add_material_direct(Material {
            name: "a".to_string(),
            kind: MaterialKind::Audio,
            duration: 10.0,
            width: 0,
            height: 0,
            source: "a.wav".to_string(),
            alt_sources: vec![],
            thumbnail: None,
        });
        let track = tl.add_track_direct(TrackKind::Audio, None);
        let clip = tl
            .add_clip_direct(
                track,
                ClipSpec {
                    material: Some(m),
                    start_time: 0.0,
                    duration: 2.0,
                    in_point: 0.0,
                    out_point: 2.0,
                    volume: 0.0, // silent
                    ..Default::default()
                },
            )
            .unwrap();

        let mut decoder = |_: &Material| -> CutlineResult<AudioPcm> {
            Ok(AudioPcm {
                sample_rate: 48_000,
                channels: 2,
                interleaved_f32: vec![0.1; 96_000],
            })
        };
        let manifest = build_audio_manifest(&tl, 2.0, 48_000, &mut decoder).unwrap();
        assert!(manifest.segments.is_empty());

        tl.update_clip_direct(
            clip,
            &crate::model::timeline::ClipPatch {
                volume: Some(0.8),
                ..Default::default()
            },
        );
        let manifest = build_audio_manifest(&tl, 2.0, 48_000, &mut decoder).unwrap();
        assert_eq!(manifest.segments.len(), 1);
        assert_eq!(manifest.segments[0].volume, 0.8);
    }
}
