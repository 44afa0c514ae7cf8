use std::path::{Path, PathBuf};

use crate::foundation::error::{CutlineError, CutlineResult};

/// Internal audio sample rate used across decode/mix/encode.
pub const MIX_SAMPLE_RATE: u32 = 48_000;

/// Probed metadata for a media source.
#[derive(Clone, Debug)]
pub struct MediaProbe {
    pub source_path: PathBuf,
    pub width: u32,
    pub height: u32,
    /// Container duration in seconds; zero when the container omits it.
    pub duration: f64,
    pub has_video: bool,
    pub has_audio: bool,
}

/// Decoded interleaved floating-point PCM.
#[derive(Clone, Debug)]
pub struct AudioPcm {
    pub sample_rate: u32,
    pub channels: u16,
    pub interleaved_f32: Vec<f32>,
}

pub fn is_ffmpeg_on_path() -> bool {
    std::process::Command::new("ffmpeg")
        .arg("-version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Probe source metadata through `ffprobe`.
pub fn probe_media(source_path: &Path) -> CutlineResult<MediaProbe> {
    #[derive(serde::Deserialize)]
    struct ProbeStream {
        codec_type: Option<String>,
        width: Option<u32>,
        height: Option<u32>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeFormat {
        duration: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeOut {
        streams: Vec<ProbeStream>,
        format: Option<ProbeFormat>,
    }

    let out = std::process::Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(source_path)
        .output()
        .map_err(|e| CutlineError::media(format!("failed to run ffprobe: {e}")))?;
    if !out.status.success() {
        return Err(CutlineError::media(format!(
            "ffprobe failed for '{}': {}",
            source_path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    let parsed: ProbeOut = serde_json::from_slice(&out.stdout)
        .map_err(|e| CutlineError::media(format!("ffprobe json parse failed: {e}")))?;
    let video = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));
    let has_audio = parsed
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));
    let duration = parsed
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    Ok(MediaProbe {
        source_path: source_path.to_path_buf(),
        width: video.and_then(|v| v.width).unwrap_or(0),
        height: video.and_then(|v| v.height).unwrap_or(0),
        duration,
        has_video: video.is_some(),
        has_audio,
    })
}

/// Decode one RGBA frame at `source_time_sec` by spawning `ffmpeg`.
pub fn decode_video_frame_rgba8(probe: &MediaProbe, source_time_sec: f64) -> CutlineResult<Vec<u8>> {
    if probe.width == 0 || probe.height == 0 {
        return Err(CutlineError::media(
            "decoded video frame size is zero (invalid source dimensions)",
        ));
    }

    let out = std::process::Command::new("ffmpeg")
        .args(["-v", "error", "-ss", &format!("{source_time_sec:.9}")])
        .arg("-i")
        .arg(&probe.source_path)
        .args([
            "-frames:v",
            "1",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "pipe:1",
        ])
        .output()
        .map_err(|e| CutlineError::media(format!("failed to run ffmpeg for video decode: {e}")))?;

    if !out.status.success() {
        return Err(CutlineError::media(format!(
            "ffmpeg video decode failed for '{}': {}",
            probe.source_path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    let expected_len = probe.width as usize * probe.height as usize * 4;
    if out.stdout.len() < expected_len {
        return Err(CutlineError::media(format!(
            "decoded frame has {} bytes, expected {expected_len}",
            out.stdout.len()
        )));
    }
    Ok(out.stdout[..expected_len].to_vec())
}

/// Decode a source's audio as stereo interleaved `f32` at `sample_rate`.
pub fn decode_audio_f32_stereo(path: &Path, sample_rate: u32) -> CutlineResult<AudioPcm> {
    let out = std::process::Command::new("ffmpeg")
        .args(["-v", "error"])
        .arg("-i")
        .arg(path)
        .args([
            "-vn",
            "-ac",
            "2",
            "-ar",
            &sample_rate.to_string(),
            "-f",
            "f32le",
            "pipe:1",
        ])
        .output()
        .map_err(|e| CutlineError::media(format!("failed to run ffmpeg for audio decode: {e}")))?;

    if !out.status.success() {
        return Err(CutlineError::media(format!(
            "ffmpeg audio decode failed for '{}': {}",
            path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }
    if !out.stdout.len().is_multiple_of(4) {
        return Err(CutlineError::media("audio decode returned ragged f32 data"));
    }

    let mut interleaved = Vec::with_capacity(out.stdout.len() / 4);
    for chunk in out.stdout.chunks_exact(4) {
        interleaved.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }
    Ok(AudioPcm {
        sample_rate,
        channels: 2,
        interleaved_f32: interleaved,
    })
}
