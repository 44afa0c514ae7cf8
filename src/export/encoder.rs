use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

use crate::foundation::error::{CutlineError, CutlineResult};
use crate::foundation::math::mul_div255;
use crate::render::surface::Surface;

/// External audio feed for the encoder: a raw `.f32le` file.
#[derive(Clone, Debug)]
pub struct AudioInputConfig {
    pub path: PathBuf,
    pub sample_rate: u32,
    pub channels: u16,
}

#[derive(Clone, Debug)]
pub struct EncodeConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub out_path: PathBuf,
    pub overwrite: bool,
    /// Target bitrate in bits/s; `None` lets quality drive rate control.
    pub video_bitrate: Option<u32>,
    /// x264 CRF, lower is better; 23 is the codec default.
    pub crf: u8,
    pub audio: Option<AudioInputConfig>,
}

impl EncodeConfig {
    pub fn validate(&self) -> CutlineResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(CutlineError::validation(
                "encode width/height must be non-zero",
            ));
        }
        if self.fps == 0 {
            return Err(CutlineError::validation("encode fps must be non-zero"));
        }
        if !self.width.is_multiple_of(2) || !self.height.is_multiple_of(2) {
            // Default settings target yuv420p output for maximum compatibility.
            return Err(CutlineError::validation(
                "encode width/height must be even (required for yuv420p mp4 output)",
            ));
        }
        if let Some(audio) = &self.audio {
            if audio.sample_rate == 0 || audio.channels == 0 {
                return Err(CutlineError::validation(
                    "audio sample_rate/channels must be non-zero when audio is enabled",
                ));
            }
        }
        Ok(())
    }
}

pub fn ensure_parent_dir(path: &Path) -> CutlineResult<()> {
    if let Some(parent) = path.parent() {
        use anyhow::Context as _;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// Streams raw frames into a spawned system `ffmpeg`, producing an MP4.
pub struct FfmpegEncoder {
    cfg: EncodeConfig,
    bg_rgba: [u8; 4],
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr_drain: Option<std::thread::JoinHandle<std::io::Result<Vec<u8>>>>,
    scratch: Vec<u8>,
}

impl FfmpegEncoder {
    /// Spawn ffmpeg. `bg_rgba` is the straight-alpha background frames are
    /// flattened over (the encoder takes opaque pixels).
    pub fn new(cfg: EncodeConfig, bg_rgba: [u8; 4]) -> CutlineResult<Self> {
        cfg.validate()?;
        ensure_parent_dir(&cfg.out_path)?;
        if !cfg.overwrite && cfg.out_path.exists() {
            return Err(CutlineError::validation(format!(
                "output file '{}' already exists",
                cfg.out_path.display()
            )));
        }
        if !crate::media::decode::is_ffmpeg_on_path() {
            return Err(CutlineError::export(
                "ffmpeg is required for MP4 encoding, but was not found on PATH",
            ));
        }

        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        cmd.arg(if cfg.overwrite { "-y" } else { "-n" });

        cmd.args([
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-s",
            &format!("{}x{}", cfg.width, cfg.height),
            "-framerate",
            &cfg.fps.to_string(),
            "-i",
            "pipe:0",
        ]);

        if let Some(audio) = &cfg.audio {
            cmd.args([
                "-f",
                "f32le",
                "-ar",
                &audio.sample_rate.to_string(),
                "-ac",
                &audio.channels.to_string(),
                "-i",
            ])
            .arg(&audio.path)
            .args(["-c:a", "aac", "-shortest"]);
        } else {
            cmd.arg("-an");
        }

        cmd.args(["-c:v", "libx264", "-pix_fmt", "yuv420p"]);
        cmd.args(["-crf", &cfg.crf.to_string()]);
        if let Some(bitrate) = cfg.video_bitrate {
            cmd.args(["-b:v", &bitrate.to_string()]);
        }
        cmd.args(["-movflags", "+faststart"]);
        cmd.arg(&cfg.out_path);

        let mut child = cmd.spawn().map_err(|e| {
            CutlineError::export(format!(
                "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
            ))
        })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| CutlineError::export("failed to open ffmpeg stdin (unexpected)"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| CutlineError::export("failed to open ffmpeg stderr (unexpected)"))?;
        let stderr_drain = std::thread::spawn(move || {
            let mut bytes = Vec::new();
            stderr.read_to_end(&mut bytes)?;
            Ok(bytes)
        });

        let scratch = vec![0u8; (cfg.width as usize) * (cfg.height as usize) * 4];
        Ok(Self {
            cfg,
            bg_rgba,
            child: Some(child),
            stdin: Some(stdin),
            stderr_drain: Some(stderr_drain),
            scratch,
        })
    }

    pub fn encode_frame(&mut self, frame: &Surface) -> CutlineResult<()> {
        if frame.width != self.cfg.width || frame.height != self.cfg.height {
            return Err(CutlineError::validation(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width, frame.height, self.cfg.width, self.cfg.height
            )));
        }
        flatten_premul_over_bg(&mut self.scratch, &frame.data, self.bg_rgba)?;

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(CutlineError::export("encoder is already finalized"));
        };
        use std::io::Write as _;
        stdin.write_all(&self.scratch).map_err(|e| {
            CutlineError::export(format!("failed to write frame to ffmpeg stdin: {e}"))
        })?;
        Ok(())
    }

    pub fn finish(mut self) -> CutlineResult<()> {
        drop(self.stdin.take());
        let mut child = self
            .child
            .take()
            .ok_or_else(|| CutlineError::export("encoder not started"))?;

        let status = child
            .wait()
            .map_err(|e| CutlineError::export(format!("failed to wait for ffmpeg: {e}")))?;
        let stderr_bytes = match self.stderr_drain.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| CutlineError::export("ffmpeg stderr drain thread panicked"))?
                .map_err(|e| CutlineError::export(format!("ffmpeg stderr read failed: {e}")))?,
            None => Vec::new(),
        };

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr_bytes);
            return Err(CutlineError::export(format!(
                "ffmpeg exited with status {}: {}",
                status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        // Aborted exports kill the encoder; the partial file is the caller's
        // to discard.
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Flatten premultiplied RGBA over an opaque background color.
fn flatten_premul_over_bg(dst: &mut [u8], src: &[u8], bg: [u8; 4]) -> CutlineResult<()> {
    if dst.len() != src.len() {
        return Err(CutlineError::export("flatten buffer size mismatch"));
    }
    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        let a = u16::from(s[3]);
        let inv = 255 - a;
        for c in 0..3 {
            d[c] = s[c].saturating_add(mul_div255(u16::from(bg[c]), inv));
        }
        d[3] = 255;
    }
    Ok(())
}
