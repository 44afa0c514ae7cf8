use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    sync::atomic::AtomicBool,
};

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "cutline", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Probe a media file and print its metadata as JSON.
    Probe(ProbeArgs),
    /// Render a single frame of a project as a PNG.
    Frame(FrameArgs),
    /// Export a project to MP4 (requires `ffmpeg` on PATH).
    Export(ExportArgs),
}

#[derive(Parser, Debug)]
struct ProbeArgs {
    /// Media file to probe.
    path: PathBuf,
}

#[derive(Parser, Debug)]
struct FrameArgs {
    /// Input project JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Timeline time in seconds.
    #[arg(long)]
    time: f64,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Parser, Debug)]
struct ExportArgs {
    /// Input project JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output MP4 path.
    #[arg(long)]
    out: PathBuf,

    /// Output frame rate; defaults to the project frame rate.
    #[arg(long)]
    fps: Option<u32>,

    /// Target video bitrate in bits/s.
    #[arg(long)]
    bitrate: Option<u32>,

    /// Encode quality tier.
    #[arg(long, value_enum, default_value_t = QualityChoice::Medium)]
    quality: QualityChoice,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum QualityChoice {
    Low,
    Medium,
    High,
}

impl From<QualityChoice> for cutline::ExportQuality {
    fn from(q: QualityChoice) -> Self {
        match q {
            QualityChoice::Low => Self::Low,
            QualityChoice::Medium => Self::Medium,
            QualityChoice::High => Self::High,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Probe(args) => cmd_probe(args),
        Command::Frame(args) => cmd_frame(args),
        Command::Export(args) => cmd_export(args),
    }
}

fn read_project(path: &Path) -> anyhow::Result<cutline::Timeline> {
    let f = File::open(path).with_context(|| format!("open project '{}'", path.display()))?;
    let r = BufReader::new(f);
    let record: cutline::ProjectRecord =
        serde_json::from_reader(r).with_context(|| "parse project JSON")?;
    Ok(record.into_timeline()?)
}

fn cmd_probe(args: ProbeArgs) -> anyhow::Result<()> {
    let probe = cutline::probe_media(&args.path)?;
    println!(
        "{}",
        serde_json::json!({
            "path": probe.source_path,
            "width": probe.width,
            "height": probe.height,
            "duration": probe.duration,
            "has_video": probe.has_video,
            "has_audio": probe.has_audio,
        })
    );
    Ok(())
}

fn cmd_frame(args: FrameArgs) -> anyhow::Result<()> {
    let timeline = read_project(&args.in_path)?;
    let factory = cutline::FfmpegElementFactory;
    let mut pipeline = cutline::Pipeline::new(
        timeline.canvas.width,
        timeline.canvas.height,
        cutline::RenderOptions::default(),
    )?;

    struct CliSource<'a> {
        timeline: &'a cutline::Timeline,
        factory: &'a cutline::FfmpegElementFactory,
        elements: std::collections::HashMap<cutline::MaterialId, Box<dyn cutline::MediaElement>>,
    }

    impl cutline::FrameSource for CliSource<'_> {
        fn frame(
            &mut self,
            material: cutline::MaterialId,
            source_time: f64,
        ) -> Option<std::sync::Arc<cutline::Surface>> {
            use cutline::{MediaElement as _, MediaElementFactory as _};
            if !self.elements.contains_key(&material) {
                let m = self.timeline.material(material)?;
                let mut element = self.factory.create(m).ok()?;
                for _ in 0..1024 {
                    if element.poll_ready().ok()? {
                        break;
                    }
                }
                if !element.is_ready() {
                    return None;
                }
                self.elements.insert(material, element);
            }
            let element = self.elements.get_mut(&material)?;
            element.seek(source_time);
            element.current_frame()
        }
    }

    let mut source = CliSource {
        timeline: &timeline,
        factory: &factory,
        elements: std::collections::HashMap::new(),
    };
    pipeline.render_frame(&timeline, args.time, &mut source)?;

    let frame = pipeline.backbuffer();
    let img = image::RgbaImage::from_raw(frame.width, frame.height, frame.data.clone())
        .context("frame buffer did not match dimensions")?;
    img.save(&args.out)
        .with_context(|| format!("write '{}'", args.out.display()))?;
    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_export(args: ExportArgs) -> anyhow::Result<()> {
    let timeline = read_project(&args.in_path)?;
    let request = cutline::ExportRequest {
        width: timeline.canvas.width,
        height: timeline.canvas.height,
        frame_rate: args.fps.unwrap_or(timeline.frame_rate.num),
        video_bitrate: args.bitrate,
        quality: args.quality.into(),
    };
    let abort = AtomicBool::new(false);
    let mut last_percent = u32::MAX;
    cutline::export_to_path(
        &timeline,
        &cutline::FfmpegElementFactory,
        &request,
        &args.out,
        &mut |p| {
            let percent = (p * 100.0) as u32;
            if percent != last_percent {
                last_percent = percent;
                eprint!("\rexporting… {percent}%");
            }
        },
        &abort,
    )?;
    eprintln!("\rexported {} at {} fps", args.out.display(), request.frame_rate);
    Ok(())
}
