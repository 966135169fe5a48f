use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use panostitch::{
    BlendChoice, Correction, ExecBackend, FfmpegSink, FrameSink, FrameSource, GainCorrection,
    GainModel, ImageSequenceSource, LogoOverlay, OutputSpec, PipelineTask, PngSequenceSink,
    RansacOpts, SeamMode, Size, StripGeometry, TaskConfig, TaskState,
};

#[derive(Parser, Debug)]
#[command(name = "panostitch", version)]
struct Cli {
    /// One directory of numbered PNG/JPEG frames per camera, left to right.
    #[arg(long = "camera", required = true)]
    cameras: Vec<PathBuf>,

    /// Output: a `.mp4` file (requires `ffmpeg` on PATH) or a directory for a PNG sequence.
    #[arg(long)]
    out: PathBuf,

    /// Panorama width in pixels.
    #[arg(long, default_value_t = 2048)]
    width: u32,

    /// Panorama height in pixels. Defaults to width / 2.
    #[arg(long)]
    height: Option<u32>,

    /// Frame rate as `num` or `num/den`.
    #[arg(long, default_value = "30")]
    fps: String,

    /// Columns shared by neighbouring cameras.
    #[arg(long, default_value_t = 64)]
    overlap: u32,

    #[arg(long, value_enum, default_value_t = BlendArg::Seam)]
    blend: BlendArg,

    /// Feather radius for `--blend linear`, seam radius for `--blend seam`.
    #[arg(long)]
    radius: Option<u32>,

    #[arg(long, value_enum, default_value_t = CorrectionArg::None)]
    correction: CorrectionArg,

    /// Render worker threads; 1 renders on the render thread.
    #[arg(long)]
    threads: Option<usize>,

    /// Stop after this many frames.
    #[arg(long)]
    max_frames: Option<u64>,

    /// RGBA PNG stamped onto every output frame at `--logo-x`/`--logo-y`.
    #[arg(long)]
    logo: Option<PathBuf>,

    #[arg(long, default_value_t = 0)]
    logo_x: u32,

    #[arg(long, default_value_t = 0)]
    logo_y: u32,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BlendArg {
    Linear,
    Seam,
    SmartSeam,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CorrectionArg {
    None,
    Gain,
    Histogram,
}

fn parse_fps(s: &str) -> anyhow::Result<panostitch::Fps> {
    let (num, den) = match s.split_once('/') {
        Some((n, d)) => (n.trim().parse()?, d.trim().parse()?),
        None => (s.trim().parse()?, 1),
    };
    Ok(panostitch::Fps::new(num, den)?)
}

fn blend_choice(cli: &Cli) -> BlendChoice {
    match cli.blend {
        BlendArg::Linear => BlendChoice::Linear {
            radius: cli.radius.unwrap_or(cli.overlap / 2),
        },
        BlendArg::Seam => BlendChoice::Seam(SeamMode::Fast {
            radius: cli.radius.unwrap_or(SeamMode::FAST_RADIUS),
        }),
        BlendArg::SmartSeam => BlendChoice::Seam(SeamMode::Smart {
            initial_radius: cli.radius.unwrap_or(SeamMode::SMART_INITIAL_RADIUS),
        }),
    }
}

fn load_logo(cli: &Cli) -> anyhow::Result<Option<LogoOverlay>> {
    let Some(path) = &cli.logo else {
        return Ok(None);
    };
    let img = image::open(path)
        .with_context(|| format!("open logo '{}'", path.display()))?
        .to_rgba8();
    let (w, h) = img.dimensions();
    let buf = panostitch::ImageBuf::from_raw(w, h, panostitch::PixelFormat::Rgba8, img.into_raw())?;
    Ok(Some(LogoOverlay::new(buf, cli.logo_x, cli.logo_y)?))
}

fn make_sink(cli: &Cli) -> Box<dyn FrameSink> {
    let is_mp4 = cli
        .out
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("mp4"));
    if is_mp4 {
        Box::new(FfmpegSink::new(&cli.out))
    } else {
        Box::new(PngSequenceSink::new(&cli.out))
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let fps = parse_fps(&cli.fps).with_context(|| format!("parse --fps '{}'", cli.fps))?;

    let mut sources: Vec<Box<dyn FrameSource>> = Vec::with_capacity(cli.cameras.len());
    for dir in &cli.cameras {
        sources.push(Box::new(ImageSequenceSource::open(dir, fps)?));
    }

    let size = Size::new(cli.width, cli.height.unwrap_or(cli.width / 2));
    let mut output = OutputSpec::new(size, blend_choice(&cli));
    output.fps = Some(fps);
    output.render.require_equirect_aspect = cli.height.is_none();
    output.render.backend = match cli.threads {
        Some(1) => ExecBackend::Serial,
        threads => ExecBackend::Parallel { threads },
    };
    output.render.correction = match cli.correction {
        CorrectionArg::None => Correction::None,
        CorrectionArg::Gain => Correction::AutoGain(GainCorrection::new(GainModel::Smoothness)),
        CorrectionArg::Histogram => Correction::AutoHistogram(RansacOpts::default()),
    };

    let config = TaskConfig {
        max_frames: cli.max_frames,
        overlay: load_logo(&cli)?,
        ..TaskConfig::default()
    };

    let mut task = PipelineTask::new(config);
    task.init(
        sources,
        make_sink(&cli),
        &StripGeometry::new(cli.overlap),
        None,
        output,
    )?;
    task.start()?;
    let state = task.wait_for_completion();
    if let Some(msg) = task.take_async_error_message() {
        anyhow::bail!("stitching failed: {msg}");
    }
    anyhow::ensure!(state == TaskState::Completed, "task ended as {state:?}");
    tracing::info!(frames = task.frames_encoded(), out = %cli.out.display(), "done");
    Ok(())
}
