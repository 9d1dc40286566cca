use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "narrsync", version)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that ffmpeg, ffprobe and edge-tts are usable.
    Preflight,
    /// Synthesize every narration and report durations and word timings, without recording.
    Narrate(NarrateArgs),
    /// Join clips, or brand a recorded video with intro, outro and transition clips.
    Stitch(StitchArgs),
}

#[derive(Parser, Debug)]
struct NarrateArgs {
    /// JSON array of narrated units.
    #[arg(long)]
    units: PathBuf,

    /// Run config JSON (defaults apply when omitted).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output directory for clips and `narrations.json`.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Parser, Debug)]
struct StitchArgs {
    /// Stitch config: `{"clips": [...]}`, or `{"transitions": [...]}` together with SOURCE.
    config: PathBuf,

    /// Recorded video to brand; required for transition configs.
    source: Option<PathBuf>,

    /// Output directory.
    #[arg(long, default_value = "output")]
    out: PathBuf,

    /// Directory relative clip paths resolve against (defaults to the config's directory).
    #[arg(long)]
    base_dir: Option<PathBuf>,
}

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum StitchConfig {
    Clips(narrsync::StitchPlan),
    Branded(narrsync::BrandedCut),
}

#[derive(serde::Serialize)]
struct NarrationReport<'a> {
    voice: &'a narrsync::VoiceConfig,
    narrated_units: usize,
    total_narration_ms: u64,
    units: &'a [narrsync::NarrationClip],
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.cmd {
        Command::Preflight => cmd_preflight(),
        Command::Narrate(args) => {
            let rt = tokio::runtime::Runtime::new().context("start async runtime")?;
            rt.block_on(cmd_narrate(args))
        }
        Command::Stitch(args) => cmd_stitch(args),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_preflight() -> anyhow::Result<()> {
    let report = narrsync::Preflight::default().run();
    for c in &report.checks {
        let mark = match (c.ok, c.required) {
            (true, _) => "ok  ",
            (false, true) => "FAIL",
            (false, false) => "warn",
        };
        eprintln!("{mark} {:<9} {}", c.name, c.detail);
    }
    if !report.is_ready() {
        anyhow::bail!("required tools are missing");
    }
    Ok(())
}

async fn cmd_narrate(args: NarrateArgs) -> anyhow::Result<()> {
    let cfg = match &args.config {
        Some(path) => narrsync::RunConfig::from_json_file(path)?,
        None => narrsync::RunConfig::default(),
    };
    let timeline = read_units(&args.units)?;

    let clip_dir = args.out.join("clips");
    std::fs::create_dir_all(&clip_dir)
        .with_context(|| format!("create clip dir '{}'", clip_dir.display()))?;

    let synthesizer = Arc::new(narrsync::EdgeTtsCli::new());
    let estimated = narrsync::estimate_narrations(
        timeline,
        synthesizer,
        &cfg.voice,
        &cfg.estimation,
        &clip_dir,
    )
    .await?;

    let report = NarrationReport {
        voice: &cfg.voice,
        narrated_units: estimated.narrated_count(),
        total_narration_ms: estimated.total_narration_ms(),
        units: estimated.clips(),
    };
    let out_path = args.out.join("narrations.json");
    let f = File::create(&out_path)
        .with_context(|| format!("create report '{}'", out_path.display()))?;
    serde_json::to_writer_pretty(f, &report).context("write narration report")?;

    eprintln!(
        "wrote {} ({} narrated units, {} ms)",
        out_path.display(),
        report.narrated_units,
        report.total_narration_ms
    );
    Ok(())
}

fn cmd_stitch(args: StitchArgs) -> anyhow::Result<()> {
    use narrsync::MediaBackend as _;

    let f = File::open(&args.config)
        .with_context(|| format!("open stitch config '{}'", args.config.display()))?;
    let config: StitchConfig =
        serde_json::from_reader(BufReader::new(f)).context("parse stitch config")?;
    let base_dir = match args.base_dir {
        Some(dir) => dir,
        None => args
            .config
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default(),
    };

    let backend = narrsync::FfmpegBackend::new();
    let plan = match config {
        StitchConfig::Clips(plan) => plan,
        StitchConfig::Branded(cut) => {
            let Some(source) = args.source else {
                anyhow::bail!("a transitions config needs the SOURCE video argument");
            };
            let source = std::path::absolute(&source)
                .with_context(|| format!("resolve '{}'", source.display()))?;
            let source_ms = backend.probe_duration_ms(&source)?;
            cut.into_plan(&source, source_ms)?
        }
    };

    let work = tempfile::Builder::new()
        .prefix("narrsync-stitch-")
        .tempdir()
        .context("create stitch workspace")?;
    let stitched = narrsync::stitch(&plan, &base_dir, &backend, work.path(), &args.out)?;
    let duration_ms = backend.probe_duration_ms(&stitched.video)?;
    eprintln!(
        "wrote {} ({} clips, {} ms)",
        stitched.video.display(),
        stitched.clips,
        duration_ms
    );
    Ok(())
}

/// Units without explicit ordinals are numbered in list order.
fn read_units(path: &Path) -> anyhow::Result<narrsync::Timeline> {
    let f = File::open(path).with_context(|| format!("open units '{}'", path.display()))?;
    let units: Vec<narrsync::NarratedUnit> =
        serde_json::from_reader(BufReader::new(f)).with_context(|| "parse units JSON")?;
    let timeline = if units.iter().all(|u| u.ordinal == 0) {
        narrsync::Timeline::numbered(units)?
    } else {
        narrsync::Timeline::new(units)?
    };
    Ok(timeline)
}
