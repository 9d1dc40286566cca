//! One narrated capture run, phase by phase.
//!
//! Estimation and capture run on the async runtime, strictly one after the other. Composition,
//! subtitle synthesis and assembly are CPU or subprocess bound and run on the blocking pool with
//! owned inputs. All intermediate files live in a per-run workspace that is removed when the
//! [`RunContext`] is dropped, whether the run succeeded, failed or was cancelled.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context as _;
use tracing::{info, warn};

use crate::assemble::backend::MediaBackend;
use crate::assemble::plan::AssemblyPlan;
use crate::assemble::{Deliverable, assemble};
use crate::audio::compose::{compose_audio, required_sources};
use crate::audio::layer::LayerSpec;
use crate::audio::pcm::AudioStore;
use crate::capture::driver::{CaptureEvent, CaptureRecord, capture};
use crate::capture::surface::VisualSurface;
use crate::config::RunConfig;
use crate::foundation::error::{NarrsyncError, NarrsyncResult};
use crate::narration::estimate::estimate_narrations;
use crate::narration::synth::SpeechSynthesizer;
use crate::subtitles::cues::{SubtitleCue, synthesize_cues};
use crate::timeline::{EstimatedTimeline, NarrationClip, Timeline};

/// Per-run state: validated configuration, output location and scratch workspace.
#[derive(Debug)]
pub struct RunContext {
    config: RunConfig,
    output_dir: PathBuf,
    workspace: tempfile::TempDir,
}

impl RunContext {
    pub fn new(config: RunConfig, output_dir: impl Into<PathBuf>) -> NarrsyncResult<Self> {
        config.validate()?;
        let output_dir = output_dir.into();
        std::fs::create_dir_all(&output_dir)
            .with_context(|| format!("create output dir '{}'", output_dir.display()))?;
        let workspace = tempfile::Builder::new()
            .prefix("narrsync-")
            .tempdir()
            .context("create run workspace")?;
        Ok(Self {
            config,
            output_dir,
            workspace,
        })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Scratch directory for clips, raw PCM and palettes.
    pub fn workspace(&self) -> &Path {
        self.workspace.path()
    }
}

/// External systems a run drives.
pub struct Collaborators {
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub surface: Box<dyn VisualSurface>,
    pub media: Arc<dyn MediaBackend>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RunStats {
    pub narrated_units: usize,
    pub total_narration_ms: u64,
    pub recording_ms: u64,
    pub estimation_ms: u64,
    pub capture_ms: u64,
    pub composition_ms: u64,
    pub assembly_ms: u64,
}

/// What a successful run hands back.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RunOutput {
    pub deliverable: Deliverable,
    pub narrations: Vec<NarrationClip>,
    pub events: Vec<CaptureEvent>,
    pub cues: Vec<SubtitleCue>,
    pub stats: RunStats,
}

/// Estimate, capture, compose and assemble one timeline.
///
/// Capture does not start unless every narration was estimated. The first failing phase ends
/// the run with its error; a recording that was finished but never assembled is discarded.
#[tracing::instrument(skip_all, fields(units = timeline.len(), layers = layers.len()))]
pub async fn run(
    ctx: &RunContext,
    timeline: Timeline,
    layers: Vec<LayerSpec>,
    collaborators: Collaborators,
) -> NarrsyncResult<RunOutput> {
    let Collaborators {
        synthesizer,
        mut surface,
        media,
    } = collaborators;
    let cfg = ctx.config();
    let mut stats = RunStats::default();

    let phase = Instant::now();
    let clip_dir = ctx.workspace().join("clips");
    tokio::fs::create_dir_all(&clip_dir)
        .await
        .with_context(|| format!("create clip dir '{}'", clip_dir.display()))?;
    let estimated = estimate_narrations(
        timeline,
        synthesizer,
        &cfg.voice,
        &cfg.estimation,
        &clip_dir,
    )
    .await?;
    stats.estimation_ms = elapsed_ms(phase);
    stats.narrated_units = estimated.narrated_count();
    stats.total_narration_ms = estimated.total_narration_ms();

    let phase = Instant::now();
    let record = capture(&estimated, &mut *surface, &cfg.capture).await?;
    stats.capture_ms = elapsed_ms(phase);
    stats.recording_ms = record.recording_ms;

    let (deliverable, events, cues) =
        match compose_and_assemble(ctx, &estimated, record, layers, media, &mut stats).await {
            Ok(done) => done,
            Err(err) => {
                if let Err(e) = surface.discard_recording().await {
                    warn!(error = %format!("{e:#}"), "failed to discard recording of failed run");
                }
                return Err(err);
            }
        };

    info!(
        video = %deliverable.video.display(),
        narrated = stats.narrated_units,
        recording_ms = stats.recording_ms,
        estimation_ms = stats.estimation_ms,
        capture_ms = stats.capture_ms,
        composition_ms = stats.composition_ms,
        assembly_ms = stats.assembly_ms,
        "run complete"
    );
    Ok(RunOutput {
        deliverable,
        narrations: estimated.clips().to_vec(),
        events,
        cues,
        stats,
    })
}

async fn compose_and_assemble(
    ctx: &RunContext,
    estimated: &EstimatedTimeline,
    record: CaptureRecord,
    layers: Vec<LayerSpec>,
    media: Arc<dyn MediaBackend>,
    stats: &mut RunStats,
) -> NarrsyncResult<(Deliverable, Vec<CaptureEvent>, Vec<SubtitleCue>)> {
    let cfg = ctx.config();

    let phase = Instant::now();
    let (plan, cues, events) = {
        let media = Arc::clone(&media);
        let mix_cfg = cfg.mix.clone();
        let sub_cfg = cfg.subtitles.clone();
        let output = cfg.output.clone();
        let estimated = estimated.clone();
        tokio::task::spawn_blocking(move || {
            let sources = required_sources(&estimated, &layers);
            let store = AudioStore::prepare(
                &sources,
                media.as_ref(),
                mix_cfg.sample_rate,
                mix_cfg.channels,
            )?;
            let (composed, cues) = rayon::join(
                || compose_audio(&estimated, &record, &layers, &store, &mix_cfg),
                || synthesize_cues(&estimated, &record, &sub_cfg),
            );
            let composed = composed?;
            let cues = cues?;
            let plan = AssemblyPlan {
                video: record.video.clone(),
                layers: composed.layers,
                audio: composed.mix,
                cues: cues.clone(),
                output,
            };
            Ok::<_, NarrsyncError>((plan, cues, record.events))
        })
        .await
        .map_err(|e| join_failed("composition", e))??
    };
    stats.composition_ms = elapsed_ms(phase);

    let phase = Instant::now();
    let deliverable = {
        let work_dir = ctx.workspace().to_path_buf();
        let out_dir = ctx.output_dir().to_path_buf();
        tokio::task::spawn_blocking(move || assemble(plan, media.as_ref(), &work_dir, &out_dir))
            .await
            .map_err(|e| join_failed("assembly", e))??
    };
    stats.assembly_ms = elapsed_ms(phase);

    Ok((deliverable, events, cues))
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

fn join_failed(phase: &str, err: tokio::task::JoinError) -> NarrsyncError {
    NarrsyncError::Other(anyhow::anyhow!("{phase} task did not complete: {err}"))
}
