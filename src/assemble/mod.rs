//! Final assembly: fit audio and subtitles to the recorded video and mux the deliverable.
//! [`stitch`] joins finished videos with branded clips.

pub(crate) mod backend;
pub(crate) mod ffmpeg;
pub(crate) mod plan;
pub(crate) mod stitch;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context as _;
use tracing::info;

use crate::assemble::backend::{MediaBackend, MuxRequest, PreviewRequest, RawAudioInput, SubtitleMode};
use crate::assemble::plan::{AssemblyPlan, FitStats};
use crate::audio::pcm::write_f32le_file;
use crate::foundation::error::{NarrsyncError, NarrsyncResult};
use crate::subtitles::srt::write_srt_file;

/// Files produced by a run.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Deliverable {
    pub video: PathBuf,
    /// Sidecar SRT, absent when there was nothing to subtitle.
    pub subtitles: Option<PathBuf>,
    pub preview: Option<PathBuf>,
    pub duration_ms: u64,
    /// Subtitle mode actually applied; burned may have fallen back to soft.
    pub subtitle_mode: SubtitleMode,
    pub fit: FitStats,
}

/// Consume `plan` and write the deliverable into `out_dir`.
///
/// Intermediate files (raw PCM, palette, staged outputs) go to `work_dir`. Nothing is left in
/// `out_dir` when any step fails.
#[tracing::instrument(skip_all, fields(video = %plan.video.display()))]
pub fn assemble(
    plan: AssemblyPlan,
    backend: &dyn MediaBackend,
    work_dir: &Path,
    out_dir: &Path,
) -> NarrsyncResult<Deliverable> {
    let started = Instant::now();
    let video_ms = backend
        .probe_duration_ms(&plan.video)
        .map_err(|e| NarrsyncError::assembly(format!("cannot read recorded video: {e:#}")))?;
    if video_ms == 0 {
        return Err(NarrsyncError::assembly(format!(
            "recorded video '{}' has zero duration",
            plan.video.display()
        )));
    }

    let fitted = plan.fit_to_video(video_ms);
    let name = fitted.output.name.clone();

    let audio_path = work_dir.join("mix.f32le");
    write_f32le_file(&fitted.audio.interleaved_f32, &audio_path)
        .map_err(|e| NarrsyncError::assembly(format!("{e:#}")))?;

    // Outputs are staged and only moved into `out_dir` once every step succeeded.
    let stage = work_dir.join("stage");
    std::fs::create_dir_all(&stage)
        .map_err(|e| NarrsyncError::assembly(format!("cannot create '{}': {e}", stage.display())))?;

    let staged_srt = if fitted.cues.is_empty() {
        None
    } else {
        let path = stage.join(format!("{name}.srt"));
        write_srt_file(&fitted.cues, &path).map_err(|e| NarrsyncError::assembly(format!("{e:#}")))?;
        Some(path)
    };

    let staged_video = stage.join(format!("{name}.mp4"));
    let subtitle_mode = backend
        .mux(&MuxRequest {
            video: fitted.video.clone(),
            audio: Some(RawAudioInput {
                path: audio_path,
                sample_rate: fitted.audio.sample_rate,
                channels: fitted.audio.channels,
            }),
            subtitles: staged_srt.clone(),
            subtitle_mode: fitted.output.subtitle_mode,
            encode: fitted.output.encode.clone(),
            out_path: staged_video.clone(),
            work_dir: work_dir.to_path_buf(),
        })
        .map_err(|e| NarrsyncError::assembly(format!("mux failed: {e:#}")))?;

    let staged_preview = match &fitted.output.preview {
        Some(cfg) => {
            let out_path = stage.join(format!("{name}.gif"));
            backend
                .render_preview(&PreviewRequest {
                    source: staged_video.clone(),
                    out_path: out_path.clone(),
                    palette_path: work_dir.join("palette.png"),
                    fps: cfg.fps,
                    width: cfg.width,
                    max_duration_ms: cfg.max_duration_ms,
                })
                .map_err(|e| NarrsyncError::assembly(format!("preview failed: {e:#}")))?;
            Some(out_path)
        }
        None => None,
    };

    let video = out_dir.join(format!("{name}.mp4"));
    let subtitles = staged_srt.as_ref().map(|_| out_dir.join(format!("{name}.srt")));
    let preview = staged_preview.as_ref().map(|_| out_dir.join(format!("{name}.gif")));
    let moves: Vec<(&Path, &Path)> = [
        Some((staged_video.as_path(), video.as_path())),
        staged_srt.as_deref().zip(subtitles.as_deref()),
        staged_preview.as_deref().zip(preview.as_deref()),
    ]
    .into_iter()
    .flatten()
    .collect();
    publish(&moves, out_dir)?;

    info!(
        video = %video.display(),
        duration_ms = video_ms,
        cues = fitted.cues.len(),
        trimmed_ms = fitted.stats.audio_trimmed_ms,
        padded_ms = fitted.stats.audio_padded_ms,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "deliverable assembled"
    );
    Ok(Deliverable {
        video,
        subtitles,
        preview,
        duration_ms: video_ms,
        subtitle_mode,
        fit: fitted.stats,
    })
}

/// Move staged files into `out_dir`, all or nothing.
fn publish(moves: &[(&Path, &Path)], out_dir: &Path) -> NarrsyncResult<()> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("create output dir '{}'", out_dir.display()))
        .map_err(|e| NarrsyncError::assembly(format!("{e:#}")))?;
    for (i, (from, to)) in moves.iter().enumerate() {
        if let Err(e) = move_file(from, to) {
            for (_, done) in &moves[..i] {
                let _ = std::fs::remove_file(done);
            }
            return Err(NarrsyncError::assembly(format!("{e:#}")));
        }
    }
    Ok(())
}

fn move_file(from: &Path, to: &Path) -> anyhow::Result<()> {
    if std::fs::rename(from, to).is_ok() {
        return Ok(());
    }
    // The workspace may sit on another filesystem.
    if let Err(e) = std::fs::copy(from, to) {
        let _ = std::fs::remove_file(to);
        return Err(e).with_context(|| format!("cannot move '{}' to '{}'", from.display(), to.display()));
    }
    std::fs::remove_file(from).with_context(|| format!("remove staged '{}'", from.display()))
}

#[cfg(test)]
#[path = "../../tests/unit/assemble/assemble.rs"]
mod tests;
