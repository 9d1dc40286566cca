//! Joining finished videos with branded intro, outro and transition clips.
//!
//! Every clip is normalized to one [`ClipFormat`] (scaled and letterboxed, fixed frame rate,
//! stereo audio with silence added where a clip has none) and the results are concatenated.

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::info;

use crate::assemble::backend::EncodeSettings;
use crate::assemble::publish;
use crate::foundation::error::{NarrsyncError, NarrsyncResult};

/// Shape every clip is normalized to before concatenation.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ClipFormat {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub sample_rate: u32,
    pub encode: EncodeSettings,
}

impl Default for ClipFormat {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            fps: 30,
            sample_rate: 44_100,
            encode: EncodeSettings {
                crf: 18,
                ..EncodeSettings::default()
            },
        }
    }
}

/// One entry of a stitch list: a whole file, or a trimmed part of one.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum StitchClip {
    Whole(PathBuf),
    Segment(ClipSegment),
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ClipSegment {
    pub source: PathBuf,
    #[serde(default)]
    pub start_ms: u64,
    /// `None` runs to the end of the source.
    #[serde(default)]
    pub end_ms: Option<u64>,
    #[serde(default)]
    pub label: Option<String>,
}

impl StitchClip {
    pub fn source(&self) -> &Path {
        match self {
            Self::Whole(p) => p,
            Self::Segment(s) => &s.source,
        }
    }

    fn trim(&self) -> Option<(u64, Option<u64>)> {
        match self {
            Self::Segment(s) if s.start_ms > 0 || s.end_ms.is_some() => Some((s.start_ms, s.end_ms)),
            _ => None,
        }
    }

    fn label(&self) -> String {
        match self {
            Self::Segment(ClipSegment {
                label: Some(label), ..
            }) => label.clone(),
            _ => self
                .source()
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
        }
    }
}

/// Clips joined in order into `{output_name}.mp4`.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StitchPlan {
    pub clips: Vec<StitchClip>,
    #[serde(default = "default_stitch_name")]
    pub output_name: String,
    #[serde(default)]
    pub format: ClipFormat,
}

fn default_stitch_name() -> String {
    "stitched".to_string()
}

/// A transition clip that replaces `trim_start_ms..trim_end_ms` of the source video.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Transition {
    pub clip: PathBuf,
    pub trim_start_ms: u64,
    pub trim_end_ms: u64,
}

/// Brand a single recorded video: optional intro and outro, transitions cut into the middle.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BrandedCut {
    #[serde(default)]
    pub intro: Option<PathBuf>,
    #[serde(default)]
    pub outro: Option<PathBuf>,
    /// Source time the first segment starts at.
    #[serde(default)]
    pub start_ms: u64,
    pub transitions: Vec<Transition>,
    #[serde(default)]
    pub format: ClipFormat,
}

impl BrandedCut {
    /// Expand into a stitch list over `source`, whose length is `source_ms`.
    pub fn into_plan(self, source: &Path, source_ms: u64) -> NarrsyncResult<StitchPlan> {
        let mut transitions = self.transitions;
        for (i, t) in transitions.iter().enumerate() {
            if t.trim_end_ms <= t.trim_start_ms {
                return Err(NarrsyncError::validation(format!(
                    "transition #{}: trim_end_ms {} must be after trim_start_ms {}",
                    i + 1,
                    t.trim_end_ms,
                    t.trim_start_ms
                )));
            }
        }
        transitions.sort_by_key(|t| t.trim_start_ms);

        let segment = |start_ms, end_ms| {
            StitchClip::Segment(ClipSegment {
                source: source.to_path_buf(),
                start_ms,
                end_ms: Some(end_ms),
                label: None,
            })
        };

        let mut clips: Vec<StitchClip> = self.intro.into_iter().map(StitchClip::Whole).collect();
        let mut cursor = self.start_ms;
        for t in transitions {
            if t.trim_start_ms < cursor {
                return Err(NarrsyncError::validation(format!(
                    "transition '{}' starts at {} ms, inside already used source (up to {cursor} ms)",
                    t.clip.display(),
                    t.trim_start_ms
                )));
            }
            if t.trim_start_ms > cursor {
                clips.push(segment(cursor, t.trim_start_ms));
            }
            clips.push(StitchClip::Whole(t.clip));
            cursor = t.trim_end_ms;
        }
        if cursor < source_ms {
            clips.push(segment(cursor, source_ms));
        }
        clips.extend(self.outro.map(StitchClip::Whole));

        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "demo".to_string());
        Ok(StitchPlan {
            clips,
            output_name: format!("{stem}_branded"),
            format: self.format,
        })
    }
}

/// Re-encode one clip to the shared format.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NormalizeRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    /// `(start_ms, end_ms)` cut applied while normalizing.
    pub trim: Option<(u64, Option<u64>)>,
    /// Without audio, a silent stereo track is generated.
    pub has_audio: bool,
    pub format: ClipFormat,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConcatRequest {
    pub clips: Vec<PathBuf>,
    /// Concat list file written before muxing.
    pub list_path: PathBuf,
    pub out_path: PathBuf,
    pub format: ClipFormat,
}

/// Clip editing collaborator. Calls are blocking.
pub trait ClipBackend: Send + Sync {
    fn has_audio_stream(&self, path: &Path) -> anyhow::Result<bool>;

    fn normalize_clip(&self, req: &NormalizeRequest) -> anyhow::Result<()>;

    fn concat_clips(&self, req: &ConcatRequest) -> anyhow::Result<()>;
}

/// Result of a stitch.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Stitched {
    pub video: PathBuf,
    pub clips: usize,
}

/// Normalize every clip of `plan` and concatenate them into `out_dir`.
///
/// Relative clip paths resolve against `base_dir`. Intermediate files go to `work_dir`; nothing
/// is written to `out_dir` unless the whole stitch succeeds.
#[tracing::instrument(skip_all, fields(clips = plan.clips.len(), name = %plan.output_name))]
pub fn stitch(
    plan: &StitchPlan,
    base_dir: &Path,
    backend: &dyn ClipBackend,
    work_dir: &Path,
    out_dir: &Path,
) -> NarrsyncResult<Stitched> {
    if plan.clips.is_empty() {
        return Err(NarrsyncError::validation("stitch list has no clips"));
    }
    let name = &plan.output_name;
    if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(NarrsyncError::validation(format!(
            "stitch output name must be a plain file stem, got '{name}'"
        )));
    }

    let mut sources = Vec::with_capacity(plan.clips.len());
    for (i, clip) in plan.clips.iter().enumerate() {
        if let Some((start, Some(end))) = clip.trim()
            && end <= start
        {
            return Err(NarrsyncError::validation(format!(
                "clip #{} '{}': end_ms {end} must be after start_ms {start}",
                i + 1,
                clip.source().display()
            )));
        }
        let src = base_dir.join(clip.source());
        if !src.is_file() {
            return Err(NarrsyncError::validation(format!(
                "clip #{} not found: '{}'",
                i + 1,
                src.display()
            )));
        }
        sources.push(src);
    }

    let normalized = plan
        .clips
        .par_iter()
        .zip(sources.par_iter())
        .enumerate()
        .map(|(i, (clip, src))| -> NarrsyncResult<PathBuf> {
            let label = clip.label();
            let fail = |what: &str, e: anyhow::Error| {
                NarrsyncError::assembly(format!("clip #{} '{label}': {what}: {e:#}", i + 1))
            };
            let has_audio = backend
                .has_audio_stream(src)
                .map_err(|e| fail("cannot probe streams", e))?;
            let output = work_dir.join(format!("norm_{i:02}.mp4"));
            backend
                .normalize_clip(&NormalizeRequest {
                    input: src.clone(),
                    output: output.clone(),
                    trim: clip.trim(),
                    has_audio,
                    format: plan.format.clone(),
                })
                .map_err(|e| fail("normalize failed", e))?;
            info!(clip = i + 1, label = %label, has_audio, trim = ?clip.trim(), "clip normalized");
            Ok(output)
        })
        .collect::<NarrsyncResult<Vec<_>>>()?;

    let stage = work_dir.join("stage");
    std::fs::create_dir_all(&stage)
        .map_err(|e| NarrsyncError::assembly(format!("cannot create '{}': {e}", stage.display())))?;
    let staged = stage.join(format!("{name}.mp4"));
    backend
        .concat_clips(&ConcatRequest {
            clips: normalized,
            list_path: work_dir.join("concat.txt"),
            out_path: staged.clone(),
            format: plan.format.clone(),
        })
        .map_err(|e| NarrsyncError::assembly(format!("concat failed: {e:#}")))?;

    let video = out_dir.join(format!("{name}.mp4"));
    publish(&[(staged.as_path(), video.as_path())], out_dir)?;
    info!(video = %video.display(), clips = plan.clips.len(), "clips stitched");
    Ok(Stitched {
        video,
        clips: plan.clips.len(),
    })
}

#[cfg(test)]
#[path = "../../tests/unit/assemble/stitch.rs"]
mod tests;
