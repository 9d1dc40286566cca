//! Audio layers and cue resolution.
//!
//! A [`LayerSpec`] is what the caller declares: cues anchored either to a unit (resolved against
//! the captured pause start) or to an absolute offset. Resolution turns it into an
//! [`AudioLayer`] of clips with concrete start times, sorted and free of overlaps.

use std::path::PathBuf;

use crate::audio::pcm::AudioStore;
use crate::capture::driver::CaptureRecord;
use crate::foundation::error::{NarrsyncError, NarrsyncResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerCategory {
    Narration,
    Music,
    Sfx,
}

/// How a clip fills the time between its start and the next cue on the same layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitMode {
    /// Tile the source until the next cue (or track end), truncating the last repetition.
    Loop,
    /// Play the source once. Overrunning the next cue is an error.
    #[default]
    Once,
    /// Play the source once, cut at the next cue.
    StopAtNextCue,
}

fn default_volume() -> f32 {
    1.0
}

/// One declared placement on an auxiliary layer.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CueSpec {
    pub source: PathBuf,
    /// Fire when this unit's narration pause begins.
    #[serde(default)]
    pub trigger_unit_id: Option<String>,
    /// Shift relative to the trigger; negative fires before the narration.
    #[serde(default)]
    pub offset_ms: i64,
    #[serde(default)]
    pub absolute_start_ms: Option<u64>,
    #[serde(default = "default_volume")]
    pub volume: f32,
    #[serde(default)]
    pub fade_in_ms: u64,
    #[serde(default)]
    pub fade_out_ms: u64,
    #[serde(default)]
    pub fit_mode: FitMode,
}

impl CueSpec {
    pub fn on_unit(source: impl Into<PathBuf>, unit_id: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            trigger_unit_id: Some(unit_id.into()),
            offset_ms: 0,
            absolute_start_ms: None,
            volume: default_volume(),
            fade_in_ms: 0,
            fade_out_ms: 0,
            fit_mode: FitMode::Once,
        }
    }

    pub fn at(source: impl Into<PathBuf>, start_ms: u64) -> Self {
        Self {
            trigger_unit_id: None,
            absolute_start_ms: Some(start_ms),
            ..Self::on_unit(source, "")
        }
    }

    pub fn with_fit_mode(mut self, fit_mode: FitMode) -> Self {
        self.fit_mode = fit_mode;
        self
    }

    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    pub fn with_fades(mut self, fade_in_ms: u64, fade_out_ms: u64) -> Self {
        self.fade_in_ms = fade_in_ms;
        self.fade_out_ms = fade_out_ms;
        self
    }

    pub fn with_offset_ms(mut self, offset_ms: i64) -> Self {
        self.offset_ms = offset_ms;
        self
    }
}

/// A declared auxiliary layer.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LayerSpec {
    pub name: String,
    pub category: LayerCategory,
    /// Overrides the configured gain for the category.
    #[serde(default)]
    pub gain: Option<f32>,
    #[serde(default)]
    pub cues: Vec<CueSpec>,
}

/// A clip placed on the master timeline.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioClip {
    pub source: PathBuf,
    pub resolved_start_ms: u64,
    pub volume: f32,
    pub fade_in_ms: u64,
    pub fade_out_ms: u64,
    pub fit_mode: FitMode,
    /// Upper bound on how much of the source is used.
    pub max_len_ms: Option<u64>,
}

/// A resolved layer: clips sorted by start, none sharing a start.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioLayer {
    pub name: String,
    pub category: LayerCategory,
    pub gain: f32,
    pub clips: Vec<AudioClip>,
}

impl AudioLayer {
    /// Sort clips by start and reject two clips starting at the same instant.
    pub fn new(
        name: impl Into<String>,
        category: LayerCategory,
        gain: f32,
        mut clips: Vec<AudioClip>,
    ) -> NarrsyncResult<Self> {
        let name = name.into();
        clips.sort_by_key(|c| c.resolved_start_ms);
        if let Some(pair) = clips
            .windows(2)
            .find(|w| w[0].resolved_start_ms == w[1].resolved_start_ms)
        {
            return Err(NarrsyncError::composition(
                format!("layer '{name}'"),
                format!(
                    "'{}' and '{}' both start at {} ms",
                    pair[0].source.display(),
                    pair[1].source.display(),
                    pair[0].resolved_start_ms
                ),
            ));
        }
        Ok(Self {
            name,
            category,
            gain,
            clips,
        })
    }
}

/// Resolve every cue of `spec` against the captured events.
pub fn resolve_layer(
    spec: &LayerSpec,
    record: &CaptureRecord,
    store: &AudioStore,
    default_gain: f32,
) -> NarrsyncResult<AudioLayer> {
    let clips = spec
        .cues
        .iter()
        .enumerate()
        .map(|(i, cue)| {
            let target = format!("layer '{}' cue #{} ('{}')", spec.name, i + 1, cue.source.display());
            let fail = |cause: String| NarrsyncError::composition(target.clone(), cause);

            let resolved_start_ms = match (&cue.trigger_unit_id, cue.absolute_start_ms) {
                (Some(unit_id), None) => {
                    let event = record
                        .event(unit_id)
                        .ok_or_else(|| fail(format!("unknown trigger unit '{unit_id}'")))?;
                    event.pause_start_ms.saturating_add_signed(cue.offset_ms)
                }
                (None, Some(start_ms)) => start_ms,
                (Some(_), Some(_)) => {
                    return Err(fail(
                        "cue sets both trigger_unit_id and absolute_start_ms".to_string(),
                    ));
                }
                (None, None) => {
                    return Err(fail(
                        "cue needs either trigger_unit_id or absolute_start_ms".to_string(),
                    ));
                }
            };
            if !store.contains(&cue.source) {
                return Err(fail("source was not prepared".to_string()));
            }
            if !cue.volume.is_finite() || cue.volume < 0.0 {
                return Err(fail(format!("volume must be >= 0, got {}", cue.volume)));
            }

            Ok(AudioClip {
                source: cue.source.clone(),
                resolved_start_ms,
                volume: cue.volume,
                fade_in_ms: cue.fade_in_ms,
                fade_out_ms: cue.fade_out_ms,
                fit_mode: cue.fit_mode,
                max_len_ms: None,
            })
        })
        .collect::<NarrsyncResult<Vec<_>>>()?;

    AudioLayer::new(
        spec.name.clone(),
        spec.category,
        spec.gain.unwrap_or(default_gain),
        clips,
    )
}

/// One pass over the source, placed at `offset` frames on the timeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Repeat {
    pub offset: u64,
    pub len: u64,
}

/// Lay out the passes of a clip starting at `start`, all quantities in frames.
///
/// `next_start` is the following clip on the same layer; `track_end` bounds everything.
pub fn plan_repeats(
    fit_mode: FitMode,
    src_len: u64,
    start: u64,
    next_start: Option<u64>,
    track_end: u64,
) -> Result<Vec<Repeat>, String> {
    if src_len == 0 || start >= track_end {
        return Ok(Vec::new());
    }
    let bound = next_start.unwrap_or(track_end).min(track_end);
    let room = bound.saturating_sub(start);

    match fit_mode {
        FitMode::Loop => {
            let mut out = Vec::with_capacity(room.div_ceil(src_len) as usize);
            let mut offset = start;
            while offset < bound {
                let len = src_len.min(bound - offset);
                out.push(Repeat { offset, len });
                offset += len;
            }
            Ok(out)
        }
        FitMode::Once => {
            if let Some(next) = next_start
                && start + src_len > next
            {
                return Err(format!(
                    "plays for {src_len} frames but the next cue starts {} frames later",
                    next - start
                ));
            }
            Ok(vec![Repeat {
                offset: start,
                len: src_len.min(track_end - start),
            }])
        }
        FitMode::StopAtNextCue => Ok(vec![Repeat {
            offset: start,
            len: src_len.min(room),
        }]),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/audio/layer.rs"]
mod tests;
