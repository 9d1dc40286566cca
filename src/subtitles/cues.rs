use tracing::{debug, info};

use crate::capture::driver::CaptureRecord;
use crate::foundation::core::UnitRef;
use crate::foundation::error::{NarrsyncError, NarrsyncResult};
use crate::timeline::{EstimatedTimeline, NarrationClip, WordTimestamp};

/// One subtitle entry on the master timeline.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SubtitleCue {
    pub unit: UnitRef,
    pub start_ms: u64,
    pub end_ms: u64,
    pub text: String,
}

/// Grouping rules for turning word timings into readable cues.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SubtitleConfig {
    /// A silence longer than this starts a new cue, and a cue lingers at most this long after
    /// its last word.
    pub gap_threshold_ms: u64,
    pub max_words_per_cue: usize,
    pub max_chars_per_cue: usize,
}

impl Default for SubtitleConfig {
    fn default() -> Self {
        Self {
            gap_threshold_ms: 600,
            max_words_per_cue: 8,
            max_chars_per_cue: 42,
        }
    }
}

/// Build the ordered subtitle track from narration word timings and measured pause starts.
///
/// Silent units contribute nothing. A narration without word timings becomes a single cue over
/// the whole clip. Overlapping cues are an error, never merged.
#[tracing::instrument(skip_all)]
pub fn synthesize_cues(
    timeline: &EstimatedTimeline,
    record: &CaptureRecord,
    cfg: &SubtitleConfig,
) -> NarrsyncResult<Vec<SubtitleCue>> {
    let mut cues = Vec::new();
    for (unit, clip) in timeline.iter() {
        if clip.is_silent() || clip.text.trim().is_empty() {
            continue;
        }
        let event = record.event(&unit.id).ok_or_else(|| {
            NarrsyncError::composition(
                format!("subtitles for {}", unit.unit_ref()),
                "no capture event for unit",
            )
        })?;

        let before = cues.len();
        cues.extend(
            clip_cues(clip, cfg)
                .into_iter()
                .map(|(start, end, text)| SubtitleCue {
                    unit: clip.unit.clone(),
                    start_ms: event.pause_start_ms + start,
                    end_ms: event.pause_start_ms + end,
                    text,
                }),
        );
        debug!(unit = %clip.unit, cues = cues.len() - before, "subtitle cues built");
    }

    cues.sort_by_key(|c| (c.start_ms, c.end_ms));
    check_cues(&cues, timeline, record)?;

    info!(cues = cues.len(), "subtitles synthesized");
    Ok(cues)
}

/// Cues for one clip as `(start, end, text)` relative to the clip start.
fn clip_cues(clip: &NarrationClip, cfg: &SubtitleConfig) -> Vec<(u64, u64, String)> {
    if clip.words.is_empty() {
        return vec![(0, clip.duration_ms, clip.text.trim().to_string())];
    }

    let groups = group_words(&clip.words, cfg);
    let mut out = Vec::with_capacity(groups.len());
    for (i, group) in groups.iter().enumerate() {
        let (Some(first), Some(last)) = (group.first(), group.last()) else {
            continue;
        };
        let mut end = (last.end_ms + cfg.gap_threshold_ms).min(clip.duration_ms);
        if let Some(next) = groups.get(i + 1).and_then(|g| g.first()) {
            end = end.min(next.start_ms);
        }
        let start = first.start_ms.min(clip.duration_ms);
        if end <= start {
            continue;
        }
        let text = group
            .iter()
            .map(|w| w.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        out.push((start, end, text));
    }
    out
}

fn group_words<'a>(words: &'a [WordTimestamp], cfg: &SubtitleConfig) -> Vec<Vec<&'a WordTimestamp>> {
    let max_words = cfg.max_words_per_cue.max(1);
    let mut groups: Vec<Vec<&WordTimestamp>> = Vec::new();
    let mut current: Vec<&WordTimestamp> = Vec::new();
    let mut chars = 0usize;

    for word in words {
        let len = word.text.trim().chars().count();
        if let Some(prev) = current.last() {
            let gap = word.start_ms.saturating_sub(prev.end_ms);
            if gap > cfg.gap_threshold_ms
                || current.len() >= max_words
                || chars + 1 + len > cfg.max_chars_per_cue
            {
                groups.push(std::mem::take(&mut current));
                chars = 0;
            }
        }
        chars += if current.is_empty() { len } else { len + 1 };
        current.push(word);
    }
    if !current.is_empty() {
        groups.push(current);
    }
    groups
}

fn check_cues(
    cues: &[SubtitleCue],
    timeline: &EstimatedTimeline,
    record: &CaptureRecord,
) -> NarrsyncResult<()> {
    for pair in cues.windows(2) {
        if pair[0].end_ms > pair[1].start_ms {
            return Err(NarrsyncError::composition(
                format!("subtitle cue for {}", pair[1].unit),
                format!(
                    "starts at {} ms, before the cue for {} ends at {} ms",
                    pair[1].start_ms, pair[0].unit, pair[0].end_ms
                ),
            ));
        }
    }
    for cue in cues {
        let bounds = timeline
            .clip(&cue.unit.id)
            .zip(record.event(&cue.unit.id))
            .map(|(clip, ev)| (ev.pause_start_ms, ev.pause_start_ms + clip.duration_ms));
        if let Some((lo, hi)) = bounds
            && (cue.start_ms < lo || cue.end_ms > hi)
        {
            return Err(NarrsyncError::composition(
                format!("subtitle cue for {}", cue.unit),
                format!(
                    "[{}, {}] ms falls outside its clip [{lo}, {hi}] ms",
                    cue.start_ms, cue.end_ms
                ),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/subtitles/cues.rs"]
mod tests;
