use std::path::PathBuf;

use crate::assemble::backend::{EncodeSettings, SubtitleMode};
use crate::audio::layer::AudioLayer;
use crate::audio::pcm::AudioPcm;
use crate::foundation::core::{ms_to_samples, samples_to_ms};
use crate::subtitles::cues::SubtitleCue;

/// Optional looping GIF preview.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    pub fps: u32,
    pub width: u32,
    pub max_duration_ms: Option<u64>,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            fps: 10,
            width: 800,
            max_duration_ms: Some(30_000),
        }
    }
}

/// What the deliverable is called and how it is encoded.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// File stem shared by the video, subtitle and preview outputs.
    pub name: String,
    pub subtitle_mode: SubtitleMode,
    #[serde(flatten)]
    pub encode: EncodeSettings,
    pub preview: Option<PreviewConfig>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            name: "demo".to_string(),
            subtitle_mode: SubtitleMode::Burned,
            encode: EncodeSettings::default(),
            preview: None,
        }
    }
}

/// Everything the assembler consumes. Built once per run and consumed by [`AssemblyPlan::fit_to_video`].
#[derive(Clone, Debug)]
pub struct AssemblyPlan {
    pub video: PathBuf,
    pub layers: Vec<AudioLayer>,
    /// Limited master mix of `layers`.
    pub audio: AudioPcm,
    pub cues: Vec<SubtitleCue>,
    pub output: OutputConfig,
}

/// What fitting had to change to match the video.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FitStats {
    pub video_ms: u64,
    pub audio_trimmed_ms: u64,
    pub audio_padded_ms: u64,
    pub cues_dropped: usize,
    pub cues_clipped: usize,
}

/// A plan whose audio and subtitles end exactly where the video does.
#[derive(Clone, Debug)]
pub struct FittedPlan {
    pub video: PathBuf,
    pub audio: AudioPcm,
    pub cues: Vec<SubtitleCue>,
    pub output: OutputConfig,
    pub stats: FitStats,
}

impl AssemblyPlan {
    /// Make the video authoritative: trim or silence-pad the audio to `video_ms`, drop cues that
    /// start at or after the end, and clip the ones that run past it. Sample 0 stays at frame 0.
    pub fn fit_to_video(self, video_ms: u64) -> FittedPlan {
        let mut audio = self.audio;
        let target = ms_to_samples(video_ms, audio.sample_rate) as usize;
        let current = audio.frames();
        let mut stats = FitStats {
            video_ms,
            ..FitStats::default()
        };
        if current > target {
            stats.audio_trimmed_ms = samples_to_ms((current - target) as u64, audio.sample_rate);
        } else {
            stats.audio_padded_ms = samples_to_ms((target - current) as u64, audio.sample_rate);
        }
        audio.resize_frames(target);

        let before = self.cues.len();
        let mut cues: Vec<SubtitleCue> = self
            .cues
            .into_iter()
            .filter(|c| c.start_ms < video_ms)
            .collect();
        stats.cues_dropped = before - cues.len();
        for cue in &mut cues {
            if cue.end_ms > video_ms {
                cue.end_ms = video_ms;
                stats.cues_clipped += 1;
            }
        }

        FittedPlan {
            video: self.video,
            audio,
            cues,
            output: self.output,
            stats,
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/assemble/plan.rs"]
mod tests;
