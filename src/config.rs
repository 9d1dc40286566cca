use std::path::Path;

use anyhow::Context as _;

use crate::assemble::plan::OutputConfig;
use crate::audio::mix::MixConfig;
use crate::capture::driver::CaptureConfig;
use crate::foundation::error::{NarrsyncError, NarrsyncResult};
use crate::narration::estimate::EstimationConfig;
use crate::narration::synth::VoiceConfig;
use crate::subtitles::cues::SubtitleConfig;

/// Settings for one narrated capture run. Every section and field has a default, so `{}` is a
/// complete configuration.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub voice: VoiceConfig,
    pub estimation: EstimationConfig,
    pub capture: CaptureConfig,
    pub mix: MixConfig,
    pub subtitles: SubtitleConfig,
    pub output: OutputConfig,
}

impl RunConfig {
    pub fn from_json_str(s: &str) -> NarrsyncResult<Self> {
        let cfg: Self = serde_json::from_str(s)
            .map_err(|e| NarrsyncError::config(format!("invalid run config JSON: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_json_file(path: &Path) -> NarrsyncResult<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read run config '{}'", path.display()))?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> NarrsyncResult<()> {
        if self.estimation.max_concurrency == 0 {
            return Err(NarrsyncError::config(
                "estimation.max_concurrency must be at least 1",
            ));
        }
        if self.estimation.retry.max_attempts == 0 {
            return Err(NarrsyncError::config(
                "estimation.retry.max_attempts must be at least 1",
            ));
        }
        if self.voice.voice.trim().is_empty() {
            return Err(NarrsyncError::config("voice.voice must not be empty"));
        }

        if self.mix.sample_rate == 0 {
            return Err(NarrsyncError::config("mix.sample_rate must be > 0"));
        }
        if !matches!(self.mix.channels, 1 | 2) {
            return Err(NarrsyncError::config(format!(
                "mix.channels must be 1 or 2, got {}",
                self.mix.channels
            )));
        }
        let gains = &self.mix.gains;
        for (name, gain) in [
            ("narration", gains.narration),
            ("music", gains.music),
            ("sfx", gains.sfx),
        ] {
            if !gain.is_finite() || gain < 0.0 {
                return Err(NarrsyncError::config(format!(
                    "mix.gains.{name} must be a finite value >= 0, got {gain}"
                )));
            }
        }
        let ceiling = self.mix.limiter.ceiling;
        if !(ceiling > 0.0 && ceiling <= 1.0) {
            return Err(NarrsyncError::config(format!(
                "mix.limiter.ceiling must be in (0, 1], got {ceiling}"
            )));
        }

        if self.subtitles.max_words_per_cue == 0 || self.subtitles.max_chars_per_cue == 0 {
            return Err(NarrsyncError::config(
                "subtitles.max_words_per_cue and max_chars_per_cue must be at least 1",
            ));
        }

        let name = &self.output.name;
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(NarrsyncError::config(format!(
                "output.name must be a plain file stem, got '{name}'"
            )));
        }
        if let Some(preview) = &self.output.preview
            && (preview.fps == 0 || preview.width == 0)
        {
            return Err(NarrsyncError::config(
                "output.preview fps and width must be > 0",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../tests/unit/config.rs"]
mod tests;
