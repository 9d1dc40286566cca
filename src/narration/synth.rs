use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::foundation::core::UnitRef;
use crate::timeline::WordTimestamp;

/// Voice and speaking rate shared by every unit of a run.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    pub voice: String,
    /// Relative rate such as `+0%` or `-5%`.
    pub rate: String,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            voice: "en-US-AriaNeural".to_string(),
            rate: "+0%".to_string(),
        }
    }
}

/// One synthesis call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SynthesisRequest {
    pub unit: UnitRef,
    pub text: String,
    pub voice: VoiceConfig,
    /// Where the synthesizer should write the audio clip.
    pub output_path: PathBuf,
}

/// What a synthesizer returns for one non-empty narration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SynthesizedClip {
    pub audio_path: PathBuf,
    pub duration_ms: u64,
    /// Ordered word timings relative to the clip start.
    pub words: Vec<WordTimestamp>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SynthesisErrorKind {
    /// Worth retrying: connectivity, throttling, empty responses.
    Transient,
    Fatal,
}

impl fmt::Display for SynthesisErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => f.write_str("transient"),
            Self::Fatal => f.write_str("fatal"),
        }
    }
}

/// Classified synthesis failure.
#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq)]
#[error("{kind} synthesis failure: {message}")]
pub struct SynthesisError {
    pub kind: SynthesisErrorKind,
    pub message: String,
}

impl SynthesisError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: SynthesisErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            kind: SynthesisErrorKind::Fatal,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind == SynthesisErrorKind::Transient
    }
}

/// Speech-synthesis collaborator.
///
/// Implementations must be safe to call concurrently for different units.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, request: &SynthesisRequest)
    -> Result<SynthesizedClip, SynthesisError>;
}
