use std::path::{Path, PathBuf};

use crate::audio::pcm::AudioPcm;

/// How subtitles end up in the deliverable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubtitleMode {
    /// Rendered into the picture.
    #[default]
    Burned,
    /// Separate, toggleable subtitle track.
    Soft,
    /// Only the sidecar SRT file is written.
    None,
}

/// Codec settings for the muxed deliverable.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EncodeSettings {
    pub video_codec: String,
    pub preset: String,
    pub crf: u8,
    pub audio_codec: String,
    pub audio_bitrate: String,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            video_codec: "libx264".to_string(),
            preset: "medium".to_string(),
            crf: 23,
            audio_codec: "aac".to_string(),
            audio_bitrate: "128k".to_string(),
        }
    }
}

/// Raw interleaved `f32le` PCM on disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawAudioInput {
    pub path: PathBuf,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Everything needed to produce the deliverable container.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MuxRequest {
    pub video: PathBuf,
    /// Master audio, already fitted to the video length.
    pub audio: Option<RawAudioInput>,
    pub subtitles: Option<PathBuf>,
    pub subtitle_mode: SubtitleMode,
    pub encode: EncodeSettings,
    pub out_path: PathBuf,
    /// Scratch directory for intermediate files; discarded with the run.
    pub work_dir: PathBuf,
}

/// Palette GIF preview of a finished video.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreviewRequest {
    pub source: PathBuf,
    pub out_path: PathBuf,
    /// Scratch file for the generated palette.
    pub palette_path: PathBuf,
    pub fps: u32,
    pub width: u32,
    /// Only the first `max_duration_ms` of the source; `None` for all of it.
    pub max_duration_ms: Option<u64>,
}

/// Media decoding and muxing collaborator.
///
/// Calls are blocking; the pipeline runs them off the async runtime.
pub trait MediaBackend: Send + Sync {
    /// Decode any audio-bearing file to interleaved `f32` at the given format.
    fn decode_audio(&self, path: &Path, sample_rate: u32, channels: u16)
    -> anyhow::Result<AudioPcm>;

    fn probe_duration_ms(&self, path: &Path) -> anyhow::Result<u64>;

    /// Mux video, audio and subtitles into `req.out_path`, sharing one time origin.
    ///
    /// Returns the subtitle mode actually applied, which may be a fallback.
    fn mux(&self, req: &MuxRequest) -> anyhow::Result<SubtitleMode>;

    fn render_preview(&self, req: &PreviewRequest) -> anyhow::Result<()>;
}
