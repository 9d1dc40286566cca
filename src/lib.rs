//! narrsync records narrated screen demos whose voice-over, sound layers and subtitles line up
//! with what is on screen.
//!
//! A run goes through four phases:
//!
//! - estimate every narration's spoken duration up front ([`estimate_narrations`])
//! - drive the visual surface unit by unit, pausing exactly as long as each narration and
//!   measuring when every pause begins ([`capture`])
//! - place narration, music and effect cues at the measured offsets and mix them, and derive
//!   subtitle cues from word timings ([`compose_audio`], [`synthesize_cues`])
//! - fit everything to the recorded video and mux the deliverable ([`assemble`])
//!
//! [`run`] chains the phases inside a per-run [`RunContext`].
//! [`stitch`] joins finished videos with branded intro, outro and transition clips.
#![forbid(unsafe_code)]

mod foundation;

pub(crate) mod assemble;
pub(crate) mod audio;
pub(crate) mod capture;
pub mod config;
pub(crate) mod narration;
pub mod pipeline;
pub mod preflight;
pub(crate) mod subtitles;
pub mod timeline;

pub use crate::foundation::core::{UnitRef, format_srt_time, ms_to_samples, samples_to_ms};
pub use crate::foundation::error::{NarrsyncError, NarrsyncResult};

pub use crate::assemble::backend::{
    EncodeSettings, MediaBackend, MuxRequest, PreviewRequest, RawAudioInput, SubtitleMode,
};
pub use crate::assemble::ffmpeg::{FfmpegBackend, is_tool_on_path};
pub use crate::assemble::plan::{AssemblyPlan, FitStats, FittedPlan, OutputConfig, PreviewConfig};
pub use crate::assemble::stitch::{
    BrandedCut, ClipBackend, ClipFormat, ClipSegment, ConcatRequest, NormalizeRequest, StitchClip,
    StitchPlan, Stitched, Transition, stitch,
};
pub use crate::assemble::{Deliverable, assemble};
pub use crate::audio::compose::{ComposedAudio, compose_audio, narration_layer, required_sources};
pub use crate::audio::layer::{
    AudioClip, AudioLayer, CueSpec, FitMode, LayerCategory, LayerSpec, resolve_layer,
};
pub use crate::audio::mix::{LayerGains, LimiterConfig, LimiterMode, MixConfig, mix_layers};
pub use crate::audio::pcm::{AudioPcm, AudioStore};
pub use crate::capture::driver::{CaptureConfig, CaptureEvent, CaptureRecord, capture};
pub use crate::capture::surface::VisualSurface;
pub use crate::config::RunConfig;
pub use crate::narration::edge_tts::EdgeTtsCli;
pub use crate::narration::estimate::{EstimationConfig, estimate_narrations};
pub use crate::narration::retry::RetryPolicy;
pub use crate::narration::synth::{
    SpeechSynthesizer, SynthesisError, SynthesisErrorKind, SynthesisRequest, SynthesizedClip,
    VoiceConfig,
};
pub use crate::pipeline::{Collaborators, RunContext, RunOutput, RunStats, run};
pub use crate::preflight::{Preflight, PreflightReport, ToolCheck};
pub use crate::subtitles::cues::{SubtitleConfig, SubtitleCue, synthesize_cues};
pub use crate::subtitles::srt::{SrtEntry, parse_srt, write_srt, write_srt_file};
pub use crate::timeline::{
    ActionSpec, EstimatedTimeline, NarratedUnit, NarrationClip, Timeline, WordTimestamp,
};
