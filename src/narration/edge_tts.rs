//! Speech synthesis through the `edge-tts` command line tool.
//!
//! `edge-tts` writes an MP3 and an SRT of boundary timings. The SRT entries become the clip's
//! word timestamps and `ffprobe` supplies the media duration.

use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::assemble::ffmpeg::{ffprobe_duration_args, parse_ffprobe_duration_ms};
use crate::narration::synth::{
    SpeechSynthesizer, SynthesisError, SynthesisRequest, SynthesizedClip,
};
use crate::subtitles::srt::parse_srt;
use crate::timeline::WordTimestamp;

/// stderr fragments that mark a failure as worth retrying.
const TRANSIENT_MARKERS: &[&str] = &[
    "ClientConnectorError",
    "ServerDisconnectedError",
    "WSServerHandshakeError",
    "TimeoutError",
    "Connection reset",
    "Temporary failure in name resolution",
    "NoAudioReceived",
    "503",
    "429",
];

/// [`SpeechSynthesizer`] backed by the `edge-tts` executable.
#[derive(Clone, Debug)]
pub struct EdgeTtsCli {
    program: OsString,
    ffprobe: OsString,
}

impl Default for EdgeTtsCli {
    fn default() -> Self {
        Self {
            program: OsString::from("edge-tts"),
            ffprobe: OsString::from("ffprobe"),
        }
    }
}

impl EdgeTtsCli {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific `edge-tts` executable instead of the one on `PATH`.
    pub fn with_program(mut self, program: impl Into<OsString>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_ffprobe(mut self, ffprobe: impl Into<OsString>) -> Self {
        self.ffprobe = ffprobe.into();
        self
    }

    async fn probe_duration_ms(&self, path: &Path) -> Result<u64, SynthesisError> {
        let out = Command::new(&self.ffprobe)
            .args(ffprobe_duration_args(path))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| SynthesisError::fatal(format!("failed to run ffprobe: {e}")))?;
        if !out.status.success() {
            return Err(SynthesisError::fatal(format!(
                "ffprobe failed for '{}': {}",
                path.display(),
                String::from_utf8_lossy(&out.stderr).trim()
            )));
        }
        parse_ffprobe_duration_ms(&String::from_utf8_lossy(&out.stdout))
            .map_err(|e| SynthesisError::fatal(format!("{e:#}")))
    }
}

#[async_trait]
impl SpeechSynthesizer for EdgeTtsCli {
    async fn synthesize(
        &self,
        request: &SynthesisRequest,
    ) -> Result<SynthesizedClip, SynthesisError> {
        if let Some(parent) = request.output_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                SynthesisError::fatal(format!(
                    "failed to create clip directory '{}': {e}",
                    parent.display()
                ))
            })?;
        }
        let subs_path = request.output_path.with_extension("srt");

        debug!(unit = %request.unit, voice = %request.voice.voice, "running edge-tts");
        let out = Command::new(&self.program)
            .args(edge_tts_args(request, &subs_path))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    SynthesisError::fatal("edge-tts was not found on PATH")
                } else {
                    SynthesisError::transient(format!("failed to run edge-tts: {e}"))
                }
            })?;
        if !out.status.success() {
            return Err(classify_failure(&String::from_utf8_lossy(&out.stderr)));
        }

        let srt = tokio::fs::read_to_string(&subs_path).await.map_err(|e| {
            SynthesisError::fatal(format!(
                "edge-tts did not write subtitles to '{}': {e}",
                subs_path.display()
            ))
        })?;
        let words: Vec<WordTimestamp> = parse_srt(&srt)
            .map_err(|e| SynthesisError::fatal(format!("unreadable edge-tts subtitles: {e:#}")))?
            .into_iter()
            .map(|entry| WordTimestamp {
                text: entry.text,
                start_ms: entry.start_ms,
                end_ms: entry.end_ms,
            })
            .collect();

        let probed = self.probe_duration_ms(&request.output_path).await?;
        let duration_ms = probed.max(words.last().map_or(0, |w| w.end_ms));
        if duration_ms == 0 {
            return Err(SynthesisError::transient("edge-tts produced an empty clip"));
        }

        Ok(SynthesizedClip {
            audio_path: request.output_path.clone(),
            duration_ms,
            words,
        })
    }
}

fn edge_tts_args(request: &SynthesisRequest, subs_path: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "--voice".into(),
        request.voice.voice.clone().into(),
        // `=` form so values starting with '-' are not taken for flags.
        format!("--rate={}", request.voice.rate).into(),
        format!("--text={}", request.text).into(),
        "--write-media".into(),
    ];
    args.push(request.output_path.clone().into_os_string());
    args.push("--write-subtitles".into());
    args.push(subs_path.as_os_str().to_os_string());
    args
}

fn classify_failure(stderr: &str) -> SynthesisError {
    let msg = stderr
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("edge-tts exited with an error")
        .trim()
        .to_string();
    if TRANSIENT_MARKERS.iter().any(|m| stderr.contains(m)) {
        SynthesisError::transient(msg)
    } else {
        SynthesisError::fatal(msg)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/narration/edge_tts.rs"]
mod tests;
