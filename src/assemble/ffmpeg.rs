use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::OnceLock;

use anyhow::{Context, bail};
use tracing::{debug, warn};

use crate::assemble::backend::{
    EncodeSettings, MediaBackend, MuxRequest, PreviewRequest, RawAudioInput, SubtitleMode,
};
use crate::assemble::stitch::{ClipBackend, ClipFormat, ConcatRequest, NormalizeRequest};
use crate::audio::pcm::AudioPcm;

/// Name the subtitle file is copied to before burning, so the filter argument needs no escaping.
const BURN_SUBS_NAME: &str = "subs.srt";
const BURN_STYLE: &str = "FontSize=22,PrimaryColour=&HFFFFFF&,OutlineColour=&H40000000&,\
                          Outline=2,Shadow=1,MarginV=30,Alignment=2";

/// [`MediaBackend`] that shells out to the system `ffmpeg` and `ffprobe`.
#[derive(Debug)]
pub struct FfmpegBackend {
    ffmpeg: OsString,
    ffprobe: OsString,
    subtitles_filter: OnceLock<bool>,
}

impl Default for FfmpegBackend {
    fn default() -> Self {
        Self {
            ffmpeg: OsString::from("ffmpeg"),
            ffprobe: OsString::from("ffprobe"),
            subtitles_filter: OnceLock::new(),
        }
    }
}

impl FfmpegBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_programs(ffmpeg: impl Into<OsString>, ffprobe: impl Into<OsString>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
            subtitles_filter: OnceLock::new(),
        }
    }

    /// Whether this ffmpeg build carries the libass `subtitles` filter. Checked once.
    pub fn has_subtitles_filter(&self) -> bool {
        *self
            .subtitles_filter
            .get_or_init(|| has_subtitles_filter(&self.ffmpeg))
    }

    fn run_ffmpeg(&self, args: &[OsString], cwd: Option<&Path>, what: &str) -> anyhow::Result<()> {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(args).stdin(Stdio::null()).stdout(Stdio::null());
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        debug!(what, args = ?args, "running ffmpeg");
        let out = cmd
            .output()
            .with_context(|| format!("failed to spawn ffmpeg for {what} (is it installed and on PATH?)"))?;
        if !out.status.success() {
            bail!(
                "ffmpeg {what} exited with status {}: {}",
                out.status,
                stderr_tail(&out.stderr)
            );
        }
        Ok(())
    }
}

impl MediaBackend for FfmpegBackend {
    fn decode_audio(
        &self,
        path: &Path,
        sample_rate: u32,
        channels: u16,
    ) -> anyhow::Result<AudioPcm> {
        let out = Command::new(&self.ffmpeg)
            .args(["-v", "error", "-i"])
            .arg(path)
            .args([
                "-vn",
                "-f",
                "f32le",
                "-acodec",
                "pcm_f32le",
                "-ac",
                &channels.to_string(),
                "-ar",
                &sample_rate.to_string(),
                "pipe:1",
            ])
            .stdin(Stdio::null())
            .output()
            .context("failed to run ffmpeg for audio decode")?;

        if !out.status.success() {
            let msg = String::from_utf8_lossy(&out.stderr);
            // No audio stream decodes to nothing rather than failing.
            if msg.contains("matches no streams")
                || msg.contains("Output file #0 does not contain any stream")
                || msg.contains("Output file does not contain any stream")
            {
                return Ok(AudioPcm::silence(sample_rate, channels, 0));
            }
            bail!(
                "ffmpeg audio decode failed for '{}': {}",
                path.display(),
                msg.trim()
            );
        }

        if !out.stdout.len().is_multiple_of(4) {
            bail!("decoded audio byte length is not aligned to f32 samples");
        }
        let interleaved_f32 = out
            .stdout
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Ok(AudioPcm {
            sample_rate,
            channels,
            interleaved_f32,
        })
    }

    fn probe_duration_ms(&self, path: &Path) -> anyhow::Result<u64> {
        let out = Command::new(&self.ffprobe)
            .args(ffprobe_duration_args(path))
            .stdin(Stdio::null())
            .output()
            .context("failed to run ffprobe")?;
        if !out.status.success() {
            bail!(
                "ffprobe failed for '{}': {}",
                path.display(),
                String::from_utf8_lossy(&out.stderr).trim()
            );
        }
        parse_ffprobe_duration_ms(&String::from_utf8_lossy(&out.stdout))
            .with_context(|| format!("probing '{}'", path.display()))
    }

    fn mux(&self, req: &MuxRequest) -> anyhow::Result<SubtitleMode> {
        let mut mode = match &req.subtitles {
            Some(_) => req.subtitle_mode,
            None => SubtitleMode::None,
        };
        if mode == SubtitleMode::Burned && !self.has_subtitles_filter() {
            warn!("ffmpeg has no libass subtitles filter; muxing a soft subtitle track instead");
            mode = SubtitleMode::Soft;
        }

        if let Some(parent) = req.out_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
        }
        let video = absolute(&req.video)?;
        let out_path = absolute(&req.out_path)?;
        let audio = req
            .audio
            .as_ref()
            .map(|a| -> anyhow::Result<RawAudioInput> {
                Ok(RawAudioInput {
                    path: absolute(&a.path)?,
                    ..a.clone()
                })
            })
            .transpose()?;

        let subs = match (mode, &req.subtitles) {
            (SubtitleMode::Burned, Some(srt)) => {
                std::fs::copy(srt, req.work_dir.join(BURN_SUBS_NAME)).with_context(|| {
                    format!("failed to stage subtitles '{}' for burning", srt.display())
                })?;
                None
            }
            (SubtitleMode::Soft, Some(srt)) => Some(absolute(srt)?),
            _ => None,
        };

        let args = mux_args(&MuxArgs {
            video: &video,
            audio: audio.as_ref(),
            soft_subtitles: subs.as_deref(),
            burn: mode == SubtitleMode::Burned,
            encode: &req.encode,
            out_path: &out_path,
        });
        self.run_ffmpeg(&args, Some(&req.work_dir), "mux")?;
        Ok(mode)
    }

    fn render_preview(&self, req: &PreviewRequest) -> anyhow::Result<()> {
        if req.fps == 0 || req.width == 0 {
            bail!("preview fps and width must be non-zero");
        }
        if let Some(parent) = req.out_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create preview directory '{}'", parent.display()))?;
        }
        self.run_ffmpeg(&preview_palette_args(req), None, "preview palette")?;
        self.run_ffmpeg(&preview_gif_args(req), None, "preview gif")
    }
}

impl ClipBackend for FfmpegBackend {
    fn has_audio_stream(&self, path: &Path) -> anyhow::Result<bool> {
        let out = Command::new(&self.ffprobe)
            .args(ffprobe_audio_stream_args(path))
            .stdin(Stdio::null())
            .output()
            .context("failed to run ffprobe")?;
        if !out.status.success() {
            bail!(
                "ffprobe failed for '{}': {}",
                path.display(),
                String::from_utf8_lossy(&out.stderr).trim()
            );
        }
        Ok(!String::from_utf8_lossy(&out.stdout).trim().is_empty())
    }

    fn normalize_clip(&self, req: &NormalizeRequest) -> anyhow::Result<()> {
        let req = NormalizeRequest {
            input: absolute(&req.input)?,
            output: absolute(&req.output)?,
            ..req.clone()
        };
        self.run_ffmpeg(&normalize_args(&req), None, "normalize")
    }

    fn concat_clips(&self, req: &ConcatRequest) -> anyhow::Result<()> {
        let mut list = String::new();
        for clip in &req.clips {
            list.push_str(&concat_list_entry(&absolute(clip)?));
        }
        std::fs::write(&req.list_path, list)
            .with_context(|| format!("failed to write concat list '{}'", req.list_path.display()))?;
        self.run_ffmpeg(&concat_args(&req.list_path, &req.out_path, &req.format), None, "concat")
    }
}

pub(crate) struct MuxArgs<'a> {
    pub video: &'a Path,
    pub audio: Option<&'a RawAudioInput>,
    pub soft_subtitles: Option<&'a Path>,
    /// Burn `subs.srt` from the working directory into the picture.
    pub burn: bool,
    pub encode: &'a EncodeSettings,
    pub out_path: &'a Path,
}

pub(crate) fn mux_args(m: &MuxArgs<'_>) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-y", "-loglevel", "error", "-i"].map(OsString::from).into();
    args.push(m.video.into());

    if let Some(audio) = m.audio {
        args.extend(["-f", "f32le", "-ar"].map(OsString::from));
        args.push(audio.sample_rate.to_string().into());
        args.push("-ac".into());
        args.push(audio.channels.to_string().into());
        args.push("-i".into());
        args.push(audio.path.clone().into_os_string());
    }
    if let Some(srt) = m.soft_subtitles {
        args.push("-i".into());
        args.push(srt.into());
    }
    if m.burn {
        args.push("-vf".into());
        args.push(format!("subtitles={BURN_SUBS_NAME}:force_style='{BURN_STYLE}'").into());
    }

    args.extend(["-map", "0:v:0"].map(OsString::from));
    if m.audio.is_some() {
        args.extend(["-map", "1:a:0"].map(OsString::from));
    }
    if m.soft_subtitles.is_some() {
        let idx = if m.audio.is_some() { 2 } else { 1 };
        args.push("-map".into());
        args.push(format!("{idx}:s:0").into());
    }

    args.push("-c:v".into());
    args.push(m.encode.video_codec.clone().into());
    args.push("-preset".into());
    args.push(m.encode.preset.clone().into());
    args.push("-crf".into());
    args.push(m.encode.crf.to_string().into());
    args.extend(["-pix_fmt", "yuv420p"].map(OsString::from));
    if m.audio.is_some() {
        args.push("-c:a".into());
        args.push(m.encode.audio_codec.clone().into());
        args.push("-b:a".into());
        args.push(m.encode.audio_bitrate.clone().into());
    } else {
        args.push("-an".into());
    }
    if m.soft_subtitles.is_some() {
        args.extend(["-c:s", "mov_text", "-metadata:s:s:0", "language=eng"].map(OsString::from));
    }
    args.extend(["-movflags", "+faststart"].map(OsString::from));
    args.push(m.out_path.into());
    args
}

fn preview_filter(req: &PreviewRequest) -> String {
    format!("fps={},scale={}:-1:flags=lanczos", req.fps, req.width)
}

fn preview_limit(req: &PreviewRequest) -> Vec<OsString> {
    match req.max_duration_ms {
        Some(ms) => vec!["-t".into(), format!("{:.3}", ms as f64 / 1000.0).into()],
        None => Vec::new(),
    }
}

pub(crate) fn preview_palette_args(req: &PreviewRequest) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-y".into(), "-loglevel".into(), "error".into()];
    args.extend(preview_limit(req));
    args.push("-i".into());
    args.push(req.source.clone().into_os_string());
    args.push("-vf".into());
    args.push(format!("{},palettegen", preview_filter(req)).into());
    args.push(req.palette_path.clone().into_os_string());
    args
}

pub(crate) fn preview_gif_args(req: &PreviewRequest) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-y".into(), "-loglevel".into(), "error".into()];
    args.extend(preview_limit(req));
    args.push("-i".into());
    args.push(req.source.clone().into_os_string());
    args.push("-i".into());
    args.push(req.palette_path.clone().into_os_string());
    args.push("-lavfi".into());
    args.push(format!("{}[x];[x][1:v]paletteuse", preview_filter(req)).into());
    args.push(req.out_path.clone().into_os_string());
    args
}

fn seconds(ms: u64) -> OsString {
    format!("{:.3}", ms as f64 / 1000.0).into()
}

fn clip_encode_args(format: &ClipFormat) -> Vec<OsString> {
    let e = &format.encode;
    let mut args: Vec<OsString> = vec![
        "-c:v".into(),
        e.video_codec.clone().into(),
        "-preset".into(),
        e.preset.clone().into(),
        "-crf".into(),
        e.crf.to_string().into(),
        "-c:a".into(),
        e.audio_codec.clone().into(),
        "-b:a".into(),
        e.audio_bitrate.clone().into(),
        "-ar".into(),
        format.sample_rate.to_string().into(),
        "-ac".into(),
        "2".into(),
        "-r".into(),
        format.fps.to_string().into(),
    ];
    args.extend(["-pix_fmt", "yuv420p"].map(OsString::from));
    args
}

/// Trim, letterbox to the clip format, and add silence when the input has no audio.
pub(crate) fn normalize_args(req: &NormalizeRequest) -> Vec<OsString> {
    let f = &req.format;
    let mut args: Vec<OsString> = ["-y", "-loglevel", "error"].map(OsString::from).into();
    let (start_ms, end_ms) = req.trim.unwrap_or((0, None));
    if start_ms > 0 {
        args.push("-ss".into());
        args.push(seconds(start_ms));
    }
    args.push("-i".into());
    args.push(req.input.clone().into_os_string());
    if !req.has_audio {
        args.extend(["-f", "lavfi", "-i"].map(OsString::from));
        args.push(format!("anullsrc=r={}:cl=stereo", f.sample_rate).into());
    }
    if let Some(end_ms) = end_ms {
        args.push("-t".into());
        args.push(seconds(end_ms.saturating_sub(start_ms)));
    }
    args.push("-vf".into());
    args.push(
        format!(
            "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2",
            w = f.width,
            h = f.height
        )
        .into(),
    );
    args.extend(["-map", "0:v:0", "-map"].map(OsString::from));
    args.push((if req.has_audio { "0:a:0" } else { "1:a:0" }).into());
    args.extend(clip_encode_args(f));
    if !req.has_audio {
        args.push("-shortest".into());
    }
    args.push(req.output.clone().into_os_string());
    args
}

/// One line of an ffmpeg concat demuxer list.
pub(crate) fn concat_list_entry(path: &Path) -> String {
    format!("file '{}'\n", path.display().to_string().replace('\'', "'\\''"))
}

pub(crate) fn concat_args(list_path: &Path, out_path: &Path, format: &ClipFormat) -> Vec<OsString> {
    let mut args: Vec<OsString> =
        ["-y", "-loglevel", "error", "-f", "concat", "-safe", "0", "-i"].map(OsString::from).into();
    args.push(list_path.into());
    args.extend(clip_encode_args(format));
    args.extend(["-movflags", "+faststart"].map(OsString::from));
    args.push(out_path.into());
    args
}

/// `ffprobe` arguments listing only audio streams; empty output means none.
pub(crate) fn ffprobe_audio_stream_args(path: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = [
        "-v",
        "error",
        "-select_streams",
        "a",
        "-show_entries",
        "stream=codec_type",
        "-of",
        "default=noprint_wrappers=1:nokey=1",
    ]
    .map(OsString::from)
    .into();
    args.push(path.into());
    args
}

/// `ffprobe` arguments printing only the container duration in seconds.
pub(crate) fn ffprobe_duration_args(path: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = [
        "-v",
        "error",
        "-show_entries",
        "format=duration",
        "-of",
        "default=noprint_wrappers=1:nokey=1",
    ]
    .iter()
    .map(OsString::from)
    .collect();
    args.push(path.as_os_str().to_os_string());
    args
}

/// Parse `ffprobe`'s duration output (seconds) into whole milliseconds, rounded.
pub(crate) fn parse_ffprobe_duration_ms(stdout: &str) -> anyhow::Result<u64> {
    let raw = stdout
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .context("ffprobe reported no duration")?;
    let secs: f64 = raw
        .parse()
        .with_context(|| format!("ffprobe duration '{raw}' is not a number"))?;
    if !secs.is_finite() || secs < 0.0 {
        bail!("ffprobe duration '{raw}' is out of range");
    }
    Ok((secs * 1000.0).round() as u64)
}

fn has_subtitles_filter(ffmpeg: &OsStr) -> bool {
    let Ok(out) = Command::new(ffmpeg)
        .args(["-hide_banner", "-filters"])
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
    else {
        return false;
    };
    String::from_utf8_lossy(&out.stdout)
        .lines()
        .any(|l| l.split_whitespace().nth(1) == Some("subtitles"))
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.trim().lines().collect();
    lines[lines.len().saturating_sub(12)..].join("\n")
}

/// Return `true` when `program -version` runs successfully.
pub fn is_tool_on_path(program: &str) -> bool {
    Command::new(program)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Resolve a path the way the muxer will see it.
pub(crate) fn absolute(path: &Path) -> anyhow::Result<PathBuf> {
    std::path::absolute(path).with_context(|| format!("cannot resolve '{}'", path.display()))
}

#[cfg(test)]
#[path = "../../tests/unit/assemble/ffmpeg.rs"]
mod tests;
