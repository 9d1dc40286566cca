//! External tool checks run before a capture is attempted.

use std::ffi::{OsStr, OsString};
use std::process::{Command, Stdio};

use tracing::{info, warn};

use crate::assemble::ffmpeg::FfmpegBackend;

/// Outcome of one check.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ToolCheck {
    pub name: String,
    pub ok: bool,
    /// A missing optional tool degrades the run instead of blocking it.
    pub required: bool,
    pub detail: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PreflightReport {
    pub checks: Vec<ToolCheck>,
}

impl PreflightReport {
    /// `true` when every required tool is usable.
    pub fn is_ready(&self) -> bool {
        self.checks.iter().all(|c| c.ok || !c.required)
    }

    pub fn failures(&self) -> impl Iterator<Item = &ToolCheck> {
        self.checks.iter().filter(|c| !c.ok)
    }
}

/// Executables the run depends on.
#[derive(Clone, Debug)]
pub struct Preflight {
    pub ffmpeg: OsString,
    pub ffprobe: OsString,
    pub edge_tts: OsString,
}

impl Default for Preflight {
    fn default() -> Self {
        Self {
            ffmpeg: OsString::from("ffmpeg"),
            ffprobe: OsString::from("ffprobe"),
            edge_tts: OsString::from("edge-tts"),
        }
    }
}

impl Preflight {
    pub fn run(&self) -> PreflightReport {
        let mut checks = vec![
            version_check("ffmpeg", &self.ffmpeg, "-version"),
            version_check("ffprobe", &self.ffprobe, "-version"),
            version_check("edge-tts", &self.edge_tts, "--help"),
        ];

        let libass = if checks[0].ok {
            let backend = FfmpegBackend::with_programs(self.ffmpeg.clone(), self.ffprobe.clone());
            if backend.has_subtitles_filter() {
                (true, "subtitles filter available".to_string())
            } else {
                (
                    false,
                    "ffmpeg built without libass; burned subtitles fall back to a soft track"
                        .to_string(),
                )
            }
        } else {
            (false, "ffmpeg unavailable".to_string())
        };
        checks.push(ToolCheck {
            name: "libass".to_string(),
            ok: libass.0,
            required: false,
            detail: libass.1,
        });

        for c in &checks {
            if c.ok {
                info!(tool = %c.name, detail = %c.detail, "preflight ok");
            } else {
                warn!(tool = %c.name, required = c.required, detail = %c.detail, "preflight failed");
            }
        }
        PreflightReport { checks }
    }
}

fn version_check(name: &str, program: &OsStr, flag: &str) -> ToolCheck {
    let (ok, detail) = match Command::new(program)
        .arg(flag)
        .stdin(Stdio::null())
        .output()
    {
        Ok(out) if out.status.success() => {
            let text = String::from_utf8_lossy(&out.stdout);
            let first = text.lines().map(str::trim).find(|l| !l.is_empty());
            (true, first.unwrap_or("available").to_string())
        }
        Ok(out) => (
            false,
            format!("`{} {flag}` exited with status {}", program.to_string_lossy(), out.status),
        ),
        Err(e) => (
            false,
            format!("cannot run '{}': {e}", program.to_string_lossy()),
        ),
    };
    ToolCheck {
        name: name.to_string(),
        ok,
        required: true,
        detail,
    }
}

#[cfg(test)]
#[path = "../tests/unit/preflight.rs"]
mod tests;
