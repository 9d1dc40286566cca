use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result, bail};

use crate::foundation::core::format_srt_time;
use crate::subtitles::cues::SubtitleCue;

/// One parsed SRT entry, times in milliseconds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SrtEntry {
    pub start_ms: u64,
    pub end_ms: u64,
    pub text: String,
}

/// Render cues as SRT, numbered from 1 in slice order.
pub fn write_srt(cues: &[SubtitleCue]) -> String {
    let mut out = String::new();
    for (i, cue) in cues.iter().enumerate() {
        let _ = write!(
            out,
            "{}\n{} --> {}\n{}\n\n",
            i + 1,
            format_srt_time(cue.start_ms),
            format_srt_time(cue.end_ms),
            cue.text.trim()
        );
    }
    out
}

pub fn write_srt_file(cues: &[SubtitleCue], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create subtitle directory '{}'", parent.display()))?;
    }
    std::fs::write(path, write_srt(cues))
        .with_context(|| format!("failed to write subtitles to '{}'", path.display()))
}

/// Parse SRT text. Index lines are tolerated but not required; entries come back sorted by start.
pub fn parse_srt(input: &str) -> Result<Vec<SrtEntry>> {
    let mut entries = Vec::new();
    let mut lines = input.lines().map(|l| l.trim_start_matches('\u{feff}')).peekable();

    while let Some(line) = lines.next() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let times = if line.contains("-->") {
            line
        } else {
            lines
                .next()
                .map(str::trim)
                .context("SRT entry is missing a timestamp line")?
        };
        let (start_raw, end_raw) = times
            .split_once("-->")
            .map(|(a, b)| (a.trim(), b.trim()))
            .context("SRT timestamp line must contain '-->'")?;

        let start_ms = parse_timestamp_ms(start_raw)
            .with_context(|| format!("failed to parse SRT start timestamp '{start_raw}'"))?;
        let end_ms = parse_timestamp_ms(end_raw)
            .with_context(|| format!("failed to parse SRT end timestamp '{end_raw}'"))?;
        if end_ms < start_ms {
            bail!("SRT entry ends before it starts: {start_raw} --> {end_raw}");
        }

        let mut text = Vec::new();
        while let Some(next) = lines.next_if(|l| !l.trim().is_empty()) {
            text.push(next.trim());
        }

        entries.push(SrtEntry {
            start_ms,
            end_ms,
            text: text.join(" "),
        });
    }

    entries.sort_by_key(|e| e.start_ms);
    Ok(entries)
}

fn parse_timestamp_ms(value: &str) -> Result<u64> {
    let cleaned = value.replace(',', ".");
    let (clock, frac) = cleaned.split_once('.').unwrap_or((cleaned.as_str(), "0"));

    let mut fields = clock.split(':');
    let mut next_field = |name: &str| -> Result<u64> {
        fields
            .next()
            .with_context(|| format!("timestamp missing {name}"))?
            .parse::<u64>()
            .with_context(|| format!("invalid {name} in timestamp"))
    };
    let hours = next_field("hours")?;
    let minutes = next_field("minutes")?;
    let seconds = next_field("seconds")?;
    if fields.next().is_some() {
        bail!("timestamp has more than three components: {value}");
    }

    let mut millis: String = frac.chars().take(3).collect();
    while millis.len() < 3 {
        millis.push('0');
    }
    let millis = millis
        .parse::<u64>()
        .context("invalid millisecond component in timestamp")?;

    Ok(((hours * 60 + minutes) * 60 + seconds) * 1000 + millis)
}

#[cfg(test)]
#[path = "../../tests/unit/subtitles/srt.rs"]
mod tests;
