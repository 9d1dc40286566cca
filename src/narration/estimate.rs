use std::path::Path;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::foundation::error::{NarrsyncError, NarrsyncResult};
use crate::narration::retry::{RetryPolicy, retry_transient};
use crate::narration::synth::{SpeechSynthesizer, SynthesisRequest, SynthesizedClip, VoiceConfig};
use crate::timeline::{EstimatedTimeline, NarratedUnit, NarrationClip, Timeline};

/// Concurrency and retry settings for the estimation phase.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EstimationConfig {
    /// Maximum synthesis calls in flight at once.
    pub max_concurrency: usize,
    pub retry: RetryPolicy,
}

impl Default for EstimationConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            retry: RetryPolicy::default(),
        }
    }
}

/// Synthesize every narrated unit and measure its duration.
///
/// Units without narration are silent (duration 0, no clip) and never reach the synthesizer.
/// Calls run concurrently up to `max_concurrency`; transient failures are retried per
/// `cfg.retry`. The first unit that cannot be synthesized aborts the phase, and all other
/// in-flight calls are cancelled and awaited before this returns, so nothing outlives it.
#[tracing::instrument(skip_all, fields(units = timeline.len()))]
pub async fn estimate_narrations(
    timeline: Timeline,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    voice: &VoiceConfig,
    cfg: &EstimationConfig,
    clip_dir: &Path,
) -> NarrsyncResult<EstimatedTimeline> {
    if cfg.max_concurrency == 0 {
        return Err(NarrsyncError::config(
            "estimation.max_concurrency must be at least 1",
        ));
    }

    let started = std::time::Instant::now();
    let mut clips: Vec<Option<NarrationClip>> = vec![None; timeline.len()];
    let permits = Arc::new(Semaphore::new(cfg.max_concurrency));
    let mut tasks = JoinSet::new();

    for (idx, unit) in timeline.units().iter().enumerate() {
        let Some(text) = unit.narration() else {
            clips[idx] = Some(NarrationClip::silent(unit.unit_ref()));
            continue;
        };

        let request = SynthesisRequest {
            unit: unit.unit_ref(),
            text: text.to_string(),
            voice: voice.clone(),
            output_path: clip_dir.join(clip_file_name(unit)),
        };
        let synthesizer = Arc::clone(&synthesizer);
        let permits = Arc::clone(&permits);
        let retry = cfg.retry;

        tasks.spawn(async move {
            let _permit = permits.acquire_owned().await.map_err(|_| {
                NarrsyncError::estimation(request.unit.clone(), "synthesis pool closed")
            })?;
            let clip = synthesize_unit(synthesizer.as_ref(), &request, &retry).await?;
            Ok::<_, NarrsyncError>((idx, clip))
        });
    }

    while let Some(joined) = tasks.join_next().await {
        let outcome = joined.map_err(|e| {
            NarrsyncError::Other(anyhow::anyhow!("synthesis task did not complete: {e}"))
        });
        match outcome.and_then(|r| r) {
            Ok((idx, clip)) => clips[idx] = Some(clip),
            Err(err) => {
                tasks.abort_all();
                while tasks.join_next().await.is_some() {}
                return Err(err);
            }
        }
    }

    let clips = clips
        .into_iter()
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| NarrsyncError::validation("estimation finished with missing clips"))?;
    let estimated = EstimatedTimeline::new(timeline, clips)?;

    info!(
        narrated = estimated.narrated_count(),
        total_narration_ms = estimated.total_narration_ms(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "narration estimated"
    );
    Ok(estimated)
}

async fn synthesize_unit(
    synthesizer: &dyn SpeechSynthesizer,
    request: &SynthesisRequest,
    retry: &RetryPolicy,
) -> NarrsyncResult<NarrationClip> {
    let label = format!("synthesize {}", request.unit);
    let clip = retry_transient(retry, &label, |attempt| {
        debug!(unit = %request.unit, attempt, "synthesizing narration");
        synthesizer.synthesize(request)
    })
    .await
    .map_err(|exhausted| {
        NarrsyncError::estimation(
            request.unit.clone(),
            format!(
                "{} (after {} attempt(s))",
                exhausted.error, exhausted.attempts
            ),
        )
    })?;

    check_clip(request, clip)
}

/// Reject clips whose timing cannot be trusted; a guessed duration would desync the capture.
fn check_clip(request: &SynthesisRequest, clip: SynthesizedClip) -> NarrsyncResult<NarrationClip> {
    let fail = |cause: String| NarrsyncError::estimation(request.unit.clone(), cause);

    if clip.duration_ms == 0 {
        return Err(fail(
            "synthesizer reported zero duration for non-empty narration".to_string(),
        ));
    }
    let mut prev_start = 0u64;
    for (i, w) in clip.words.iter().enumerate() {
        if w.end_ms < w.start_ms || w.start_ms < prev_start {
            return Err(fail(format!("word timestamp #{i} ('{}') is out of order", w.text)));
        }
        if w.end_ms > clip.duration_ms {
            return Err(fail(format!(
                "word timestamp #{i} ends at {} ms, past the clip duration of {} ms",
                w.end_ms, clip.duration_ms
            )));
        }
        prev_start = w.start_ms;
    }

    Ok(NarrationClip {
        unit: request.unit.clone(),
        text: request.text.clone(),
        audio: Some(clip.audio_path),
        duration_ms: clip.duration_ms,
        words: clip.words,
    })
}

pub(crate) fn clip_file_name(unit: &NarratedUnit) -> String {
    let safe: String = unit
        .id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{:04}_{safe}.mp3", unit.ordinal)
}

#[cfg(test)]
#[path = "../../tests/unit/narration/estimate.rs"]
mod tests;
