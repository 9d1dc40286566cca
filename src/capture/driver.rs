use std::path::PathBuf;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::capture::surface::VisualSurface;
use crate::foundation::core::UnitRef;
use crate::foundation::error::{NarrsyncError, NarrsyncResult};
use crate::timeline::{EstimatedTimeline, NarratedUnit};

/// Fixed framing delays and bounds applied around every unit.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Settle after recording starts, before the first action.
    pub lead_in_ms: u64,
    /// Settle after each action, before its narration pause.
    pub action_settle_ms: u64,
    /// Settle after the last unit, before the recording is finalized.
    pub tail_ms: u64,
    pub action_timeout_ms: u64,
    /// How far a measured pause may overshoot its narration before the capture is rejected.
    pub pause_tolerance_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            lead_in_ms: 500,
            action_settle_ms: 300,
            tail_ms: 1_000,
            action_timeout_ms: 30_000,
            pause_tolerance_ms: 250,
        }
    }
}

/// Measured timing of one unit, in milliseconds from recording start.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CaptureEvent {
    pub unit: UnitRef,
    pub action_start_ms: u64,
    /// When the narration pause began; equals the settle point for silent units.
    pub pause_start_ms: u64,
    /// Time actually spent paused, 0 for silent units.
    pub pause_duration_ms: u64,
    /// End of the unit's wait-after delay; the next unit starts here.
    pub settle_end_ms: u64,
}

/// Output of a completed capture.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CaptureRecord {
    pub video: PathBuf,
    /// One event per unit, in timeline order.
    pub events: Vec<CaptureEvent>,
    /// Recording length as measured by the driver.
    pub recording_ms: u64,
}

impl CaptureRecord {
    pub fn event(&self, unit_id: &str) -> Option<&CaptureEvent> {
        self.events.iter().find(|e| e.unit.id == unit_id)
    }
}

/// Run every unit against `surface`, strictly in order, measuring when each narration pause
/// begins.
///
/// The first failure aborts the capture: the recording is discarded and the error names the
/// unit and its action.
#[tracing::instrument(skip_all, fields(units = timeline.units().len()))]
pub async fn capture(
    timeline: &EstimatedTimeline,
    surface: &mut dyn VisualSurface,
    cfg: &CaptureConfig,
) -> NarrsyncResult<CaptureRecord> {
    let (Some(first), Some(last)) = (timeline.units().first(), timeline.units().last()) else {
        return Err(NarrsyncError::validation("cannot capture an empty timeline"));
    };

    surface.start_recording().await.map_err(|e| {
        NarrsyncError::capture(
            first.unit_ref(),
            first.action.describe(),
            format!("recording did not start: {e:#}"),
        )
    })?;
    let origin = Instant::now();

    let events = match run_units(timeline, surface, cfg, origin).await {
        Ok(events) => events,
        Err(err) => {
            if let Err(e) = surface.discard_recording().await {
                warn!(error = %format!("{e:#}"), "failed to discard aborted recording");
            }
            return Err(err);
        }
    };

    settle(cfg.tail_ms).await;
    let video = surface.finish_recording().await.map_err(|e| {
        NarrsyncError::capture(
            last.unit_ref(),
            last.action.describe(),
            format!("recording could not be finalized: {e:#}"),
        )
    })?;
    let recording_ms = elapsed_ms(origin);

    info!(
        units = events.len(),
        recording_ms,
        video = %video.display(),
        "capture completed"
    );
    Ok(CaptureRecord {
        video,
        events,
        recording_ms,
    })
}

async fn run_units(
    timeline: &EstimatedTimeline,
    surface: &mut dyn VisualSurface,
    cfg: &CaptureConfig,
    origin: Instant,
) -> NarrsyncResult<Vec<CaptureEvent>> {
    let action_timeout = Duration::from_millis(cfg.action_timeout_ms);
    let mut events: Vec<CaptureEvent> = Vec::with_capacity(timeline.units().len());

    settle(cfg.lead_in_ms).await;

    for (unit, clip) in timeline.iter() {
        let fail = |cause: String| NarrsyncError::capture(unit.unit_ref(), unit.action.describe(), cause);

        let action_start_ms = elapsed_ms(origin);
        match tokio::time::timeout(action_timeout, surface.perform(&unit.action)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(fail(format!("action failed: {e:#}"))),
            Err(_) => {
                return Err(fail(format!(
                    "action did not settle within {} ms",
                    cfg.action_timeout_ms
                )));
            }
        }
        settle(cfg.action_settle_ms).await;

        let pause_start_ms = elapsed_ms(origin);
        let pause_duration_ms = pause_for(clip.duration_ms, origin, pause_start_ms).await;
        if pause_duration_ms > clip.duration_ms + cfg.pause_tolerance_ms {
            return Err(fail(format!(
                "narration pause overran: {pause_duration_ms} ms measured for {} ms of narration",
                clip.duration_ms
            )));
        }

        settle(unit.wait_after_ms).await;
        let event = CaptureEvent {
            unit: unit.unit_ref(),
            action_start_ms,
            pause_start_ms,
            pause_duration_ms,
            settle_end_ms: elapsed_ms(origin),
        };
        check_order(events.last(), &event, unit)?;
        debug!(
            unit = %event.unit,
            pause_start_ms,
            pause_duration_ms,
            settle_end_ms = event.settle_end_ms,
            "unit captured"
        );
        events.push(event);
    }

    Ok(events)
}

/// Sleep for the narration and report the time actually spent.
async fn pause_for(narration_ms: u64, origin: Instant, pause_start_ms: u64) -> u64 {
    if narration_ms == 0 {
        return 0;
    }
    tokio::time::sleep(Duration::from_millis(narration_ms)).await;
    elapsed_ms(origin).saturating_sub(pause_start_ms)
}

/// A unit's pause may never begin before the previous unit has fully settled.
fn check_order(
    prev: Option<&CaptureEvent>,
    cur: &CaptureEvent,
    unit: &NarratedUnit,
) -> NarrsyncResult<()> {
    if let Some(prev) = prev
        && cur.pause_start_ms < prev.settle_end_ms
    {
        return Err(NarrsyncError::capture(
            unit.unit_ref(),
            unit.action.describe(),
            format!(
                "pause started at {} ms, before {} settled at {} ms",
                cur.pause_start_ms, prev.unit, prev.settle_end_ms
            ),
        ));
    }
    Ok(())
}

async fn settle(ms: u64) {
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

fn elapsed_ms(origin: Instant) -> u64 {
    origin.elapsed().as_millis() as u64
}

#[cfg(test)]
#[path = "../../tests/unit/capture/driver.rs"]
mod tests;
