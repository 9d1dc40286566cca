use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Instant;

use tracing::info;

use crate::audio::layer::{AudioClip, AudioLayer, FitMode, LayerCategory, LayerSpec, resolve_layer};
use crate::audio::mix::{MixConfig, mix_layers};
use crate::audio::pcm::{AudioPcm, AudioStore};
use crate::capture::driver::CaptureRecord;
use crate::foundation::core::ms_to_samples;
use crate::foundation::error::{NarrsyncError, NarrsyncResult};
use crate::timeline::EstimatedTimeline;

/// Resolved layers plus the limited master mix, spanning the whole recording.
#[derive(Clone, Debug)]
pub struct ComposedAudio {
    pub layers: Vec<AudioLayer>,
    pub mix: AudioPcm,
    pub duration_ms: u64,
}

/// Every audio file the composition will read, narration first, without duplicates.
pub fn required_sources(timeline: &EstimatedTimeline, layers: &[LayerSpec]) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    timeline
        .clips()
        .iter()
        .filter_map(|c| c.audio.clone())
        .chain(layers.iter().flat_map(|l| l.cues.iter().map(|c| c.source.clone())))
        .filter(|p| seen.insert(p.clone()))
        .collect()
}

/// Place every narration clip at its unit's measured pause start.
pub fn narration_layer(
    timeline: &EstimatedTimeline,
    record: &CaptureRecord,
    gain: f32,
) -> NarrsyncResult<AudioLayer> {
    let mut clips = Vec::new();
    for (unit, clip) in timeline.iter() {
        if clip.is_silent() {
            continue;
        }
        let target = format!("narration for {}", unit.unit_ref());
        let event = record
            .event(&unit.id)
            .ok_or_else(|| NarrsyncError::composition(&target, "no capture event for unit"))?;
        if event.pause_duration_ms < clip.duration_ms {
            return Err(NarrsyncError::composition(
                target,
                format!(
                    "pause of {} ms is shorter than the {} ms narration",
                    event.pause_duration_ms, clip.duration_ms
                ),
            ));
        }
        let Some(source) = clip.audio.clone() else {
            continue;
        };
        clips.push(AudioClip {
            source,
            resolved_start_ms: event.pause_start_ms,
            volume: 1.0,
            fade_in_ms: 0,
            fade_out_ms: 0,
            fit_mode: FitMode::Once,
            max_len_ms: Some(clip.duration_ms),
        });
    }
    AudioLayer::new("narration", LayerCategory::Narration, gain, clips)
}

/// Resolve narration and auxiliary layers against the capture and mix them into one master
/// track as long as the recording.
#[tracing::instrument(skip_all, fields(layers = specs.len() + 1))]
pub fn compose_audio(
    timeline: &EstimatedTimeline,
    record: &CaptureRecord,
    specs: &[LayerSpec],
    store: &AudioStore,
    cfg: &MixConfig,
) -> NarrsyncResult<ComposedAudio> {
    let started = Instant::now();
    if store.sample_rate() != cfg.sample_rate || store.channels() != cfg.channels {
        return Err(NarrsyncError::composition(
            "master mix",
            format!(
                "sources prepared at {} Hz x{} but the mix is {} Hz x{}",
                store.sample_rate(),
                store.channels(),
                cfg.sample_rate,
                cfg.channels
            ),
        ));
    }
    if record.events.len() != timeline.units().len() {
        return Err(NarrsyncError::composition(
            "capture events",
            format!(
                "{} events for {} units",
                record.events.len(),
                timeline.units().len()
            ),
        ));
    }

    let mut layers = Vec::with_capacity(specs.len() + 1);
    layers.push(narration_layer(timeline, record, cfg.gains.narration)?);
    for spec in specs {
        layers.push(resolve_layer(
            spec,
            record,
            store,
            cfg.gains.for_category(spec.category),
        )?);
    }

    let total_frames = ms_to_samples(record.recording_ms, cfg.sample_rate);
    let mix = mix_layers(&layers, store, total_frames, cfg)?;

    info!(
        layers = layers.len(),
        clips = layers.iter().map(|l| l.clips.len()).sum::<usize>(),
        duration_ms = record.recording_ms,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "audio composed"
    );
    Ok(ComposedAudio {
        layers,
        mix,
        duration_ms: record.recording_ms,
    })
}

#[cfg(test)]
#[path = "../../tests/unit/audio/compose.rs"]
mod tests;
