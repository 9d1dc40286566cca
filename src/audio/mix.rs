use rayon::prelude::*;
use tracing::debug;

use crate::audio::layer::{AudioLayer, LayerCategory, plan_repeats};
use crate::audio::pcm::{AudioPcm, AudioStore};
use crate::foundation::core::ms_to_samples;
use crate::foundation::error::{NarrsyncError, NarrsyncResult};

/// Default gain applied to each layer category when the layer does not override it.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct LayerGains {
    pub narration: f32,
    pub music: f32,
    pub sfx: f32,
}

impl Default for LayerGains {
    fn default() -> Self {
        Self {
            narration: 1.0,
            music: 0.25,
            sfx: 0.6,
        }
    }
}

impl LayerGains {
    pub fn for_category(&self, category: LayerCategory) -> f32 {
        match category {
            LayerCategory::Narration => self.narration,
            LayerCategory::Music => self.music,
            LayerCategory::Sfx => self.sfx,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimiterMode {
    /// Scale the whole mix down so its peak sits at the ceiling.
    #[default]
    Normalize,
    /// `ceiling * tanh(x / ceiling)`.
    SoftClip,
    /// Hard clamp at the ceiling.
    Clip,
}

/// Peak control applied once, to the summed master.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct LimiterConfig {
    pub mode: LimiterMode,
    pub ceiling: f32,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            mode: LimiterMode::Normalize,
            ceiling: 0.98,
        }
    }
}

impl LimiterConfig {
    pub fn apply(&self, samples: &mut [f32]) {
        let ceiling = self.ceiling;
        match self.mode {
            LimiterMode::Normalize => {
                let peak = samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
                if peak > ceiling {
                    let scale = ceiling / peak;
                    for s in samples.iter_mut() {
                        *s *= scale;
                    }
                }
            }
            LimiterMode::SoftClip => {
                for s in samples.iter_mut() {
                    *s = ceiling * (*s / ceiling).tanh();
                }
            }
            LimiterMode::Clip => {
                for s in samples.iter_mut() {
                    *s = s.clamp(-ceiling, ceiling);
                }
            }
        }
    }
}

/// Output format, category gains and limiter for the master mix.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct MixConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub gains: LayerGains,
    pub limiter: LimiterConfig,
}

impl Default for MixConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 2,
            gains: LayerGains::default(),
            limiter: LimiterConfig::default(),
        }
    }
}

/// Render one layer into a silence-padded buffer of `total_frames` frames.
///
/// Each clip is laid out by its fit mode against the next clip on the layer. Fades span the
/// whole placement, so a looped bed fades in once and out once.
pub fn render_layer(
    layer: &AudioLayer,
    store: &AudioStore,
    total_frames: u64,
) -> NarrsyncResult<Vec<f32>> {
    let sample_rate = store.sample_rate();
    let channels = usize::from(store.channels());
    let mut out = vec![0.0f32; total_frames as usize * channels];

    for (i, clip) in layer.clips.iter().enumerate() {
        let target = || {
            format!(
                "layer '{}' clip '{}' at {} ms",
                layer.name,
                clip.source.display(),
                clip.resolved_start_ms
            )
        };
        let src = store
            .get(&clip.source)
            .ok_or_else(|| NarrsyncError::composition(target(), "source was not prepared"))?;

        let start = ms_to_samples(clip.resolved_start_ms, sample_rate);
        let mut src_len = src.frames() as u64;
        if let Some(max_ms) = clip.max_len_ms {
            let cap = ms_to_samples(clip.resolved_start_ms + max_ms, sample_rate) - start;
            src_len = src_len.min(cap);
        }
        let next_start = layer
            .clips
            .get(i + 1)
            .map(|next| ms_to_samples(next.resolved_start_ms, sample_rate));

        let repeats = plan_repeats(clip.fit_mode, src_len, start, next_start, total_frames)
            .map_err(|cause| NarrsyncError::composition(target(), cause))?;
        let Some(last) = repeats.last() else {
            continue;
        };
        let span = last.offset + last.len - start;
        let fade_in = ms_to_samples(clip.fade_in_ms, sample_rate);
        let fade_out = ms_to_samples(clip.fade_out_ms, sample_rate);

        for rep in &repeats {
            for k in 0..rep.len {
                let pos = rep.offset + k;
                let gain = clip.volume * fade_gain(pos - start, span, fade_in, fade_out);
                let dst = pos as usize * channels;
                let src_idx = k as usize * channels;
                for c in 0..channels {
                    out[dst + c] += src.interleaved_f32[src_idx + c] * gain;
                }
            }
        }
        debug!(
            layer = %layer.name,
            source = %clip.source.display(),
            start_frame = start,
            passes = repeats.len(),
            "clip placed"
        );
    }

    Ok(out)
}

fn fade_gain(rel: u64, span: u64, fade_in: u64, fade_out: u64) -> f32 {
    let mut gain = 1.0f32;
    if fade_in > 0 {
        gain *= (rel as f32 / fade_in as f32).clamp(0.0, 1.0);
    }
    if fade_out > 0 {
        let remaining = span.saturating_sub(rel);
        gain *= (remaining as f32 / fade_out as f32).clamp(0.0, 1.0);
    }
    gain
}

/// Render all layers in parallel, sum them with their layer gain, then limit the master once.
#[tracing::instrument(skip_all, fields(layers = layers.len(), total_frames = total_frames))]
pub fn mix_layers(
    layers: &[AudioLayer],
    store: &AudioStore,
    total_frames: u64,
    cfg: &MixConfig,
) -> NarrsyncResult<AudioPcm> {
    let rendered = layers
        .par_iter()
        .map(|layer| render_layer(layer, store, total_frames).map(|buf| (layer.gain, buf)))
        .collect::<NarrsyncResult<Vec<_>>>()?;

    let mut master = AudioPcm::silence(
        store.sample_rate(),
        store.channels(),
        total_frames as usize,
    );
    for (gain, buf) in rendered {
        for (m, s) in master.interleaved_f32.iter_mut().zip(buf) {
            *m += s * gain;
        }
    }

    let peak_before = master.peak();
    cfg.limiter.apply(&mut master.interleaved_f32);
    debug!(peak_before, peak_after = master.peak(), "master limited");
    Ok(master)
}

#[cfg(test)]
#[path = "../../tests/unit/audio/mix.rs"]
mod tests;
