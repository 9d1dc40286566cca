use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use rayon::prelude::*;

use crate::assemble::backend::MediaBackend;
use crate::foundation::core::samples_to_ms;
use crate::foundation::error::{NarrsyncError, NarrsyncResult};

/// Decoded interleaved floating-point PCM.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioPcm {
    pub sample_rate: u32,
    pub channels: u16,
    pub interleaved_f32: Vec<f32>,
}

impl AudioPcm {
    pub fn silence(sample_rate: u32, channels: u16, frames: usize) -> Self {
        Self {
            sample_rate,
            channels,
            interleaved_f32: vec![0.0; frames * usize::from(channels)],
        }
    }

    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.interleaved_f32.len() / usize::from(self.channels)
    }

    pub fn duration_ms(&self) -> u64 {
        samples_to_ms(self.frames() as u64, self.sample_rate)
    }

    /// Truncate or silence-pad to exactly `frames` frames.
    pub fn resize_frames(&mut self, frames: usize) {
        self.interleaved_f32
            .resize(frames * usize::from(self.channels), 0.0);
    }

    pub fn peak(&self) -> f32 {
        self.interleaved_f32
            .iter()
            .fold(0.0f32, |m, s| m.max(s.abs()))
    }
}

/// Write interleaved samples as raw little-endian `f32`.
pub fn write_f32le_file(samples_interleaved: &[f32], out_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent).with_context(|| {
            format!(
                "failed to create audio output directory '{}'",
                parent.display()
            )
        })?;
    }

    let mut bytes = Vec::<u8>::with_capacity(samples_interleaved.len() * 4);
    for &sample in samples_interleaved {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    std::fs::write(out_path, bytes)
        .with_context(|| format!("failed to write raw audio '{}'", out_path.display()))
}

/// Decoded sources keyed by the path they were referenced with, all at the mix format.
#[derive(Clone, Debug)]
pub struct AudioStore {
    sample_rate: u32,
    channels: u16,
    sources: HashMap<PathBuf, Arc<AudioPcm>>,
}

impl AudioStore {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            sources: HashMap::new(),
        }
    }

    /// Decode every source through `backend`, in parallel.
    ///
    /// A source that does not exist or cannot be decoded is a composition failure naming it.
    #[tracing::instrument(skip_all, fields(sources = sources.len()))]
    pub fn prepare(
        sources: &[PathBuf],
        backend: &dyn MediaBackend,
        sample_rate: u32,
        channels: u16,
    ) -> NarrsyncResult<Self> {
        let decoded = sources
            .par_iter()
            .map(|path| {
                let target = format!("source '{}'", path.display());
                if !path.is_file() {
                    return Err(NarrsyncError::composition(target, "file does not exist"));
                }
                let pcm = backend
                    .decode_audio(path, sample_rate, channels)
                    .map_err(|e| NarrsyncError::composition(target, format!("{e:#}")))?;
                Ok((path.clone(), pcm))
            })
            .collect::<NarrsyncResult<Vec<_>>>()?;

        let mut store = Self::new(sample_rate, channels);
        for (path, pcm) in decoded {
            store.insert(path, pcm)?;
        }
        Ok(store)
    }

    /// Add an already-decoded source; it must match the store's format.
    pub fn insert(&mut self, path: impl Into<PathBuf>, pcm: AudioPcm) -> NarrsyncResult<()> {
        let path = path.into();
        if pcm.sample_rate != self.sample_rate || pcm.channels != self.channels {
            return Err(NarrsyncError::composition(
                format!("source '{}'", path.display()),
                format!(
                    "decoded as {} Hz x{}, expected {} Hz x{}",
                    pcm.sample_rate, pcm.channels, self.sample_rate, self.channels
                ),
            ));
        }
        self.sources.insert(path, Arc::new(pcm));
        Ok(())
    }

    pub fn get(&self, path: &Path) -> Option<&Arc<AudioPcm>> {
        self.sources.get(path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.sources.contains_key(path)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }
}

#[cfg(test)]
#[path = "../../tests/unit/audio/pcm.rs"]
mod tests;
