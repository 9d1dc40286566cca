//! The ordered script of narrated units and its post-estimation form.
//!
//! A [`Timeline`] is validated once and never mutated afterwards. Estimation consumes it and
//! produces an [`EstimatedTimeline`], which is what capture, composition and subtitle synthesis
//! read from.

use std::collections::HashSet;
use std::path::PathBuf;

use crate::foundation::core::UnitRef;
use crate::foundation::error::{NarrsyncError, NarrsyncResult};

/// Opaque description of a unit's visual action.
///
/// The engine never inspects it; it is handed to the visual-surface collaborator as-is and only
/// rendered into error messages.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct ActionSpec(serde_json::Value);

impl ActionSpec {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn value(&self) -> &serde_json::Value {
        &self.0
    }

    /// Compact single-line rendering used in diagnostics.
    pub fn describe(&self) -> String {
        const MAX: usize = 96;
        let s = self.0.to_string();
        if s.chars().count() <= MAX {
            return s;
        }
        let mut out: String = s.chars().take(MAX).collect();
        out.push_str("...");
        out
    }
}

fn default_wait_after_ms() -> u64 {
    500
}

/// One narration-bearing step of the script.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct NarratedUnit {
    pub id: String,
    #[serde(default)]
    pub ordinal: u32,
    #[serde(default, alias = "narration")]
    pub narration_text: Option<String>,
    #[serde(default)]
    pub action: ActionSpec,
    #[serde(default = "default_wait_after_ms")]
    pub wait_after_ms: u64,
}

impl NarratedUnit {
    pub fn new(id: impl Into<String>, ordinal: u32) -> Self {
        Self {
            id: id.into(),
            ordinal,
            narration_text: None,
            action: ActionSpec::default(),
            wait_after_ms: default_wait_after_ms(),
        }
    }

    pub fn with_narration(mut self, text: impl Into<String>) -> Self {
        self.narration_text = Some(text.into());
        self
    }

    pub fn with_action(mut self, action: serde_json::Value) -> Self {
        self.action = ActionSpec::new(action);
        self
    }

    pub fn with_wait_after_ms(mut self, ms: u64) -> Self {
        self.wait_after_ms = ms;
        self
    }

    /// Narration text with surrounding whitespace removed, `None` when the unit is silent.
    pub fn narration(&self) -> Option<&str> {
        self.narration_text
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn unit_ref(&self) -> UnitRef {
        UnitRef::new(self.id.clone(), self.ordinal)
    }
}

/// Ordered, validated sequence of units.
#[derive(Clone, Debug, PartialEq)]
pub struct Timeline {
    units: Vec<NarratedUnit>,
}

impl Timeline {
    /// Validate `units` as given: non-empty, unique ids, strictly increasing ordinals.
    pub fn new(units: Vec<NarratedUnit>) -> NarrsyncResult<Self> {
        if units.is_empty() {
            return Err(NarrsyncError::validation(
                "timeline must contain at least one unit",
            ));
        }

        let mut seen = HashSet::with_capacity(units.len());
        for (i, unit) in units.iter().enumerate() {
            if unit.id.trim().is_empty() {
                return Err(NarrsyncError::validation(format!(
                    "unit at position {i} has an empty id"
                )));
            }
            if !seen.insert(unit.id.as_str()) {
                return Err(NarrsyncError::validation(format!(
                    "duplicate unit id '{}'",
                    unit.id
                )));
            }
            if i > 0 && unit.ordinal <= units[i - 1].ordinal {
                return Err(NarrsyncError::validation(format!(
                    "unit '{}' has ordinal {} which does not follow {} of unit '{}'",
                    unit.id,
                    unit.ordinal,
                    units[i - 1].ordinal,
                    units[i - 1].id
                )));
            }
        }

        Ok(Self { units })
    }

    /// Assign ordinals `1..=n` in list order, then validate.
    pub fn numbered(mut units: Vec<NarratedUnit>) -> NarrsyncResult<Self> {
        for (i, unit) in units.iter_mut().enumerate() {
            unit.ordinal = (i + 1) as u32;
        }
        Self::new(units)
    }

    pub fn units(&self) -> &[NarratedUnit] {
        &self.units
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub(crate) fn into_units(self) -> Vec<NarratedUnit> {
        self.units
    }
}

/// Timing of one spoken word (or boundary phrase), relative to the clip start.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct WordTimestamp {
    pub text: String,
    pub start_ms: u64,
    pub end_ms: u64,
}

/// Estimation output for one unit.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct NarrationClip {
    pub unit: UnitRef,
    /// Narration text; empty for silent units.
    pub text: String,
    /// Synthesized audio, `None` for silent units.
    pub audio: Option<PathBuf>,
    pub duration_ms: u64,
    pub words: Vec<WordTimestamp>,
}

impl NarrationClip {
    pub fn silent(unit: UnitRef) -> Self {
        Self {
            unit,
            text: String::new(),
            audio: None,
            duration_ms: 0,
            words: Vec::new(),
        }
    }

    pub fn is_silent(&self) -> bool {
        self.duration_ms == 0 || self.audio.is_none()
    }
}

/// A timeline whose every unit has a known narration duration.
#[derive(Clone, Debug, PartialEq)]
pub struct EstimatedTimeline {
    units: Vec<NarratedUnit>,
    clips: Vec<NarrationClip>,
}

impl EstimatedTimeline {
    /// Pair a timeline with one clip per unit, in unit order.
    pub fn new(timeline: Timeline, clips: Vec<NarrationClip>) -> NarrsyncResult<Self> {
        let units = timeline.into_units();
        if units.len() != clips.len() {
            return Err(NarrsyncError::validation(format!(
                "expected {} narration clips, got {}",
                units.len(),
                clips.len()
            )));
        }
        for (unit, clip) in units.iter().zip(&clips) {
            if unit.id != clip.unit.id || unit.ordinal != clip.unit.ordinal {
                return Err(NarrsyncError::validation(format!(
                    "narration clip for {} is out of place (expected unit '{}')",
                    clip.unit, unit.id
                )));
            }
        }
        Ok(Self { units, clips })
    }

    pub fn units(&self) -> &[NarratedUnit] {
        &self.units
    }

    pub fn clips(&self) -> &[NarrationClip] {
        &self.clips
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NarratedUnit, &NarrationClip)> {
        self.units.iter().zip(&self.clips)
    }

    pub fn clip(&self, unit_id: &str) -> Option<&NarrationClip> {
        self.clips.iter().find(|c| c.unit.id == unit_id)
    }

    pub fn narrated_count(&self) -> usize {
        self.clips.iter().filter(|c| !c.is_silent()).count()
    }

    pub fn total_narration_ms(&self) -> u64 {
        self.clips.iter().map(|c| c.duration_ms).sum()
    }
}

#[cfg(test)]
#[path = "../tests/unit/timeline.rs"]
mod tests;
