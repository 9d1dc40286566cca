use std::fmt;

/// Identity of a narrated unit as carried by errors and capture events.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct UnitRef {
    pub id: String,
    pub ordinal: u32,
}

impl UnitRef {
    pub fn new(id: impl Into<String>, ordinal: u32) -> Self {
        Self {
            id: id.into(),
            ordinal,
        }
    }
}

impl fmt::Display for UnitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit '{}' (#{})", self.id, self.ordinal)
    }
}

/// Convert a millisecond offset to the nearest sample frame at `sample_rate`.
pub fn ms_to_samples(ms: u64, sample_rate: u32) -> u64 {
    let num = u128::from(ms) * u128::from(sample_rate);
    ((num + 500) / 1000) as u64
}

/// Convert a sample frame count to milliseconds, rounding down.
pub fn samples_to_ms(samples: u64, sample_rate: u32) -> u64 {
    if sample_rate == 0 {
        return 0;
    }
    ((u128::from(samples) * 1000) / u128::from(sample_rate)) as u64
}

/// Format milliseconds as `HH:MM:SS,mmm`.
pub fn format_srt_time(ms: u64) -> String {
    let hours = ms / 3_600_000;
    let minutes = (ms % 3_600_000) / 60_000;
    let seconds = (ms % 60_000) / 1_000;
    let millis = ms % 1_000;
    format!("{hours:02}:{minutes:02}:{seconds:02},{millis:03}")
}
