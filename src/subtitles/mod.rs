//! Subtitle track synthesis and SRT I/O.

pub(crate) mod cues;
pub(crate) mod srt;
