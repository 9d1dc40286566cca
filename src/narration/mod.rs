//! Narration duration estimation: synthesize every narrated unit up front so capture knows how
//! long each pause must be.

pub(crate) mod edge_tts;
pub(crate) mod estimate;
pub(crate) mod retry;
pub(crate) mod synth;
