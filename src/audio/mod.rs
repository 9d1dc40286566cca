//! Audio layer composition: cue resolution against captured timestamps, per-layer rendering,
//! and the master mix.

pub(crate) mod compose;
pub(crate) mod layer;
pub(crate) mod mix;
pub(crate) mod pcm;
