//! Timed capture: drive the recorded surface through the timeline and measure, on the wall
//! clock, when every narration pause actually began.

pub(crate) mod driver;
pub(crate) mod surface;
