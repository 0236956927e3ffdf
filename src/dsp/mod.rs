// src/dsp/mod.rs
//
// Stateless signal processing over a single AudioBuffer. Nothing here
// knows about clips or the timeline.

pub mod eq;
pub mod ops;
pub mod stretch;
pub mod tempo;

pub use stretch::{change_speed, granular_stretch, resample};
pub use tempo::estimate_bpm;
