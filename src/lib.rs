// src/lib.rs
//
// Multi-track arrangement and non-destructive editing engine: clips on
// lanes with collision-aware placement, a re-renderable effect pipeline,
// tempo detection, offline mixdown, and project persistence.

pub mod arrangement;
pub mod audio;
pub mod dsp;
pub mod effects;
pub mod generator;
pub mod mixdown;
pub mod playback;
pub mod render;
pub mod session;

pub use arrangement::{Arrangement, Clip, ClipId, DragContext};
pub use audio::AudioBuffer;
pub use effects::{ActiveEffects, EffectChange};
