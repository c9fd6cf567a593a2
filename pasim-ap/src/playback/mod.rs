//! Playback engine and signal chain

pub mod bus;
pub mod chain;
pub mod dsp;
pub mod engine;
pub mod params;
pub mod playout;

pub use bus::OutputBus;
pub use chain::{build_output_unit, OutputUnit, StageKind};
pub use engine::{PlaybackEngine, PlaybackSettings, PlaybackStatus};
pub use params::{EffectParams, EffectParamsUpdate, SpeakerPosition};
pub use playout::{playout_ring, PlayoutFeeder, PlayoutReader};
