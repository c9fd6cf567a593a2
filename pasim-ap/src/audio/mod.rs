//! Audio input and output
//!
//! Fetching, decoding and resampling of announcement tracks, and the cpal
//! device stream that plays the output bus.

pub mod decoder;
pub mod fetch;
pub mod output;
pub mod resampler;
pub mod types;

pub use decoder::{SymphoniaDecoder, TrackDecoder};
pub use fetch::{FileFetcher, HttpFetcher, ResourceFetcher, RoutingFetcher};
pub use output::AudioOutput;
pub use resampler::Resampler;
pub use types::{AudioBuffer, AudioFrame};
