//! # PASIM Announcement Player Library (pasim-ap)
//!
//! Exam-day public-address simulator: a simulated clock fires one-shot
//! announcement events from a schedule catalog, and a playback engine plays
//! each announcement through a spatial effects chain.
//!
//! **Architecture:** symphonia + rubato decode into an in-memory cache, a
//! block-based DSP chain renders the single live output unit, cpal pulls it
//! from the output bus.

pub mod audio;
pub mod catalog;
pub mod config;
pub mod console;
pub mod error;
pub mod playback;
pub mod scheduler;
pub mod simulator;

pub use error::{Error, Result};
pub use simulator::Simulator;
