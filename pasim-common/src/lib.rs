//! # PASIM Common Library
//!
//! Shared code for the public-address simulator crates:
//! - Error type
//! - Time-of-day values and schedule arithmetic
//! - Simulation event types (SimEvent enum) and EventBus
//! - Configuration file discovery

pub mod config;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
pub use time::TimeOfDay;
