//! Simulated clock and one-shot event scheduling

pub mod clock;

pub use clock::{ClockSnapshot, EventAction, SimClock, DEFAULT_STAGE, TICK_INTERVAL};
