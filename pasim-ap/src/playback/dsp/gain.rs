//! Live volume control

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Shared handle to the volume of a live output unit.
///
/// The audio thread reads it once per render quantum, so a change takes
/// effect without rebuilding the chain. Stored as f32 bits.
#[derive(Debug, Clone)]
pub struct GainControl {
    bits: Arc<AtomicU32>,
}

impl GainControl {
    pub fn new(gain: f32) -> Self {
        Self {
            bits: Arc::new(AtomicU32::new(gain.to_bits())),
        }
    }

    pub fn set(&self, gain: f32) {
        self.bits.store(gain.to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }
}
