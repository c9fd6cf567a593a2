//! Output bus
//!
//! Single slot between the engine and the audio device. Attaching a unit
//! stops whatever was there first, so at most one unit is ever audible.

use crate::audio::AudioFrame;
use crate::playback::chain::OutputUnit;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone)]
pub struct OutputBus {
    slot: Arc<Mutex<Option<OutputUnit>>>,
    units_started: Arc<AtomicUsize>,
    sample_rate: u32,
}

impl OutputBus {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
            units_started: Arc::new(AtomicUsize::new(0)),
            sample_rate,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn lock(&self) -> MutexGuard<'_, Option<OutputUnit>> {
        match self.slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Make `unit` the audible unit, stopping the previous one.
    pub fn attach(&self, unit: OutputUnit) {
        let mut slot = self.lock();
        if let Some(previous) = slot.take() {
            previous.stop();
        }
        *slot = Some(unit);
        self.units_started.fetch_add(1, Ordering::SeqCst);
    }

    /// Stop and remove the current unit, if any.
    pub fn detach(&self) {
        if let Some(unit) = self.lock().take() {
            unit.stop();
        }
    }

    /// The unit currently attached
    pub fn current(&self) -> Option<OutputUnit> {
        self.lock().clone()
    }

    /// Number of attached units still producing sound (0 or 1)
    pub fn live_units(&self) -> usize {
        self.lock().iter().filter(|u| !u.is_stopped()).count()
    }

    /// Units attached since the bus was created
    pub fn units_started(&self) -> usize {
        self.units_started.load(Ordering::SeqCst)
    }

    /// Fill `out` from the attached unit, or with silence.
    pub fn render(&self, out: &mut [AudioFrame]) {
        let slot = self.lock();
        match slot.as_ref() {
            Some(unit) => unit.render(out),
            None => out.fill(AudioFrame::zero()),
        }
    }
}
