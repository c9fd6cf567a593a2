//! Test helper modules for pasim-ap integration tests
//!
//! - MemoryFetcher: in-memory resource store with fetch counting
//! - audio_generator: WAV tracks built with hound
//! - EngineHarness: engine + bus + event bus wired for tests

#![allow(dead_code)]

pub mod audio_generator;

pub use audio_generator::{announcement_wav, tone_wav, TEST_SAMPLE_RATE};

use async_trait::async_trait;
use pasim_ap::audio::{ResourceFetcher, SymphoniaDecoder};
use pasim_ap::playback::{OutputBus, PlaybackEngine, PlaybackSettings};
use pasim_ap::{Error, Result};
use pasim_common::events::{EventBus, SimEvent};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

/// Resource store keyed by id
#[derive(Default)]
pub struct MemoryFetcher {
    tracks: Mutex<HashMap<String, Vec<u8>>>,
    fetches: AtomicUsize,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, resource: &str, bytes: Vec<u8>) {
        self.tracks
            .lock()
            .unwrap()
            .insert(resource.to_string(), bytes);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResourceFetcher for MemoryFetcher {
    async fn fetch(&self, resource: &str) -> Result<Vec<u8>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.tracks
            .lock()
            .unwrap()
            .get(resource)
            .cloned()
            .ok_or_else(|| Error::Fetch(format!("{}: not found", resource)))
    }
}

/// Engine wired to an in-memory fetcher and a silent bus
pub struct EngineHarness {
    pub engine: PlaybackEngine,
    pub fetcher: Arc<MemoryFetcher>,
    pub events: EventBus,
    pub bus: OutputBus,
}

impl EngineHarness {
    pub fn new() -> Self {
        Self::with_settings(PlaybackSettings::default())
    }

    pub fn with_settings(settings: PlaybackSettings) -> Self {
        let fetcher = Arc::new(MemoryFetcher::new());
        let events = EventBus::new(256);
        let bus = OutputBus::new(TEST_SAMPLE_RATE);
        let engine = PlaybackEngine::new(
            bus.clone(),
            fetcher.clone(),
            Arc::new(SymphoniaDecoder::new(TEST_SAMPLE_RATE)),
            events.clone(),
            settings,
        );
        Self {
            engine,
            fetcher,
            events,
            bus,
        }
    }

    /// Store a tone track of `secs` seconds under `resource`
    pub fn with_track(self, resource: &str, secs: f32) -> Self {
        self.fetcher.insert(resource, announcement_wav(secs));
        self
    }
}

/// Wait for work on other tasks and the blocking pool (decoding) until
/// `condition` holds, giving up after about 5s of real time.
///
/// Only yields and sleeps the thread, so a paused tokio clock does not move.
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..5000 {
        if condition() {
            return true;
        }
        tokio::task::yield_now().await;
        std::thread::sleep(Duration::from_millis(1));
    }
    condition()
}

/// Everything currently queued on `rx`
pub fn drain(rx: &mut broadcast::Receiver<SimEvent>) -> Vec<SimEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}
