//! Playback engine
//!
//! **Responsibilities:**
//! - Decoded-track cache (append-only) and current track
//! - Transport: play, pause with exact offset capture, resume, stop
//! - Live parameters: volume in place, everything else by rebuilding the
//!   output unit from the current offset
//! - Position tracking poll (100ms) with automatic completion
//!
//! The engine measures play offset in real elapsed time (tokio clock), never
//! in simulated time. All state sits behind one mutex that is never held
//! across an await, so transport calls are synchronous and atomic.

use crate::audio::decoder::TrackDecoder;
use crate::audio::fetch::{resource_extension, ResourceFetcher};
use crate::audio::AudioBuffer;
use crate::error::{Error, Result};
use crate::playback::bus::OutputBus;
use crate::playback::chain::{build_output_unit, OutputUnit};
use crate::playback::dsp::GainControl;
use crate::playback::params::{EffectParams, EffectParamsUpdate, SpeakerPosition};
use pasim_common::events::{EventBus, PlaybackState, SimEvent};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

/// Interval of the position tracking poll
pub const POSITION_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Initial values for the live parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    pub volume: f32,
    pub spatial_enabled: bool,
    pub position: SpeakerPosition,
    #[serde(flatten)]
    pub effects: EffectParams,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            volume: 1.0,
            spatial_enabled: true,
            position: SpeakerPosition::default(),
            effects: EffectParams::default(),
        }
    }
}

/// Snapshot of the engine for status displays.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackStatus {
    pub title: Option<String>,
    pub resource: Option<String>,
    pub duration_secs: f64,
    /// Polled position, updated ~10x per second while playing
    pub position_secs: f64,
    /// Stored resume offset (authoritative while not playing)
    pub offset_secs: f64,
    pub is_playing: bool,
    pub volume: f32,
    pub spatial_enabled: bool,
    pub position: SpeakerPosition,
    pub effects: EffectParams,
    pub cached_tracks: usize,
}

struct CurrentTrack {
    resource: String,
    title: String,
    buffer: AudioBuffer,
}

struct ActiveUnit {
    unit: OutputUnit,
    gain: GainControl,
    /// Real time the unit started producing sound
    started_at: Instant,
}

struct EngineState {
    cache: HashMap<String, AudioBuffer>,
    current: Option<CurrentTrack>,
    offset: f64,
    position_secs: f64,
    is_playing: bool,
    active: Option<ActiveUnit>,
    poll: Option<JoinHandle<()>>,
    /// Bumped whenever the active unit changes; a stale poll exits
    generation: u64,
    volume: f32,
    spatial_enabled: bool,
    position: SpeakerPosition,
    effects: EffectParams,
    defaults: PlaybackSettings,
    /// Last state reported to subscribers
    reported: PlaybackState,
}

impl EngineState {
    /// Record a state transition, returning the event to emit once the
    /// lock is released.
    fn transition(&mut self, new_state: PlaybackState) -> Option<SimEvent> {
        let old_state = self.reported;
        if old_state == new_state {
            return None;
        }
        self.reported = new_state;
        Some(SimEvent::PlaybackStateChanged {
            old_state,
            new_state,
        })
    }

    fn duration(&self) -> f64 {
        self.current
            .as_ref()
            .map(|t| t.buffer.duration_seconds())
            .unwrap_or(0.0)
    }

    /// Exact offset right now: elapsed real time since the unit started,
    /// clamped to the track.
    fn elapsed_offset(&self) -> f64 {
        match &self.active {
            Some(active) => {
                let elapsed = active.started_at.elapsed().as_secs_f64();
                (active.unit.start_offset() + elapsed).clamp(0.0, self.duration())
            }
            None => self.offset,
        }
    }
}

/// Announcement playback engine.
///
/// Cheap to clone; clones share state, so scheduler actions capture a clone
/// instead of reaching a global.
#[derive(Clone)]
pub struct PlaybackEngine {
    state: Arc<Mutex<EngineState>>,
    bus: OutputBus,
    fetcher: Arc<dyn ResourceFetcher>,
    decoder: Arc<dyn TrackDecoder>,
    events: EventBus,
}

impl PlaybackEngine {
    pub fn new(
        bus: OutputBus,
        fetcher: Arc<dyn ResourceFetcher>,
        decoder: Arc<dyn TrackDecoder>,
        events: EventBus,
        settings: PlaybackSettings,
    ) -> Self {
        let state = EngineState {
            cache: HashMap::new(),
            current: None,
            offset: 0.0,
            position_secs: 0.0,
            is_playing: false,
            active: None,
            poll: None,
            generation: 0,
            volume: settings.volume,
            spatial_enabled: settings.spatial_enabled,
            position: settings.position,
            effects: settings.effects,
            defaults: settings,
            reported: PlaybackState::Stopped,
        };

        Self {
            state: Arc::new(Mutex::new(state)),
            bus,
            fetcher,
            decoder,
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn bus(&self) -> &OutputBus {
        &self.bus
    }

    // ----------------------------------------------------------------------
    // Loading
    // ----------------------------------------------------------------------

    /// Fetch and decode `resource` into the cache. Idempotent.
    ///
    /// Failures are logged and reported as [`SimEvent::PlaybackFailed`];
    /// the returned error is informational.
    pub async fn preload(&self, resource: &str) -> Result<()> {
        self.cached_or_decode(resource, resource).await.map(|_| ())
    }

    /// Make `resource` the current track, decoding it first if needed.
    ///
    /// Resets the offset to 0. A unit still playing the previous track is
    /// torn down; `play` must be called to start the new one.
    pub async fn load(&self, resource: &str, title: &str) -> Result<()> {
        let buffer = self.cached_or_decode(resource, title).await?;
        let duration = buffer.duration_seconds();

        let event = {
            let mut st = self.lock();
            self.teardown(&mut st);
            st.current = Some(CurrentTrack {
                resource: resource.to_string(),
                title: title.to_string(),
                buffer,
            });
            st.offset = 0.0;
            st.position_secs = 0.0;
            st.is_playing = false;
            st.transition(PlaybackState::Stopped)
        };

        self.emit(event);
        info!(title, duration_secs = duration, "Track loaded");
        self.events.emit_lossy(SimEvent::TrackLoaded {
            title: title.to_string(),
            duration_secs: duration,
        });
        Ok(())
    }

    async fn cached_or_decode(&self, resource: &str, title: &str) -> Result<AudioBuffer> {
        if let Some(buffer) = self.lock().cache.get(resource) {
            debug!(resource, "Track already cached");
            return Ok(buffer.clone());
        }

        match self.fetch_and_decode(resource).await {
            Ok(buffer) => {
                let mut st = self.lock();
                let buffer = st
                    .cache
                    .entry(resource.to_string())
                    .or_insert(buffer)
                    .clone();
                debug!(resource, cached = st.cache.len(), "Track cached");
                Ok(buffer)
            }
            Err(e) => {
                error!(resource, error = %e, "Failed to load track");
                self.events.emit_lossy(SimEvent::PlaybackFailed {
                    title: title.to_string(),
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn fetch_and_decode(&self, resource: &str) -> Result<AudioBuffer> {
        let bytes = self.fetcher.fetch(resource).await?;
        let extension = resource_extension(resource).map(str::to_string);
        let decoder = Arc::clone(&self.decoder);

        // Decode off the async workers so the clock keeps ticking
        tokio::task::spawn_blocking(move || decoder.decode(bytes, extension.as_deref()))
            .await
            .map_err(|e| Error::Decode(format!("Decode task failed: {}", e)))?
    }

    // ----------------------------------------------------------------------
    // Transport
    // ----------------------------------------------------------------------

    /// Start the current track. No-op if nothing is loaded or already
    /// playing. A finished track (offset at the end) restarts from 0.
    pub fn play(&self) {
        let event = {
            let mut st = self.lock();
            if st.current.is_none() || st.is_playing {
                debug!("play ignored: nothing loaded or already playing");
                return;
            }
            if st.offset >= st.duration() {
                st.offset = 0.0;
            }
            let offset = st.offset;
            self.start_unit(&mut st, offset);
            st.transition(PlaybackState::Playing)
        };
        self.emit(event);
    }

    /// Pause, storing the exact elapsed offset.
    pub fn pause(&self) {
        let event = {
            let mut st = self.lock();
            if !st.is_playing {
                debug!("pause ignored: not playing");
                return;
            }
            let offset = st.elapsed_offset();
            self.teardown(&mut st);
            st.offset = offset;
            st.position_secs = offset;
            st.is_playing = false;
            info!(offset_secs = offset, "Playback paused");
            st.transition(PlaybackState::Paused)
        };
        self.emit(event);
    }

    /// Continue from the stored offset. No-op if playing, nothing is
    /// loaded, or the stored offset is at or past the end.
    pub fn resume(&self) {
        let event = {
            let mut st = self.lock();
            if st.current.is_none() || st.is_playing {
                debug!("resume ignored: nothing loaded or already playing");
                return;
            }
            let offset = st.offset;
            if offset >= st.duration() {
                debug!(offset_secs = offset, "resume ignored: track already finished");
                return;
            }
            self.start_unit(&mut st, offset);
            info!(offset_secs = offset, "Playback resumed");
            st.transition(PlaybackState::Playing)
        };
        self.emit(event);
    }

    /// Stop and rewind to 0. No-op if nothing is active.
    pub fn stop(&self) {
        let event = {
            let mut st = self.lock();
            if st.active.is_none() && !st.is_playing {
                return;
            }
            self.teardown(&mut st);
            st.offset = 0.0;
            st.position_secs = 0.0;
            st.is_playing = false;
            info!("Playback stopped");
            st.transition(PlaybackState::Stopped)
        };
        self.emit(event);
    }

    // ----------------------------------------------------------------------
    // Live parameters
    // ----------------------------------------------------------------------

    /// Set the volume; a live unit picks it up without a rebuild.
    pub fn set_volume(&self, volume: f32) {
        let volume = volume.clamp(0.0, 1.0);
        let mut st = self.lock();
        st.volume = volume;
        if let Some(active) = &st.active {
            active.gain.set(volume);
        }
        debug!(volume, "Volume set");
    }

    pub fn set_position(&self, position: SpeakerPosition) {
        let mut st = self.lock();
        st.position = position;
        self.rebuild_if_playing(&mut st, "position");
    }

    pub fn set_effect_params(&self, update: &EffectParamsUpdate) {
        let mut st = self.lock();
        st.effects.apply(update);
        self.rebuild_if_playing(&mut st, "effects");
    }

    /// Flip spatial processing; returns the new state.
    pub fn toggle_spatial(&self) -> bool {
        let mut st = self.lock();
        st.spatial_enabled = !st.spatial_enabled;
        let enabled = st.spatial_enabled;
        self.rebuild_if_playing(&mut st, "spatial toggle");
        enabled
    }

    /// Restore spatial flag, position and effects to their defaults.
    pub fn reset_effects(&self) {
        let mut st = self.lock();
        let defaults = st.defaults;
        st.spatial_enabled = defaults.spatial_enabled;
        st.position = defaults.position;
        st.effects = defaults.effects;
        self.rebuild_if_playing(&mut st, "reset");
    }

    // ----------------------------------------------------------------------
    // Queries
    // ----------------------------------------------------------------------

    pub fn is_playing(&self) -> bool {
        self.lock().is_playing
    }

    /// Stored resume offset in seconds
    pub fn offset(&self) -> f64 {
        self.lock().offset
    }

    /// Exact current offset (elapsed time while playing)
    pub fn current_offset(&self) -> f64 {
        self.lock().elapsed_offset()
    }

    pub fn duration(&self) -> f64 {
        self.lock().duration()
    }

    pub fn is_cached(&self, resource: &str) -> bool {
        self.lock().cache.contains_key(resource)
    }

    /// The unit currently producing sound, if any
    pub fn active_unit(&self) -> Option<OutputUnit> {
        self.lock().active.as_ref().map(|a| a.unit.clone())
    }

    pub fn status(&self) -> PlaybackStatus {
        let st = self.lock();
        PlaybackStatus {
            title: st.current.as_ref().map(|t| t.title.clone()),
            resource: st.current.as_ref().map(|t| t.resource.clone()),
            duration_secs: st.duration(),
            position_secs: st.position_secs,
            offset_secs: st.offset,
            is_playing: st.is_playing,
            volume: st.volume,
            spatial_enabled: st.spatial_enabled,
            position: st.position,
            effects: st.effects,
            cached_tracks: st.cache.len(),
        }
    }

    // ----------------------------------------------------------------------
    // Internals
    // ----------------------------------------------------------------------

    /// Replace any live unit with a fresh one starting at `offset`, and
    /// restart the position poll. Caller holds the lock.
    fn start_unit(&self, st: &mut EngineState, offset: f64) {
        if st.current.is_none() {
            return;
        }
        self.teardown(st);

        let (unit, gain) = match st.current.as_ref() {
            Some(track) => build_output_unit(
                &track.buffer,
                offset,
                st.volume,
                st.spatial_enabled,
                st.position,
                &st.effects,
            ),
            None => return,
        };
        self.bus.attach(unit.clone());

        st.generation += 1;
        st.active = Some(ActiveUnit {
            unit,
            gain,
            started_at: Instant::now(),
        });
        st.offset = offset;
        st.position_secs = offset;
        st.is_playing = true;
        st.poll = Some(self.spawn_position_poll(st.generation));

        debug!(
            offset_secs = offset,
            spatial = st.spatial_enabled,
            generation = st.generation,
            "Output unit started"
        );
    }

    /// Stop the live unit and cancel the poll. Safe to call repeatedly.
    fn teardown(&self, st: &mut EngineState) {
        if let Some(poll) = st.poll.take() {
            poll.abort();
        }
        if let Some(active) = st.active.take() {
            active.unit.stop();
            self.bus.detach();
        }
        st.generation += 1;
    }

    fn rebuild_if_playing(&self, st: &mut EngineState, reason: &str) {
        if !st.is_playing {
            return;
        }
        let offset = st.elapsed_offset();
        info!(reason, offset_secs = offset, "Rebuilding output unit");
        self.start_unit(st, offset);
    }

    fn spawn_position_poll(&self, generation: u64) -> JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            let mut tick = interval(POSITION_POLL_INTERVAL);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tick.tick().await; // first tick completes immediately

            loop {
                tick.tick().await;
                if !engine.poll_position(generation) {
                    break;
                }
            }
        })
    }

    /// One poll step. Returns false once the poll should end.
    fn poll_position(&self, generation: u64) -> bool {
        let (finished_title, event) = {
            let mut st = self.lock();
            if st.generation != generation || !st.is_playing {
                return false;
            }

            let offset = st.elapsed_offset();
            let duration = st.duration();
            st.position_secs = offset;
            if offset < duration {
                return true;
            }

            // Natural end: stay at the end so resume does not replay
            st.poll = None;
            if let Some(active) = st.active.take() {
                active.unit.stop();
                self.bus.detach();
            }
            st.generation += 1;
            st.offset = duration;
            st.position_secs = duration;
            st.is_playing = false;
            let title = st.current.as_ref().map(|t| t.title.clone());
            (title, st.transition(PlaybackState::Stopped))
        };

        info!(title = ?finished_title, "Playback finished");
        self.emit(event);
        false
    }

    fn emit(&self, event: Option<SimEvent>) {
        if let Some(event) = event {
            self.events.emit_lossy(event);
        }
    }
}

impl Drop for EngineState {
    fn drop(&mut self) {
        if let Some(poll) = self.poll.take() {
            poll.abort();
        }
        if let Some(active) = self.active.take() {
            active.unit.stop();
        }
    }
}
