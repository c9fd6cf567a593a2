//! Exam-day simulator
//!
//! Owns the clock, the playback engine handle, the catalog and the listening
//! overrides, and implements the operator actions on top of them: transport
//! toggle, time and stage jumps, listening-track changes, bulk preload and
//! progress reporting.
//!
//! Every change to the set of actions goes through [`Simulator::register_events`],
//! which clears the clock and registers the whole catalog again.

use crate::catalog::{
    derive_announcements, register_all, Catalog, ListeningOverrides, ScheduleEntry, SoundLibrary,
};
use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::playback::{PlaybackEngine, PlaybackStatus};
use crate::scheduler::{ClockSnapshot, SimClock};
use chrono::NaiveDate;
use futures::future::join_all;
use pasim_common::events::{EventBus, SimEvent};
use pasim_common::TimeOfDay;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, warn};

/// What a transport toggle did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransportAction {
    Started,
    Paused,
    Resumed,
}

/// Time left in the period in progress
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageRemaining {
    pub subject: String,
    pub remaining_secs: u32,
    pub label: String,
}

impl StageRemaining {
    fn new(subject: &str, remaining_secs: u32) -> Self {
        Self {
            subject: subject.to_string(),
            remaining_secs,
            label: format!("{}분 {}초 남음", remaining_secs / 60, remaining_secs % 60),
        }
    }
}

/// Everything a status display needs
#[derive(Debug, Clone, Serialize)]
pub struct SimulatorStatus {
    pub clock: ClockSnapshot,
    pub started: bool,
    pub progress_percent: f64,
    pub remaining: Option<StageRemaining>,
    pub playback: PlaybackStatus,
    pub listening: Vec<(String, String)>,
}

/// Day bounds and start point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayPlan {
    pub date: NaiveDate,
    pub start_time: TimeOfDay,
    pub day_start: TimeOfDay,
    pub day_end: TimeOfDay,
}

impl From<&AppConfig> for DayPlan {
    fn from(config: &AppConfig) -> Self {
        Self {
            date: config.sim_date,
            start_time: config.start_time,
            day_start: config.day_start,
            day_end: config.day_end,
        }
    }
}

pub struct Simulator {
    clock: SimClock,
    engine: PlaybackEngine,
    events: EventBus,
    catalog: Arc<Catalog>,
    sounds: SoundLibrary,
    listening: Mutex<ListeningOverrides>,
    started: AtomicBool,
    plan: DayPlan,
}

impl Simulator {
    /// Build the simulator and register the catalog. The clock is not
    /// started until the first [`toggle`](Self::toggle) or jump.
    pub fn new(
        plan: DayPlan,
        speed: u32,
        catalog: Catalog,
        sounds: SoundLibrary,
        engine: PlaybackEngine,
        events: EventBus,
    ) -> Self {
        let clock = SimClock::new(plan.date.and_time(plan.start_time.to_naive_time()));
        clock.set_speed(speed);

        let sim = Self {
            clock,
            engine,
            events,
            catalog: Arc::new(catalog),
            sounds,
            listening: Mutex::new(ListeningOverrides::new()),
            started: AtomicBool::new(false),
            plan,
        };
        sim.register_events();
        sim
    }

    fn listening(&self) -> MutexGuard<'_, ListeningOverrides> {
        match self.listening.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn clock(&self) -> &SimClock {
        &self.clock
    }

    pub fn engine(&self) -> &PlaybackEngine {
        &self.engine
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn has_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Clear the clock and register every announcement from current state.
    pub fn register_events(&self) {
        let overrides = self.listening().clone();
        let announcements = derive_announcements(&self.catalog, &self.sounds, &overrides);
        self.clock.clear_events();
        register_all(&self.clock, &self.engine, &self.events, &announcements);
        info!(count = announcements.len(), "Schedule registered");
    }

    // ----------------------------------------------------------------------
    // Transport
    // ----------------------------------------------------------------------

    /// Start the day, or alternate pause and resume.
    ///
    /// Pausing also pauses audio at its exact offset; resuming only resumes
    /// the clock.
    pub fn toggle(&self) -> TransportAction {
        if !self.started.swap(true, Ordering::SeqCst) {
            let at = self.plan.date.and_time(self.plan.start_time.to_naive_time());
            self.register_events();
            self.clock.start(at);
            info!(time = %at, "Simulation started");
            TransportAction::Started
        } else if self.clock.is_running() {
            self.pause();
            TransportAction::Paused
        } else {
            self.resume();
            TransportAction::Resumed
        }
    }

    pub fn pause(&self) {
        self.clock.pause();
        self.engine.pause();
    }

    pub fn resume(&self) {
        self.clock.resume();
    }

    pub fn set_speed(&self, speed: u32) {
        self.clock.set_speed(speed);
    }

    // ----------------------------------------------------------------------
    // Seeking
    // ----------------------------------------------------------------------

    /// Jump to `HH:MM` on the current simulated date and keep running.
    pub fn jump_to(&self, hh_mm: &str) -> Result<()> {
        let target = TimeOfDay::parse_hh_mm(hh_mm)
            .map_err(|e| Error::InvalidTime(e.to_string()))?;
        self.restart_at(target);
        info!(time = %target, "Jumped");
        Ok(())
    }

    /// Jump to the start of `subject`'s period.
    ///
    /// The restart ticks at the period start immediately, so its start bell
    /// (or start notice) fires once from the schedule itself.
    pub fn jump_to_stage(&self, subject: &str) -> Result<()> {
        let entry = self
            .catalog
            .find(subject)
            .ok_or_else(|| Error::Catalog(format!("Unknown subject '{}'", subject)))?;

        let stage = format!("{} 시작", entry.subject);
        self.clock.set_current_stage(stage.clone());
        self.events.emit_lossy(SimEvent::StageChanged { stage });

        self.restart_at(entry.start_time);
        info!(subject, time = %entry.start_time, "Jumped to stage");
        Ok(())
    }

    fn restart_at(&self, target: TimeOfDay) {
        self.engine.stop();
        self.register_events();

        let date = self.clock.current_time().date();
        self.clock.start(date.and_time(target.to_naive_time()));
        self.started.store(true, Ordering::SeqCst);
        self.events.emit_lossy(SimEvent::ClockJumped { to: target });
    }

    // ----------------------------------------------------------------------
    // Listening broadcast
    // ----------------------------------------------------------------------

    /// Entries that carry a listening broadcast
    pub fn listening_subjects(&self) -> Vec<&str> {
        self.catalog
            .entries()
            .iter()
            .filter(|e| e.listening_start_time.is_some())
            .map(|e| e.subject.as_str())
            .collect()
    }

    /// Attach (`Some`) or remove (`None`) the listening track of `subject`,
    /// then re-register the schedule.
    pub fn set_listening_track(&self, subject: &str, resource: Option<String>) -> Result<()> {
        let entry = self
            .catalog
            .find(subject)
            .ok_or_else(|| Error::Catalog(format!("Unknown subject '{}'", subject)))?;
        if entry.listening_start_time.is_none() {
            return Err(Error::Catalog(format!(
                "'{}' has no listening broadcast",
                subject
            )));
        }

        {
            let mut listening = self.listening();
            match &resource {
                Some(r) => listening.insert(subject.to_string(), r.clone()),
                None => listening.remove(subject),
            };
        }
        self.register_events();
        info!(subject, resource = ?resource, "Listening track changed");
        self.events
            .emit_lossy(SimEvent::ListeningTrackChanged { resource });
        Ok(())
    }

    // ----------------------------------------------------------------------
    // Preloading
    // ----------------------------------------------------------------------

    /// Every resource the schedule can play
    pub fn resources(&self) -> BTreeSet<String> {
        let mut resources: BTreeSet<String> = self
            .catalog
            .distinct_sounds()
            .into_iter()
            .map(|name| self.sounds.resource(name))
            .collect();
        resources.extend(self.listening().values().cloned());
        resources
    }

    /// Preload every resource concurrently. Returns how many succeeded;
    /// failures are logged by the engine and do not stop the batch.
    pub async fn preload_all(&self) -> usize {
        let resources = self.resources();
        let total = resources.len();
        let results = join_all(resources.iter().map(|r| self.engine.preload(r))).await;
        let loaded = results.iter().filter(|r| r.is_ok()).count();
        if loaded < total {
            warn!(loaded, total, "Some announcement sounds failed to preload");
        } else {
            info!(loaded, "All announcement sounds preloaded");
        }
        loaded
    }

    // ----------------------------------------------------------------------
    // Reporting
    // ----------------------------------------------------------------------

    /// Share of the day elapsed, in [0, 100]
    pub fn progress_percent(&self) -> f64 {
        let now = self.clock.time_of_day().seconds_of_day() as f64;
        let start = self.plan.day_start.seconds_of_day() as f64;
        let end = self.plan.day_end.seconds_of_day() as f64;
        ((now - start) / (end - start) * 100.0).clamp(0.0, 100.0)
    }

    /// The period in progress
    pub fn active_entry(&self) -> Option<&ScheduleEntry> {
        self.catalog.active_at(self.clock.time_of_day())
    }

    pub fn remaining(&self) -> Option<StageRemaining> {
        let now = self.clock.time_of_day();
        self.catalog.active_at(now).map(|entry| {
            let remaining = entry.end_time.seconds_of_day() - now.seconds_of_day();
            StageRemaining::new(&entry.subject, remaining)
        })
    }

    pub fn status(&self) -> SimulatorStatus {
        let listening = self
            .listening()
            .iter()
            .map(|(s, r)| (s.clone(), r.clone()))
            .collect();
        SimulatorStatus {
            clock: self.clock.snapshot(),
            started: self.has_started(),
            progress_percent: self.progress_percent(),
            remaining: self.remaining(),
            playback: self.engine.status(),
            listening,
        }
    }

    /// Stop the clock and audio.
    pub fn shutdown(&self) {
        self.clock.pause();
        self.engine.stop();
        info!("Simulator stopped");
    }
}
