//! Simulated clock with one-shot events
//!
//! The clock advances `speed` simulated seconds per real second. Events are
//! matched on the exact time-of-day sampled by a tick; at speeds above 1 the
//! seconds between two samples are never seen, so events there do not fire.
//! Seeking must be paired with `clear_events` and re-registration.

use chrono::NaiveDateTime;
use pasim_common::TimeOfDay;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Real time between two ticks
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Stage label before anything has happened
pub const DEFAULT_STAGE: &str = "대기중";

/// Callback run when an event fires. Runs on the tick task; anything slow
/// must be spawned.
pub type EventAction = Arc<dyn Fn() + Send + Sync>;

struct ScheduledEvent {
    time: TimeOfDay,
    action: EventAction,
    fired: bool,
}

struct ClockState {
    current_time: NaiveDateTime,
    speed: u32,
    is_running: bool,
    current_stage: String,
    events: Vec<ScheduledEvent>,
    tick_loop: Option<JoinHandle<()>>,
    /// Identifies the live tick loop; bumped on every cancel
    loop_generation: u64,
    /// Bumped whenever `current_time` is set from outside a tick
    epoch: u64,
}

/// Point-in-time view of the clock.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClockSnapshot {
    pub current_time: NaiveDateTime,
    pub speed: u32,
    pub is_running: bool,
    pub current_stage: String,
    pub registered_events: usize,
    pub fired_events: usize,
}

/// Decrements the live-loop counter when a tick loop task is dropped,
/// including when it is aborted before its first poll.
struct LoopGuard(Arc<AtomicUsize>);

impl LoopGuard {
    fn new(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for LoopGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Simulated wall clock driving the announcement schedule.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SimClock {
    state: Arc<Mutex<ClockState>>,
    live_loops: Arc<AtomicUsize>,
}

impl SimClock {
    pub fn new(initial_time: NaiveDateTime) -> Self {
        let state = ClockState {
            current_time: initial_time,
            speed: 1,
            is_running: false,
            current_stage: DEFAULT_STAGE.to_string(),
            events: Vec::new(),
            tick_loop: None,
            loop_generation: 0,
            epoch: 0,
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            live_loops: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ClockState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    // ----------------------------------------------------------------------
    // Event table
    // ----------------------------------------------------------------------

    /// Add a one-shot event. Several events may share a time.
    pub fn register_event<F>(&self, time: TimeOfDay, action: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.lock().events.push(ScheduledEvent {
            time,
            action: Arc::new(action),
            fired: false,
        });
    }

    /// Drop every registered event.
    pub fn clear_events(&self) {
        let mut st = self.lock();
        debug!(cleared = st.events.len(), "Clearing events");
        st.events.clear();
    }

    pub fn event_count(&self) -> usize {
        self.lock().events.len()
    }

    /// Registered event times, in registration order, with their fired flag
    pub fn event_times(&self) -> Vec<(TimeOfDay, bool)> {
        self.lock().events.iter().map(|e| (e.time, e.fired)).collect()
    }

    // ----------------------------------------------------------------------
    // Transport
    // ----------------------------------------------------------------------

    /// Set the time, tick once immediately, then tick every second.
    pub fn start(&self, at: NaiveDateTime) {
        {
            let mut st = self.lock();
            Self::cancel_loop(&mut st);
            st.current_time = at;
            st.is_running = true;
            st.epoch += 1;
        }
        info!(time = %at, "Clock started");

        self.tick();

        let mut st = self.lock();
        // An action run by the first tick may have paused the clock
        if st.is_running && st.tick_loop.is_none() {
            self.spawn_loop(&mut st);
        }
    }

    /// Stop ticking. Time and fired flags are kept.
    pub fn pause(&self) {
        let mut st = self.lock();
        Self::cancel_loop(&mut st);
        st.is_running = false;
        info!(time = %st.current_time, "Clock paused");
    }

    /// Continue ticking without an immediate tick. No-op if a loop exists.
    pub fn resume(&self) {
        let mut st = self.lock();
        if st.tick_loop.is_some() {
            debug!("resume ignored: tick loop already active");
            return;
        }
        st.is_running = true;
        self.spawn_loop(&mut st);
        info!(time = %st.current_time, "Clock resumed");
    }

    /// Change the multiplier; an active loop is restarted so the next tick
    /// uses it.
    pub fn set_speed(&self, speed: u32) {
        let speed = speed.max(1);
        let mut st = self.lock();
        st.speed = speed;
        if st.tick_loop.is_some() {
            Self::cancel_loop(&mut st);
            self.spawn_loop(&mut st);
        }
        info!(speed, "Clock speed set");
    }

    /// Move the clock without touching the loop. Callers seeking must clear
    /// and re-register events first.
    pub fn set_current_time(&self, time: NaiveDateTime) {
        let mut st = self.lock();
        st.current_time = time;
        st.epoch += 1;
    }

    pub fn set_current_stage(&self, stage: impl Into<String>) {
        let stage = stage.into();
        debug!(stage = %stage, "Stage set");
        self.lock().current_stage = stage;
    }

    // ----------------------------------------------------------------------
    // Queries
    // ----------------------------------------------------------------------

    pub fn current_time(&self) -> NaiveDateTime {
        self.lock().current_time
    }

    pub fn time_of_day(&self) -> TimeOfDay {
        TimeOfDay::of(&self.lock().current_time)
    }

    pub fn speed(&self) -> u32 {
        self.lock().speed
    }

    pub fn is_running(&self) -> bool {
        self.lock().is_running
    }

    pub fn current_stage(&self) -> String {
        self.lock().current_stage.clone()
    }

    /// Tick loop tasks currently alive (0 or 1 once aborted loops are reaped)
    pub fn live_tick_loops(&self) -> usize {
        self.live_loops.load(Ordering::SeqCst)
    }

    pub fn has_tick_loop(&self) -> bool {
        self.lock().tick_loop.is_some()
    }

    pub fn snapshot(&self) -> ClockSnapshot {
        let st = self.lock();
        ClockSnapshot {
            current_time: st.current_time,
            speed: st.speed,
            is_running: st.is_running,
            current_stage: st.current_stage.clone(),
            registered_events: st.events.len(),
            fired_events: st.events.iter().filter(|e| e.fired).count(),
        }
    }

    // ----------------------------------------------------------------------
    // Ticking
    // ----------------------------------------------------------------------

    /// Fire due events for the current second, then advance by `speed`.
    ///
    /// Actions run without the lock held, in registration order, each at
    /// most once.
    pub fn tick(&self) {
        self.tick_checked(None);
    }

    /// Tick on behalf of loop `generation`. Returns false without touching
    /// the clock if that loop was cancelled, even if the cancel landed after
    /// the loop woke up.
    fn tick_if_current(&self, generation: u64) -> bool {
        self.tick_checked(Some(generation))
    }

    fn tick_checked(&self, generation: Option<u64>) -> bool {
        let (now, epoch, due) = {
            let mut st = self.lock();
            if let Some(generation) = generation {
                if !(st.is_running && st.loop_generation == generation && st.tick_loop.is_some()) {
                    return false;
                }
            }
            let now = TimeOfDay::of(&st.current_time);
            let due: Vec<EventAction> = st
                .events
                .iter_mut()
                .filter(|e| !e.fired && e.time == now)
                .map(|e| {
                    e.fired = true;
                    Arc::clone(&e.action)
                })
                .collect();
            (now, st.epoch, due)
        };

        if !due.is_empty() {
            info!(time = %now, count = due.len(), "Firing events");
        }
        for action in &due {
            action();
        }

        let mut st = self.lock();
        // An action that moved the clock owns the new time
        if st.epoch == epoch {
            let step = chrono::Duration::seconds(st.speed as i64);
            st.current_time += step;
        }
        true
    }

    fn spawn_loop(&self, st: &mut ClockState) {
        st.loop_generation += 1;
        let generation = st.loop_generation;
        let clock = self.clone();
        let guard = LoopGuard::new(&self.live_loops);

        st.tick_loop = Some(tokio::spawn(async move {
            let _guard = guard;
            let mut ticker = interval_at(Instant::now() + TICK_INTERVAL, TICK_INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !clock.tick_if_current(generation) {
                    break;
                }
            }
        }));
        debug!(generation, "Tick loop started");
    }

    fn cancel_loop(st: &mut ClockState) {
        if let Some(handle) = st.tick_loop.take() {
            handle.abort();
            debug!(generation = st.loop_generation, "Tick loop cancelled");
        }
        st.loop_generation += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::sync::atomic::AtomicU32;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, 7)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn tod(text: &str) -> TimeOfDay {
        TimeOfDay::parse(text).unwrap()
    }

    fn counter_action(counter: &Arc<AtomicU32>) -> impl Fn() + Send + Sync + 'static {
        let counter = Arc::clone(counter);
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_tick_fires_due_event_once() {
        let clock = SimClock::new(at(8, 40, 0));
        let fired = Arc::new(AtomicU32::new(0));
        clock.register_event(tod("08:40:00"), counter_action(&fired));

        clock.tick();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(clock.current_time(), at(8, 40, 1));

        // Back to the same second: already fired
        clock.set_current_time(at(8, 40, 0));
        clock.tick();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_clear_and_reregister_resets_eligibility() {
        let clock = SimClock::new(at(8, 40, 0));
        let fired = Arc::new(AtomicU32::new(0));
        clock.register_event(tod("08:40:00"), counter_action(&fired));
        clock.tick();

        clock.clear_events();
        clock.register_event(tod("08:40:00"), counter_action(&fired));
        clock.set_current_time(at(8, 40, 0));
        clock.tick();
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_actions_run_in_registration_order() {
        let clock = SimClock::new(at(9, 0, 0));
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = Arc::clone(&order);
            clock.register_event(tod("09:00:00"), move || order.lock().unwrap().push(i));
        }
        clock.tick();
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
        assert_eq!(clock.snapshot().fired_events, 3);
    }

    #[test]
    fn test_fast_forward_skips_unsampled_seconds() {
        let clock = SimClock::new(at(8, 0, 0));
        let fired = Arc::new(AtomicU32::new(0));
        clock.register_event(tod("08:00:05"), counter_action(&fired));
        clock.register_event(tod("08:00:10"), counter_action(&fired));

        clock.lock().speed = 10;
        clock.tick(); // samples 08:00:00
        clock.tick(); // samples 08:00:10
        assert_eq!(clock.current_time(), at(8, 0, 20));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(clock.event_times()[0], (tod("08:00:05"), false));
    }

    #[test]
    fn test_matching_ignores_date() {
        let clock = SimClock::new(at(23, 59, 59));
        let fired = Arc::new(AtomicU32::new(0));
        clock.register_event(tod("00:00:00"), counter_action(&fired));
        clock.tick();
        clock.tick(); // next day 00:00:00
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_action_moving_the_clock_keeps_its_time() {
        let clock = SimClock::new(at(10, 0, 0));
        let jumper = clock.clone();
        clock.register_event(tod("10:00:00"), move || jumper.set_current_time(at(12, 0, 0)));
        clock.tick();
        assert_eq!(clock.current_time(), at(12, 0, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_woken_loop_does_not_tick_after_pause() {
        let clock = SimClock::new(at(10, 0, 0));
        let fired = Arc::new(AtomicU32::new(0));
        clock.register_event(tod("10:00:00"), counter_action(&fired));
        clock.resume();
        let generation = clock.lock().loop_generation;

        // The loop has woken for its tick when pause lands on another worker
        clock.pause();
        assert!(!clock.tick_if_current(generation));

        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(clock.current_time(), at(10, 0, 0));
        assert_eq!(clock.event_times()[0], (tod("10:00:00"), false));
    }

    #[tokio::test(start_paused = true)]
    async fn test_woken_loop_does_not_tick_after_speed_change() {
        let clock = SimClock::new(at(10, 0, 0));
        clock.resume();
        let stale = clock.lock().loop_generation;

        clock.set_speed(5);
        assert!(!clock.tick_if_current(stale));
        assert_eq!(clock.current_time(), at(10, 0, 0));

        let live = clock.lock().loop_generation;
        assert!(clock.tick_if_current(live));
        assert_eq!(clock.current_time(), at(10, 0, 5));
    }

    #[test]
    fn test_default_stage() {
        let clock = SimClock::new(at(8, 0, 0));
        assert_eq!(clock.current_stage(), DEFAULT_STAGE);
        clock.set_current_stage("국어 시작");
        assert_eq!(clock.snapshot().current_stage, "국어 시작");
    }
}
