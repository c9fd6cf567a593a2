//! Simulator integration tests
//!
//! Catalog, clock and engine wired together the way the binary does it,
//! with sounds served from memory.

mod helpers;

use chrono::NaiveDate;
use helpers::{announcement_wav, drain, wait_until, EngineHarness};
use pasim_ap::catalog::{Catalog, SoundLibrary};
use pasim_ap::simulator::{DayPlan, Simulator, TransportAction};
use pasim_common::events::SimEvent;
use pasim_common::TimeOfDay;
use std::time::Duration;
use tokio::time::sleep;

fn tod(text: &str) -> TimeOfDay {
    TimeOfDay::parse(text).unwrap()
}

fn plan(start: &str) -> DayPlan {
    DayPlan {
        date: NaiveDate::from_ymd_opt(2025, 6, 7).unwrap(),
        start_time: tod(start),
        day_start: tod("08:05:00"),
        day_end: tod("17:45:00"),
    }
}

fn simulator(h: &EngineHarness, start: &str, catalog: Catalog) -> Simulator {
    Simulator::new(
        plan(start),
        1,
        catalog,
        SoundLibrary::new("sounds", "wav"),
        h.engine.clone(),
        h.events.clone(),
    )
}

fn first_period_catalog() -> Catalog {
    Catalog::from_toml_str(
        r#"
        [[entry]]
        subject = "국어"
        start_time = "08:40:00"
        end_time = "10:00:00"
        start_sound = "X"
        "#,
    )
    .unwrap()
}

fn announcements(events: &[SimEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            SimEvent::Announcement { title, .. } => Some(title.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_first_period_bell_fires_once_at_its_second() {
    let h = EngineHarness::new().with_track("sounds/X.wav", 2.0);
    let mut rx = h.events.subscribe();
    let sim = simulator(&h, "08:39:58", first_period_catalog());

    assert_eq!(sim.toggle(), TransportAction::Started);
    sleep(Duration::from_millis(1500)).await;
    assert!(announcements(&drain(&mut rx)).is_empty());

    sleep(Duration::from_millis(1000)).await;
    assert_eq!(announcements(&drain(&mut rx)), vec!["국어 본령".to_string()]);

    assert!(wait_until(|| h.engine.is_playing()).await);
    assert_eq!(h.engine.status().title.as_deref(), Some("국어 본령"));

    sleep(Duration::from_millis(5000)).await;
    assert!(announcements(&drain(&mut rx)).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_toggle_cycles_start_pause_resume() {
    let h = EngineHarness::new();
    let sim = simulator(&h, "08:05:00", Catalog::builtin().unwrap());

    assert!(!sim.has_started());
    assert_eq!(sim.toggle(), TransportAction::Started);
    assert!(sim.clock().is_running());
    assert_eq!(sim.toggle(), TransportAction::Paused);
    assert!(!sim.clock().is_running());
    assert_eq!(sim.toggle(), TransportAction::Resumed);
    assert!(sim.clock().is_running());
}

#[tokio::test(start_paused = true)]
async fn test_pausing_simulation_pauses_audio_and_resume_leaves_it_paused() {
    let h = EngineHarness::new().with_track("sounds/X.wav", 10.0);
    let sim = simulator(&h, "08:40:00", first_period_catalog());

    sim.toggle();
    assert!(wait_until(|| h.engine.is_playing()).await);
    sleep(Duration::from_millis(800)).await;

    sim.toggle();
    assert!(!h.engine.is_playing());
    let offset = h.engine.offset();
    assert!(offset > 0.0);

    sim.toggle();
    assert!(sim.clock().is_running());
    assert!(!h.engine.is_playing());
    assert_eq!(h.engine.offset(), offset);
}

#[tokio::test(start_paused = true)]
async fn test_time_jump_restarts_clock_and_stops_audio() {
    let h = EngineHarness::new().with_track("sounds/X.wav", 30.0);
    let mut rx = h.events.subscribe();
    let sim = simulator(&h, "08:40:00", first_period_catalog());
    sim.toggle();
    assert!(wait_until(|| h.engine.is_playing()).await);

    sim.jump_to("10:29").unwrap();

    assert!(!h.engine.is_playing());
    assert!(sim.clock().is_running());
    // The restart ticked once
    assert_eq!(sim.clock().time_of_day(), tod("10:29:01"));
    assert!(drain(&mut rx).contains(&SimEvent::ClockJumped { to: tod("10:29:00") }));

    assert!(sim.jump_to("25:00").is_err());
    assert!(sim.jump_to("10:29:30").is_err());
}

#[tokio::test(start_paused = true)]
async fn test_jump_back_refires_schedule() {
    let h = EngineHarness::new().with_track("sounds/X.wav", 1.0);
    let mut rx = h.events.subscribe();
    let sim = simulator(&h, "08:39:59", first_period_catalog());

    sim.toggle();
    sleep(Duration::from_millis(1500)).await;
    assert_eq!(announcements(&drain(&mut rx)).len(), 1);

    // At x60 the restart tick lands exactly on 08:40:00 for the next sample
    sim.set_speed(60);
    sim.jump_to("08:39").unwrap();
    assert_eq!(sim.clock().time_of_day(), tod("08:40:00"));
    sleep(Duration::from_millis(1500)).await;
    assert_eq!(announcements(&drain(&mut rx)), vec!["국어 본령".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_stage_jump_sets_stage_and_rings_start_bell() {
    let h = EngineHarness::new().with_track("sounds/1교시본령.wav", 2.0);
    let mut rx = h.events.subscribe();
    let sim = simulator(&h, "08:05:00", Catalog::builtin().unwrap());

    sim.jump_to_stage("국어").unwrap();

    assert_eq!(sim.clock().current_stage(), "국어 시작");
    assert_eq!(sim.clock().time_of_day(), tod("08:40:01"));
    assert!(sim.has_started());

    let events = drain(&mut rx);
    assert!(events.contains(&SimEvent::StageChanged {
        stage: "국어 시작".to_string()
    }));
    assert_eq!(announcements(&events), vec!["국어 본령".to_string()]);
    assert!(wait_until(|| h.engine.is_playing()).await);
}

#[tokio::test(start_paused = true)]
async fn test_stage_jump_without_bell_announces_start() {
    let h = EngineHarness::new();
    let mut rx = h.events.subscribe();
    let sim = simulator(&h, "08:05:00", Catalog::builtin().unwrap());

    sim.jump_to_stage("영어").unwrap();

    let events = drain(&mut rx);
    assert!(events.contains(&SimEvent::ExamStarted {
        subject: "영어".to_string(),
        at: tod("13:10:00"),
    }));
    assert!(announcements(&events).is_empty());
    assert!(sim.jump_to_stage("체육").is_err());
}

#[tokio::test(start_paused = true)]
async fn test_listening_override_registers_and_plays() {
    let h = EngineHarness::new();
    h.fetcher.insert("/tmp/listening.wav", announcement_wav(3.0));
    let mut rx = h.events.subscribe();
    let sim = simulator(&h, "13:06:59", Catalog::builtin().unwrap());
    let base = sim.clock().event_count();

    sim.set_listening_track("영어", Some("/tmp/listening.wav".to_string()))
        .unwrap();
    assert_eq!(sim.clock().event_count(), base + 1);
    assert!(sim.resources().contains("/tmp/listening.wav"));

    sim.toggle();
    sleep(Duration::from_millis(1500)).await;
    assert!(announcements(&drain(&mut rx)).contains(&"영어 듣기 방송".to_string()));
    assert!(wait_until(|| h.engine.is_playing()).await);

    sim.set_listening_track("영어", None).unwrap();
    assert_eq!(sim.clock().event_count(), base);
    assert!(sim.set_listening_track("국어", Some("x.wav".to_string())).is_err());
}

#[tokio::test(start_paused = true)]
async fn test_missing_sound_is_skipped_and_clock_continues() {
    let h = EngineHarness::new();
    let mut rx = h.events.subscribe();
    let sim = simulator(&h, "08:40:00", first_period_catalog());

    sim.toggle();
    assert!(
        wait_until(|| {
            drain(&mut rx)
                .iter()
                .any(|e| matches!(e, SimEvent::PlaybackFailed { title, .. } if title == "국어 본령"))
        })
        .await
    );

    sleep(Duration::from_millis(2500)).await;
    assert!(sim.clock().is_running());
    assert_eq!(sim.clock().time_of_day(), tod("08:40:03"));
    assert!(!h.engine.is_playing());
}

#[tokio::test(start_paused = true)]
async fn test_progress_and_remaining() {
    let h = EngineHarness::new();
    let sim = simulator(&h, "08:05:00", Catalog::builtin().unwrap());
    let date = NaiveDate::from_ymd_opt(2025, 6, 7).unwrap();
    let set = |t: &str| {
        sim.clock()
            .set_current_time(date.and_time(tod(t).to_naive_time()))
    };

    set("08:05:00");
    assert_eq!(sim.progress_percent(), 0.0);

    set("12:55:00");
    assert!((sim.progress_percent() - 50.0).abs() < 1e-9);

    set("18:00:00");
    assert_eq!(sim.progress_percent(), 100.0);
    assert!(sim.remaining().is_none());

    set("09:57:30");
    let remaining = sim.remaining().unwrap();
    assert_eq!(remaining.subject, "국어");
    assert_eq!(remaining.remaining_secs, 150);
    assert_eq!(remaining.label, "2분 30초 남음");
    assert_eq!(sim.active_entry().unwrap().subject, "국어");

    let status = sim.status();
    assert_eq!(status.remaining.unwrap().label, "2분 30초 남음");
    assert!(!status.started);
    assert_eq!(status.clock.current_stage, "대기중");
}

#[tokio::test(start_paused = true)]
async fn test_preload_all_tolerates_failures() {
    let h = EngineHarness::new();
    let catalog = Catalog::builtin().unwrap();
    h.fetcher.insert("sounds/1교시본령.wav", announcement_wav(0.5));
    h.fetcher.insert("sounds/1교시종료령.wav", announcement_wav(0.5));
    let sim = simulator(&h, "08:05:00", catalog);

    let loaded = sim.preload_all().await;

    assert_eq!(loaded, 2);
    assert!(h.engine.is_cached("sounds/1교시본령.wav"));
    assert_eq!(h.fetcher.fetch_count(), sim.resources().len());
}
