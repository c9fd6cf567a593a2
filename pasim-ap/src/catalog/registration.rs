//! Deriving clock events from the catalog
//!
//! Derivation is pure: catalog + sound library + listening overrides in, an
//! ordered list of announcements out. Registration then turns each into a
//! clock action that talks to the playback engine. Callers clear the clock
//! before registering so the whole set is always rebuilt together.

use crate::catalog::{Catalog, ScheduleEntry};
use crate::playback::PlaybackEngine;
use crate::scheduler::SimClock;
use pasim_common::events::{EventBus, SimEvent};
use pasim_common::TimeOfDay;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Maps catalog sound names to resource identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoundLibrary {
    root: String,
    extension: String,
}

impl SoundLibrary {
    /// `root` is a directory or base URL; an empty root leaves ids relative.
    pub fn new(root: impl Into<String>, extension: impl Into<String>) -> Self {
        let root = root.into().trim_end_matches('/').to_string();
        let extension = extension.into().trim_start_matches('.').to_string();
        Self { root, extension }
    }

    pub fn resource(&self, name: &str) -> String {
        if self.root.is_empty() {
            format!("{}.{}", name, self.extension)
        } else {
            format!("{}/{}.{}", self.root, name, self.extension)
        }
    }
}

/// User-supplied listening tracks, keyed by subject.
pub type ListeningOverrides = HashMap<String, String>;

/// What an announcement is for. Determines its time and title.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AnnouncementKind {
    Start,
    End,
    TeacherEntry,
    Pre,
    Ready,
    EndTen,
    Listening,
    /// Period start without a bell; notification only
    StartNotice,
}

impl AnnouncementKind {
    /// Title suffix shown after the subject
    pub fn label(&self) -> &'static str {
        match self {
            AnnouncementKind::Start => "본령",
            AnnouncementKind::End => "종료",
            AnnouncementKind::TeacherEntry => "교사 입장 안내",
            AnnouncementKind::Pre => "예비령",
            AnnouncementKind::Ready => "준비령",
            AnnouncementKind::EndTen => "종료 10분 전",
            AnnouncementKind::Listening => "듣기 방송",
            AnnouncementKind::StartNotice => "시험 시작",
        }
    }
}

/// One event derived from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduledAnnouncement {
    pub time: TimeOfDay,
    pub subject: String,
    pub kind: AnnouncementKind,
    pub title: String,
    /// Track to play; `None` for notification-only events
    pub resource: Option<String>,
}

impl ScheduledAnnouncement {
    fn new(entry: &ScheduleEntry, kind: AnnouncementKind, time: TimeOfDay, resource: Option<String>) -> Self {
        Self {
            time,
            subject: entry.subject.clone(),
            kind,
            title: format!("{} {}", entry.subject, kind.label()),
            resource,
        }
    }
}

/// Announcements for `entry` in registration order.
fn derive_entry(
    entry: &ScheduleEntry,
    sounds: &SoundLibrary,
    listening: &ListeningOverrides,
) -> Vec<ScheduledAnnouncement> {
    let mut out = Vec::new();
    let sound = |name: &Option<String>| name.as_deref().map(|n| sounds.resource(n));

    match sound(&entry.start_sound) {
        Some(resource) => out.push(ScheduledAnnouncement::new(
            entry,
            AnnouncementKind::Start,
            entry.start_time,
            Some(resource),
        )),
        None => out.push(ScheduledAnnouncement::new(
            entry,
            AnnouncementKind::StartNotice,
            entry.start_time,
            None,
        )),
    }

    let derived = [
        (AnnouncementKind::End, &entry.end_sound, entry.end_time),
        (
            AnnouncementKind::TeacherEntry,
            &entry.teacher_entry_sound,
            entry.start_time.minus_minutes(15),
        ),
        (AnnouncementKind::Pre, &entry.pre_sound, entry.start_time.minus_minutes(10)),
        (AnnouncementKind::Ready, &entry.ready_sound, entry.start_time.minus_minutes(5)),
        (AnnouncementKind::EndTen, &entry.end10_sound, entry.end_time.minus_minutes(10)),
    ];
    for (kind, name, time) in derived {
        if let Some(resource) = sound(name) {
            out.push(ScheduledAnnouncement::new(entry, kind, time, Some(resource)));
        }
    }

    if let Some(at) = entry.listening_start_time {
        match listening.get(&entry.subject) {
            Some(resource) => out.push(ScheduledAnnouncement::new(
                entry,
                AnnouncementKind::Listening,
                at,
                Some(resource.clone()),
            )),
            None => warn!(subject = %entry.subject, "No listening track attached"),
        }
    }

    out
}

/// Every announcement of the catalog, entry by entry.
pub fn derive_announcements(
    catalog: &Catalog,
    sounds: &SoundLibrary,
    listening: &ListeningOverrides,
) -> Vec<ScheduledAnnouncement> {
    catalog
        .entries()
        .iter()
        .flat_map(|entry| derive_entry(entry, sounds, listening))
        .collect()
}

/// Register `announcements` on `clock`.
///
/// Sound actions emit [`SimEvent::Announcement`] and spawn load + play on
/// the engine, so the tick never waits on decoding. Load failures are
/// already reported by the engine. Must be called inside a tokio runtime
/// context whenever the clock ticks.
pub fn register_all(
    clock: &SimClock,
    engine: &PlaybackEngine,
    events: &EventBus,
    announcements: &[ScheduledAnnouncement],
) {
    for announcement in announcements {
        let time = announcement.time;
        let title = announcement.title.clone();
        let events = events.clone();

        match announcement.resource.clone() {
            Some(resource) => {
                let engine = engine.clone();
                clock.register_event(time, move || {
                    info!(title = %title, at = %time, "Announcement");
                    events.emit_lossy(SimEvent::Announcement {
                        title: title.clone(),
                        at: time,
                    });
                    let engine = engine.clone();
                    let resource = resource.clone();
                    let title = title.clone();
                    tokio::spawn(async move {
                        if engine.load(&resource, &title).await.is_ok() {
                            engine.play();
                        }
                    });
                });
            }
            None => {
                let subject = announcement.subject.clone();
                clock.register_event(time, move || {
                    info!(subject = %subject, at = %time, "Exam started");
                    events.emit_lossy(SimEvent::ExamStarted {
                        subject: subject.clone(),
                        at: time,
                    });
                });
            }
        }
    }
    debug!(count = announcements.len(), "Announcements registered");
}
