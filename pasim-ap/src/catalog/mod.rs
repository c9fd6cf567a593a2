//! Schedule catalog
//!
//! The ordered list of exam periods with their announcement sounds. The
//! built-in exam-day catalog ships with the binary; a TOML file with the same
//! shape can replace it.

pub mod registration;

pub use registration::{
    derive_announcements, register_all, AnnouncementKind, ListeningOverrides, ScheduledAnnouncement,
    SoundLibrary,
};

use crate::error::{Error, Result};
use pasim_common::TimeOfDay;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::debug;

const BUILTIN_CATALOG: &str = include_str!("assets/exam_day.toml");

/// One exam period and the sounds announced around it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub subject: String,
    pub start_time: TimeOfDay,
    pub end_time: TimeOfDay,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_sound: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_sound: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teacher_entry_sound: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_sound: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_sound: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end10_sound: Option<String>,
    /// Start of the listening broadcast, when the period has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listening_start_time: Option<TimeOfDay>,
}

impl ScheduleEntry {
    /// Whether `now` falls inside `[start_time, end_time)`
    pub fn contains(&self, now: TimeOfDay) -> bool {
        now >= self.start_time && now < self.end_time
    }

    /// Catalog sound names referenced by this entry
    pub fn sound_names(&self) -> impl Iterator<Item = &str> {
        [
            &self.start_sound,
            &self.end_sound,
            &self.teacher_entry_sound,
            &self.pre_sound,
            &self.ready_sound,
            &self.end10_sound,
        ]
        .into_iter()
        .filter_map(|s| s.as_deref())
    }
}

/// Ordered schedule catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(rename = "entry", default)]
    entries: Vec<ScheduleEntry>,
}

impl Catalog {
    pub fn new(entries: Vec<ScheduleEntry>) -> Result<Self> {
        let catalog = Self { entries };
        catalog.validate()?;
        Ok(catalog)
    }

    /// The exam-day catalog compiled into the binary.
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(BUILTIN_CATALOG)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let catalog: Catalog = toml::from_str(text)
            .map_err(|e| Error::Catalog(format!("Failed to parse catalog: {}", e)))?;
        catalog.validate()?;
        debug!(entries = catalog.entries.len(), "Catalog parsed");
        Ok(catalog)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Catalog(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    fn validate(&self) -> Result<()> {
        let mut subjects = BTreeSet::new();
        for entry in &self.entries {
            if entry.subject.trim().is_empty() {
                return Err(Error::Catalog("Entry with empty subject".to_string()));
            }
            if !subjects.insert(entry.subject.as_str()) {
                return Err(Error::Catalog(format!("Duplicate subject '{}'", entry.subject)));
            }
            if entry.end_time <= entry.start_time {
                return Err(Error::Catalog(format!(
                    "'{}' ends at {} before it starts at {}",
                    entry.subject, entry.end_time, entry.start_time
                )));
            }
        }
        Ok(())
    }

    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn find(&self, subject: &str) -> Option<&ScheduleEntry> {
        self.entries.iter().find(|e| e.subject == subject)
    }

    /// First entry in progress at `now`
    pub fn active_at(&self, now: TimeOfDay) -> Option<&ScheduleEntry> {
        self.entries.iter().find(|e| e.contains(now))
    }

    /// Distinct sound names across the catalog, sorted
    pub fn distinct_sounds(&self) -> BTreeSet<&str> {
        self.entries.iter().flat_map(|e| e.sound_names()).collect()
    }
}
