//! Configuration for pasim-ap
//!
//! Settings sources, highest priority first:
//! 1. Command-line arguments (`--sound-root`, `--start`, `--speed`, ...)
//! 2. Environment variables (`PASIM_SOUND_ROOT`, via clap)
//! 3. TOML configuration file (`--config`, `PASIM_CONFIG`, platform dirs)
//! 4. Built-in defaults (code constants)
//!
//! Everything is bootstrap-only: nothing here is persisted or reloaded.

use crate::error::{Error, Result};
use crate::playback::PlaybackSettings;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use pasim_common::TimeOfDay;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "PASIM_CONFIG";

/// Application configuration loaded from TOML.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory or http(s) base URL holding the announcement sounds
    pub sound_root: String,

    /// File extension of catalog sounds
    ///
    /// Default: mp3
    pub sound_extension: String,

    /// Time the day starts at on the first toggle
    pub start_time: TimeOfDay,

    /// Simulated calendar date
    pub sim_date: NaiveDate,

    /// Initial clock speed multiplier
    pub speed: u32,

    /// Progress bar bounds
    pub day_start: TimeOfDay,
    pub day_end: TimeOfDay,

    /// Catalog TOML replacing the built-in exam-day schedule
    pub catalog: Option<PathBuf>,

    pub audio: AudioConfig,

    /// Initial volume, spatial flag, position and effect parameters
    pub effects: PlaybackSettings,

    pub logging: LoggingConfig,
}

/// Output device configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Output device name (default device if unset or missing)
    pub device: Option<String>,

    /// Fixed device buffer size in frames
    pub buffer_size: Option<u32>,

    /// Bus rate when running without a device
    pub sample_rate: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            buffer_size: None,
            sample_rate: 44100,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); RUST_LOG wins
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

fn hms(hour: u32, minute: u32, second: u32) -> TimeOfDay {
    TimeOfDay::from(NaiveTime::from_hms_opt(hour, minute, second).unwrap_or(NaiveTime::MIN))
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sound_root: "sounds".to_string(),
            sound_extension: "mp3".to_string(),
            start_time: hms(8, 5, 0),
            sim_date: NaiveDate::from_ymd_opt(2025, 6, 7).unwrap_or_default(),
            speed: 1,
            day_start: hms(8, 5, 0),
            day_end: hms(17, 45, 0),
            catalog: None,
            audio: AudioConfig::default(),
            effects: PlaybackSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Command-line overrides applied on top of the file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub sound_root: Option<String>,
    pub start_time: Option<String>,
    pub speed: Option<u32>,
    pub catalog: Option<PathBuf>,
}

impl AppConfig {
    /// Load from the resolved config file, or defaults if none was found.
    pub fn load(cli_config: Option<&Path>) -> Result<Self> {
        let path = pasim_common::config::resolve_config_path(cli_config, CONFIG_ENV_VAR);
        if let Some(p) = &path {
            info!("Loading config from {}", p.display());
        }
        let config: AppConfig = pasim_common::config::load_or_default(path.as_deref())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(text)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply CLI overrides and re-validate.
    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) -> Result<()> {
        if let Some(root) = overrides.sound_root {
            self.sound_root = root;
        }
        if let Some(start) = overrides.start_time {
            self.start_time = TimeOfDay::parse(&start)
                .map_err(|e| Error::Config(format!("Invalid --start: {}", e)))?;
        }
        if let Some(speed) = overrides.speed {
            self.speed = speed;
        }
        if let Some(catalog) = overrides.catalog {
            self.catalog = Some(catalog);
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        if self.speed == 0 {
            return Err(Error::Config("speed must be at least 1".to_string()));
        }
        if self.day_end <= self.day_start {
            return Err(Error::Config(format!(
                "day_end {} must be after day_start {}",
                self.day_end, self.day_start
            )));
        }
        if self.sound_extension.trim().is_empty() {
            return Err(Error::Config("sound_extension must not be empty".to_string()));
        }
        if self.audio.sample_rate == 0 {
            return Err(Error::Config("audio.sample_rate must be positive".to_string()));
        }
        if !(0.0..=1.0).contains(&self.effects.volume) {
            return Err(Error::Config(format!(
                "effects.volume {} outside [0, 1]",
                self.effects.volume
            )));
        }
        self.effects.effects.validate().map_err(Error::Config)?;
        Ok(())
    }

    /// Simulated timestamp of `time` on the configured date
    pub fn at(&self, time: TimeOfDay) -> NaiveDateTime {
        self.sim_date.and_time(time.to_naive_time())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.start_time.to_string(), "08:05:00");
        assert_eq!(config.day_end.to_string(), "17:45:00");
        assert_eq!(config.speed, 1);
        assert!(config.effects.spatial_enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            sound_root = "https://example.org/sounds"
            speed = 10

            [effects]
            reverb_mix = 0.2
            spatial_enabled = false

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();
        assert_eq!(config.sound_root, "https://example.org/sounds");
        assert_eq!(config.speed, 10);
        assert_eq!(config.effects.effects.reverb_mix, 0.2);
        assert_eq!(config.effects.effects.delay_mix, 0.7);
        assert!(!config.effects.spatial_enabled);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.audio.sample_rate, 44100);
    }

    #[test]
    fn test_rejects_zero_speed() {
        assert!(AppConfig::from_toml_str("speed = 0").is_err());
    }

    #[test]
    fn test_rejects_out_of_range_effects() {
        assert!(AppConfig::from_toml_str("[effects]\ncompressor_threshold = 5.0").is_err());
        assert!(AppConfig::from_toml_str("[effects]\ndelay_feedback = 1.5").is_err());
    }

    #[test]
    fn test_rejects_bad_time() {
        assert!(AppConfig::from_toml_str("start_time = \"8am\"").is_err());
    }

    #[test]
    fn test_overrides() {
        let mut config = AppConfig::default();
        config
            .apply_overrides(ConfigOverrides {
                sound_root: Some("/srv/sounds".to_string()),
                start_time: Some("08:39:58".to_string()),
                speed: Some(5),
                catalog: None,
            })
            .unwrap();
        assert_eq!(config.sound_root, "/srv/sounds");
        assert_eq!(config.start_time.to_string(), "08:39:58");
        assert_eq!(config.speed, 5);

        let bad = config.apply_overrides(ConfigOverrides {
            start_time: Some("25:00:00".to_string()),
            ..Default::default()
        });
        assert!(bad.is_err());
    }

    #[test]
    fn test_missing_explicit_file_is_common_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = AppConfig::load(Some(&dir.path().join("pasim-ap.toml")));
        assert!(matches!(
            result,
            Err(Error::Common(pasim_common::Error::Config(_)))
        ));
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "sim_date = \"2026-11-19\"").unwrap();
        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.sim_date, NaiveDate::from_ymd_opt(2026, 11, 19).unwrap());
        assert_eq!(
            config.at(config.start_time).to_string(),
            "2026-11-19 08:05:00"
        );
    }
}
