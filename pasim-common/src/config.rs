//! Configuration file discovery and TOML loading
//!
//! Config file resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. Per-user config directory (`<config_dir>/pasim/config.toml`)
//! 4. System-wide file (`/etc/pasim/config.toml`, Linux only)
//!
//! A missing file is not an error: callers fall back to built-in defaults.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Directory name used under the platform config directory
pub const APP_DIR_NAME: &str = "pasim";

/// Locate the bootstrap config file.
///
/// An explicitly requested file (CLI or environment) is returned even if it
/// does not exist, so the caller reports it instead of silently using
/// defaults. Implicit locations are only returned when present.
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3/4: Platform locations
    default_config_locations().into_iter().find(|p| p.exists())
}

/// Candidate config file locations for the current platform, in search order
pub fn default_config_locations() -> Vec<PathBuf> {
    let mut locations = Vec::new();
    if let Some(dir) = dirs::config_dir() {
        locations.push(dir.join(APP_DIR_NAME).join("config.toml"));
    }
    if cfg!(target_os = "linux") {
        locations.push(PathBuf::from("/etc").join(APP_DIR_NAME).join("config.toml"));
    }
    locations
}

/// Read and deserialize a TOML file.
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    debug!("Loading TOML file: {}", path.display());
    let text = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read {}: {}", path.display(), e))
    })?;
    toml::from_str(&text)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Load a TOML file if one was found, otherwise return `T::default()`.
///
/// Parse errors are returned; only absence degrades to defaults.
pub fn load_or_default<T: DeserializeOwned + Default>(path: Option<&Path>) -> Result<T> {
    match path {
        Some(p) if p.exists() => load_toml(p),
        Some(p) => Err(Error::Config(format!(
            "Config file not found: {}",
            p.display()
        ))),
        None => {
            warn!("No config file found, using built-in defaults");
            Ok(T::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serial_test::serial;
    use std::io::Write;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct Sample {
        #[serde(default)]
        speed: u32,
    }

    #[test]
    #[serial]
    fn test_cli_argument_wins() {
        std::env::set_var("PASIM_TEST_CONFIG", "/tmp/from-env.toml");
        let path = resolve_config_path(Some(Path::new("/tmp/from-cli.toml")), "PASIM_TEST_CONFIG");
        assert_eq!(path, Some(PathBuf::from("/tmp/from-cli.toml")));
        std::env::remove_var("PASIM_TEST_CONFIG");
    }

    #[test]
    #[serial]
    fn test_env_var_used_without_cli() {
        std::env::set_var("PASIM_TEST_CONFIG", "/tmp/from-env.toml");
        let path = resolve_config_path(None, "PASIM_TEST_CONFIG");
        assert_eq!(path, Some(PathBuf::from("/tmp/from-env.toml")));
        std::env::remove_var("PASIM_TEST_CONFIG");
    }

    #[test]
    fn test_load_toml_parses_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "speed = 10").unwrap();
        let sample: Sample = load_toml(file.path()).unwrap();
        assert_eq!(sample.speed, 10);
    }

    #[test]
    fn test_load_toml_reports_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "speed = \"fast\"").unwrap();
        let result: Result<Sample> = load_toml(file.path());
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_load_toml_reports_unreadable_file_as_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let result: Result<Sample> = load_toml(&dir.path().join("missing.toml"));
        assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("missing.toml")));
    }

    #[test]
    fn test_load_or_default_without_file() {
        let sample: Sample = load_or_default(None).unwrap();
        assert_eq!(sample, Sample::default());
    }

    #[test]
    fn test_load_or_default_missing_explicit_file_is_error() {
        let result: Result<Sample> =
            load_or_default(Some(Path::new("/nonexistent/pasim/config.toml")));
        assert!(result.is_err());
    }
}
