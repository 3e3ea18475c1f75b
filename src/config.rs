use std::fs::create_dir_all;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::tree::Limits;
use crate::value::FormatOptions;

const APP_DIR: &str = "dcmtree";
const SETTINGS_FILE: &str = "config.json";
const LAST_OPENED_FILE: &str = "last_opened";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub debounce_ms: u64,
    pub max_depth: usize,
    pub max_nodes: usize,
    pub value_width: usize,
    pub dictionary: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        let limits = Limits::default();
        Self {
            debounce_ms: 300,
            max_depth: limits.max_depth,
            max_nodes: limits.max_nodes,
            value_width: FormatOptions::default().value_width,
            dictionary: None,
        }
    }
}

impl Settings {
    /// Reads settings from `path`, or from the default location when `None`.
    /// A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match dirs::config_dir() {
                Some(dir) => dir.join(APP_DIR).join(SETTINGS_FILE),
                None => return Ok(Self::default()),
            },
        };
        if !path.exists() {
            debug!(path = %path.display(), "no settings file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Json { path, source })
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn limits(&self) -> Limits {
        Limits {
            max_depth: self.max_depth,
            max_nodes: self.max_nodes,
        }
    }

    pub fn format_options(&self) -> FormatOptions {
        FormatOptions {
            value_width: self.value_width,
        }
    }
}

// Get the app config directory, creating it on first use
pub fn app_config_dir() -> Result<PathBuf, ConfigError> {
    let dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?.join(APP_DIR);
    create_dir_all(&dir).map_err(|source| ConfigError::Io {
        path: dir.clone(),
        source,
    })?;
    Ok(dir)
}

pub fn save_last_opened_file(dir: &Path, file_path: &Path) -> Result<(), ConfigError> {
    let path = dir.join(LAST_OPENED_FILE);
    std::fs::write(&path, file_path.display().to_string())
        .map_err(|source| ConfigError::Io { path, source })
}

pub fn load_last_opened_file(dir: &Path) -> Result<PathBuf, ConfigError> {
    let path = dir.join(LAST_OPENED_FILE);
    if !path.exists() {
        return Err(ConfigError::NoLastFile);
    }
    let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io { path, source })?;

    let file_path = PathBuf::from(content.trim());
    // Check if the file still exists
    if !file_path.exists() {
        return Err(ConfigError::MissingLastFile(file_path));
    }
    Ok(file_path)
}

pub fn clear_last_opened_file(dir: &Path) -> Result<(), ConfigError> {
    let path = dir.join(LAST_OPENED_FILE);
    if path.exists() {
        std::fs::remove_file(&path).map_err(|source| ConfigError::Io { path, source })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_settings_fill_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"debounce_ms": 120, "dictionary": "/opt/attributes.json"}"#).unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.debounce(), Duration::from_millis(120));
        assert_eq!(settings.max_depth, Settings::default().max_depth);
        assert_eq!(settings.dictionary, Some(PathBuf::from("/opt/attributes.json")));
    }

    #[test]
    fn missing_settings_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(Some(&dir.path().join("absent.json"))).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn invalid_settings_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ nope").unwrap();
        assert!(matches!(Settings::load(Some(&path)), Err(ConfigError::Json { .. })));
    }

    #[test]
    fn last_opened_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let record = dir.path().join("study.json");
        std::fs::write(&record, "{}").unwrap();

        assert!(matches!(load_last_opened_file(dir.path()), Err(ConfigError::NoLastFile)));
        save_last_opened_file(dir.path(), &record).unwrap();
        assert_eq!(load_last_opened_file(dir.path()).unwrap(), record);

        std::fs::remove_file(&record).unwrap();
        assert!(matches!(
            load_last_opened_file(dir.path()),
            Err(ConfigError::MissingLastFile(_))
        ));

        clear_last_opened_file(dir.path()).unwrap();
        assert!(matches!(load_last_opened_file(dir.path()), Err(ConfigError::NoLastFile)));
    }
}
