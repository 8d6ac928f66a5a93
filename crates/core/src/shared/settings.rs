use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shared::constants::{DEFAULT_RETENTION_SECS, WHISPER_MODEL_NAME, WHISPER_MODEL_URL};

const APP_DIR: &str = "Audio2Text";
const DEFAULT_STORAGE_ROOT: &str = "/storage/emulated/0";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("could not determine config directory")]
    NoConfigDir,
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// User configuration, stored as JSON in the platform config directory.
///
/// Missing fields take their default, so older files keep loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Private directory for converted audio.
    pub working_dir: PathBuf,
    /// Mount point of the primary shared-storage volume.
    pub external_storage_root: PathBuf,
    /// JSON metadata catalog backing content references.
    pub catalog_path: Option<PathBuf>,
    pub model_name: String,
    pub model_url: String,
    /// Directory of pre-packaged models checked before downloading.
    pub bundled_model_dir: Option<PathBuf>,
    /// Language code; `None` auto-detects.
    pub language: Option<String>,
    /// Inference threads; `None` picks from the CPU count.
    pub threads: Option<usize>,
    pub retention_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            working_dir: default_working_dir(),
            external_storage_root: PathBuf::from(DEFAULT_STORAGE_ROOT),
            catalog_path: None,
            model_name: WHISPER_MODEL_NAME.to_string(),
            model_url: WHISPER_MODEL_URL.to_string(),
            bundled_model_dir: None,
            language: None,
            threads: None,
            retention_secs: DEFAULT_RETENTION_SECS,
        }
    }
}

fn default_working_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR)
        .join("work")
}

impl Settings {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_DIR).join("settings.json"))
    }

    /// Loads the user's settings, falling back to defaults when the file is
    /// missing or unreadable.
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        Self::load_from(&path).unwrap_or_else(|e| {
            log::warn!("{e}; using default settings");
            Self::default()
        })
    }

    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let json = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&json).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self) -> Result<(), SettingsError> {
        let path = Self::config_path().ok_or(SettingsError::NoConfigDir)?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        let io_err = |source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, json).map_err(io_err)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}
