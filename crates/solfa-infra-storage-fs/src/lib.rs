mod timeline_file;

pub use timeline_file::{JsonTimelineProvider, TimelineFile, TimelineLoadError};

use solfa_ports::storage::{PracticeSettings, StorageError, StoragePort};
use std::fs;
use std::path::{Path, PathBuf};

pub struct FsStorage {
    base_dir: PathBuf,
}

impl FsStorage {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn default_base_dir() -> Result<PathBuf, StorageError> {
        let base = dirs_next::config_dir()
            .ok_or_else(|| StorageError::Io("config dir not found".to_string()))?;
        Ok(base.join("Solfa"))
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn settings_path(&self) -> PathBuf {
        self.base_dir.join("settings.json")
    }

    /// Directory for exported diagnostics bundles.
    pub fn diagnostics_dir(&self) -> PathBuf {
        self.base_dir.join("diagnostics")
    }
}

pub(crate) fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, StorageError> {
    let data = fs::read(path).map_err(|e| StorageError::Io(format!("{}: {e}", path.display())))?;
    serde_json::from_slice(&data).map_err(|e| StorageError::Serde(e.to_string()))
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StorageError::Io(e.to_string()))?;
    }
    let data = serde_json::to_vec_pretty(value).map_err(|e| StorageError::Serde(e.to_string()))?;
    fs::write(path, data).map_err(|e| StorageError::Io(e.to_string()))
}

impl Default for FsStorage {
    fn default() -> Self {
        let base_dir = Self::default_base_dir().unwrap_or_else(|err| {
            tracing::warn!(%err, "falling back to working directory for settings");
            PathBuf::from(".")
        });
        Self { base_dir }
    }
}

impl StoragePort for FsStorage {
    fn load_settings(&self) -> Result<PracticeSettings, StorageError> {
        let path = self.settings_path();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no settings file, using defaults");
            return Ok(PracticeSettings::default());
        }
        read_json(&path)
    }

    fn save_settings(&self, s: &PracticeSettings) -> Result<(), StorageError> {
        write_json(&self.settings_path(), s)
    }
}
