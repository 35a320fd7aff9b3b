//! Settings store for runtime configuration and calibration.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::calibration::CalibrationProfile;
use crate::config::RuntimeConfig;
use crate::error::{NavError, NavResult};

pub trait SettingsStore: Send + Sync {
    fn load_calibration(&self) -> NavResult<CalibrationProfile>;

    fn save_calibration(&self, profile: &CalibrationProfile) -> NavResult<()>;

    fn load_runtime_config(&self) -> NavResult<RuntimeConfig>;
}

/// Everything the store keeps, as one record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoredSettings {
    pub runtime: RuntimeConfig,
    pub calibration: CalibrationProfile,
}

/// One pretty-printed JSON file, created with defaults if missing.
#[derive(Debug)]
pub struct JsonSettingsStore {
    path: PathBuf,
    // Serializes read-modify-write of the file.
    write_lock: Mutex<()>,
}

impl JsonSettingsStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> NavResult<StoredSettings> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let defaults = StoredSettings::default();
                log::info!("Creating settings file {}", self.path.display());
                self.write(&defaults)?;
                Ok(defaults)
            }
            Err(e) => Err(NavError::Storage(format!("{}: {}", self.path.display(), e))),
        }
    }

    fn write(&self, settings: &StoredSettings) -> NavResult<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(settings)?;
        // Write-then-rename so a reader never sees half a file.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl SettingsStore for JsonSettingsStore {
    fn load_calibration(&self) -> NavResult<CalibrationProfile> {
        let profile = self.read()?.calibration;
        if !profile.is_consistent() {
            return Err(NavError::Storage(format!(
                "{}: calibration min exceeds max",
                self.path.display()
            )));
        }
        Ok(profile)
    }

    fn save_calibration(&self, profile: &CalibrationProfile) -> NavResult<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut settings = self.read()?;
        settings.calibration = *profile;
        self.write(&settings)
    }

    fn load_runtime_config(&self) -> NavResult<RuntimeConfig> {
        Ok(self.read()?.runtime)
    }
}

/// Keeps settings in memory; for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryStore {
    settings: Mutex<StoredSettings>,
}

impl MemoryStore {
    pub fn new(settings: StoredSettings) -> Self {
        Self {
            settings: Mutex::new(settings),
        }
    }

    fn get(&self) -> StoredSettings {
        self.settings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl SettingsStore for MemoryStore {
    fn load_calibration(&self) -> NavResult<CalibrationProfile> {
        Ok(self.get().calibration)
    }

    fn save_calibration(&self, profile: &CalibrationProfile) -> NavResult<()> {
        self.settings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .calibration = *profile;
        Ok(())
    }

    fn load_runtime_config(&self) -> NavResult<RuntimeConfig> {
        Ok(self.get().runtime)
    }
}
