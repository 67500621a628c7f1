//! Configuration directories and per-profile sync settings.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// Default configuration directory name
const CONFIG_DIR_NAME: &str = "garmin-sync";

/// Default retention for daily health tabs, in days.
pub const DEFAULT_HEALTH_RETENTION_DAYS: u32 = 365;

/// Default retention for the activities tab, in days (5 years).
pub const DEFAULT_ACTIVITY_RETENTION_DAYS: u32 = 1826;

/// Get the configuration directory path
/// Returns ~/.config/garmin-sync on Unix, ~/Library/Application Support/garmin-sync on macOS
pub fn config_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|p| p.join(CONFIG_DIR_NAME))
        .ok_or_else(|| SyncError::config("Could not determine config directory"))
}

/// Get the data directory path for storing tokens
pub fn data_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|p| p.join(CONFIG_DIR_NAME))
        .ok_or_else(|| SyncError::config("Could not determine data directory"))
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Per-profile sync settings, stored as `<profile>.json` in the config
/// directory. Missing file means defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncProfile {
    #[serde(default = "default_domain")]
    pub domain: String,
    /// Folder the tab CSVs land in.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_health_retention")]
    pub health_retention_days: u32,
    #[serde(default = "default_activity_retention")]
    pub activity_retention_days: u32,
}

fn default_domain() -> String {
    "garmin.com".to_string()
}

fn default_output_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
        .join("export")
}

fn default_health_retention() -> u32 {
    DEFAULT_HEALTH_RETENTION_DAYS
}

fn default_activity_retention() -> u32 {
    DEFAULT_ACTIVITY_RETENTION_DAYS
}

impl Default for SyncProfile {
    fn default() -> Self {
        Self {
            domain: default_domain(),
            output_dir: default_output_dir(),
            health_retention_days: default_health_retention(),
            activity_retention_days: default_activity_retention(),
        }
    }
}

impl SyncProfile {
    /// Load the profile's settings, falling back to defaults when no
    /// settings file exists yet.
    pub fn load(profile: &str) -> Result<Self> {
        Self::load_from(&config_dir()?, profile)
    }

    pub fn load_from(dir: &Path, profile: &str) -> Result<Self> {
        let path = dir.join(format!("{}.json", profile));
        if !path.exists() {
            return Ok(Self::default());
        }
        let json = fs::read_to_string(&path)?;
        serde_json::from_str(&json)
            .map_err(|e| SyncError::config(format!("invalid profile {}: {}", path.display(), e)))
    }

    pub fn save_to(&self, dir: &Path, profile: &str) -> Result<()> {
        ensure_dir(dir)?;
        let path = dir.join(format!("{}.json", profile));
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}
