//! User preferences persisted next to the cache.

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_SYNC_INTERVAL_HOURS: u32 = 6;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
  #[default]
  System,
  Light,
  Dark,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
  pub theme: Theme,
  /// Hours between background syncs, always positive
  pub sync_interval_hours: u32,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      theme: Theme::System,
      sync_interval_hours: DEFAULT_SYNC_INTERVAL_HOURS,
    }
  }
}

impl Settings {
  pub fn sync_interval(&self) -> Duration {
    Duration::from_secs(u64::from(self.sync_interval_hours) * 3600)
  }
}

/// Key-value preference storage.
pub trait PreferenceStore {
  fn get(&self) -> Settings;
  fn set(&self, settings: &Settings) -> Result<()>;
}

/// Preferences in a YAML file. A missing or unreadable file means defaults.
pub struct YamlPreferences {
  path: PathBuf,
}

impl YamlPreferences {
  pub fn new(path: PathBuf) -> Self {
    Self { path }
  }

  /// prefs.yaml under the application data directory
  pub fn open_default() -> Result<Self> {
    Ok(Self::new(crate::db::data_dir()?.join("prefs.yaml")))
  }

  pub fn path(&self) -> &Path {
    &self.path
  }
}

impl PreferenceStore for YamlPreferences {
  fn get(&self) -> Settings {
    let contents = match std::fs::read_to_string(&self.path) {
      Ok(contents) => contents,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Settings::default(),
      Err(e) => {
        warn!("Failed to read preferences {}: {}", self.path.display(), e);
        return Settings::default();
      }
    };

    match serde_yaml::from_str::<Settings>(&contents) {
      Ok(settings) if settings.sync_interval_hours == 0 => {
        warn!("Ignoring zero sync interval in {}", self.path.display());
        Settings {
          sync_interval_hours: DEFAULT_SYNC_INTERVAL_HOURS,
          ..settings
        }
      }
      Ok(settings) => settings,
      Err(e) => {
        warn!("Failed to parse preferences {}: {}", self.path.display(), e);
        Settings::default()
      }
    }
  }

  fn set(&self, settings: &Settings) -> Result<()> {
    if settings.sync_interval_hours == 0 {
      return Err(eyre!("Sync interval must be at least 1 hour"));
    }

    if let Some(parent) = self.path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create preferences directory: {}", e))?;
    }

    let contents =
      serde_yaml::to_string(settings).map_err(|e| eyre!("Failed to serialize preferences: {}", e))?;
    std::fs::write(&self.path, contents)
      .map_err(|e| eyre!("Failed to write preferences {}: {}", self.path.display(), e))?;

    Ok(())
  }
}
