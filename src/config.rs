use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::news::types::{CATEGORIES, SORT_ORDERS};

/// Largest page the upstream will serve.
const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  pub api: ApiConfig,
  pub headlines: HeadlinesConfig,
  /// Items per upstream page, for both headlines and search
  pub page_size: u32,
  pub search: SearchConfig,
  pub sync: SyncConfig,
  /// Cache database path (defaults to $XDG_DATA_HOME/newsflow/cache.db)
  pub database: Option<PathBuf>,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      api: ApiConfig::default(),
      headlines: HeadlinesConfig::default(),
      page_size: 20,
      search: SearchConfig::default(),
      sync: SyncConfig::default(),
      database: None,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
  pub base_url: String,
  /// Connect and read timeout for every request
  pub timeout_secs: u64,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url: "https://newsapi.org/".to_string(),
      timeout_secs: 30,
    }
  }
}

impl ApiConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HeadlinesConfig {
  pub country: String,
  pub category: Option<String>,
}

impl Default for HeadlinesConfig {
  fn default() -> Self {
    Self {
      country: "us".to_string(),
      category: None,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
  pub debounce_ms: u64,
  /// Shorter (non-empty) queries are never sent
  pub min_query_len: usize,
  /// relevancy, popularity or publishedAt
  pub sort_by: String,
}

impl Default for SearchConfig {
  fn default() -> Self {
    Self {
      debounce_ms: 500,
      min_query_len: 3,
      sort_by: "relevancy".to_string(),
    }
  }
}

impl SearchConfig {
  pub fn debounce(&self) -> Duration {
    Duration::from_millis(self.debounce_ms)
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  /// Failed runs are retried until this many attempts have been made
  pub max_attempts: u32,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self { max_attempts: 3 }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./newsflow.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/newsflow/config.yaml
  ///
  /// Without any file the built-in defaults are used.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("newsflow.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("newsflow").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    config.validate()?;
    Ok(config)
  }

  fn validate(&self) -> Result<()> {
    if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
      return Err(eyre!(
        "page_size must be between 1 and {}, got {}",
        MAX_PAGE_SIZE,
        self.page_size
      ));
    }
    if self.sync.max_attempts == 0 {
      return Err(eyre!("sync.max_attempts must be at least 1"));
    }
    url::Url::parse(&self.api.base_url)
      .map_err(|e| eyre!("Invalid api.base_url {}: {}", self.api.base_url, e))?;
    if let Some(category) = &self.headlines.category {
      if !CATEGORIES.contains(&category.as_str()) {
        return Err(eyre!(
          "Unknown headlines.category {}, expected one of: {}",
          category,
          CATEGORIES.join(", ")
        ));
      }
    }
    if !SORT_ORDERS.contains(&self.search.sort_by.as_str()) {
      return Err(eyre!(
        "Unknown search.sort_by {}, expected one of: {}",
        self.search.sort_by,
        SORT_ORDERS.join(", ")
      ));
    }
    Ok(())
  }

  /// Get the news API key from environment variables.
  ///
  /// Checks NEWSFLOW_API_KEY first, then NEWS_API_KEY as fallback.
  pub fn get_api_key() -> Result<String> {
    std::env::var("NEWSFLOW_API_KEY")
      .or_else(|_| std::env::var("NEWS_API_KEY"))
      .map_err(|_| {
        eyre!("News API key not found. Set NEWSFLOW_API_KEY or NEWS_API_KEY environment variable.")
      })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
  }

  #[test]
  fn test_defaults() {
    let config = Config::default();
    assert_eq!(config.api.base_url, "https://newsapi.org/");
    assert_eq!(config.api.timeout(), Duration::from_secs(30));
    assert_eq!(config.headlines.country, "us");
    assert_eq!(config.page_size, 20);
    assert_eq!(config.search.debounce(), Duration::from_millis(500));
    assert_eq!(config.search.min_query_len, 3);
    assert_eq!(config.sync.max_attempts, 3);
  }

  #[test]
  fn test_partial_file_keeps_defaults() {
    let file = write_config("headlines:\n  country: gb\n  category: technology\npage_size: 10\n");
    let config = Config::load(Some(file.path())).unwrap();

    assert_eq!(config.headlines.country, "gb");
    assert_eq!(config.headlines.category.as_deref(), Some("technology"));
    assert_eq!(config.page_size, 10);
    assert_eq!(config.search.sort_by, "relevancy");
  }

  #[test]
  fn test_missing_explicit_path_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(Config::load(Some(&dir.path().join("nope.yaml"))).is_err());
  }

  #[test]
  fn test_out_of_range_page_size_is_rejected() {
    let file = write_config("page_size: 0\n");
    assert!(Config::load(Some(file.path())).is_err());

    let file = write_config("page_size: 500\n");
    assert!(Config::load(Some(file.path())).is_err());
  }

  #[test]
  fn test_bad_base_url_is_rejected() {
    let file = write_config("api:\n  base_url: not a url\n");
    assert!(Config::load(Some(file.path())).is_err());
  }

  #[test]
  fn test_unknown_category_is_rejected() {
    let file = write_config("headlines:\n  category: technlogy\n");
    let err = Config::load(Some(file.path())).unwrap_err();
    assert!(err.to_string().contains("headlines.category"));
  }

  #[test]
  fn test_sort_order_must_be_known() {
    let file = write_config("search:\n  sort_by: publishedAt\n");
    assert_eq!(Config::load(Some(file.path())).unwrap().search.sort_by, "publishedAt");

    let file = write_config("search:\n  sort_by: newest\n");
    assert!(Config::load(Some(file.path())).is_err());
  }
}
