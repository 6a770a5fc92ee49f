use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

use crate::http::Request;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
  pub cache: CacheConfig,
  pub sync: SyncConfig,
  pub notifications: NotificationConfig,
  pub store: StoreConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Generation tag. Bump whenever the seed asset list or the caching
  /// policy changes; install then builds a fresh generation and activation
  /// purges the old one.
  pub version: String,
  /// Origin the seed paths resolve against
  pub origin: String,
  /// Paths cached at install; all must fetch for the install to succeed
  pub seed_assets: Vec<String>,
  /// Path served as offline fallback for navigations
  pub root: String,
  /// Optional bound on a single network fetch, in seconds.
  /// The web app's service worker has none; a hung fetch hangs that event.
  pub timeout_secs: Option<u64>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      version: "araise-v2".to_string(),
      origin: "https://araise.web.app".to_string(),
      seed_assets: vec![
        "/".to_string(),
        "/dashboard".to_string(),
        "/workout".to_string(),
        "/water".to_string(),
        "/diet".to_string(),
        "/static/css/main.css".to_string(),
        "/static/js/main.js".to_string(),
        "/manifest.json".to_string(),
      ],
      root: "/".to_string(),
      timeout_secs: None,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  /// The one sync tag this worker reacts to
  pub tag: String,
  /// Duration of the simulated reconciliation flush, in milliseconds
  pub delay_ms: u64,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      tag: "sync-user-data".to_string(),
      delay_ms: 3000,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
  /// Icon path shown on push notifications
  pub icon: String,
}

impl Default for NotificationConfig {
  fn default() -> Self {
    Self {
      icon: "/logo192.png".to_string(),
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
  /// Cache database path (default: data dir)
  pub path: Option<PathBuf>,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./araise-offline.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/araise-offline/config.yaml
  ///
  /// The seed asset list is fixed at deploy time, so when no file exists the
  /// built-in defaults for the ARAISE deployment are used.
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
    let local = PathBuf::from("araise-offline.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("araise-offline").join("config.yaml");
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

    Ok(config)
  }

  /// The configured app origin as a URL.
  pub fn origin_url(&self) -> Result<Url> {
    Url::parse(&self.cache.origin)
      .map_err(|e| eyre!("Invalid origin {}: {}", self.cache.origin, e))
  }

  /// The app root page as a URL.
  pub fn root_url(&self) -> Result<Url> {
    self
      .origin_url()?
      .join(&self.cache.root)
      .map_err(|e| eyre!("Invalid root path {}: {}", self.cache.root, e))
  }

  /// Build the GET request for a seed asset path.
  pub fn seed_request(&self, path: &str) -> Result<Request> {
    let url = self
      .origin_url()?
      .join(path)
      .map_err(|e| eyre!("Invalid seed asset path {}: {}", path, e))?;
    Ok(Request::get(url))
  }
}
