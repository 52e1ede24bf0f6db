//! Player configuration.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const APP_NAME: &str = "playctl";

/// Distinguishes default socket paths of controllers in one process.
static INSTANCE: AtomicU32 = AtomicU32::new(0);

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("Failed to read config file: {0}")]
  Io(#[from] std::io::Error),
  #[error("Failed to parse config file: {0}")]
  Parse(#[from] toml::de::Error),
  #[error("Invalid config: {0}")]
  Invalid(String),
}

/// Player configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerConfig {
  /// Engine executable path (None = auto-detect mpv, then ffplay).
  #[serde(default)]
  pub engine_path: Option<String>,

  /// Additional engine command-line arguments.
  #[serde(default)]
  pub engine_args: Vec<String>,

  /// Control socket path (None = per-instance path in the temp dir).
  #[serde(default)]
  pub socket_path: Option<PathBuf>,

  /// Connect/read bound for one IPC exchange.
  #[serde(default = "default_ipc_timeout_ms")]
  pub ipc_timeout_ms: u64,

  /// How many times to look for the control socket after spawning.
  #[serde(default = "default_startup_retries")]
  pub startup_retries: u32,

  #[serde(default = "default_startup_poll_ms")]
  pub startup_poll_ms: u64,

  /// How long a graceful stop may take before the engine is killed.
  #[serde(default = "default_stop_timeout_ms")]
  pub stop_timeout_ms: u64,

  /// Status poller period.
  #[serde(default = "default_poll_interval_ms")]
  pub poll_interval_ms: u64,
}

fn default_ipc_timeout_ms() -> u64 {
  80
}

fn default_startup_retries() -> u32 {
  40
}

fn default_startup_poll_ms() -> u64 {
  50
}

fn default_stop_timeout_ms() -> u64 {
  1000
}

fn default_poll_interval_ms() -> u64 {
  1000
}

impl Default for PlayerConfig {
  fn default() -> Self {
    Self {
      engine_path: None,
      engine_args: Vec::new(),
      socket_path: None,
      ipc_timeout_ms: default_ipc_timeout_ms(),
      startup_retries: default_startup_retries(),
      startup_poll_ms: default_startup_poll_ms(),
      stop_timeout_ms: default_stop_timeout_ms(),
      poll_interval_ms: default_poll_interval_ms(),
    }
  }
}

impl PlayerConfig {
  /// Load from a TOML file. A missing file yields the defaults.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    if !path.exists() {
      log::debug!("No config at {:?}, using defaults", path);
      return Ok(Self::default());
    }
    let text = std::fs::read_to_string(path)?;
    let config: Self = toml::from_str(&text)?;
    config.validate().map_err(ConfigError::Invalid)?;
    Ok(config)
  }

  /// Validate configuration values.
  pub fn validate(&self) -> Result<(), String> {
    if self.engine_path.as_deref().is_some_and(|p| p.trim().is_empty()) {
      return Err("Engine path cannot be empty".to_string());
    }
    for (name, value) in [
      ("ipc_timeout_ms", self.ipc_timeout_ms),
      ("startup_poll_ms", self.startup_poll_ms),
      ("stop_timeout_ms", self.stop_timeout_ms),
    ] {
      if !(1..=10_000).contains(&value) {
        return Err(format!("{name} must be between 1 and 10000"));
      }
    }
    if self.startup_retries < 1 {
      return Err("startup_retries must be at least 1".to_string());
    }
    if !(100..=60_000).contains(&self.poll_interval_ms) {
      return Err("poll_interval_ms must be between 100 and 60000".to_string());
    }
    Ok(())
  }

  /// The configured socket path, or a fresh per-instance one.
  pub fn resolve_socket_path(&self) -> PathBuf {
    self.socket_path.clone().unwrap_or_else(|| {
      let n = INSTANCE.fetch_add(1, Ordering::SeqCst);
      std::env::temp_dir().join(format!("{APP_NAME}-{}-{n}.sock", std::process::id()))
    })
  }

  pub fn ipc_timeout(&self) -> Duration {
    Duration::from_millis(self.ipc_timeout_ms)
  }

  pub fn poll_interval(&self) -> Duration {
    Duration::from_millis(self.poll_interval_ms)
  }
}

/// `<config dir>/playctl/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
  dirs::config_dir().map(|dir| dir.join(APP_NAME).join("config.toml"))
}
