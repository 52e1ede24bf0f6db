//! Playback control for an external audio engine.
//!
//! Spawns mpv (or ffplay) on demand, drives it over its JSON IPC socket or
//! with job-control signals, and keeps a play queue in step with the engine.

pub mod config;
pub mod engine;
pub mod player;

#[cfg(all(test, unix))]
mod testing;

pub use config::{default_config_path, ConfigError, PlayerConfig};
pub use engine::{EngineKind, ShutdownOutcome};
pub use player::{
  PauseToggle, PlaybackController, PlaybackState, PlayerError, PlayerEvent, PlayerStatus,
  StatusPoller, Track,
};
