//! Player error types.

use thiserror::Error;

use crate::engine::ProcessError;

/// Errors surfaced to callers of the playback controller.
///
/// IPC hiccups never show up here: they degrade to missing data instead.
#[derive(Debug, Error)]
pub enum PlayerError {
  #[error("No supported audio engine found (install mpv or ffplay)")]
  NoEngineAvailable,

  #[error("Invalid stream URI {0:?}: only http:// and https:// are accepted")]
  InvalidUri(String),

  #[error("Failed to launch audio engine: {0}")]
  Launch(#[source] std::io::Error),
}

impl From<ProcessError> for PlayerError {
  fn from(err: ProcessError) -> Self {
    match err {
      ProcessError::NotFound => PlayerError::NoEngineAvailable,
      ProcessError::SpawnFailed(e) => PlayerError::Launch(e),
    }
  }
}
