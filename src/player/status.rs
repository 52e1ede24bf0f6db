//! Playback status snapshots and their display form.

use serde::Serialize;

use super::track::Track;

pub const DEFAULT_VOLUME: u8 = 100;

/// Derived from polling the engine, never from local bookkeeping alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub enum PlaybackState {
  #[default]
  Stopped,
  Playing,
  Paused,
}

/// Best-effort player status. Fields the engine did not report keep defaults.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerStatus {
  pub state: PlaybackState,
  /// Seconds into the current track.
  pub position: f64,
  /// Track length in seconds, 0 when unknown (e.g. live streams).
  pub duration: f64,
  pub volume: u8,
  /// URI the engine is currently playing, when it reports one.
  pub path: Option<String>,
  /// Whether the engine answered at all. Unreachable snapshots are stale.
  pub reachable: bool,
}

impl Default for PlayerStatus {
  fn default() -> Self {
    Self {
      state: PlaybackState::Stopped,
      position: 0.0,
      duration: 0.0,
      volume: DEFAULT_VOLUME,
      path: None,
      reachable: false,
    }
  }
}

impl PlayerStatus {
  /// One-line status: `▶ Artist - Title  01:23 / 03:45  vol 80%`.
  pub fn display_line(&self, track: Option<&Track>) -> String {
    let icon = match self.state {
      PlaybackState::Playing => "▶",
      PlaybackState::Paused => "⏸",
      PlaybackState::Stopped => "■",
    };
    let label = track.map(Track::label).unwrap_or_else(|| "Nothing playing".to_string());

    if self.state == PlaybackState::Stopped {
      return format!("{icon} {label}");
    }

    let clock = if self.duration > 0.0 {
      format!("{} / {}", format_clock(self.position), format_clock(self.duration))
    } else {
      format_clock(self.position)
    };
    format!("{icon} {label}  {clock}  vol {}%", self.volume)
  }
}

/// `mm:ss`, or `h:mm:ss` from one hour on.
pub fn format_clock(seconds: f64) -> String {
  let total = if seconds.is_finite() && seconds > 0.0 {
    seconds as u64
  } else {
    0
  };
  let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
  if h > 0 {
    format!("{h}:{m:02}:{s:02}")
  } else {
    format!("{m:02}:{s:02}")
  }
}

/// Fires once on a Playing -> Stopped transition, however long Stopped lasts.
#[derive(Debug, Default, Clone)]
pub struct AdvanceTrigger {
  last: PlaybackState,
}

impl AdvanceTrigger {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn observe(&mut self, state: PlaybackState) -> bool {
    let fired = self.last == PlaybackState::Playing && state == PlaybackState::Stopped;
    self.last = state;
    fired
  }
}
