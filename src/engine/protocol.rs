//! Engine JSON IPC protocol types.
//!
//! Every request is a single line `{"command": [...]}`. Only property queries
//! expect an answer, which arrives as `{"data": ..., "error": "success"}`.
//! Reference: https://mpv.io/manual/master/#json-ipc

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How a `loadfile` request treats the engine playlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
  /// Stop the current file and replace the whole playlist.
  Replace,
  /// Append to the playlist, starting playback if nothing is playing.
  AppendPlay,
}

impl LoadMode {
  pub fn as_str(self) -> &'static str {
    match self {
      LoadMode::Replace => "replace",
      LoadMode::AppendPlay => "append-play",
    }
  }
}

/// Request sent to the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCommand {
  LoadFile { uri: String, mode: LoadMode },
  SetProperty { name: String, value: Value },
  GetProperty { name: String },
  Cycle { name: String },
  /// Relative seek in seconds, either direction.
  Seek { delta: i64 },
  PlaylistRemove { index: usize },
  PlaylistNext,
  PlaylistPrev,
}

impl EngineCommand {
  /// Load a file for playback.
  pub fn loadfile(uri: &str, mode: LoadMode) -> Self {
    Self::LoadFile {
      uri: uri.to_string(),
      mode,
    }
  }

  /// Set pause state.
  pub fn set_pause(paused: bool) -> Self {
    Self::SetProperty {
      name: "pause".to_string(),
      value: paused.into(),
    }
  }

  /// Set volume. Callers clamp to 0-100 first.
  pub fn set_volume(volume: u8) -> Self {
    Self::SetProperty {
      name: "volume".to_string(),
      value: volume.into(),
    }
  }

  /// Get a property value.
  pub fn get_property(name: &str) -> Self {
    Self::GetProperty {
      name: name.to_string(),
    }
  }

  /// Cycle (toggle) a property.
  pub fn cycle(name: &str) -> Self {
    Self::Cycle {
      name: name.to_string(),
    }
  }

  pub fn seek_relative(delta: i64) -> Self {
    Self::Seek { delta }
  }

  pub fn playlist_remove(index: usize) -> Self {
    Self::PlaylistRemove { index }
  }

  /// Wire name of the command, used for logging.
  pub fn name(&self) -> &'static str {
    match self {
      Self::LoadFile { .. } => "loadfile",
      Self::SetProperty { .. } => "set_property",
      Self::GetProperty { .. } => "get_property",
      Self::Cycle { .. } => "cycle",
      Self::Seek { .. } => "seek",
      Self::PlaylistRemove { .. } => "playlist-remove",
      Self::PlaylistNext => "playlist-next",
      Self::PlaylistPrev => "playlist-prev",
    }
  }

  /// Only queries wait for a reply line.
  pub fn expects_reply(&self) -> bool {
    matches!(self, Self::GetProperty { .. })
  }

  /// Positional arguments of the `command` array.
  pub fn args(&self) -> Vec<Value> {
    let name = Value::from(self.name());
    match self {
      Self::LoadFile { uri, mode } => vec![name, uri.as_str().into(), mode.as_str().into()],
      Self::SetProperty { name: prop, value } => vec![name, prop.as_str().into(), value.clone()],
      Self::GetProperty { name: prop } | Self::Cycle { name: prop } => {
        vec![name, prop.as_str().into()]
      }
      Self::Seek { delta } => vec![name, (*delta).into(), "relative".into()],
      Self::PlaylistRemove { index } => vec![name, (*index).into()],
      Self::PlaylistNext | Self::PlaylistPrev => vec![name],
    }
  }

  /// Serialize as one JSON line, without the trailing newline.
  pub fn to_line(&self) -> Result<String, serde_json::Error> {
    serde_json::to_string(&Envelope {
      command: self.args(),
    })
  }
}

#[derive(Serialize)]
struct Envelope {
  command: Vec<Value>,
}

/// Reply to a command.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineReply {
  /// "success" or an error message. Some engines omit it.
  #[serde(default)]
  pub error: Option<String>,
  #[serde(default)]
  pub data: Option<Value>,
}

impl EngineReply {
  pub fn is_success(&self) -> bool {
    self.error.as_deref().map_or(true, |e| e == "success")
  }
}

/// Unsolicited event broadcast on every open connection.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineEvent {
  pub event: String,
  #[serde(default)]
  pub reason: Option<String>,
}

/// A line read from the control socket.
#[derive(Debug, Clone)]
pub enum EngineMessage {
  Reply(EngineReply),
  Event(EngineEvent),
}

impl EngineMessage {
  /// Parse a JSON line from the engine.
  pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
    let value: Value = serde_json::from_str(line)?;
    if value.get("event").is_some() {
      Ok(EngineMessage::Event(serde_json::from_value(value)?))
    } else {
      Ok(EngineMessage::Reply(serde_json::from_value(value)?))
    }
  }
}

/// Typed property values from the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
  Bool(bool),
  Number(f64),
  String(String),
  List(Vec<Value>),
  Null,
}

impl PropertyValue {
  pub fn as_bool(&self) -> Option<bool> {
    match self {
      PropertyValue::Bool(b) => Some(*b),
      _ => None,
    }
  }

  pub fn as_f64(&self) -> Option<f64> {
    match self {
      PropertyValue::Number(n) => Some(*n),
      _ => None,
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      PropertyValue::String(s) => Some(s),
      _ => None,
    }
  }
}

impl From<Value> for PropertyValue {
  fn from(value: Value) -> Self {
    match value {
      Value::Bool(b) => PropertyValue::Bool(b),
      Value::Number(n) => PropertyValue::Number(n.as_f64().unwrap_or(0.0)),
      Value::String(s) => PropertyValue::String(s),
      Value::Array(items) => PropertyValue::List(items),
      Value::Object(_) => PropertyValue::String(value.to_string()),
      Value::Null => PropertyValue::Null,
    }
  }
}

/// One entry of the engine's `playlist` property.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PlaylistEntry {
  pub filename: String,
  #[serde(default)]
  pub current: bool,
  #[serde(default)]
  pub playing: bool,
  #[serde(default)]
  pub title: Option<String>,
}

impl PlaylistEntry {
  /// Decode the `playlist` property, skipping entries that don't parse.
  pub fn parse_list(value: Value) -> Vec<PlaylistEntry> {
    match value {
      Value::Array(items) => items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect(),
      _ => Vec::new(),
    }
  }
}
