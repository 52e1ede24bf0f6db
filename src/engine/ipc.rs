//! Short-lived IPC exchanges with the engine.
//!
//! Each command opens its own connection to the control socket, writes one
//! line, reads at most one reply and closes. Every failure collapses to
//! "no data" so a dead or busy engine never stalls the caller.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use super::protocol::{EngineCommand, EngineMessage, PlaylistEntry, PropertyValue};

#[derive(Error, Debug)]
enum IpcError {
  #[error("Connection failed: {0}")]
  ConnectionFailed(std::io::Error),
  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),
  #[error("Timed out")]
  Timeout,
  #[error("Connection closed before reply")]
  Closed,
  #[error("Malformed message: {0}")]
  Json(#[from] serde_json::Error),
  #[error("Engine error: {0}")]
  Engine(String),
}

/// Handle to the engine control socket.
#[derive(Debug, Clone)]
pub struct IpcChannel {
  path: PathBuf,
  timeout: Duration,
}

impl IpcChannel {
  pub fn new(path: impl Into<PathBuf>, timeout: Duration) -> Self {
    Self {
      path: path.into(),
      timeout,
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// Send a command. Returns the reply's `data` for queries, `None` otherwise
  /// or on any failure.
  pub async fn send(&self, command: &EngineCommand) -> Option<Value> {
    match self.exchange(command).await {
      Ok(data) => data,
      Err(e) => {
        log::debug!("IPC {} dropped: {}", command.name(), e);
        None
      }
    }
  }

  /// Query a property as a typed value.
  pub async fn get_property(&self, name: &str) -> Option<PropertyValue> {
    self
      .send(&EngineCommand::get_property(name))
      .await
      .map(PropertyValue::from)
  }

  /// Query the engine playlist. `None` when the engine did not answer.
  pub async fn playlist(&self) -> Option<Vec<PlaylistEntry>> {
    self
      .send(&EngineCommand::get_property("playlist"))
      .await
      .map(PlaylistEntry::parse_list)
  }

  async fn exchange(&self, command: &EngineCommand) -> Result<Option<Value>, IpcError> {
    let line = command.to_line()?;
    let stream = self.connect().await?;
    let (reader, writer) = tokio::io::split(stream);
    self.roundtrip(reader, writer, line, command.expects_reply()).await
  }

  #[cfg(unix)]
  async fn connect(&self) -> Result<tokio::net::UnixStream, IpcError> {
    use tokio::net::UnixStream;

    match tokio::time::timeout(self.timeout, UnixStream::connect(&self.path)).await {
      Ok(Ok(stream)) => Ok(stream),
      Ok(Err(e)) => Err(IpcError::ConnectionFailed(e)),
      Err(_) => Err(IpcError::Timeout),
    }
  }

  #[cfg(windows)]
  async fn connect(&self) -> Result<tokio::net::windows::named_pipe::NamedPipeClient, IpcError> {
    use tokio::net::windows::named_pipe::ClientOptions;

    ClientOptions::new()
      .open(&self.path)
      .map_err(IpcError::ConnectionFailed)
  }

  async fn roundtrip<R, W>(
    &self,
    reader: R,
    mut writer: W,
    line: String,
    expects_reply: bool,
  ) -> Result<Option<Value>, IpcError>
  where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
  {
    let write = async {
      writer.write_all(line.as_bytes()).await?;
      writer.write_all(b"\n").await?;
      writer.flush().await
    };
    tokio::time::timeout(self.timeout, write)
      .await
      .map_err(|_| IpcError::Timeout)??;

    if !expects_reply {
      return Ok(None);
    }

    tokio::time::timeout(self.timeout, Self::read_reply(reader))
      .await
      .map_err(|_| IpcError::Timeout)?
  }

  /// Skip broadcast events until the reply line shows up.
  async fn read_reply<R: AsyncRead + Unpin>(reader: R) -> Result<Option<Value>, IpcError> {
    let mut buf_reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
      line.clear();
      if buf_reader.read_line(&mut line).await? == 0 {
        return Err(IpcError::Closed);
      }
      let trimmed = line.trim();
      if trimmed.is_empty() {
        continue;
      }

      match EngineMessage::parse(trimmed)? {
        EngineMessage::Reply(reply) if reply.is_success() => return Ok(reply.data),
        EngineMessage::Reply(reply) => {
          return Err(IpcError::Engine(reply.error.unwrap_or_default()));
        }
        EngineMessage::Event(_) => continue,
      }
    }
  }
}
