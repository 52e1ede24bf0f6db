//! In-process stand-ins for the engine used by unit tests.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;

use crate::engine::{
  EngineBinary, EngineKind, EngineProcess, Launcher, ProcessError, SignalDelivery, SuspendSignal,
};

#[derive(Debug)]
struct EngineState {
  received: Vec<Vec<Value>>,
  playlist: Vec<String>,
  current: Option<usize>,
  paused: bool,
  idle: bool,
  volume: f64,
  time_pos: f64,
  duration: f64,
  mute_replies: bool,
  event_before_reply: bool,
}

impl EngineState {
  fn apply(&mut self, args: &[Value]) -> Option<Value> {
    let name = args.first().and_then(Value::as_str).unwrap_or_default();
    let arg = |i: usize| args.get(i).cloned().unwrap_or(Value::Null);

    match name {
      "loadfile" => {
        let uri = arg(1).as_str().unwrap_or_default().to_string();
        if arg(2).as_str() == Some("append-play") {
          self.playlist.push(uri);
          if self.idle || self.current.is_none() {
            self.current = Some(self.playlist.len() - 1);
            self.start_file();
          }
        } else {
          self.playlist = vec![uri];
          self.current = Some(0);
          self.start_file();
        }
        None
      }
      "set_property" => {
        match arg(1).as_str() {
          Some("pause") => self.paused = arg(2).as_bool().unwrap_or(self.paused),
          Some("volume") => self.volume = arg(2).as_f64().unwrap_or(self.volume),
          _ => {}
        }
        None
      }
      "cycle" => {
        if arg(1).as_str() == Some("pause") {
          self.paused = !self.paused;
        }
        None
      }
      "seek" => {
        let delta = arg(1).as_f64().unwrap_or(0.0);
        self.time_pos = (self.time_pos + delta).clamp(0.0, self.duration);
        None
      }
      "playlist-remove" => {
        if let Some(index) = arg(1).as_u64().map(|i| i as usize) {
          if index < self.playlist.len() {
            self.playlist.remove(index);
            self.current = match self.current {
              Some(c) if c == index => None,
              Some(c) if c > index => Some(c - 1),
              other => other,
            };
          }
        }
        None
      }
      "playlist-next" => {
        if let Some(c) = self.current {
          if c + 1 < self.playlist.len() {
            self.current = Some(c + 1);
            self.start_file();
          }
        }
        None
      }
      "playlist-prev" => {
        if let Some(c) = self.current {
          if c > 0 {
            self.current = Some(c - 1);
            self.start_file();
          }
        }
        None
      }
      "get_property" => Some(self.property(arg(1).as_str().unwrap_or_default())),
      _ => None,
    }
  }

  fn start_file(&mut self) {
    self.idle = false;
    self.time_pos = 0.0;
    self.duration = 180.0;
  }

  fn property(&self, name: &str) -> Value {
    match name {
      "pause" => json!(self.paused),
      "idle-active" => json!(self.idle),
      "volume" => json!(self.volume),
      "time-pos" if !self.idle => json!(self.time_pos),
      "duration" if !self.idle => json!(self.duration),
      "percent-pos" if !self.idle && self.duration > 0.0 => {
        json!(self.time_pos / self.duration * 100.0)
      }
      "path" => match self.current.filter(|_| !self.idle) {
        Some(c) => json!(self.playlist[c]),
        None => Value::Null,
      },
      "playlist" => Value::Array(
        self
          .playlist
          .iter()
          .enumerate()
          .map(|(i, f)| {
            let current = Some(i) == self.current;
            json!({ "filename": f, "current": current })
          })
          .collect(),
      ),
      _ => Value::Null,
    }
  }
}

/// A fake engine speaking the JSON IPC protocol on a Unix socket.
pub struct FakeEngine {
  state: Arc<Mutex<EngineState>>,
  cancel: CancellationToken,
}

impl FakeEngine {
  /// Bind `path` and serve connections on the current tokio runtime.
  pub fn serve(path: &Path) -> std::io::Result<Arc<Self>> {
    let std_listener = std::os::unix::net::UnixListener::bind(path)?;
    std_listener.set_nonblocking(true)?;
    let listener = UnixListener::from_std(std_listener)?;

    let engine = Arc::new(Self {
      state: Arc::new(Mutex::new(EngineState {
        received: Vec::new(),
        playlist: Vec::new(),
        current: None,
        paused: false,
        idle: true,
        volume: 100.0,
        time_pos: 0.0,
        duration: 0.0,
        mute_replies: false,
        event_before_reply: false,
      })),
      cancel: CancellationToken::new(),
    });

    let state = engine.state.clone();
    let cancel = engine.cancel.clone();
    tokio::spawn(async move {
      loop {
        tokio::select! {
          _ = cancel.cancelled() => break,
          accepted = listener.accept() => match accepted {
            // One connection at a time keeps commands in arrival order.
            Ok((stream, _)) => Self::handle(stream, state.clone()).await,
            Err(_) => break,
          },
        }
      }
    });

    Ok(engine)
  }

  async fn handle(stream: UnixStream, state: Arc<Mutex<EngineState>>) {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
      return;
    }
    let Ok(request) = serde_json::from_str::<Value>(line.trim()) else {
      return;
    };
    let args = request["command"].as_array().cloned().unwrap_or_default();

    let (reply, mute, event_first) = {
      let mut s = state.lock();
      s.received.push(args.clone());
      let reply = s.apply(&args);
      (reply, s.mute_replies, s.event_before_reply)
    };

    let Some(data) = reply else {
      return;
    };
    if mute {
      tokio::time::sleep(Duration::from_secs(5)).await;
      return;
    }
    if event_first {
      let _ = writer.write_all(b"{\"event\":\"playback-restart\"}\n").await;
    }
    let out = json!({ "data": data, "error": "success", "request_id": 0 });
    let _ = writer.write_all(format!("{}\n", out).as_bytes()).await;
  }

  /// Every command array received so far.
  pub fn commands(&self) -> Vec<Vec<Value>> {
    self.state.lock().received.clone()
  }

  /// Commands rendered as space-joined strings, queries excluded.
  pub fn control_commands(&self) -> Vec<String> {
    self
      .commands()
      .into_iter()
      .filter(|c| c.first().and_then(Value::as_str) != Some("get_property"))
      .map(|c| {
        c.iter()
          .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
          })
          .collect::<Vec<_>>()
          .join(" ")
      })
      .collect()
  }

  pub fn playlist(&self) -> Vec<String> {
    self.state.lock().playlist.clone()
  }

  pub fn current(&self) -> Option<String> {
    let s = self.state.lock();
    s.current.map(|c| s.playlist[c].clone())
  }

  pub fn paused(&self) -> bool {
    self.state.lock().paused
  }

  pub fn volume(&self) -> f64 {
    self.state.lock().volume
  }

  /// Simulate the end of the last track: the engine goes idle.
  pub fn finish_playlist(&self) {
    let mut s = self.state.lock();
    s.idle = true;
    s.current = None;
  }

  /// Simulate the engine moving to the next playlist entry on its own.
  pub fn advance(&self) {
    self.state.lock().apply(&[json!("playlist-next")]);
  }

  /// Drop an entry behind the controller's back, as if the engine lost it.
  pub fn forget_playlist_entry(&self, uri: &str) {
    self.state.lock().playlist.retain(|f| f != uri);
  }

  pub fn set_mute_replies(&self, mute: bool) {
    self.state.lock().mute_replies = mute;
  }

  pub fn emit_event_before_replies(&self, on: bool) {
    self.state.lock().event_before_reply = on;
  }

  pub fn shutdown(&self) {
    self.cancel.cancel();
  }
}

impl Drop for FakeEngine {
  fn drop(&mut self) {
    self.cancel.cancel();
  }
}

/// Shared bookkeeping between the launcher and the processes it hands out.
#[derive(Default)]
struct LaunchLog {
  launches: Mutex<Vec<Vec<String>>>,
  engines: Mutex<Vec<Arc<FakeEngine>>>,
  alive: Mutex<Vec<Arc<AtomicBool>>>,
  signals: Mutex<Vec<SuspendSignal>>,
  kills: AtomicUsize,
  terminates: AtomicUsize,
  hang_on_terminate: AtomicBool,
  fail_spawn: AtomicBool,
}

/// A `Launcher` that starts a `FakeEngine` instead of a real process.
#[derive(Default)]
pub struct FakeLauncher {
  log: Arc<LaunchLog>,
}

impl FakeLauncher {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn hang_on_terminate(&self, hang: bool) {
    self.log.hang_on_terminate.store(hang, Ordering::SeqCst);
  }

  pub fn fail_spawn(&self, fail: bool) {
    self.log.fail_spawn.store(fail, Ordering::SeqCst);
  }

  pub fn launch_count(&self) -> usize {
    self.log.launches.lock().len()
  }

  pub fn launches(&self) -> Vec<Vec<String>> {
    self.log.launches.lock().clone()
  }

  pub fn kill_count(&self) -> usize {
    self.log.kills.load(Ordering::SeqCst)
  }

  pub fn terminate_count(&self) -> usize {
    self.log.terminates.load(Ordering::SeqCst)
  }

  pub fn signals(&self) -> Vec<SuspendSignal> {
    self.log.signals.lock().clone()
  }

  /// The most recently started fake engine.
  pub fn engine(&self) -> Option<Arc<FakeEngine>> {
    self.log.engines.lock().last().cloned()
  }

  /// Mark every launched process as dead, as if it crashed or exited.
  pub fn crash_all(&self) {
    for alive in self.log.alive.lock().iter() {
      alive.store(false, Ordering::SeqCst);
    }
    for engine in self.log.engines.lock().iter() {
      engine.shutdown();
    }
  }
}

impl Launcher for FakeLauncher {
  fn launch(
    &self,
    binary: &EngineBinary,
    args: &[String],
  ) -> Result<Box<dyn EngineProcess>, ProcessError> {
    if self.log.fail_spawn.load(Ordering::SeqCst) {
      return Err(ProcessError::SpawnFailed(std::io::Error::new(
        std::io::ErrorKind::PermissionDenied,
        "permission denied",
      )));
    }
    self.log.launches.lock().push(args.to_vec());

    let engine = match binary.kind {
      EngineKind::Mpv => {
        let socket = args
          .iter()
          .find_map(|a| a.strip_prefix("--input-ipc-server="))
          .map(PathBuf::from);
        match socket {
          Some(path) => Some(FakeEngine::serve(&path)?),
          None => None,
        }
      }
      EngineKind::Ffplay => None,
    };
    if let Some(engine) = &engine {
      self.log.engines.lock().push(engine.clone());
    }

    let alive = Arc::new(AtomicBool::new(true));
    self.log.alive.lock().push(alive.clone());

    Ok(Box::new(FakeProcess {
      alive,
      engine,
      log: self.log.clone(),
      suspended: false,
      term_pending: false,
    }))
  }
}

struct FakeProcess {
  alive: Arc<AtomicBool>,
  engine: Option<Arc<FakeEngine>>,
  log: Arc<LaunchLog>,
  /// Stopped processes hold SIGTERM until continued.
  suspended: bool,
  term_pending: bool,
}

impl FakeProcess {
  fn exit(&self) {
    self.alive.store(false, Ordering::SeqCst);
    if let Some(engine) = &self.engine {
      engine.shutdown();
    }
  }
}

impl EngineProcess for FakeProcess {
  fn id(&self) -> Option<u32> {
    Some(4242)
  }

  fn is_alive(&mut self) -> bool {
    self.alive.load(Ordering::SeqCst)
  }

  fn terminate(&mut self) -> std::io::Result<()> {
    self.log.terminates.fetch_add(1, Ordering::SeqCst);
    if self.suspended {
      self.term_pending = true;
    } else if !self.log.hang_on_terminate.load(Ordering::SeqCst) {
      self.exit();
    }
    Ok(())
  }

  fn kill(&mut self) -> std::io::Result<()> {
    self.log.kills.fetch_add(1, Ordering::SeqCst);
    self.exit();
    Ok(())
  }

  fn wait_timeout(&mut self, bound: Duration) -> std::io::Result<bool> {
    if self.alive.load(Ordering::SeqCst) {
      std::thread::sleep(bound);
    }
    Ok(!self.alive.load(Ordering::SeqCst))
  }

  fn signal(&mut self, signal: SuspendSignal) -> SignalDelivery {
    if !self.alive.load(Ordering::SeqCst) {
      return SignalDelivery::ProcessGone;
    }
    self.log.signals.lock().push(signal);
    self.suspended = signal == SuspendSignal::Stop;
    let hang = self.log.hang_on_terminate.load(Ordering::SeqCst);
    if !self.suspended && std::mem::take(&mut self.term_pending) && !hang {
      self.exit();
    }
    SignalDelivery::Delivered
  }
}

/// Poll `cond` until it holds or `limit` passes.
pub async fn wait_until(limit: Duration, mut cond: impl FnMut() -> bool) -> bool {
  let deadline = tokio::time::Instant::now() + limit;
  while tokio::time::Instant::now() < deadline {
    if cond() {
      return true;
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
  }
  cond()
}
