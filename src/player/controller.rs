//! Playback controller - the public surface over the supervised engine.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_channel::{Receiver, Sender};
use parking_lot::RwLock;

use super::error::PlayerError;
use super::pause::{PauseStrategy, PauseToggle};
use super::queue::PlayQueue;
use super::status::{PlaybackState, PlayerStatus, DEFAULT_VOLUME};
use super::track::{validate_uri, Track};
use crate::config::PlayerConfig;
use crate::engine::{
  discover_engine, EngineBinary, EngineCommand, EngineKind, IpcChannel, Launcher, LoadMode,
  PlaylistEntry, ShutdownOutcome, Supervisor, SupervisorTimings, SystemLauncher,
};

const HISTORY_LIMIT: usize = 50;
const EVENT_BUFFER: usize = 64;

/// Notifications for a presentation layer.
#[derive(Debug, Clone)]
pub enum PlayerEvent {
  TrackStarted(Arc<Track>),
  /// Queue length after a change.
  QueueChanged(usize),
  Stopped,
  Status { status: PlayerStatus, line: String },
}

/// State only touched while holding the controller lock.
struct Engine {
  supervisor: Supervisor,
  pause: PauseStrategy,
  history: Vec<Arc<Track>>,
}

struct Inner {
  engine: tokio::sync::Mutex<Engine>,
  ipc: IpcChannel,
  kind: Option<EngineKind>,
  /// Written only under `engine`; readable without it.
  queue: RwLock<PlayQueue>,
  current: RwLock<Option<Arc<Track>>>,
  last_status: RwLock<PlayerStatus>,
  /// Bumped whenever the current track changes or playback stops.
  generation: AtomicU64,
  poll_interval: Duration,
  event_tx: Sender<PlayerEvent>,
  event_rx: Receiver<PlayerEvent>,
}

/// Serializes play/enqueue/remove/pause/stop/seek/volume on one lock.
///
/// One controller exclusively owns its engine process and control socket;
/// two controllers must not share a socket path.
#[derive(Clone)]
pub struct PlaybackController {
  inner: Arc<Inner>,
}

impl PlaybackController {
  /// Create a controller, locating the engine binary once.
  pub fn new(config: &PlayerConfig) -> Self {
    let binary = discover_engine(config.engine_path.as_deref().map(Path::new));
    Self::with_launcher(config, binary, Arc::new(SystemLauncher))
  }

  /// Create a controller with an explicit engine and launcher.
  pub fn with_launcher(
    config: &PlayerConfig,
    binary: Option<EngineBinary>,
    launcher: Arc<dyn Launcher>,
  ) -> Self {
    let kind = binary.as_ref().map(|b| b.kind);
    if let Some(b) = &binary {
      log::info!("Using {:?} engine at {:?}", b.kind, b.path);
    }

    let socket_path = config.resolve_socket_path();
    let supervisor = Supervisor::new(
      binary,
      launcher,
      socket_path.clone(),
      config.engine_args.clone(),
      SupervisorTimings {
        startup_retries: config.startup_retries,
        startup_poll: Duration::from_millis(config.startup_poll_ms),
        stop_timeout: Duration::from_millis(config.stop_timeout_ms),
      },
    );
    let pause = kind
      .map(PauseStrategy::for_engine)
      .unwrap_or(PauseStrategy::Ipc);
    let (event_tx, event_rx) = async_channel::bounded(EVENT_BUFFER);

    Self {
      inner: Arc::new(Inner {
        engine: tokio::sync::Mutex::new(Engine {
          supervisor,
          pause,
          history: Vec::new(),
        }),
        ipc: IpcChannel::new(socket_path, config.ipc_timeout()),
        kind,
        queue: RwLock::new(PlayQueue::new()),
        current: RwLock::new(None),
        last_status: RwLock::new(PlayerStatus::default()),
        generation: AtomicU64::new(0),
        poll_interval: config.poll_interval(),
        event_tx,
        event_rx,
      }),
    }
  }

  pub fn engine_kind(&self) -> Option<EngineKind> {
    self.inner.kind
  }

  /// Whether the engine takes commands over the control socket.
  pub fn supports_ipc(&self) -> bool {
    self.inner.kind.is_some_and(EngineKind::supports_ipc)
  }

  pub fn socket_path(&self) -> &Path {
    self.inner.ipc.path()
  }

  pub fn poll_interval(&self) -> Duration {
    self.inner.poll_interval
  }

  /// Receiver for player events. Events are dropped when nobody keeps up.
  pub fn events(&self) -> Receiver<PlayerEvent> {
    self.inner.event_rx.clone()
  }

  pub fn current_track(&self) -> Option<Arc<Track>> {
    self.inner.current.read().clone()
  }

  pub fn queue(&self) -> Vec<Arc<Track>> {
    self.inner.queue.read().to_vec()
  }

  pub fn queue_len(&self) -> usize {
    self.inner.queue.read().len()
  }

  /// Last status seen by `get_status`.
  pub fn last_status(&self) -> PlayerStatus {
    self.inner.last_status.read().clone()
  }

  /// Display line for the last status and current track.
  pub fn status_line(&self) -> String {
    let track = self.current_track();
    self.last_status().display_line(track.as_deref())
  }

  /// Play a stream URI, replacing whatever is playing.
  pub async fn play(&self, uri: &str) -> Result<(), PlayerError> {
    validate_uri(uri)?;
    self.play_track(Arc::new(Track::from_uri(uri))).await
  }

  /// Play a track. Replaying the current track resumes it instead of reloading.
  pub async fn play_track(&self, track: Arc<Track>) -> Result<(), PlayerError> {
    validate_uri(track.uri())?;
    self.require_engine()?;

    let mut guard = self.inner.engine.lock().await;
    let engine = &mut *guard;

    if self.current_uri().as_deref() == Some(track.uri()) && engine.supervisor.is_live() {
      log::info!("Already playing {}, resuming", track.uri());
      engine.pause.resume(&mut engine.supervisor, &self.inner.ipc).await;
      return Ok(());
    }

    self.start_locked(engine, track, true).await
  }

  /// Append a URI to the queue.
  pub async fn enqueue(&self, uri: &str) -> Result<(), PlayerError> {
    validate_uri(uri)?;
    self.enqueue_track(Arc::new(Track::from_uri(uri))).await
  }

  /// Append a track to the queue and the engine playlist. With nothing
  /// playing it starts right away, as `append-play` does.
  pub async fn enqueue_track(&self, track: Arc<Track>) -> Result<(), PlayerError> {
    validate_uri(track.uri())?;
    self.require_engine()?;

    let mut guard = self.inner.engine.lock().await;
    let engine = &mut *guard;
    let idle = self.inner.current.read().is_none();

    match self.inner.kind {
      Some(EngineKind::Mpv) => {
        if engine.supervisor.ensure_live().await? {
          engine.pause.reset();
        }
        self
          .inner
          .ipc
          .send(&EngineCommand::loadfile(track.uri(), LoadMode::AppendPlay))
          .await;
        if idle {
          self.set_current(engine, track, true);
          return Ok(());
        }
      }
      Some(EngineKind::Ffplay) => {
        if idle {
          return self.start_locked(engine, track, true).await;
        }
      }
      None => return Err(PlayerError::NoEngineAvailable),
    }

    log::info!("Queued {}", track.uri());
    let len = {
      let mut queue = self.inner.queue.write();
      queue.push_back(track);
      queue.len()
    };
    self.emit(PlayerEvent::QueueChanged(len));
    Ok(())
  }

  /// Remove a queued URI. The engine playlist decides: the local queue only
  /// changes after the engine confirmed the removal.
  pub async fn remove_from_queue(&self, uri: &str) -> bool {
    let _guard = self.inner.engine.lock().await;

    let removed = match self.inner.kind {
      Some(EngineKind::Mpv) => self.remove_from_engine_playlist(uri).await,
      Some(EngineKind::Ffplay) => {
        let queue = self.inner.queue.read();
        queue.contains_uri(uri)
      }
      None => false,
    };
    if !removed {
      return false;
    }

    let len = {
      let mut queue = self.inner.queue.write();
      queue.remove_uri(uri);
      queue.len()
    };
    self.emit(PlayerEvent::QueueChanged(len));
    true
  }

  async fn remove_from_engine_playlist(&self, uri: &str) -> bool {
    let ipc = &self.inner.ipc;
    let count = |entries: &[PlaylistEntry]| entries.iter().filter(|e| e.filename == uri).count();

    let Some(before) = ipc.playlist().await else {
      log::debug!("Engine playlist unavailable, not removing {}", uri);
      return false;
    };
    let Some(index) = before.iter().position(|e| e.filename == uri && !e.current) else {
      log::info!("{} is not in the engine playlist", uri);
      return false;
    };

    ipc.send(&EngineCommand::playlist_remove(index)).await;

    match ipc.playlist().await {
      Some(after) if count(&after) < count(&before) => true,
      _ => {
        log::warn!("Engine did not confirm removal of {}", uri);
        false
      }
    }
  }

  /// Pause or resume through the active pause strategy.
  pub async fn toggle_pause(&self) -> Result<PauseToggle, PlayerError> {
    self.require_engine()?;
    let mut guard = self.inner.engine.lock().await;
    let engine = &mut *guard;
    Ok(engine.pause.toggle(&mut engine.supervisor, &self.inner.ipc).await)
  }

  /// Shut the engine down. The queue is cleared with it, since the engine
  /// playlist it mirrored is gone.
  pub async fn stop(&self) -> ShutdownOutcome {
    let mut guard = self.inner.engine.lock().await;
    let engine = &mut *guard;

    let outcome = engine.supervisor.shutdown().await;
    engine.pause.reset();
    self.inner.generation.fetch_add(1, Ordering::SeqCst);
    if let Some(track) = self.inner.current.write().take() {
      push_history(&mut engine.history, track);
    }
    self.inner.queue.write().clear();
    *self.inner.last_status.write() = PlayerStatus::default();

    self.emit(PlayerEvent::QueueChanged(0));
    self.emit(PlayerEvent::Stopped);
    outcome
  }

  /// Relative seek in seconds. Returns `false` on engines without IPC.
  pub async fn seek(&self, delta_seconds: i64) -> Result<bool, PlayerError> {
    self.send_control(EngineCommand::seek_relative(delta_seconds)).await
  }

  /// Set volume, clamped to 0-100. Returns `false` on engines without IPC.
  pub async fn set_volume(&self, volume: i64) -> Result<bool, PlayerError> {
    let volume = volume.clamp(0, 100) as u8;
    self.send_control(EngineCommand::set_volume(volume)).await
  }

  /// Current engine volume, if the engine can report it.
  pub async fn get_volume(&self) -> Option<u8> {
    if !self.supports_ipc() {
      return None;
    }
    self
      .inner
      .ipc
      .get_property("volume")
      .await
      .and_then(|v| v.as_f64())
      .map(clamp_volume)
  }

  async fn send_control(&self, command: EngineCommand) -> Result<bool, PlayerError> {
    self.require_engine()?;
    if !self.supports_ipc() {
      log::debug!("{} unsupported on this engine", command.name());
      return Ok(false);
    }
    let _guard = self.inner.engine.lock().await;
    self.inner.ipc.send(&command).await;
    Ok(true)
  }

  /// Pop the queue head and play it. `None` when the queue is empty.
  pub async fn play_next(&self) -> Result<Option<Arc<Track>>, PlayerError> {
    self.require_engine()?;
    let mut guard = self.inner.engine.lock().await;
    self.advance_locked(&mut guard).await
  }

  /// Auto-advance entry point: skipped when playback changed since `generation`.
  pub(crate) async fn advance_from(
    &self,
    generation: u64,
  ) -> Result<Option<Arc<Track>>, PlayerError> {
    let mut guard = self.inner.engine.lock().await;
    if self.generation() != generation {
      log::debug!("Playback changed under the poller, not advancing");
      return Ok(None);
    }
    self.advance_locked(&mut guard).await
  }

  async fn advance_locked(&self, engine: &mut Engine) -> Result<Option<Arc<Track>>, PlayerError> {
    let Some(next) = self.inner.queue.write().pop_front() else {
      return Ok(None);
    };
    self.emit(PlayerEvent::QueueChanged(self.queue_len()));

    log::info!("Advancing to {}", next.uri());
    if let Err(e) = self.start_locked(engine, next.clone(), true).await {
      self.inner.queue.write().push_front(next);
      return Err(e);
    }
    Ok(Some(next))
  }

  /// Replay the previously played track, putting the current one back at
  /// the head of the queue.
  pub async fn previous(&self) -> Result<Option<Arc<Track>>, PlayerError> {
    self.require_engine()?;
    let mut guard = self.inner.engine.lock().await;
    let engine = &mut *guard;

    let Some(prev) = engine.history.pop() else {
      return Ok(None);
    };
    // Queued first so a mirrored engine playlist picks it up again.
    let current = self.current_track();
    if let Some(current) = &current {
      self.inner.queue.write().push_front(current.clone());
    }
    if let Err(e) = self.start_locked(engine, prev.clone(), false).await {
      if current.is_some() {
        self.inner.queue.write().pop_front();
      }
      engine.history.push(prev);
      return Err(e);
    }
    Ok(Some(prev))
  }

  /// Snapshot of the engine state. Missing replies degrade to defaults.
  pub async fn get_status(&self) -> PlayerStatus {
    let status = match self.inner.kind {
      Some(EngineKind::Mpv) => self.probe_ipc_status().await,
      Some(EngineKind::Ffplay) => self.probe_process_status(),
      None => PlayerStatus::default(),
    };
    *self.inner.last_status.write() = status.clone();
    status
  }

  async fn probe_ipc_status(&self) -> PlayerStatus {
    let ipc = &self.inner.ipc;
    let Some(idle) = ipc.get_property("idle-active").await.and_then(|v| v.as_bool()) else {
      return PlayerStatus::default();
    };

    let volume = ipc
      .get_property("volume")
      .await
      .and_then(|v| v.as_f64())
      .map_or(DEFAULT_VOLUME, clamp_volume);
    if idle {
      return PlayerStatus {
        volume,
        reachable: true,
        ..PlayerStatus::default()
      };
    }

    let paused = ipc
      .get_property("pause")
      .await
      .and_then(|v| v.as_bool())
      .unwrap_or(false);
    let duration = ipc
      .get_property("duration")
      .await
      .and_then(|v| v.as_f64())
      .unwrap_or(0.0);
    let position = match ipc.get_property("time-pos").await.and_then(|v| v.as_f64()) {
      Some(pos) => pos,
      None => ipc
        .get_property("percent-pos")
        .await
        .and_then(|v| v.as_f64())
        .map_or(0.0, |pct| pct / 100.0 * duration),
    };
    let path = ipc
      .get_property("path")
      .await
      .and_then(|v| v.as_str().map(str::to_string));

    PlayerStatus {
      state: if paused {
        PlaybackState::Paused
      } else {
        PlaybackState::Playing
      },
      position,
      duration,
      volume,
      path,
      reachable: true,
    }
  }

  /// Signal-only engines can't be asked; the process itself is the status.
  fn probe_process_status(&self) -> PlayerStatus {
    let Ok(mut guard) = self.inner.engine.try_lock() else {
      return self.last_status();
    };
    let engine = &mut *guard;

    let state = if !engine.supervisor.is_live() {
      PlaybackState::Stopped
    } else if engine.pause.cached_paused() == Some(true) {
      PlaybackState::Paused
    } else {
      PlaybackState::Playing
    };
    PlayerStatus {
      state,
      path: (state != PlaybackState::Stopped)
        .then(|| self.current_uri())
        .flatten(),
      reachable: true,
      ..PlayerStatus::default()
    }
  }

  /// Adopt a track the engine moved to on its own from its playlist.
  pub(crate) async fn follow_engine(&self, path: &str) {
    let mut guard = self.inner.engine.lock().await;
    if self.current_uri().as_deref() == Some(path) {
      return;
    }
    let head_matches = self
      .inner
      .queue
      .read()
      .front()
      .is_some_and(|t| t.uri() == path);
    if !head_matches {
      return;
    }

    let Some(track) = self.inner.queue.write().pop_front() else {
      return;
    };
    log::info!("Engine moved on to {}", path);
    self.emit(PlayerEvent::QueueChanged(self.queue_len()));
    self.set_current(&mut guard, track, true);
  }

  /// Playback ran out with nothing queued.
  pub(crate) async fn finish_from(&self, generation: u64) {
    let mut guard = self.inner.engine.lock().await;
    if self.generation() != generation || !self.inner.queue.read().is_empty() {
      return;
    }
    self.inner.generation.fetch_add(1, Ordering::SeqCst);
    if let Some(track) = self.inner.current.write().take() {
      log::info!("Finished {}", track.uri());
      push_history(&mut guard.history, track);
    }
    self.emit(PlayerEvent::Stopped);
  }

  pub(crate) fn generation(&self) -> u64 {
    self.inner.generation.load(Ordering::SeqCst)
  }

  pub(crate) fn emit(&self, event: PlayerEvent) {
    // A full buffer means nobody is listening closely; drop rather than block.
    let _ = self.inner.event_tx.try_send(event);
  }

  async fn start_locked(
    &self,
    engine: &mut Engine,
    track: Arc<Track>,
    remember_current: bool,
  ) -> Result<(), PlayerError> {
    let ipc = &self.inner.ipc;
    match self.inner.kind {
      Some(EngineKind::Mpv) => {
        engine.supervisor.ensure_live().await?;
        ipc
          .send(&EngineCommand::loadfile(track.uri(), LoadMode::Replace))
          .await;
        ipc.send(&EngineCommand::set_pause(false)).await;

        // `replace` wiped the engine playlist; mirror the queue back into it.
        let pending = self.queue();
        for queued in pending {
          ipc
            .send(&EngineCommand::loadfile(queued.uri(), LoadMode::AppendPlay))
            .await;
        }
      }
      Some(EngineKind::Ffplay) => {
        engine.supervisor.shutdown().await;
        engine.supervisor.launch(Some(track.uri())).await?;
      }
      None => return Err(PlayerError::NoEngineAvailable),
    }

    engine.pause.reset();
    log::info!("Playing {}", track.uri());
    self.set_current(engine, track, remember_current);
    Ok(())
  }

  fn set_current(&self, engine: &mut Engine, track: Arc<Track>, remember_current: bool) {
    self.inner.generation.fetch_add(1, Ordering::SeqCst);
    let previous = self.inner.current.write().replace(track.clone());
    if let (Some(previous), true) = (previous, remember_current) {
      push_history(&mut engine.history, previous);
    }
    self.emit(PlayerEvent::TrackStarted(track));
  }

  fn current_uri(&self) -> Option<String> {
    self
      .inner
      .current
      .read()
      .as_ref()
      .map(|t| t.uri().to_string())
  }

  fn require_engine(&self) -> Result<(), PlayerError> {
    match self.inner.kind {
      Some(_) => Ok(()),
      None => Err(PlayerError::NoEngineAvailable),
    }
  }
}

fn push_history(history: &mut Vec<Arc<Track>>, track: Arc<Track>) {
  history.push(track);
  if history.len() > HISTORY_LIMIT {
    history.remove(0);
  }
}

fn clamp_volume(volume: f64) -> u8 {
  volume.round().clamp(0.0, 100.0) as u8
}
