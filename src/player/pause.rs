//! Pause/resume, either through the engine protocol or with job-control signals.

use crate::engine::{
  EngineCommand, EngineKind, IpcChannel, SignalDelivery, Supervisor, SuspendSignal,
};

/// What a pause toggle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseToggle {
  /// `cycle pause` was sent; the engine owns the resulting state.
  Cycled,
  /// The engine process was stopped with SIGSTOP.
  Suspended,
  /// The engine process was continued with SIGCONT.
  Resumed,
  /// No live engine to pause.
  NoProcess,
  /// Degraded mode: this platform cannot suspend processes. State unchanged.
  Unsupported,
}

/// Chosen once per controller from the discovered engine kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PauseStrategy {
  /// Atomic `cycle pause` over IPC.
  Ipc,
  /// SIGSTOP/SIGCONT. `paused` is only a cache: the engine cannot be asked.
  Signal { paused: bool },
}

impl PauseStrategy {
  pub fn for_engine(kind: EngineKind) -> Self {
    if kind.supports_ipc() {
      PauseStrategy::Ipc
    } else {
      PauseStrategy::Signal { paused: false }
    }
  }

  /// Cached pause flag. `None` when the engine is the source of truth.
  pub fn cached_paused(&self) -> Option<bool> {
    match self {
      PauseStrategy::Ipc => None,
      PauseStrategy::Signal { paused } => Some(*paused),
    }
  }

  /// Forget the cache, for when the engine process was replaced.
  pub fn reset(&mut self) {
    if let PauseStrategy::Signal { paused } = self {
      *paused = false;
    }
  }

  pub async fn toggle(&mut self, supervisor: &mut Supervisor, ipc: &IpcChannel) -> PauseToggle {
    match self {
      PauseStrategy::Ipc => {
        ipc.send(&EngineCommand::cycle("pause")).await;
        PauseToggle::Cycled
      }
      PauseStrategy::Signal { paused } => {
        let (signal, outcome) = if *paused {
          (SuspendSignal::Continue, PauseToggle::Resumed)
        } else {
          (SuspendSignal::Stop, PauseToggle::Suspended)
        };
        match supervisor.signal(signal) {
          SignalDelivery::Delivered => {
            *paused = !*paused;
            outcome
          }
          SignalDelivery::ProcessGone => {
            // A vanished process counts as stopped, not as an error.
            *paused = false;
            PauseToggle::NoProcess
          }
          SignalDelivery::Unsupported => {
            log::warn!("Pause unavailable: no suspend/continue signals on this platform");
            PauseToggle::Unsupported
          }
        }
      }
    }
  }

  /// Make sure playback is running, used when replaying the current track.
  pub async fn resume(&mut self, supervisor: &mut Supervisor, ipc: &IpcChannel) {
    match *self {
      PauseStrategy::Ipc => {
        ipc.send(&EngineCommand::set_pause(false)).await;
      }
      PauseStrategy::Signal { paused: true } => {
        self.toggle(supervisor, ipc).await;
      }
      PauseStrategy::Signal { paused: false } => {}
    }
  }
}

#[cfg(all(test, unix))]
mod tests {
  use super::*;
  use crate::engine::{EngineBinary, SupervisorTimings};
  use crate::testing::{wait_until, FakeLauncher};
  use std::sync::Arc;
  use std::time::Duration;

  fn setup(kind: EngineKind) -> (Supervisor, IpcChannel, Arc<FakeLauncher>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let launcher = Arc::new(FakeLauncher::new());
    let socket = dir.path().join("engine.sock");
    let supervisor = Supervisor::new(
      Some(EngineBinary::new(kind, "/fake/engine")),
      launcher.clone(),
      socket.clone(),
      Vec::new(),
      SupervisorTimings {
        startup_retries: 50,
        startup_poll: Duration::from_millis(10),
        stop_timeout: Duration::from_millis(50),
      },
    );
    let ipc = IpcChannel::new(socket, Duration::from_millis(500));
    (supervisor, ipc, launcher, dir)
  }

  #[test]
  fn test_strategy_follows_engine_kind() {
    assert_eq!(PauseStrategy::for_engine(EngineKind::Mpv), PauseStrategy::Ipc);
    assert_eq!(
      PauseStrategy::for_engine(EngineKind::Ffplay),
      PauseStrategy::Signal { paused: false }
    );
  }

  #[tokio::test]
  async fn test_ipc_toggle_sends_single_cycle() {
    let (mut sup, ipc, launcher, _dir) = setup(EngineKind::Mpv);
    sup.ensure_live().await.unwrap();
    let engine = launcher.engine().unwrap();

    let mut strategy = PauseStrategy::Ipc;
    assert_eq!(strategy.toggle(&mut sup, &ipc).await, PauseToggle::Cycled);
    assert!(wait_until(Duration::from_secs(2), || engine.paused()).await);
    assert_eq!(engine.control_commands(), vec!["cycle pause"]);
    assert_eq!(engine.commands().len(), 1);
  }

  #[tokio::test]
  async fn test_signal_toggle_alternates() {
    let (mut sup, ipc, launcher, _dir) = setup(EngineKind::Ffplay);
    sup.launch(Some("https://example.com/a")).await.unwrap();

    let mut strategy = PauseStrategy::for_engine(EngineKind::Ffplay);
    assert_eq!(strategy.toggle(&mut sup, &ipc).await, PauseToggle::Suspended);
    assert_eq!(strategy.cached_paused(), Some(true));
    assert_eq!(strategy.toggle(&mut sup, &ipc).await, PauseToggle::Resumed);
    assert_eq!(strategy.cached_paused(), Some(false));
    assert_eq!(
      launcher.signals(),
      vec![SuspendSignal::Stop, SuspendSignal::Continue]
    );
  }

  #[tokio::test]
  async fn test_signal_toggle_on_dead_process() {
    let (mut sup, ipc, launcher, _dir) = setup(EngineKind::Ffplay);
    sup.launch(Some("https://example.com/a")).await.unwrap();

    let mut strategy = PauseStrategy::for_engine(EngineKind::Ffplay);
    strategy.toggle(&mut sup, &ipc).await;
    launcher.crash_all();
    assert_eq!(strategy.toggle(&mut sup, &ipc).await, PauseToggle::NoProcess);
    assert_eq!(strategy.cached_paused(), Some(false));
  }
}
