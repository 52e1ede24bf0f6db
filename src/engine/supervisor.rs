//! Keeps exactly one engine process alive and tears it down on request.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::process::{
  EngineBinary, EngineKind, EngineProcess, Launcher, ProcessError, SignalDelivery, SuspendSignal,
};

/// Which path `shutdown` took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
  /// There was no live process.
  NotRunning,
  /// The process exited within the bound after the termination request.
  Graceful,
  /// The bound was exceeded and the process was force-killed.
  Killed,
}

/// Timing knobs for the supervisor.
#[derive(Debug, Clone, Copy)]
pub struct SupervisorTimings {
  pub startup_retries: u32,
  pub startup_poll: Duration,
  pub stop_timeout: Duration,
}

/// Owns the engine process handle and its control socket path.
pub struct Supervisor {
  binary: Option<EngineBinary>,
  launcher: Arc<dyn Launcher>,
  socket_path: PathBuf,
  extra_args: Vec<String>,
  timings: SupervisorTimings,
  process: Option<Box<dyn EngineProcess>>,
  /// Last job-control signal delivered was SIGSTOP.
  suspended: bool,
}

impl Supervisor {
  pub fn new(
    binary: Option<EngineBinary>,
    launcher: Arc<dyn Launcher>,
    socket_path: PathBuf,
    extra_args: Vec<String>,
    timings: SupervisorTimings,
  ) -> Self {
    if binary.is_none() {
      log::error!("No audio engine available, playback is disabled");
    }
    Self {
      binary,
      launcher,
      socket_path,
      extra_args,
      timings,
      process: None,
      suspended: false,
    }
  }

  pub fn kind(&self) -> Option<EngineKind> {
    self.binary.as_ref().map(|b| b.kind)
  }

  pub fn socket_path(&self) -> &Path {
    &self.socket_path
  }

  pub fn has_process(&self) -> bool {
    self.process.is_some()
  }

  /// Probe the process. A dead one is dropped here, so death is noticed lazily.
  pub fn is_live(&mut self) -> bool {
    let Some(process) = self.process.as_mut() else {
      return false;
    };
    if process.is_alive() {
      return true;
    }

    log::warn!("Engine process (pid: {:?}) has exited", process.id());
    self.process = None;
    self.suspended = false;
    self.remove_socket();
    false
  }

  /// Make sure an engine is running. Returns `true` when a new one was spawned.
  pub async fn ensure_live(&mut self) -> Result<bool, ProcessError> {
    if self.is_live() {
      return Ok(false);
    }
    self.launch(None).await?;
    Ok(true)
  }

  /// Start a fresh engine, handing signal-only engines their stream directly.
  pub async fn launch(&mut self, initial_uri: Option<&str>) -> Result<(), ProcessError> {
    let binary = self.binary.clone().ok_or(ProcessError::NotFound)?;

    self.remove_socket();
    let args = binary
      .kind
      .launch_args(&self.socket_path, initial_uri, &self.extra_args);
    let process = self.launcher.launch(&binary, &args)?;
    log::info!("Engine started (pid: {:?})", process.id());
    self.process = Some(process);
    self.suspended = false;

    if binary.kind.supports_ipc() {
      wait_for_socket(&self.socket_path, self.timings).await;
    }
    Ok(())
  }

  /// Terminate the engine, force-killing it past the stop bound. The handle
  /// and the socket file are gone afterwards whatever happened.
  pub async fn shutdown(&mut self) -> ShutdownOutcome {
    let suspended = std::mem::take(&mut self.suspended);
    let outcome = match self.process.take() {
      Some(process) => {
        let bound = self.timings.stop_timeout;
        let stop = move || terminate_process(process, bound, suspended);
        match tokio::task::spawn_blocking(stop).await {
          Ok(outcome) => outcome,
          Err(e) => {
            log::error!("spawn_blocking panicked during engine shutdown: {}", e);
            ShutdownOutcome::Killed
          }
        }
      }
      None => ShutdownOutcome::NotRunning,
    };

    self.remove_socket();
    log::info!("Engine shut down: {:?}", outcome);
    outcome
  }

  /// Send a job-control signal, checking liveness right before.
  pub fn signal(&mut self, signal: SuspendSignal) -> SignalDelivery {
    if !self.is_live() {
      return SignalDelivery::ProcessGone;
    }
    let delivery = match self.process.as_mut() {
      Some(process) => process.signal(signal),
      None => SignalDelivery::ProcessGone,
    };
    if delivery == SignalDelivery::Delivered {
      self.suspended = signal == SuspendSignal::Stop;
    }
    delivery
  }

  fn remove_socket(&self) {
    #[cfg(not(windows))]
    {
      let _ = std::fs::remove_file(&self.socket_path);
    }
    // Windows named pipes are cleaned up automatically
  }
}

/// Must not borrow the supervisor across the sleep: `dyn EngineProcess` is not `Sync`.
async fn wait_for_socket(socket_path: &Path, timings: SupervisorTimings) {
  for _ in 0..timings.startup_retries {
    if socket_path.exists() {
      log::debug!("Control socket ready at {:?}", socket_path);
      return;
    }
    tokio::time::sleep(timings.startup_poll).await;
  }
  // Leave the process running, it may still come up.
  log::warn!("Control socket {:?} did not appear, continuing anyway", socket_path);
}

fn terminate_process(
  mut process: Box<dyn EngineProcess>,
  bound: Duration,
  suspended: bool,
) -> ShutdownOutcome {
  let pid = process.id();
  if !process.is_alive() {
    return ShutdownOutcome::NotRunning;
  }

  // A stopped process leaves SIGTERM pending until it runs again.
  if suspended {
    process.signal(SuspendSignal::Continue);
  }

  if let Err(e) = process.terminate() {
    log::warn!("Termination request to pid {:?} failed: {}", pid, e);
  }
  match process.wait_timeout(bound) {
    Ok(true) => return ShutdownOutcome::Graceful,
    Ok(false) => log::warn!("Engine pid {:?} ignored termination, killing", pid),
    Err(e) => log::error!("wait() failed for pid {:?}: {}", pid, e),
  }

  if let Err(e) = process.kill() {
    log::error!("kill() failed for pid {:?}: {}", pid, e);
  }
  if let Err(e) = process.wait_timeout(bound) {
    log::error!("wait() after kill failed for pid {:?}: {}", pid, e);
  }
  ShutdownOutcome::Killed
}
