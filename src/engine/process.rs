//! Engine binary detection and process spawning.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcessError {
  #[error("No audio engine executable found")]
  NotFound,
  #[error("Failed to spawn engine: {0}")]
  SpawnFailed(#[from] io::Error),
}

/// Kind of engine discovered at startup. Decides the control mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
  /// mpv: JSON IPC over a control socket.
  Mpv,
  /// ffplay: no IPC, one process per track, paused with signals.
  Ffplay,
}

impl EngineKind {
  pub fn binary_name(self) -> &'static str {
    match self {
      EngineKind::Mpv => "mpv",
      EngineKind::Ffplay => "ffplay",
    }
  }

  pub fn supports_ipc(self) -> bool {
    matches!(self, EngineKind::Mpv)
  }

  /// Guess the kind from an executable path supplied by the user.
  pub fn from_path(path: &Path) -> Self {
    let stem = path
      .file_stem()
      .map(|s| s.to_string_lossy().to_ascii_lowercase())
      .unwrap_or_default();
    if stem.starts_with("ffplay") {
      EngineKind::Ffplay
    } else {
      EngineKind::Mpv
    }
  }

  /// Launch arguments: audio-only output, and for IPC engines the control
  /// socket. Signal-only engines receive the stream URI directly.
  pub fn launch_args(
    self,
    socket: &Path,
    initial_uri: Option<&str>,
    extra_args: &[String],
  ) -> Vec<String> {
    let mut args: Vec<String> = match self {
      EngineKind::Mpv => vec![
        format!("--input-ipc-server={}", socket.display()),
        "--idle=yes".to_string(),
        "--no-video".to_string(),
        "--no-terminal".to_string(),
        "--keep-open=no".to_string(),
      ],
      EngineKind::Ffplay => vec![
        "-nodisp".to_string(),
        "-autoexit".to_string(),
        "-loglevel".to_string(),
        "quiet".to_string(),
      ],
    };
    args.extend(extra_args.iter().cloned());
    if let Some(uri) = initial_uri {
      args.push(uri.to_string());
    }
    args
  }
}

/// A located engine executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineBinary {
  pub kind: EngineKind,
  pub path: PathBuf,
}

impl EngineBinary {
  pub fn new(kind: EngineKind, path: impl Into<PathBuf>) -> Self {
    Self {
      kind,
      path: path.into(),
    }
  }
}

/// Find a supported engine: the configured path first, then mpv, then ffplay.
pub fn discover_engine(configured: Option<&Path>) -> Option<EngineBinary> {
  if let Some(path) = configured {
    if path.exists() {
      return Some(EngineBinary::new(EngineKind::from_path(path), path));
    }
    if let Ok(found) = which::which(path) {
      return Some(EngineBinary::new(EngineKind::from_path(&found), found));
    }
    log::warn!("Configured engine {:?} not found, falling back to search", path);
  }

  for kind in [EngineKind::Mpv, EngineKind::Ffplay] {
    if let Some(path) = find_binary(kind) {
      return Some(EngineBinary::new(kind, path));
    }
  }

  None
}

/// Find an engine executable in PATH or common locations.
fn find_binary(kind: EngineKind) -> Option<PathBuf> {
  let name = kind.binary_name();

  // Check PATH first
  if let Ok(path) = which::which(name) {
    return Some(path);
  }

  #[cfg(windows)]
  let common_dirs: &[&str] = &[r"C:\Program Files\mpv", r"C:\mpv", r"C:\ffmpeg\bin"];
  #[cfg(target_os = "macos")]
  let common_dirs: &[&str] = &["/usr/local/bin", "/opt/homebrew/bin"];
  #[cfg(all(unix, not(target_os = "macos")))]
  let common_dirs: &[&str] = &["/usr/bin", "/usr/local/bin"];
  #[cfg(not(any(unix, windows)))]
  let common_dirs: &[&str] = &[];

  common_dirs
    .iter()
    .map(|dir| Path::new(dir).join(name).with_extension(std::env::consts::EXE_EXTENSION))
    .find(|p| p.exists())
}

/// Job-control signals used by the signal pause strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspendSignal {
  Stop,
  Continue,
}

/// Result of delivering a suspend/continue signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalDelivery {
  Delivered,
  /// The process is already gone (ESRCH or reaped).
  ProcessGone,
  /// The platform has no suspend/continue signals.
  Unsupported,
}

/// A running engine process.
pub trait EngineProcess: Send {
  fn id(&self) -> Option<u32>;

  /// Non-blocking exit-status probe.
  fn is_alive(&mut self) -> bool;

  /// Ask the process to exit.
  fn terminate(&mut self) -> io::Result<()>;

  fn kill(&mut self) -> io::Result<()>;

  /// Block up to `bound` for the process to exit. Returns whether it did.
  fn wait_timeout(&mut self, bound: Duration) -> io::Result<bool>;

  fn signal(&mut self, signal: SuspendSignal) -> SignalDelivery;
}

/// Starts engine processes.
pub trait Launcher: Send + Sync {
  fn launch(
    &self,
    binary: &EngineBinary,
    args: &[String],
  ) -> Result<Box<dyn EngineProcess>, ProcessError>;
}

/// Spawns real OS processes, detached from the controlling terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLauncher;

impl Launcher for SystemLauncher {
  fn launch(
    &self,
    binary: &EngineBinary,
    args: &[String],
  ) -> Result<Box<dyn EngineProcess>, ProcessError> {
    log::info!("Spawning {:?}: {:?} {:?}", binary.kind, binary.path, args);

    let mut cmd = Command::new(&binary.path);
    cmd
      .args(args)
      .stdin(Stdio::null())
      .stdout(Stdio::null())
      .stderr(Stdio::null());

    // Own process group: terminal signals such as Ctrl-C don't reach the engine.
    #[cfg(unix)]
    {
      use std::os::unix::process::CommandExt;
      cmd.process_group(0);
    }

    let child = cmd.spawn()?;
    Ok(Box::new(ChildProcess(child)))
  }
}

/// `EngineProcess` backed by `std::process::Child`.
#[derive(Debug)]
pub struct ChildProcess(Child);

impl EngineProcess for ChildProcess {
  fn id(&self) -> Option<u32> {
    Some(self.0.id())
  }

  fn is_alive(&mut self) -> bool {
    matches!(self.0.try_wait(), Ok(None))
  }

  #[cfg(unix)]
  fn terminate(&mut self) -> io::Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    match kill(Pid::from_raw(self.0.id() as i32), Signal::SIGTERM) {
      Ok(()) | Err(nix::errno::Errno::ESRCH) => Ok(()),
      Err(e) => Err(io::Error::from(e)),
    }
  }

  #[cfg(not(unix))]
  fn terminate(&mut self) -> io::Result<()> {
    self.0.kill()
  }

  fn kill(&mut self) -> io::Result<()> {
    self.0.kill()
  }

  fn wait_timeout(&mut self, bound: Duration) -> io::Result<bool> {
    let deadline = Instant::now() + bound;
    loop {
      if self.0.try_wait()?.is_some() {
        return Ok(true);
      }
      if Instant::now() >= deadline {
        return Ok(false);
      }
      std::thread::sleep(Duration::from_millis(20));
    }
  }

  #[cfg(unix)]
  fn signal(&mut self, signal: SuspendSignal) -> SignalDelivery {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let sig = match signal {
      SuspendSignal::Stop => Signal::SIGSTOP,
      SuspendSignal::Continue => Signal::SIGCONT,
    };
    match kill(Pid::from_raw(self.0.id() as i32), sig) {
      Ok(()) => SignalDelivery::Delivered,
      Err(nix::errno::Errno::ESRCH) => SignalDelivery::ProcessGone,
      Err(e) => {
        log::warn!("Failed to send {:?} to engine: {}", sig, e);
        SignalDelivery::ProcessGone
      }
    }
  }

  #[cfg(not(unix))]
  fn signal(&mut self, signal: SuspendSignal) -> SignalDelivery {
    log::warn!("{:?} not supported on this platform", signal);
    SignalDelivery::Unsupported
  }
}
