//! Engine module - supervises the external audio engine and talks to it.
//!
//! Architecture:
//! - `process.rs` - engine binary detection, launch arguments and the process seam
//! - `supervisor.rs` - keeps one engine alive, shuts it down with a kill fallback
//! - `ipc.rs` - one-shot connections to the control socket (Unix sockets / Named Pipes)
//! - `protocol.rs` - JSON command/reply types and serialization

mod ipc;
mod process;
mod protocol;
mod supervisor;

pub use ipc::IpcChannel;
pub use process::{
  discover_engine, ChildProcess, EngineBinary, EngineKind, EngineProcess, Launcher, ProcessError,
  SignalDelivery, SuspendSignal, SystemLauncher,
};
pub use protocol::{
  EngineCommand, EngineEvent, EngineMessage, EngineReply, LoadMode, PlaylistEntry, PropertyValue,
};
pub use supervisor::{ShutdownOutcome, Supervisor, SupervisorTimings};
