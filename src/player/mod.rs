//! Player module - queue, pause and status bookkeeping on top of the engine.
//!
//! Architecture:
//! - `controller.rs` - `PlaybackController`, the one entry point for callers
//! - `poller.rs` - periodic status polling and queue auto-advance
//! - `pause.rs` - IPC or signal based pause, picked per engine
//! - `queue.rs` - ordered list of upcoming tracks
//! - `status.rs` - status snapshots, display line and the advance trigger
//! - `track.rs` - track metadata and URI validation

mod controller;
mod error;
mod pause;
mod poller;
mod queue;
mod status;
mod track;

pub use controller::{PlaybackController, PlayerEvent};
pub use error::PlayerError;
pub use pause::{PauseStrategy, PauseToggle};
pub use poller::StatusPoller;
pub use queue::PlayQueue;
pub use status::{format_clock, AdvanceTrigger, PlaybackState, PlayerStatus, DEFAULT_VOLUME};
pub use track::{validate_uri, Track};
