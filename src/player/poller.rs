//! Background status polling and queue auto-advance.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::controller::{PlaybackController, PlayerEvent};
use super::status::{AdvanceTrigger, PlayerStatus};

/// Handle to the polling task. Dropping it stops the task.
pub struct StatusPoller {
  cancel_token: CancellationToken,
  handle: Option<JoinHandle<()>>,
}

impl StatusPoller {
  /// Poll `controller` every `interval` until stopped.
  pub fn spawn(controller: PlaybackController, interval: Duration) -> Self {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    let handle = tokio::spawn(async move {
      log::info!("Status poller started ({:?})", interval);
      let mut ticker = tokio::time::interval(interval);
      ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
      let mut trigger = AdvanceTrigger::new();
      let mut last: Option<PlayerStatus> = None;

      loop {
        tokio::select! {
          _ = token.cancelled() => {
            log::info!("Status poller stopped");
            break;
          }
          _ = ticker.tick() => {
            poll_once(&controller, &mut trigger, &mut last).await;
          }
        }
      }
    });

    Self {
      cancel_token,
      handle: Some(handle),
    }
  }

  pub fn is_running(&self) -> bool {
    self.handle.as_ref().is_some_and(|h| !h.is_finished())
  }

  /// Cancel the task and wait briefly for it to wind down.
  pub async fn stop(mut self) {
    self.cancel_token.cancel();
    if let Some(handle) = self.handle.take() {
      let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;
    }
  }
}

impl Drop for StatusPoller {
  fn drop(&mut self) {
    self.cancel_token.cancel();
  }
}

impl PlaybackController {
  /// Start the status poller at the configured interval.
  pub fn spawn_poller(&self) -> StatusPoller {
    StatusPoller::spawn(self.clone(), self.poll_interval())
  }
}

async fn poll_once(
  controller: &PlaybackController,
  trigger: &mut AdvanceTrigger,
  last: &mut Option<PlayerStatus>,
) {
  let generation = controller.generation();
  let status = controller.get_status().await;

  if last.as_ref() != Some(&status) {
    controller.emit(PlayerEvent::Status {
      status: status.clone(),
      line: controller.status_line(),
    });
    *last = Some(status.clone());
  }

  // No answer is not the same as stopped.
  if !status.reachable {
    return;
  }

  if let Some(path) = status.path.as_deref() {
    let is_current = controller.current_track().is_some_and(|t| t.uri() == path);
    let is_next = controller.queue().first().is_some_and(|t| t.uri() == path);
    if !is_current && is_next {
      controller.follow_engine(path).await;
    }
  }

  if !trigger.observe(status.state) {
    return;
  }

  if controller.queue_len() == 0 {
    controller.finish_from(generation).await;
    return;
  }
  match controller.advance_from(generation).await {
    Ok(Some(track)) => log::debug!("Auto-advanced to {}", track.uri()),
    Ok(None) => {}
    Err(e) => log::error!("Auto-advance failed: {}", e),
  }
}
