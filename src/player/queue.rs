use std::collections::VecDeque;
use std::sync::Arc;

use super::track::Track;

/// FIFO of tracks waiting to play. The head plays next; the current track is
/// never in here.
#[derive(Debug, Default, Clone)]
pub struct PlayQueue {
  tracks: VecDeque<Arc<Track>>,
}

impl PlayQueue {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn push_back(&mut self, track: Arc<Track>) {
    self.tracks.push_back(track);
  }

  pub fn push_front(&mut self, track: Arc<Track>) {
    self.tracks.push_front(track);
  }

  pub fn pop_front(&mut self) -> Option<Arc<Track>> {
    self.tracks.pop_front()
  }

  pub fn front(&self) -> Option<&Arc<Track>> {
    self.tracks.front()
  }

  /// Remove the first track with this URI.
  pub fn remove_uri(&mut self, uri: &str) -> Option<Arc<Track>> {
    let index = self.tracks.iter().position(|t| t.uri() == uri)?;
    self.tracks.remove(index)
  }

  pub fn contains_uri(&self, uri: &str) -> bool {
    self.tracks.iter().any(|t| t.uri() == uri)
  }

  pub fn clear(&mut self) {
    self.tracks.clear();
  }

  pub fn len(&self) -> usize {
    self.tracks.len()
  }

  pub fn is_empty(&self) -> bool {
    self.tracks.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &Arc<Track>> {
    self.tracks.iter()
  }

  pub fn to_vec(&self) -> Vec<Arc<Track>> {
    self.tracks.iter().cloned().collect()
  }
}
