use serde::{Deserialize, Serialize};

use super::error::PlayerError;

/// A playable track. The URI is already resolved and authorized upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
  id: String,
  title: String,
  #[serde(default)]
  artists: Vec<String>,
  uri: String,
}

impl Track {
  pub fn new(
    id: impl Into<String>,
    title: impl Into<String>,
    artists: Vec<String>,
    uri: impl Into<String>,
  ) -> Self {
    Self {
      id: id.into(),
      title: title.into(),
      artists,
      uri: uri.into(),
    }
  }

  /// A track known only by its URI. The last path segment stands in for a title.
  pub fn from_uri(uri: &str) -> Self {
    let title = uri
      .split(['?', '#'])
      .next()
      .and_then(|path| path.trim_end_matches('/').rsplit('/').next())
      .filter(|s| !s.is_empty() && !s.contains(':'))
      .unwrap_or(uri);
    Self::new(uri, title, Vec::new(), uri)
  }

  pub fn id(&self) -> &str {
    &self.id
  }

  pub fn title(&self) -> &str {
    &self.title
  }

  pub fn artists(&self) -> &[String] {
    &self.artists
  }

  pub fn uri(&self) -> &str {
    &self.uri
  }

  /// "Artist A, Artist B - Title", or just the title.
  pub fn label(&self) -> String {
    if self.artists.is_empty() {
      self.title.clone()
    } else {
      format!("{} - {}", self.artists.join(", "), self.title)
    }
  }
}

/// Only http(s) URIs may reach the engine, so nothing can be smuggled in as a flag.
pub fn validate_uri(uri: &str) -> Result<(), PlayerError> {
  if uri.starts_with("http://") || uri.starts_with("https://") {
    Ok(())
  } else {
    Err(PlayerError::InvalidUri(uri.to_string()))
  }
}
