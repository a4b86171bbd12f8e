//! Typed failures surfaced by the paging engine.
//!
//! Load errors are returned as values (see [`crate::cache::LoadResult`]) and
//! never panic across the reader boundary, so callers can offer a retry for
//! the direction that failed.

use thiserror::Error;

/// Why a page load failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
  /// No connectivity, DNS failure or a timeout.
  #[error("network error: {0}")]
  Transport(String),

  /// Upstream answered with a non-success status.
  #[error("upstream returned HTTP {status}{}", upstream_detail(.code, .message))]
  Upstream {
    status: u16,
    code: Option<String>,
    message: Option<String>,
  },

  /// Response body could not be decoded at all.
  #[error("malformed response: {0}")]
  Data(String),

  /// Transactional commit failed. Prior cache state is intact.
  #[error("cache commit failed: {0}")]
  Storage(String),
}

impl LoadError {
  pub fn upstream(status: u16) -> Self {
    Self::Upstream {
      status,
      code: None,
      message: None,
    }
  }

  /// HTTP status for upstream failures.
  pub fn status(&self) -> Option<u16> {
    match self {
      Self::Upstream { status, .. } => Some(*status),
      _ => None,
    }
  }

  /// Whether repeating the identical request has a reasonable chance of
  /// succeeding: transport failures, 5xx, 429 and 408.
  pub fn is_retryable(&self) -> bool {
    match self {
      Self::Transport(_) => true,
      Self::Upstream { status, .. } => *status >= 500 || *status == 429 || *status == 408,
      Self::Data(_) | Self::Storage(_) => false,
    }
  }
}

fn upstream_detail(code: &Option<String>, message: &Option<String>) -> String {
  match (code, message) {
    (Some(c), Some(m)) => format!(" ({}): {}", c, m),
    (Some(c), None) => format!(" ({})", c),
    (None, Some(m)) => format!(": {}", m),
    (None, None) => String::new(),
  }
}

/// A single upstream record that cannot be cached.
///
/// These never fail a page: the record is dropped and the rest of the batch
/// is kept.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataError {
  #[error("record is missing `{0}`")]
  MissingField(&'static str),

  #[error("record has an unparseable timestamp `{0}`")]
  InvalidTimestamp(String),
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_upstream_display_includes_code_and_message() {
    let err = LoadError::Upstream {
      status: 426,
      code: Some("parametersMissing".to_string()),
      message: Some("upgrade".to_string()),
    };
    assert_eq!(
      err.to_string(),
      "upstream returned HTTP 426 (parametersMissing): upgrade"
    );
    assert_eq!(LoadError::upstream(500).to_string(), "upstream returned HTTP 500");
  }

  #[test]
  fn test_retryable_classification() {
    assert!(LoadError::Transport("timed out".into()).is_retryable());
    assert!(LoadError::upstream(500).is_retryable());
    assert!(LoadError::upstream(503).is_retryable());
    assert!(LoadError::upstream(429).is_retryable());
    assert!(LoadError::upstream(408).is_retryable());

    assert!(!LoadError::upstream(401).is_retryable());
    assert!(!LoadError::upstream(404).is_retryable());
    assert!(!LoadError::Data("eof".into()).is_retryable());
    assert!(!LoadError::Storage("locked".into()).is_retryable());
  }
}
