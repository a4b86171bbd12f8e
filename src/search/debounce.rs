//! Collapses rapid query edits into a single search intent.

use std::time::{Duration, Instant};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);
pub const DEFAULT_MIN_QUERY_LEN: usize = 3;

/// What the search side should do once the input settles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchIntent {
  /// Start a fresh search for this query, from page 1.
  Search(String),
  /// The query was emptied: drop the results without fetching.
  Clear,
}

/// Cooperative debouncer. The owner feeds it input and polls it from its
/// own tick; nothing here spawns or sleeps.
#[derive(Debug)]
pub struct QueryDebouncer {
  current: String,
  /// When the current value was last edited, if it has not fired yet.
  pending_since: Option<Instant>,
  window: Duration,
  min_len: usize,
}

impl Default for QueryDebouncer {
  fn default() -> Self {
    Self::new(DEFAULT_DEBOUNCE, DEFAULT_MIN_QUERY_LEN)
  }
}

impl QueryDebouncer {
  pub fn new(window: Duration, min_len: usize) -> Self {
    Self {
      current: String::new(),
      pending_since: None,
      window,
      min_len,
    }
  }

  pub fn current(&self) -> &str {
    &self.current
  }

  pub fn is_pending(&self) -> bool {
    self.pending_since.is_some()
  }

  /// Record an edit and restart the timer.
  pub fn on_input(&mut self, text: &str) {
    self.on_input_at(text, Instant::now());
  }

  pub fn on_input_at(&mut self, text: &str, now: Instant) {
    self.current = text.to_string();
    self.pending_since = Some(now);
  }

  /// Fire immediately with the current value, bypassing the timer.
  pub fn search_now(&mut self) -> Option<SearchIntent> {
    self.pending_since = None;
    self.intent()
  }

  /// Returns an intent once the window has elapsed without further edits.
  pub fn poll(&mut self) -> Option<SearchIntent> {
    self.poll_at(Instant::now())
  }

  pub fn poll_at(&mut self, now: Instant) -> Option<SearchIntent> {
    let since = self.pending_since?;
    if now.saturating_duration_since(since) < self.window {
      return None;
    }
    self.pending_since = None;
    self.intent()
  }

  /// Short queries are suppressed; an empty one clears.
  fn intent(&self) -> Option<SearchIntent> {
    let query = self.current.trim();
    if query.is_empty() {
      Some(SearchIntent::Clear)
    } else if query.chars().count() < self.min_len {
      None
    } else {
      Some(SearchIntent::Search(query.to_string()))
    }
  }
}
