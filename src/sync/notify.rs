use tracing::info;

pub const SYNC_TITLE: &str = "NewsFlow Updates";

pub fn sync_body(new_items: usize) -> String {
  format!("Found {} new headlines!", new_items)
}

/// Delivers a user-facing notification.
pub trait Notifier: Send + Sync {
  fn notify(&self, title: &str, body: &str);
}

/// Prints notifications on stdout and records them in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
  fn notify(&self, title: &str, body: &str) {
    info!(title, body, "notification");
    println!("[{}] {}", title, body);
  }
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;
  use std::sync::Mutex;

  /// Keeps every notification for inspection.
  #[derive(Default)]
  pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(String, String)>>,
  }

  impl Notifier for RecordingNotifier {
    fn notify(&self, title: &str, body: &str) {
      self.sent.lock().unwrap().push((title.to_string(), body.to_string()));
    }
  }

  #[test]
  fn test_body_counts_items() {
    assert_eq!(sync_body(4), "Found 4 new headlines!");
  }
}
