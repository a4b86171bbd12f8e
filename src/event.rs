use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// Interactive session events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
  /// A line typed on stdin, without its newline
  Line(String),
  /// Stdin was closed
  Eof,
  /// Periodic tick for debouncing and result polling
  Tick,
}

/// Event handler that produces events from stdin lines and a tick timer
pub struct EventHandler {
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
  /// Create a new event handler with the given tick rate
  pub fn new(tick_rate: Duration) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();

    // Spawn stdin reader
    let line_tx = tx.clone();
    tokio::spawn(async move {
      let mut lines = BufReader::new(tokio::io::stdin()).lines();
      loop {
        let event = match lines.next_line().await {
          Ok(Some(line)) => Event::Line(line),
          Ok(None) | Err(_) => Event::Eof,
        };
        let done = event == Event::Eof;
        if line_tx.send(event).is_err() || done {
          break;
        }
      }
    });

    // Spawn ticker
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(tick_rate);
      loop {
        ticker.tick().await;
        if tx.send(Event::Tick).is_err() {
          break;
        }
      }
    });

    Self { rx }
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}
