//! Push-based change notification for ordered cache views.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

use super::traits::{CachedItem, ItemFilter};

type Snapshot<T> = Vec<CachedItem<T>>;

struct Observer<T> {
  filter: ItemFilter,
  tx: mpsc::UnboundedSender<Snapshot<T>>,
}

struct Registry<T> {
  next_id: u64,
  observers: HashMap<u64, Observer<T>>,
}

/// Set of live subscribers, keyed by registration id.
pub struct ObserverRegistry<T> {
  inner: Arc<Mutex<Registry<T>>>,
}

impl<T> Default for ObserverRegistry<T> {
  fn default() -> Self {
    Self {
      inner: Arc::new(Mutex::new(Registry {
        next_id: 0,
        observers: HashMap::new(),
      })),
    }
  }
}

impl<T: Clone> ObserverRegistry<T> {
  /// Register an observer and seed it with the current view.
  pub fn subscribe(&self, filter: ItemFilter, initial: Snapshot<T>) -> Subscription<T> {
    let (tx, rx) = mpsc::unbounded_channel();
    // Receiver is alive, cannot fail.
    let _ = tx.send(initial);

    let mut registry = lock(&self.inner);
    let id = registry.next_id;
    registry.next_id += 1;
    registry.observers.insert(id, Observer { filter, tx });

    Subscription {
      id,
      rx,
      registry: Arc::clone(&self.inner),
    }
  }

  /// Filters that currently have at least one subscriber.
  pub fn active_filters(&self) -> Vec<ItemFilter> {
    let registry = lock(&self.inner);
    let mut filters: Vec<ItemFilter> = Vec::new();
    for observer in registry.observers.values() {
      if !filters.contains(&observer.filter) {
        filters.push(observer.filter);
      }
    }
    filters
  }

  /// Push a fresh view to every subscriber of `filter`, pruning closed ones.
  pub fn publish(&self, filter: ItemFilter, snapshot: &Snapshot<T>) {
    let mut registry = lock(&self.inner);
    registry.observers.retain(|_, observer| {
      if observer.filter != filter {
        return true;
      }
      observer.tx.send(snapshot.clone()).is_ok()
    });
  }

}

fn lock<T>(inner: &Mutex<Registry<T>>) -> std::sync::MutexGuard<'_, Registry<T>> {
  // A panic while holding this lock leaves the map itself consistent.
  inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Handle to a live ordered view.
///
/// Yields the full ordered view once on subscribe and again after every
/// committed write. Deregisters on [`Subscription::unsubscribe`] or drop.
pub struct Subscription<T> {
  id: u64,
  rx: mpsc::UnboundedReceiver<Snapshot<T>>,
  registry: Arc<Mutex<Registry<T>>>,
}

impl<T> Subscription<T> {
  /// Wait for the next committed view.
  pub async fn next(&mut self) -> Option<Snapshot<T>> {
    self.rx.recv().await
  }

  /// Latest view already delivered, if any, without waiting.
  pub fn try_next(&mut self) -> Option<Snapshot<T>> {
    self.rx.try_recv().ok()
  }

  /// Stop receiving updates.
  pub fn unsubscribe(self) {
    // Drop does the work.
  }
}

impl<T> Stream for Subscription<T> {
  type Item = Snapshot<T>;

  fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
    self.rx.poll_recv(cx)
  }
}

impl<T> Drop for Subscription<T> {
  fn drop(&mut self) {
    lock(&self.registry).observers.remove(&self.id);
  }
}
