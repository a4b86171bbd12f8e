//! Tick-driven search over a network-only pager.
//!
//! The session owns the debouncer and at most one active query. Each page
//! load runs on its own task and reports back through a channel, which the
//! owner drains from its event loop:
//!
//! ```ignore
//! session.on_input(&line);
//! for event in session.tick() {
//!     render(event);
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::debounce::{QueryDebouncer, SearchIntent};
use super::network_pager::{NetworkPager, PageLoad};
use crate::cache::PageFetcher;
use crate::error::LoadError;

/// Fetcher bound to one query.
pub type QueryFetcher<T> = Arc<dyn PageFetcher<Item = T>>;

/// Builds the fetcher for a query. Filters other than the query itself are
/// captured by the closure.
pub type FetcherFactory<T> = Box<dyn Fn(&str) -> QueryFetcher<T> + Send + Sync>;

/// Something the owner may want to render.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchEvent {
  Started { query: String },
  Cleared,
  PageLoaded {
    query: String,
    page: u32,
    added: usize,
    end_of_data: bool,
  },
  Failed {
    query: String,
    page: u32,
    error: LoadError,
  },
}

struct InFlight<T> {
  page: u32,
  handle: JoinHandle<()>,
  rx: mpsc::UnboundedReceiver<PageLoad<T>>,
}

struct ActiveQuery<T> {
  query: String,
  pager: Arc<NetworkPager<QueryFetcher<T>>>,
  items: Vec<T>,
  next_key: Option<u32>,
  failed_page: Option<u32>,
  in_flight: Option<InFlight<T>>,
}

impl<T> ActiveQuery<T> {
  fn cancel(&mut self) {
    if let Some(in_flight) = self.in_flight.take() {
      debug!(query = %self.query, page = in_flight.page, "cancelling search page");
      in_flight.handle.abort();
    }
  }
}

pub struct SearchSession<T> {
  debouncer: QueryDebouncer,
  make_fetcher: FetcherFactory<T>,
  page_size: u32,
  active: Option<ActiveQuery<T>>,
}

impl<T: Clone + Send + 'static> SearchSession<T> {
  pub fn new(make_fetcher: FetcherFactory<T>, debounce: Duration, min_len: usize, page_size: u32) -> Self {
    Self {
      debouncer: QueryDebouncer::new(debounce, min_len),
      make_fetcher,
      page_size: page_size.max(1),
      active: None,
    }
  }

  /// Record an edit. Nothing is fetched until the input settles.
  pub fn on_input(&mut self, text: &str) {
    self.debouncer.on_input(text);
  }

  /// Run the current input immediately.
  pub fn search_now(&mut self) -> Vec<SearchEvent> {
    match self.debouncer.search_now() {
      Some(intent) => self.apply(intent),
      None => Vec::new(),
    }
  }

  /// Advance timers and collect finished loads. Never blocks.
  pub fn tick(&mut self) -> Vec<SearchEvent> {
    let mut events = match self.debouncer.poll() {
      Some(intent) => self.apply(intent),
      None => Vec::new(),
    };
    events.extend(self.poll());
    events
  }

  /// Request the next page. Ignored while a page is in flight, after the
  /// last page, or when there is no active query.
  pub fn load_more(&mut self) -> bool {
    let page_size = self.page_size;
    let Some(active) = self.active.as_mut() else {
      return false;
    };
    if active.in_flight.is_some() {
      return false;
    }
    let Some(page) = active.next_key else {
      return false;
    };
    active.in_flight = Some(spawn_page(Arc::clone(&active.pager), page, page_size));
    true
  }

  /// Repeat the page that last failed.
  pub fn retry(&mut self) -> bool {
    let page_size = self.page_size;
    let Some(active) = self.active.as_mut() else {
      return false;
    };
    if active.in_flight.is_some() {
      return false;
    }
    let Some(page) = active.failed_page.take() else {
      return false;
    };
    info!(query = %active.query, page, "retrying search page");
    active.in_flight = Some(spawn_page(Arc::clone(&active.pager), page, page_size));
    true
  }

  /// Wait for the in-flight page, if any, and return its events.
  pub async fn settle(&mut self) -> Vec<SearchEvent> {
    let result = match self.active.as_mut().and_then(|a| a.in_flight.as_mut()) {
      Some(in_flight) => in_flight.rx.recv().await,
      None => return Vec::new(),
    };
    self.finish(result).into_iter().collect()
  }

  pub fn query(&self) -> Option<&str> {
    self.active.as_ref().map(|a| a.query.as_str())
  }

  pub fn items(&self) -> &[T] {
    self.active.as_ref().map(|a| a.items.as_slice()).unwrap_or(&[])
  }

  pub fn is_loading(&self) -> bool {
    self.active.as_ref().is_some_and(|a| a.in_flight.is_some())
  }

  pub fn is_end_of_data(&self) -> bool {
    self.active.as_ref().is_some_and(|a| a.next_key.is_none())
  }

  pub fn has_failed(&self) -> bool {
    self.active.as_ref().is_some_and(|a| a.failed_page.is_some())
  }

  fn apply(&mut self, intent: SearchIntent) -> Vec<SearchEvent> {
    if let Some(mut previous) = self.active.take() {
      previous.cancel();
    }

    match intent {
      SearchIntent::Clear => {
        debug!("search cleared");
        vec![SearchEvent::Cleared]
      }
      SearchIntent::Search(query) => {
        info!(query = %query, "starting search");
        let pager = Arc::new(NetworkPager::new((self.make_fetcher)(&query)));
        let in_flight = spawn_page(Arc::clone(&pager), 1, self.page_size);
        self.active = Some(ActiveQuery {
          query: query.clone(),
          pager,
          items: Vec::new(),
          next_key: Some(1),
          failed_page: None,
          in_flight: Some(in_flight),
        });
        vec![SearchEvent::Started { query }]
      }
    }
  }

  fn poll(&mut self) -> Option<SearchEvent> {
    let in_flight = self.active.as_mut()?.in_flight.as_mut()?;
    match in_flight.rx.try_recv() {
      Ok(load) => self.finish(Some(load)),
      Err(mpsc::error::TryRecvError::Empty) => None,
      Err(mpsc::error::TryRecvError::Disconnected) => self.finish(None),
    }
  }

  fn finish(&mut self, load: Option<PageLoad<T>>) -> Option<SearchEvent> {
    let active = self.active.as_mut()?;
    let page = active.in_flight.take()?.page;

    // The task can only drop its sender without sending if it was torn down.
    let load = load.unwrap_or_else(|| PageLoad::Error(LoadError::Transport("search was cancelled".to_string())));

    match load {
      PageLoad::Page { items, next_key, .. } => {
        let added = items.len();
        active.items.extend(items);
        active.next_key = next_key;
        Some(SearchEvent::PageLoaded {
          query: active.query.clone(),
          page,
          added,
          end_of_data: next_key.is_none(),
        })
      }
      PageLoad::Error(error) => {
        active.failed_page = Some(page);
        Some(SearchEvent::Failed {
          query: active.query.clone(),
          page,
          error,
        })
      }
    }
  }
}

fn spawn_page<T: Send + 'static>(
  pager: Arc<NetworkPager<QueryFetcher<T>>>,
  page: u32,
  page_size: u32,
) -> InFlight<T> {
  let (tx, rx) = mpsc::unbounded_channel();
  let handle = tokio::spawn(async move {
    let result = pager.load(Some(page), page_size).await;
    // Receiver is gone when the query was superseded.
    let _ = tx.send(result);
  });
  InFlight { page, handle, rx }
}
