//! Reader side of a cached feed: owns the load window and serializes loads.

use color_eyre::Result;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::mediator::CacheMediator;
use super::observer::Subscription;
use super::storage::CacheStore;
use super::traits::{
  CacheResult, CachedItem, Cacheable, InitializeAction, ItemFilter, LoadResult, LoadType,
  LoadWindow, PageFetcher,
};
use crate::error::LoadError;

/// A cached, incrementally loaded feed.
///
/// The window is always derived from the committed "all" view, chunked by
/// page size, so it reflects exactly what a reader of the store would see.
/// Loads take an async lock, which gives the single-writer ordering the
/// mediator relies on.
pub struct CachedPager<T, S, F> {
  mediator: CacheMediator<T, S, F>,
  store: Arc<S>,
  anchor_position: Option<usize>,
  load_lock: Mutex<()>,
}

impl<T, S, F> CachedPager<T, S, F>
where
  T: Cacheable,
  S: CacheStore<T> + 'static,
  F: PageFetcher<Item = T>,
{
  pub fn new(store: Arc<S>, fetcher: F, page_size: u32) -> Self {
    Self {
      mediator: CacheMediator::new(Arc::clone(&store), fetcher, page_size),
      store,
      anchor_position: None,
      load_lock: Mutex::new(()),
    }
  }

  /// Remember which item the reader is looking at.
  pub fn set_anchor(&mut self, position: Option<usize>) {
    self.anchor_position = position;
  }

  /// Open the feed: refresh if the cache is empty, otherwise serve it as is.
  ///
  /// A failed refresh still returns whatever is cached, tagged as offline.
  pub async fn start(&self) -> Result<CacheResult<Vec<CachedItem<T>>>> {
    match self.mediator.initialize() {
      InitializeAction::SkipInitialRefresh => {
        debug!("cache populated, skipping initial refresh");
        Ok(CacheResult::from_cache(self.snapshot()?))
      }
      InitializeAction::LaunchInitialRefresh => self.refresh_or_offline().await,
    }
  }

  /// Refresh unconditionally, falling back to the cached view on failure.
  pub async fn refresh_or_offline(&self) -> Result<CacheResult<Vec<CachedItem<T>>>> {
    match self.refresh().await {
      LoadResult::Error(e) => {
        info!("refresh failed, serving cached items: {}", e);
        Ok(CacheResult::offline(self.snapshot()?, e))
      }
      LoadResult::Success { .. } => Ok(CacheResult::from_network(self.snapshot()?)),
    }
  }

  pub async fn refresh(&self) -> LoadResult {
    self.load(LoadType::Refresh).await
  }

  pub async fn append(&self) -> LoadResult {
    self.load(LoadType::Append).await
  }

  pub async fn prepend(&self) -> LoadResult {
    self.load(LoadType::Prepend).await
  }

  async fn load(&self, load_type: LoadType) -> LoadResult {
    let _guard = self.load_lock.lock().await;

    let window = match self.window() {
      Ok(window) => window,
      Err(e) => return LoadResult::Error(LoadError::Storage(e.to_string())),
    };
    self.mediator.load(load_type, &window).await
  }

  /// Current load window.
  pub fn window(&self) -> Result<LoadWindow> {
    let identities = self
      .store
      .ordered(ItemFilter::All)?
      .into_iter()
      .map(|cached| cached.item.cache_key())
      .collect();

    Ok(
      LoadWindow::from_ordered(identities, self.mediator.page_size() as usize)
        .with_anchor(self.anchor_position),
    )
  }

  /// Everything loaded so far, in feed order.
  pub fn snapshot(&self) -> Result<Vec<CachedItem<T>>> {
    self.store.ordered(ItemFilter::All)
  }

  /// Live feed view.
  pub fn subscribe(&self) -> Result<Subscription<T>> {
    self.store.observe(ItemFilter::All)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::mediator::tests::ScriptedFetcher;
  use crate::cache::storage::tests::Note;
  use crate::cache::storage::SqliteStore;
  use crate::cache::traits::CacheSource;

  fn pager(fetcher: ScriptedFetcher, page_size: u32) -> (CachedPager<Note, SqliteStore<Note>, Arc<ScriptedFetcher>>, Arc<ScriptedFetcher>) {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let fetcher = Arc::new(fetcher);
    (CachedPager::new(store, Arc::clone(&fetcher), page_size), fetcher)
  }

  fn ids(items: &[CachedItem<Note>]) -> Vec<String> {
    items.iter().map(|c| c.item.id.clone()).collect()
  }

  #[tokio::test]
  async fn test_start_refreshes_empty_cache_once() {
    let (pager, fetcher) = pager(ScriptedFetcher::default().with_page(1, &["a", "b"]), 2);

    let first = pager.start().await.unwrap();
    assert_eq!(first.source, CacheSource::Network);
    assert_eq!(ids(&first.data), vec!["a", "b"]);

    let second = pager.start().await.unwrap();
    assert_eq!(second.source, CacheSource::Cache);
    assert_eq!(fetcher.request_count(), 1);
  }

  #[tokio::test]
  async fn test_start_offline_returns_error_and_empty_view() {
    let (pager, _) = pager(
      ScriptedFetcher::default().with_error(1, LoadError::Transport("no route".into())),
      2,
    );

    let result = pager.start().await.unwrap();
    assert_eq!(result.source, CacheSource::Offline);
    assert!(result.data.is_empty());
    assert!(matches!(result.error, Some(LoadError::Transport(_))));
  }

  #[tokio::test]
  async fn test_append_walks_pages_in_order() {
    let (pager, fetcher) = pager(
      ScriptedFetcher::default()
        .with_page(1, &["a", "b"])
        .with_page(2, &["c", "d"])
        .with_page(3, &["e"]),
      2,
    );

    pager.refresh().await;
    assert_eq!(pager.append().await, LoadResult::Success { end_of_data: false });
    assert_eq!(pager.append().await, LoadResult::Success { end_of_data: false });
    assert_eq!(pager.append().await, LoadResult::Success { end_of_data: true });
    assert_eq!(pager.append().await, LoadResult::Success { end_of_data: true });

    assert_eq!(ids(&pager.snapshot().unwrap()), vec!["a", "b", "c", "d", "e"]);
    let pages: Vec<u32> = fetcher.requests.lock().unwrap().iter().map(|r| r.page).collect();
    assert_eq!(pages, vec![1, 2, 3, 4]);
  }

  #[tokio::test]
  async fn test_prepend_from_first_page_is_terminal() {
    let (pager, fetcher) = pager(ScriptedFetcher::default().with_page(1, &["a"]), 2);
    pager.refresh().await;

    assert!(pager.prepend().await.is_end_of_data());
    assert_eq!(fetcher.request_count(), 1);
  }

  #[tokio::test]
  async fn test_subscriber_sees_appended_page() {
    let (pager, _) = pager(
      ScriptedFetcher::default()
        .with_page(1, &["a"])
        .with_page(2, &["b"]),
      1,
    );
    pager.refresh().await;

    let mut feed = pager.subscribe().unwrap();
    assert_eq!(ids(&feed.next().await.unwrap()), vec!["a"]);

    pager.append().await;
    assert_eq!(ids(&feed.next().await.unwrap()), vec!["a", "b"]);
  }

  #[tokio::test]
  async fn test_window_carries_anchor() {
    let (mut pager, _) = pager(ScriptedFetcher::default().with_page(1, &["a", "b", "c"]), 2);
    pager.refresh().await;
    pager.set_anchor(Some(2));

    let window = pager.window().unwrap();
    assert_eq!(window.pages.len(), 2);
    assert_eq!(window.closest_to_anchor(), Some("c"));
  }
}
