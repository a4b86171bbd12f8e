//! Incremental load orchestration between the network and the cache store.

use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::storage::CacheStore;
use super::traits::{
  Cacheable, InitializeAction, LoadResult, LoadType, LoadWindow, PageFetcher, PageKey, PageRequest,
};
use crate::error::LoadError;

/// Keeps a cache store consistent with a page-numbered upstream.
///
/// The mediator holds no state of its own: every decision is a function of
/// the load direction, the reader's window and the page key table. Callers
/// must serialize loads for one logical feed, since each window is computed
/// from the previously committed state.
pub struct CacheMediator<T, S, F> {
  store: Arc<S>,
  fetcher: F,
  page_size: u32,
  _item: PhantomData<fn() -> T>,
}

impl<T, S, F> CacheMediator<T, S, F>
where
  T: Cacheable,
  S: CacheStore<T> + 'static,
  F: PageFetcher<Item = T>,
{
  pub fn new(store: Arc<S>, fetcher: F, page_size: u32) -> Self {
    Self {
      store,
      fetcher,
      page_size: page_size.max(1),
      _item: PhantomData,
    }
  }

  pub fn page_size(&self) -> u32 {
    self.page_size
  }

  /// Coarse freshness check: refresh only when nothing is cached.
  pub fn initialize(&self) -> InitializeAction {
    match self.store.count() {
      Ok(0) => InitializeAction::LaunchInitialRefresh,
      Ok(_) => InitializeAction::SkipInitialRefresh,
      Err(e) => {
        warn!("could not count cached items, refreshing: {}", e);
        InitializeAction::LaunchInitialRefresh
      }
    }
  }

  /// Load one page in the given direction and commit it.
  ///
  /// Nothing is written unless the fetch succeeds, and the write itself is a
  /// single transaction, so an `Error` result leaves both tables untouched.
  pub async fn load(&self, load_type: LoadType, window: &LoadWindow) -> LoadResult {
    let page = match self.target_page(load_type, window) {
      Ok(Some(page)) => page,
      Ok(None) => return LoadResult::Success { end_of_data: true },
      Err(e) => return LoadResult::Error(e),
    };

    debug!(?load_type, page, "loading page");

    let request = PageRequest {
      page,
      page_size: self.page_size,
    };
    let fetched = match self.fetcher.fetch_page(request).await {
      Ok(fetched) => fetched,
      Err(e) => {
        warn!(?load_type, page, "page load failed: {}", e);
        return LoadResult::Error(e);
      }
    };

    // Upstream totals drift between pages; an empty batch is the only
    // reliable end marker.
    let end_of_data = fetched.items.is_empty();
    let prev_key = if page == 1 { None } else { Some(page - 1) };
    let next_key = if end_of_data { None } else { Some(page + 1) };

    let keys: Vec<PageKey> = fetched
      .items
      .iter()
      .map(|item| PageKey {
        identity: item.cache_key(),
        prev_key,
        next_key,
      })
      .collect();

    let count = fetched.items.len();
    if let Err(e) = self.commit(load_type, fetched.items, keys).await {
      warn!(?load_type, page, "commit failed: {}", e);
      return LoadResult::Error(e);
    }

    info!(?load_type, page, count, end_of_data, "page committed");
    LoadResult::Success { end_of_data }
  }

  /// Resolve which page a load should fetch. `None` means there is nothing
  /// to load in that direction.
  fn target_page(&self, load_type: LoadType, window: &LoadWindow) -> Result<Option<u32>, LoadError> {
    match load_type {
      LoadType::Refresh => {
        // Refresh always starts over at page 1. The anchor key is looked up
        // for diagnostics only.
        if let Ok(Some(key)) = self.key_for(window.closest_to_anchor()) {
          debug!(
            identity = %key.identity,
            prev_key = ?key.prev_key,
            next_key = ?key.next_key,
            "refresh anchor"
          );
        }
        Ok(Some(1))
      }
      LoadType::Prepend => {
        let key = self.key_for(window.first_item())?;
        let prev_key = key.and_then(|k| k.prev_key);
        if prev_key.is_none() {
          debug!("PREPEND: no previous page");
        }
        Ok(prev_key)
      }
      LoadType::Append => {
        let key = self.key_for(window.last_item())?;
        let next_key = key.as_ref().and_then(|k| k.next_key);
        if next_key.is_none() {
          debug!(key = ?key, "APPEND: end of pagination reached");
        }
        Ok(next_key)
      }
    }
  }

  fn key_for(&self, identity: Option<&str>) -> Result<Option<PageKey>, LoadError> {
    let Some(identity) = identity else {
      return Ok(None);
    };
    self
      .store
      .page_key(identity)
      .map_err(|e| LoadError::Storage(e.to_string()))
  }

  /// Run the transactional write off the async worker. A PREPEND batch goes
  /// in front of the window so its first item carries the next `prev_key`.
  async fn commit(&self, load_type: LoadType, items: Vec<T>, keys: Vec<PageKey>) -> Result<(), LoadError> {
    let store = Arc::clone(&self.store);
    let result = tokio::task::spawn_blocking(move || match load_type {
      LoadType::Refresh => store.replace_all(&items, &keys),
      LoadType::Prepend => store.bulk_insert_front(&items, &keys),
      LoadType::Append => store.bulk_insert(&items, &keys),
    })
    .await
    .map_err(|e| LoadError::Storage(format!("commit task failed: {}", e)))?;

    result.map_err(|e| LoadError::Storage(e.to_string()))
  }
}
