//! Core traits and types for the paging cache.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::LoadError;

/// Trait for items that can be cached.
///
/// The payload is stored as serialized JSON, so the store never needs to
/// know the item's fields beyond its identity and display order.
pub trait Cacheable: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
  /// Globally unique identity, used as the primary key (e.g. canonical URL).
  fn cache_key(&self) -> String;

  /// Stable display order for the bookmarks view, sorted descending.
  /// Returns None if the item has no natural ordering.
  fn sort_key(&self) -> Option<&str>;
}

/// An item as read back from the store, with its local-only attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedItem<T> {
  pub item: T,
  /// Local flag that survives upserts of the same identity.
  pub bookmarked: bool,
  /// Monotonic insertion sequence. Re-inserting an existing identity keeps
  /// its original position.
  pub inserted_at: i64,
}

/// Pagination cursors discovered when an item was fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageKey {
  pub identity: String,
  pub prev_key: Option<u32>,
  /// None is the authoritative end-of-data marker for forward loads.
  pub next_key: Option<u32>,
}

/// The two supported ordered views of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemFilter {
  /// Everything, in insertion order.
  All,
  /// Bookmarked items only, newest sort key first.
  Bookmarked,
}

/// Direction of a mediator load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadType {
  Refresh,
  Prepend,
  Append,
}

/// Decision made before the first read of a cached feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitializeAction {
  LaunchInitialRefresh,
  SkipInitialRefresh,
}

/// Outcome of a single mediator load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadResult {
  Success { end_of_data: bool },
  Error(LoadError),
}

impl LoadResult {
  pub fn is_end_of_data(&self) -> bool {
    matches!(self, LoadResult::Success { end_of_data: true })
  }

  pub fn error(&self) -> Option<&LoadError> {
    match self {
      LoadResult::Error(e) => Some(e),
      LoadResult::Success { .. } => None,
    }
  }
}

/// The pages currently loaded by a reader, as identities.
///
/// Only the edges matter to the mediator: the first item of the first
/// non-empty page for PREPEND and the last item of the last non-empty page
/// for APPEND.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadWindow {
  pub pages: Vec<Vec<String>>,
  /// Index (across all pages) of the item the reader is looking at.
  pub anchor_position: Option<usize>,
}

impl LoadWindow {
  /// Build a window by chunking an ordered list of identities.
  pub fn from_ordered(identities: Vec<String>, page_size: usize) -> Self {
    let pages = identities
      .chunks(page_size.max(1))
      .map(|chunk| chunk.to_vec())
      .collect();
    Self {
      pages,
      anchor_position: None,
    }
  }

  pub fn with_anchor(mut self, anchor_position: Option<usize>) -> Self {
    self.anchor_position = anchor_position;
    self
  }

  pub fn first_item(&self) -> Option<&str> {
    self
      .pages
      .iter()
      .find(|page| !page.is_empty())
      .and_then(|page| page.first())
      .map(String::as_str)
  }

  pub fn last_item(&self) -> Option<&str> {
    self
      .pages
      .iter()
      .rev()
      .find(|page| !page.is_empty())
      .and_then(|page| page.last())
      .map(String::as_str)
  }

  /// Identity of the item nearest the anchor, clamped to the loaded range.
  pub fn closest_to_anchor(&self) -> Option<&str> {
    let anchor = self.anchor_position?;
    let total: usize = self.pages.iter().map(Vec::len).sum();
    if total == 0 {
      return None;
    }
    self
      .pages
      .iter()
      .flatten()
      .nth(anchor.min(total - 1))
      .map(String::as_str)
  }

  pub fn is_empty(&self) -> bool {
    self.pages.iter().all(Vec::is_empty)
  }
}

/// A request for one upstream page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
  /// 1-based page number.
  pub page: u32,
  pub page_size: u32,
}

/// One page of already-validated items.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPage<T> {
  pub items: Vec<T>,
  /// Upstream's claimed total, when it reports one.
  pub total_results: Option<u64>,
}

impl<T> FetchedPage<T> {
  pub fn empty() -> Self {
    Self {
      items: Vec::new(),
      total_results: Some(0),
    }
  }
}

/// The network collaborator.
///
/// Filters (country, category, query, sort order) are bound into the
/// implementing value, so changing a filter means building a new fetcher.
#[async_trait]
pub trait PageFetcher: Send + Sync {
  type Item: Send + 'static;

  async fn fetch_page(&self, request: PageRequest) -> Result<FetchedPage<Self::Item>, LoadError>;
}

#[async_trait]
impl<P: PageFetcher + ?Sized> PageFetcher for std::sync::Arc<P> {
  type Item = P::Item;

  async fn fetch_page(&self, request: PageRequest) -> Result<FetchedPage<Self::Item>, LoadError> {
    (**self).fetch_page(request).await
  }
}

/// Result from a cache read, including metadata about where it came from.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// The load failure that forced an offline read, if any
  pub error: Option<LoadError>,
}

impl<T> CacheResult<T> {
  /// Data that was just refreshed from the network.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      error: None,
    }
  }

  /// Data served from cache without attempting a refresh.
  pub fn from_cache(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Cache,
      error: None,
    }
  }

  /// Data served from cache because the refresh failed.
  pub fn offline(data: T, error: LoadError) -> Self {
    Self {
      data,
      source: CacheSource::Offline,
      error: Some(error),
    }
  }
}

/// Indicates where cached data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Refreshed from the network on this read
  Network,
  /// Cache was populated, so the initial refresh was skipped
  Cache,
  /// Refresh failed, serving whatever is cached
  Offline,
}
