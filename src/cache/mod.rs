//! Offline-first paging cache.
//!
//! Items live in a local store with a side table of page cursors. A mediator
//! fetches one upstream page at a time and commits it atomically, and readers
//! observe ordered views of the store that update after each commit:
//! - `CacheStore` persists items, page keys and the local bookmark flag
//! - `CacheMediator` decides which page a REFRESH/PREPEND/APPEND needs
//! - `CachedPager` owns a reader's window and serializes its loads

pub(crate) mod mediator;
mod observer;
mod pager;
pub(crate) mod storage;
mod traits;

pub use pager::CachedPager;
pub use storage::{CacheStore, SqliteStore};
pub use traits::{
  CacheResult, CacheSource, CachedItem, Cacheable, FetchedPage, ItemFilter, LoadResult,
  PageFetcher, PageKey, PageRequest,
};
