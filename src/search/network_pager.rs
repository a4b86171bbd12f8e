use tracing::{debug, warn};

use crate::cache::{FetchedPage, PageFetcher, PageRequest};
use crate::error::LoadError;

/// Status the upstream uses when a plan's result window is exhausted. It is
/// an expected condition, so it ends paging instead of failing it.
pub const SOFT_END_STATUS: u16 = 426;

/// One network-only page, or the reason it could not be loaded.
#[derive(Debug, Clone, PartialEq)]
pub enum PageLoad<T> {
  Page {
    items: Vec<T>,
    prev_key: Option<u32>,
    next_key: Option<u32>,
  },
  Error(LoadError),
}

impl<T> PageLoad<T> {
  pub fn is_end_of_data(&self) -> bool {
    matches!(self, PageLoad::Page { next_key: None, .. })
  }
}

/// Stateless page-number pager with no local persistence.
///
/// A new query means a new fetcher and therefore a new pager, which starts
/// over at page 1.
pub struct NetworkPager<F> {
  fetcher: F,
}

impl<F: PageFetcher> NetworkPager<F> {
  pub fn new(fetcher: F) -> Self {
    Self { fetcher }
  }

  /// Load page `key` (page 1 when `None`).
  pub async fn load(&self, key: Option<u32>, page_size: u32) -> PageLoad<F::Item> {
    let page = key.unwrap_or(1).max(1);
    let request = PageRequest { page, page_size };

    let fetched = match self.fetcher.fetch_page(request).await {
      Ok(fetched) => fetched,
      Err(e) if e.status() == Some(SOFT_END_STATUS) => {
        debug!(page, "upstream result limit reached, ending search");
        FetchedPage::empty()
      }
      Err(e) => {
        warn!(page, "search page failed: {}", e);
        return PageLoad::Error(e);
      }
    };

    let prev_key = if page == 1 { None } else { Some(page - 1) };
    let next_key = if is_last_page(&fetched, page, page_size) {
      None
    } else {
      Some(page + 1)
    };

    debug!(page, count = fetched.items.len(), ?next_key, "search page loaded");
    PageLoad::Page {
      items: fetched.items,
      prev_key,
      next_key,
    }
  }
}

fn is_last_page<T>(fetched: &FetchedPage<T>, page: u32, page_size: u32) -> bool {
  if fetched.items.is_empty() {
    return true;
  }
  // Without a reported total only an empty batch ends the search.
  match fetched.total_results {
    Some(total) => total <= u64::from(page) * u64::from(page_size),
    None => false,
  }
}
