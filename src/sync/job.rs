//! One background sync run: fetch page 1, upsert it, maybe notify.

use async_trait::async_trait;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{info, warn};

use super::notify::{sync_body, Notifier, SYNC_TITLE};
use super::runner::PeriodicJob;
use crate::cache::{CacheStore, Cacheable, PageFetcher, PageKey, PageRequest};
use crate::error::LoadError;

/// Terminal state of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
  /// Batch committed. `new_items` is the batch size, which over-reports
  /// items that were already cached.
  Success { new_items: usize },
  /// Failed, but the runner should try again after its backoff.
  Retry { attempts: u32 },
  /// Failed too many times; this run is abandoned.
  Failure { attempts: u32 },
}

pub struct SyncJob<T, S, F> {
  store: Arc<S>,
  fetcher: F,
  notifier: Arc<dyn Notifier>,
  page_size: u32,
  max_attempts: u32,
  _item: PhantomData<fn() -> T>,
}

impl<T, S, F> SyncJob<T, S, F>
where
  T: Cacheable,
  S: CacheStore<T> + 'static,
  F: PageFetcher<Item = T>,
{
  pub fn new(store: Arc<S>, fetcher: F, notifier: Arc<dyn Notifier>, page_size: u32, max_attempts: u32) -> Self {
    Self {
      store,
      fetcher,
      notifier,
      page_size: page_size.max(1),
      max_attempts: max_attempts.max(1),
      _item: PhantomData,
    }
  }

  /// Run once. `attempt` is 1 for the first try of a scheduled run.
  ///
  /// Re-running is always safe: page 1 is upserted by identity, so bookmark
  /// flags, existing positions and existing page keys survive. New
  /// identities go to the front of the feed.
  pub async fn run(&self, attempt: u32) -> SyncOutcome {
    match self.sync_first_page().await {
      Ok(new_items) => {
        info!(new_items, attempt, "sync succeeded");
        if new_items > 0 {
          self.notifier.notify(SYNC_TITLE, &sync_body(new_items));
        }
        SyncOutcome::Success { new_items }
      }
      Err(e) if attempt < self.max_attempts => {
        warn!(attempt, max_attempts = self.max_attempts, "sync failed, will retry: {}", e);
        SyncOutcome::Retry { attempts: attempt }
      }
      Err(e) => {
        warn!(attempt, "sync failed, giving up: {}", e);
        SyncOutcome::Failure { attempts: attempt }
      }
    }
  }

  async fn sync_first_page(&self) -> Result<usize, LoadError> {
    let fetched = self
      .fetcher
      .fetch_page(PageRequest {
        page: 1,
        page_size: self.page_size,
      })
      .await?;

    let items = fetched.items;
    let count = items.len();
    // Page-1 keys for identities seen for the first time. Cached ones keep
    // the keys of the page they were loaded from.
    let next_key = if items.is_empty() { None } else { Some(2) };
    let keys: Vec<PageKey> = items
      .iter()
      .map(|item| PageKey {
        identity: item.cache_key(),
        prev_key: None,
        next_key,
      })
      .collect();

    let store = Arc::clone(&self.store);
    tokio::task::spawn_blocking(move || store.merge_front(&items, &keys))
      .await
      .map_err(|e| LoadError::Storage(format!("commit task failed: {}", e)))?
      .map_err(|e| LoadError::Storage(e.to_string()))?;

    Ok(count)
  }
}

#[async_trait]
impl<T, S, F> PeriodicJob for SyncJob<T, S, F>
where
  T: Cacheable,
  S: CacheStore<T> + 'static,
  F: PageFetcher<Item = T>,
{
  async fn run(&self, attempt: u32) -> SyncOutcome {
    SyncJob::run(self, attempt).await
  }
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;
  use crate::cache::{FetchedPage, ItemFilter, SqliteStore};
  use crate::news::types::{Article, Source};
  use crate::sync::notify::tests::RecordingNotifier;
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::sync::Mutex;

  pub fn article(n: u32) -> Article {
    Article {
      source: Source {
        id: None,
        name: "Wire".to_string(),
      },
      author: None,
      title: format!("Headline {}", n),
      description: None,
      url: format!("https://news.example/{}", n),
      url_to_image: None,
      published_at: format!("2024-03-{:02}T08:00:00Z", n),
      content: None,
    }
  }

  /// Fails the first `failures` calls, then serves `articles`.
  pub struct FlakyFeed {
    pub failures: u32,
    pub articles: Mutex<Vec<Article>>,
    pub calls: AtomicU32,
  }

  impl FlakyFeed {
    pub fn new(failures: u32, articles: Vec<Article>) -> Self {
      Self {
        failures,
        articles: Mutex::new(articles),
        calls: AtomicU32::new(0),
      }
    }
  }

  #[async_trait]
  impl PageFetcher for FlakyFeed {
    type Item = Article;

    async fn fetch_page(&self, request: PageRequest) -> Result<FetchedPage<Article>, LoadError> {
      assert_eq!(request.page, 1);
      let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
      if call <= self.failures {
        return Err(LoadError::Transport("connection reset".into()));
      }
      Ok(FetchedPage {
        items: self.articles.lock().unwrap().clone(),
        total_results: None,
      })
    }
  }

  type TestJob = SyncJob<Article, SqliteStore<Article>, Arc<FlakyFeed>>;

  fn job(feed: FlakyFeed) -> (TestJob, Arc<SqliteStore<Article>>, Arc<FlakyFeed>, Arc<RecordingNotifier>) {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let feed = Arc::new(feed);
    let notifier = Arc::new(RecordingNotifier::default());
    let job = SyncJob::new(
      Arc::clone(&store),
      Arc::clone(&feed),
      Arc::clone(&notifier) as Arc<dyn Notifier>,
      20,
      3,
    );
    (job, store, feed, notifier)
  }

  #[tokio::test]
  async fn test_success_commits_and_notifies() {
    let (job, store, _, notifier) = job(FlakyFeed::new(0, vec![article(1), article(2)]));

    assert_eq!(job.run(1).await, SyncOutcome::Success { new_items: 2 });
    assert_eq!(store.count().unwrap(), 2);

    let key = store.page_key("https://news.example/1").unwrap().unwrap();
    assert_eq!((key.prev_key, key.next_key), (None, Some(2)));

    let sent = notifier.sent.lock().unwrap();
    assert_eq!(
      sent.as_slice(),
      &[(SYNC_TITLE.to_string(), "Found 2 new headlines!".to_string())]
    );
  }

  #[tokio::test]
  async fn test_empty_batch_does_not_notify() {
    let (job, _, _, notifier) = job(FlakyFeed::new(0, vec![]));
    assert_eq!(job.run(1).await, SyncOutcome::Success { new_items: 0 });
    assert!(notifier.sent.lock().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_rerun_keeps_bookmarks_and_rows() {
    let (job, store, _, _) = job(FlakyFeed::new(0, vec![article(1), article(2)]));
    job.run(1).await;
    store.set_bookmark("https://news.example/2", true).unwrap();

    job.run(1).await;

    assert_eq!(store.count().unwrap(), 2);
    let bookmarked = store.ordered(ItemFilter::Bookmarked).unwrap();
    assert_eq!(bookmarked.len(), 1);
    assert_eq!(bookmarked[0].item.url, "https://news.example/2");
  }

  #[tokio::test]
  async fn test_failures_retry_then_give_up() {
    let (job, store, _, notifier) = job(FlakyFeed::new(10, vec![article(1)]));

    assert_eq!(job.run(1).await, SyncOutcome::Retry { attempts: 1 });
    assert_eq!(job.run(2).await, SyncOutcome::Retry { attempts: 2 });
    assert_eq!(job.run(3).await, SyncOutcome::Failure { attempts: 3 });
    assert_eq!(store.count().unwrap(), 0);
    assert!(notifier.sent.lock().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_append_keeps_advancing_after_sync() {
    use crate::cache::mediator::tests::ScriptedFetcher;
    use crate::cache::storage::tests::Note;
    use crate::cache::CachedPager;

    let store = Arc::new(SqliteStore::<Note>::in_memory().unwrap());
    let feed = Arc::new(
      ScriptedFetcher::default()
        .with_page(1, &["a", "b"])
        .with_page(2, &["c", "d"])
        .with_page(3, &["e", "f"]),
    );
    let pager = CachedPager::new(Arc::clone(&store), Arc::clone(&feed), 2);
    pager.refresh().await;
    pager.append().await;

    let sync = SyncJob::new(
      Arc::clone(&store),
      Arc::new(ScriptedFetcher::default().with_page(1, &["n", "a"])),
      Arc::new(RecordingNotifier::default()) as Arc<dyn Notifier>,
      2,
      3,
    );
    assert_eq!(sync.run(1).await, SyncOutcome::Success { new_items: 2 });

    assert!(!pager.append().await.is_end_of_data());
    assert!(pager.append().await.is_end_of_data());
    assert!(pager.prepend().await.is_end_of_data());

    let pages: Vec<u32> = feed.requests.lock().unwrap().iter().map(|r| r.page).collect();
    assert_eq!(pages, vec![1, 2, 3, 4]);
    let order: Vec<String> = store
      .ordered(ItemFilter::All)
      .unwrap()
      .into_iter()
      .map(|c| c.item.id)
      .collect();
    assert_eq!(order, vec!["n", "a", "b", "c", "d", "e", "f"]);
    let key = store.page_key("a").unwrap().unwrap();
    assert_eq!((key.prev_key, key.next_key), (None, Some(2)));
  }
}
