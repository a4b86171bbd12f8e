use crate::cache::{
  CacheResult, CacheSource, CacheStore, CachedItem, CachedPager, ItemFilter, LoadResult,
  SqliteStore,
};
use crate::commands::{self, Input};
use crate::config::Config;
use crate::db::Database;
use crate::event::{Event, EventHandler};
use crate::news::{Article, HeadlineFilter, HeadlinesFetcher, NewsClient, SearchFetcher, SearchFilter};
use crate::prefs::{PreferenceStore, Settings, Theme, YamlPreferences};
use crate::search::{FetcherFactory, QueryFetcher, SearchEvent, SearchSession};
use crate::sync::{
  run_with_retries, ConsoleNotifier, Notifier, RetryPolicy, SyncJob, SyncOutcome, SyncRunner,
  SYNC_WORK_NAME,
};
use chrono::DateTime;
use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub type ArticleStore = SqliteStore<Article>;

/// How often a running sync re-reads the interval preference
const PREFS_POLL: Duration = Duration::from_secs(60);

/// Main application state
pub struct App {
  /// Application configuration
  config: Config,

  /// Article cache shared by headlines, bookmarks and sync
  store: Arc<ArticleStore>,

  prefs: YamlPreferences,
}

impl App {
  pub fn new(config: Config) -> Result<Self> {
    let db = match &config.database {
      Some(path) => Database::open_at(path)?,
      None => Database::open()?,
    };
    debug!(database = ?config.database, "cache opened");

    Ok(Self {
      config,
      store: Arc::new(SqliteStore::new(db)),
      prefs: YamlPreferences::open_default()?,
    })
  }

  fn client(&self) -> Result<NewsClient> {
    NewsClient::new(&self.config.api, Config::get_api_key()?)
  }

  fn headlines_fetcher(&self) -> Result<HeadlinesFetcher> {
    let filter = HeadlineFilter {
      country: self.config.headlines.country.clone(),
      category: self.config.headlines.category.clone(),
    };
    Ok(HeadlinesFetcher::new(self.client()?, filter))
  }

  /// Show cached headlines from position `from` (1-based), loading more
  /// from the network as asked.
  pub async fn headlines(&self, refresh: bool, more: u32, prepend: bool, from: usize) -> Result<()> {
    let mut pager = CachedPager::new(
      Arc::clone(&self.store),
      self.headlines_fetcher()?,
      self.config.page_size,
    );
    let skip = from.saturating_sub(1);
    if skip > 0 {
      pager.set_anchor(Some(skip));
    }
    let mut feed = pager.subscribe()?;

    let opened = if refresh {
      pager.refresh_or_offline().await?
    } else {
      pager.start().await?
    };
    report_source(&opened);

    if prepend {
      report_load("newer page", &pager.prepend().await);
    }

    for _ in 0..more {
      let result = pager.append().await;
      report_load("next page", &result);
      if result.is_end_of_data() || result.error().is_some() {
        break;
      }
    }

    // Every commit has already been pushed; the last view is current.
    let mut view = Vec::new();
    while let Some(latest) = feed.try_next() {
      view = latest;
    }
    if skip >= view.len() && !view.is_empty() {
      println!("Only {} headlines cached", view.len());
    }
    print_articles(view.get(skip..).unwrap_or_default(), skip);
    Ok(())
  }

  fn search_session(&self) -> Result<SearchSession<Article>> {
    let client = self.client()?;
    let sort_by = self.config.search.sort_by.clone();
    let factory: FetcherFactory<Article> = Box::new(move |query: &str| {
      let filter = SearchFilter {
        query: query.to_string(),
        sort_by: sort_by.clone(),
      };
      Arc::new(SearchFetcher::new(client.clone(), filter)) as QueryFetcher<Article>
    });

    Ok(SearchSession::new(
      factory,
      self.config.search.debounce(),
      self.config.search.min_query_len,
      self.config.page_size,
    ))
  }

  /// One-shot search, fetching up to `pages` pages.
  pub async fn search(&self, query: &str, pages: u32) -> Result<()> {
    let mut session = self.search_session()?;
    session.on_input(query);
    if session.search_now().is_empty() {
      return Err(eyre!(
        "Query must be at least {} characters",
        self.config.search.min_query_len
      ));
    }

    let mut loaded = 1;
    loop {
      for event in session.settle().await {
        if let SearchEvent::Failed { page, error, .. } = event {
          return Err(eyre!("Search page {} failed: {}", page, error));
        }
      }
      if loaded >= pages || !session.load_more() {
        break;
      }
      loaded += 1;
    }

    print_plain(session.items(), 0);
    if session.items().is_empty() {
      println!("No results for \"{}\"", query);
    }
    Ok(())
  }

  /// Line-oriented search: text edits the query, `:commands` drive paging.
  pub async fn search_interactive(&self) -> Result<()> {
    let mut session = self.search_session()?;
    let mut events = EventHandler::new(Duration::from_millis(100));

    println!("Type to search, :help for commands");

    while let Some(event) = events.next().await {
      match event {
        Event::Tick => {
          for event in session.tick() {
            print_search_event(&session, event);
          }
        }
        Event::Line(line) => match commands::parse_line(&line) {
          Input::Query(query) => session.on_input(query),
          Input::Command("go") => {
            let started = session.search_now();
            if started.is_empty() {
              println!(
                "Query must be at least {} characters",
                self.config.search.min_query_len
              );
            }
            for event in started {
              print_search_event(&session, event);
            }
          }
          Input::Command("more") => {
            if !session.load_more() {
              println!("Nothing more to load");
            }
          }
          Input::Command("retry") => {
            if !session.retry() {
              println!("Nothing to retry");
            }
          }
          Input::Command("quit") => break,
          Input::Command(_) => println!("{}", commands::help_text()),
          Input::Unknown(text) => println!("Unknown command :{}", text),
        },
        Event::Eof => break,
      }
    }

    Ok(())
  }

  pub fn bookmarks(&self) -> Result<()> {
    let bookmarked = self.store.ordered(ItemFilter::Bookmarked)?;
    if bookmarked.is_empty() {
      println!("No bookmarks yet");
    }
    print_articles(&bookmarked, 0);
    Ok(())
  }

  pub fn bookmark(&self, url: &str, remove: bool) -> Result<()> {
    if !self.store.set_bookmark(url, !remove)? {
      return Err(eyre!("Article not in cache: {}", url));
    }
    info!(url, bookmarked = !remove, "bookmark updated");
    println!("{} {}", if remove { "Removed" } else { "Bookmarked" }, url);
    Ok(())
  }

  pub fn show(&self, url: &str) -> Result<()> {
    let cached = self
      .store
      .get(url)?
      .ok_or_else(|| eyre!("Article not in cache: {}", url))?;
    print_detail(&cached);
    Ok(())
  }

  /// Background sync: once, or on the preferred interval until Ctrl-C.
  pub async fn sync(&self, once: bool) -> Result<()> {
    let notifier: Arc<dyn Notifier> = Arc::new(ConsoleNotifier);
    let job = Arc::new(SyncJob::new(
      Arc::clone(&self.store),
      self.headlines_fetcher()?,
      notifier,
      self.config.page_size,
      self.config.sync.max_attempts,
    ));

    if once {
      return match run_with_retries(&*job, &RetryPolicy::default()).await {
        SyncOutcome::Success { new_items } => {
          println!("Synced {} headlines", new_items);
          Ok(())
        }
        SyncOutcome::Failure { attempts } | SyncOutcome::Retry { attempts } => {
          Err(eyre!("Sync failed after {} attempts", attempts))
        }
      };
    }

    let mut runner = SyncRunner::new(RetryPolicy::default());
    let interval = self.prefs.get().sync_interval();
    runner.register(SYNC_WORK_NAME, interval, job.clone());
    println!(
      "Syncing every {}h, press Ctrl-C to stop",
      interval.as_secs() / 3600
    );

    let mut prefs_poll = tokio::time::interval(PREFS_POLL);
    prefs_poll.tick().await;
    loop {
      tokio::select! {
        signal = tokio::signal::ctrl_c() => {
          signal.map_err(|e| eyre!("Failed to listen for Ctrl-C: {}", e))?;
          break;
        }
        _ = prefs_poll.tick() => {
          // Same interval keeps the running schedule.
          runner.register(SYNC_WORK_NAME, self.prefs.get().sync_interval(), job.clone());
        }
      }
    }

    runner.cancel(SYNC_WORK_NAME);
    Ok(())
  }

  pub fn settings(&self, theme: Option<Theme>, interval: Option<u32>) -> Result<()> {
    let current = self.prefs.get();
    let updated = Settings {
      theme: theme.unwrap_or(current.theme),
      sync_interval_hours: interval.unwrap_or(current.sync_interval_hours),
    };

    if updated != current {
      self.prefs.set(&updated)?;
    }

    println!("theme: {:?}", updated.theme);
    println!("sync interval: {}h", updated.sync_interval_hours);
    Ok(())
  }
}

fn report_source(result: &CacheResult<Vec<CachedItem<Article>>>) {
  match (result.source, &result.error) {
    (CacheSource::Offline, Some(e)) => eprintln!("Offline, showing cached headlines ({})", e),
    (CacheSource::Cache, _) => eprintln!("Showing cached headlines (use --refresh to update)"),
    _ => {}
  }
}

fn report_load(what: &str, result: &LoadResult) {
  match result {
    LoadResult::Error(e) if e.is_retryable() => {
      eprintln!("Loading {} failed: {} (try again later)", what, e)
    }
    LoadResult::Error(e) => eprintln!("Loading {} failed: {}", what, e),
    LoadResult::Success { end_of_data: true } => eprintln!("No {} available", what),
    LoadResult::Success { .. } => {}
  }
}

fn print_search_event(session: &SearchSession<Article>, event: SearchEvent) {
  match event {
    SearchEvent::Started { query } => println!("Searching for \"{}\"...", query),
    SearchEvent::Cleared => println!("Results cleared"),
    SearchEvent::PageLoaded {
      added, end_of_data, ..
    } => {
      let items = session.items();
      let start = items.len() - added;
      print_plain(&items[start..], start);
      if end_of_data {
        println!("-- end of results ({} total)", items.len());
      } else {
        println!("-- :more for the next page");
      }
    }
    SearchEvent::Failed { page, error, .. } => {
      println!("Page {} failed: {} (:retry)", page, error)
    }
  }
}

fn print_articles(items: &[CachedItem<Article>], offset: usize) {
  for (index, cached) in items.iter().enumerate() {
    print_line(offset + index, &cached.item, cached.bookmarked);
  }
}

/// Search results are never bookmarked.
fn print_plain(items: &[Article], offset: usize) {
  for (index, article) in items.iter().enumerate() {
    print_line(offset + index, article, false);
  }
}

fn print_line(index: usize, article: &Article, bookmarked: bool) {
  let marker = if bookmarked { "*" } else { " " };
  println!(
    "{:>3}.{} {} ({}, {})",
    index + 1,
    marker,
    article.title,
    article.source.name,
    display_time(&article.published_at)
  );
  println!("      {}", article.url);
}

fn print_detail(cached: &CachedItem<Article>) {
  let article = &cached.item;
  println!("{}", article.title);
  println!("{} | {}", article.source.name, display_time(&article.published_at));
  if let Some(author) = &article.author {
    println!("by {}", author);
  }
  if cached.bookmarked {
    println!("[bookmarked]");
  }
  println!("{}", article.url);
  if let Some(description) = &article.description {
    println!("\n{}", description);
  }
  if let Some(content) = &article.content {
    println!("\n{}", content);
  }
}

fn display_time(published_at: &str) -> String {
  DateTime::parse_from_rfc3339(published_at)
    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
    .unwrap_or_else(|_| published_at.to_string())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_display_time() {
    assert_eq!(display_time("2024-05-01T12:30:00Z"), "2024-05-01 12:30");
    assert_eq!(display_time("garbage"), "garbage");
  }
}
