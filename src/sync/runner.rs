//! In-process periodic runner with unique named registrations.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::job::SyncOutcome;

/// Work the runner can schedule.
#[async_trait]
pub trait PeriodicJob: Send + Sync {
  /// Run one attempt; `attempt` starts at 1 for every scheduled run.
  async fn run(&self, attempt: u32) -> SyncOutcome;
}

/// Backoff between retries of one scheduled run.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
  pub initial_delay_ms: u64,
  pub max_delay_ms: u64,
  pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      initial_delay_ms: 30_000,
      max_delay_ms: 600_000,
      backoff_multiplier: 2.0,
    }
  }
}

impl RetryPolicy {
  fn next_delay(&self, delay_ms: u64) -> u64 {
    (((delay_ms as f64) * self.backoff_multiplier) as u64).min(self.max_delay_ms)
  }
}

/// Run a job until it stops asking for a retry.
///
/// The job decides when to give up, so this always terminates for a job
/// that eventually returns `Success` or `Failure`.
pub async fn run_with_retries(job: &dyn PeriodicJob, policy: &RetryPolicy) -> SyncOutcome {
  let mut attempt = 1;
  let mut delay_ms = policy.initial_delay_ms;

  loop {
    match job.run(attempt).await {
      SyncOutcome::Retry { attempts } => {
        debug!(attempts, delay_ms, "retrying after backoff");
        sleep(Duration::from_millis(delay_ms)).await;
        delay_ms = policy.next_delay(delay_ms);
        attempt += 1;
      }
      outcome => return outcome,
    }
  }
}

/// What `register` did with an existing registration of the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
  Scheduled,
  /// Same interval: the running schedule was left alone.
  Kept,
  /// Different interval: the old schedule was cancelled.
  Replaced,
}

struct Scheduled {
  interval: Duration,
  handle: JoinHandle<()>,
}

/// Runs registered jobs on fixed intervals until cancelled or dropped.
pub struct SyncRunner {
  policy: RetryPolicy,
  scheduled: HashMap<String, Scheduled>,
}

impl SyncRunner {
  pub fn new(policy: RetryPolicy) -> Self {
    Self {
      policy,
      scheduled: HashMap::new(),
    }
  }

  /// Schedule `job` every `interval` under a unique name. The first run
  /// starts immediately.
  pub fn register(&mut self, name: &str, interval: Duration, job: Arc<dyn PeriodicJob>) -> Registration {
    let result = match self.scheduled.get(name) {
      Some(existing) if existing.interval == interval && !existing.handle.is_finished() => {
        debug!(name, ?interval, "keeping existing schedule");
        return Registration::Kept;
      }
      Some(_) => Registration::Replaced,
      None => Registration::Scheduled,
    };

    if let Some(previous) = self.scheduled.remove(name) {
      previous.handle.abort();
    }

    info!(name, ?interval, ?result, "scheduling periodic job");
    let handle = tokio::spawn(run_periodically(name.to_string(), interval, job, self.policy.clone()));
    self.scheduled.insert(name.to_string(), Scheduled { interval, handle });
    result
  }

  /// Stop a schedule. Returns false if nothing was registered.
  pub fn cancel(&mut self, name: &str) -> bool {
    match self.scheduled.remove(name) {
      Some(scheduled) => {
        scheduled.handle.abort();
        true
      }
      None => false,
    }
  }

  pub fn interval(&self, name: &str) -> Option<Duration> {
    self.scheduled.get(name).map(|s| s.interval)
  }
}

impl Drop for SyncRunner {
  fn drop(&mut self) {
    for scheduled in self.scheduled.values() {
      scheduled.handle.abort();
    }
  }
}

async fn run_periodically(name: String, interval: Duration, job: Arc<dyn PeriodicJob>, policy: RetryPolicy) {
  let mut ticker = tokio::time::interval(interval);
  ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

  loop {
    ticker.tick().await;
    match run_with_retries(job.as_ref(), &policy).await {
      SyncOutcome::Success { new_items } => debug!(name = %name, new_items, "periodic run finished"),
      SyncOutcome::Failure { attempts } => {
        warn!(name = %name, attempts, "periodic run failed, waiting for next interval")
      }
      SyncOutcome::Retry { .. } => {}
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::SqliteStore;
  use crate::news::types::Article;
  use crate::sync::job::tests::{article, FlakyFeed};
  use crate::sync::job::SyncJob;
  use crate::sync::notify::tests::RecordingNotifier;
  use crate::sync::notify::Notifier;
  use std::sync::atomic::{AtomicU32, Ordering};

  fn fast_policy() -> RetryPolicy {
    RetryPolicy {
      initial_delay_ms: 1,
      max_delay_ms: 4,
      backoff_multiplier: 2.0,
    }
  }

  fn sync_job(feed: Arc<FlakyFeed>) -> SyncJob<Article, SqliteStore<Article>, Arc<FlakyFeed>> {
    SyncJob::new(
      Arc::new(SqliteStore::in_memory().unwrap()),
      feed,
      Arc::new(RecordingNotifier::default()) as Arc<dyn Notifier>,
      20,
      3,
    )
  }

  /// Counts runs and always succeeds.
  #[derive(Default)]
  struct CountingJob {
    runs: AtomicU32,
  }

  #[async_trait]
  impl PeriodicJob for CountingJob {
    async fn run(&self, _attempt: u32) -> SyncOutcome {
      self.runs.fetch_add(1, Ordering::SeqCst);
      SyncOutcome::Success { new_items: 0 }
    }
  }

  #[test]
  fn test_backoff_doubles_up_to_cap() {
    let policy = RetryPolicy::default();
    assert_eq!(policy.next_delay(30_000), 60_000);
    assert_eq!(policy.next_delay(400_000), 600_000);
  }

  #[tokio::test]
  async fn test_three_failures_end_in_failure_without_fourth_attempt() {
    let feed = Arc::new(FlakyFeed::new(u32::MAX, vec![article(1)]));
    let job = sync_job(Arc::clone(&feed));

    let outcome = run_with_retries(&job, &fast_policy()).await;

    assert_eq!(outcome, SyncOutcome::Failure { attempts: 3 });
    assert_eq!(feed.calls.load(Ordering::SeqCst), 3);
  }

  #[tokio::test]
  async fn test_recovers_within_attempt_budget() {
    let feed = Arc::new(FlakyFeed::new(2, vec![article(1), article(2), article(3)]));
    let job = sync_job(Arc::clone(&feed));

    let outcome = run_with_retries(&job, &fast_policy()).await;

    assert_eq!(outcome, SyncOutcome::Success { new_items: 3 });
    assert_eq!(feed.calls.load(Ordering::SeqCst), 3);
  }

  #[tokio::test]
  async fn test_register_same_interval_keeps_schedule() {
    let mut runner = SyncRunner::new(fast_policy());
    let job = Arc::new(CountingJob::default());

    let hour = Duration::from_secs(3600);
    assert_eq!(runner.register("sync", hour, job.clone()), Registration::Scheduled);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(runner.register("sync", hour, job.clone()), Registration::Kept);
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Only the immediate first tick ran; keeping did not restart it.
    assert_eq!(job.runs.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_register_new_interval_replaces_schedule() {
    let mut runner = SyncRunner::new(fast_policy());
    let job = Arc::new(CountingJob::default());

    runner.register("sync", Duration::from_secs(3600), job.clone());
    let outcome = runner.register("sync", Duration::from_secs(7200), job.clone());

    assert_eq!(outcome, Registration::Replaced);
    assert_eq!(runner.interval("sync"), Some(Duration::from_secs(7200)));
  }

  #[tokio::test]
  async fn test_cancel() {
    let mut runner = SyncRunner::new(fast_policy());
    runner.register("sync", Duration::from_secs(3600), Arc::new(CountingJob::default()));

    assert!(runner.cancel("sync"));
    assert!(!runner.cancel("sync"));
    assert_eq!(runner.interval("sync"), None);
  }
}
