//! Periodic background sync of the headline cache.

mod job;
mod notify;
mod runner;

pub use job::{SyncJob, SyncOutcome};
pub use notify::{ConsoleNotifier, Notifier};
pub use runner::{run_with_retries, RetryPolicy, SyncRunner};

/// Name of the headline sync registration.
pub const SYNC_WORK_NAME: &str = "news_sync_work";
