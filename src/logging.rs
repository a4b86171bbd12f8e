use color_eyre::{eyre::eyre, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable holding the log filter directives
pub const LOG_ENV: &str = "NEWSFLOW_LOG";
const DEFAULT_FILTER: &str = "newsflow=info";

/// Initialize tracing.
///
/// Logs go to a daily rolling file in `log_dir` so stdout stays clean for
/// command output. With `verbose` they are mirrored to stderr. The returned
/// guard flushes the file writer on drop and must be held for the life of
/// the program.
pub fn init(log_dir: &Path, verbose: bool) -> Result<WorkerGuard> {
  std::fs::create_dir_all(log_dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", log_dir.display(), e))?;

  let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

  let appender = tracing_appender::rolling::daily(log_dir, "newsflow.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  let file_layer = fmt::layer().with_writer(writer).with_ansi(false);
  let stderr_layer = verbose.then(|| {
    fmt::layer()
      .with_writer(std::io::stderr)
      .with_target(false)
  });

  tracing_subscriber::registry()
    .with(filter)
    .with(file_layer)
    .with(stderr_layer)
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

  Ok(guard)
}
