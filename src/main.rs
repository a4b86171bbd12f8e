mod app;
mod cache;
mod commands;
mod config;
mod db;
mod error;
mod event;
mod logging;
mod news;
mod prefs;
mod search;
mod sync;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "newsflow")]
#[command(about = "An offline-first headline reader with background sync")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/newsflow/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Mirror logs to stderr
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
  /// Show top headlines, from cache when available
  Headlines {
    /// Discard the cache and load page 1 again
    #[arg(long)]
    refresh: bool,

    /// Load this many further pages
    #[arg(long, default_value_t = 0)]
    more: u32,

    /// Try to load the page before the first cached one
    #[arg(long)]
    prepend: bool,

    /// List from this position on
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    from: u32,
  },

  /// Search all articles (results are not cached)
  Search {
    /// Search terms
    #[arg(required_unless_present = "interactive")]
    query: Option<String>,

    /// Number of pages to load
    #[arg(long, default_value_t = 1)]
    pages: u32,

    /// Read queries and commands from stdin
    #[arg(short, long, conflicts_with = "query")]
    interactive: bool,
  },

  /// List bookmarked articles
  Bookmarks,

  /// Bookmark a cached article by URL
  Bookmark {
    url: String,

    /// Remove the bookmark instead
    #[arg(long)]
    remove: bool,
  },

  /// Show one cached article
  Show { url: String },

  /// Refresh the headline cache in the background
  Sync {
    /// Run a single sync and exit
    #[arg(long)]
    once: bool,
  },

  /// View or change preferences
  Settings {
    #[arg(long, value_enum)]
    theme: Option<prefs::Theme>,

    /// Hours between background syncs
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    interval: Option<u32>,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let _log_guard = logging::init(&db::data_dir()?.join("logs"), args.verbose)?;

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;

  let app = app::App::new(config)?;

  match args.command {
    Commands::Headlines {
      refresh,
      more,
      prepend,
      from,
    } => app.headlines(refresh, more, prepend, from as usize).await?,
    Commands::Search {
      interactive: true, ..
    } => app.search_interactive().await?,
    Commands::Search { query, pages, .. } => {
      app.search(query.as_deref().unwrap_or_default(), pages).await?
    }
    Commands::Bookmarks => app.bookmarks()?,
    Commands::Bookmark { url, remove } => app.bookmark(&url, remove)?,
    Commands::Show { url } => app.show(&url)?,
    Commands::Sync { once } => app.sync(once).await?,
    Commands::Settings { theme, interval } => app.settings(theme, interval)?,
  }

  Ok(())
}
