//! CLI entry point: the host environment that delivers lifecycle events to
//! the cache controller.

use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use araise_offline::app::App;
use araise_offline::config::Config;

#[derive(Parser, Debug)]
#[command(name = "araise-offline")]
#[command(about = "Offline cache controller for the ARAISE web app")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/araise-offline/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Fetch the seed asset list into a new cache generation
  Install {
    /// Leave the generation waiting instead of activating it
    #[arg(long)]
    wait: bool,
  },
  /// Promote the installed generation and purge stale ones
  Activate,
  /// Serve a request through the worker (cache first, then network)
  Fetch {
    /// Absolute URL, or a path resolved against the configured origin
    url: String,
    /// Treat the request as a top-level navigation
    #[arg(long)]
    navigate: bool,
  },
  /// List cache generations and their entries
  Status,
  /// Fire a background sync event
  Sync {
    /// Sync tag (defaults to the configured tag)
    #[arg(short, long)]
    tag: Option<String>,
  },
  /// Deliver a push payload (JSON with title/body/primaryKey)
  Push { payload: String },
  /// Post a page message to the worker, e.g. '{"action":"skipWaiting"}'
  Message { payload: String },
}

/// Log to a daily file in the data directory so CLI output stays clean.
fn init_tracing() -> Result<tracing_appender::non_blocking::WorkerGuard> {
  let log_dir = dirs::data_dir()
    .map(|d| d.join("araise-offline"))
    .unwrap_or_else(|| PathBuf::from("."));
  std::fs::create_dir_all(&log_dir)?;

  let file = tracing_appender::rolling::daily(&log_dir, "araise-offline.log");
  let (writer, guard) = tracing_appender::non_blocking(file);

  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("araise_offline=info")),
    )
    .with_writer(writer)
    .with_ansi(false)
    .init();

  Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _guard = init_tracing()?;

  // Load configuration
  let config = Config::load(args.config.as_deref())?;

  let app = App::new(config)?;
  match args.command {
    Command::Install { wait } => app.install(wait).await?,
    Command::Activate => app.activate().await?,
    Command::Fetch { url, navigate } => app.fetch(&url, navigate).await?,
    Command::Status => app.status()?,
    Command::Sync { tag } => app.sync(tag).await?,
    Command::Push { payload } => app.push(&payload).await?,
    Command::Message { payload } => app.message(&payload).await?,
  }

  Ok(())
}
