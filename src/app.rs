use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use url::Url;

use crate::cache::{CacheStore, SqliteStore};
use crate::config::Config;
use crate::http::Request;
use crate::net::HttpFetcher;
use crate::notify::LogNotifier;
use crate::worker::events::{MessageCommand, SyncEvent};
use crate::worker::{CacheController, WorkerState};

/// Host application.
///
/// Wires the controller to a persistent store and the real network, and
/// delivers one lifecycle event per CLI invocation. The controller is the
/// only writer of the cache; the app reads store listings for `status`.
pub struct App {
  config: Config,
  store: Arc<SqliteStore>,
  controller: CacheController<SqliteStore, HttpFetcher>,
}

impl App {
  pub fn new(config: Config) -> Result<Self> {
    let path = match &config.store.path {
      Some(p) => p.clone(),
      None => SqliteStore::default_path()?,
    };

    let store = Arc::new(SqliteStore::open(&path)?);
    let fetcher = Arc::new(HttpFetcher::new(&config)?);
    let controller = CacheController::new(
      config.clone(),
      Arc::clone(&store),
      fetcher,
      Arc::new(LogNotifier),
    )?;

    Ok(Self {
      config,
      store,
      controller,
    })
  }

  /// Install the configured generation; activates it unless `wait` is set.
  pub async fn install(&self, wait: bool) -> Result<()> {
    self.controller.on_install().await?;

    if wait {
      println!(
        "Generation {} installed, waiting for activation",
        self.config.cache.version
      );
      return Ok(());
    }

    self.controller.on_activate().await?;
    println!("Generation {} installed and active", self.config.cache.version);
    Ok(())
  }

  /// Promote the installed generation and purge stale ones.
  pub async fn activate(&self) -> Result<()> {
    self.controller.on_activate().await?;
    println!("Generation {} active", self.config.cache.version);
    Ok(())
  }

  /// Serve a request through the worker, cache first.
  pub async fn fetch(&self, url: &str, navigate: bool) -> Result<()> {
    if self.controller.state()? == WorkerState::Parsed {
      return Err(eyre!(
        "No cache generation installed; run `araise-offline install` first"
      ));
    }

    // A page load drives activation before the worker serves it.
    self.controller.on_activate().await?;

    let url = self.resolve_url(url)?;
    let request = if navigate {
      Request::navigation(url)
    } else {
      Request::get(url)
    };

    let response = self.controller.on_fetch(&request).await?;
    let size = response.body.as_ref().map(|b| b.len()).unwrap_or(0);
    println!("{} {} ({} bytes)", response.status, response.status_text, size);
    Ok(())
  }

  /// List cache generations and their entries.
  pub fn status(&self) -> Result<()> {
    let names = self.store.names()?;
    if names.is_empty() {
      println!("No cache generations");
      return Ok(());
    }

    for name in names {
      let entries = self.store.entries(&name)?;
      let marker = if name == self.config.cache.version {
        " (current)"
      } else {
        ""
      };
      println!("{}{}: {} entries", name, marker, entries.len());
      for entry in entries {
        println!(
          "  {}  cached {}",
          entry.url,
          entry.cached_at.format("%Y-%m-%d %H:%M:%S")
        );
      }
    }
    Ok(())
  }

  /// Fire a background sync event.
  pub async fn sync(&self, tag: Option<String>) -> Result<()> {
    let tag = tag.unwrap_or_else(|| self.config.sync.tag.clone());
    self.controller.on_sync(SyncEvent::new(tag, false)).await
  }

  /// Deliver a raw push payload.
  pub async fn push(&self, payload: &str) -> Result<()> {
    self.controller.on_push(payload.as_bytes()).await
  }

  /// Post a page message to the worker.
  pub async fn message(&self, payload: &str) -> Result<()> {
    let command = MessageCommand::parse(payload.as_bytes())?;
    self.controller.on_message(command).await
  }

  fn resolve_url(&self, url: &str) -> Result<Url> {
    if url.starts_with('/') {
      self
        .config
        .origin_url()?
        .join(url)
        .map_err(|e| eyre!("Invalid path {}: {}", url, e))
    } else {
      Url::parse(url).map_err(|e| eyre!("Invalid URL {}: {}", url, e))
    }
  }
}
