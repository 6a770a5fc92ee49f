//! The offline cache controller.
//!
//! Owns the versioned cache generations and answers the lifecycle events of
//! the hosting environment: install populates a new generation from the seed
//! asset list, activate purges stale generations and claims control, fetch
//! serves cache-first with network fallback. Every handler is an `async fn`
//! whose future the host must await before it may suspend the worker; that
//! is the whole keep-alive contract.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use color_eyre::{eyre::eyre, Report, Result};
use futures::future::try_join_all;
use tracing::{debug, info, warn};

use crate::cache::CacheStore;
use crate::config::Config;
use crate::event::WorkerEvent;
use crate::http::{Request, Response};
use crate::net::Fetch;
use crate::notify::Notifier;

use super::events::{
  MessageCommand, Notification, NotificationClick, PushPayload, SyncEvent, ACTION_CLOSE,
};
use super::state::{is_valid_transition, WorkerState};

/// Service-worker style cache controller.
///
/// The store, the network fetcher and the notification surface are injected;
/// the configured version tag names the one generation this controller
/// considers current.
pub struct CacheController<S, F> {
  config: Config,
  store: Arc<S>,
  fetcher: Arc<F>,
  notifier: Arc<dyn Notifier>,
  state: Mutex<WorkerState>,
}

impl<S: CacheStore, F: Fetch> CacheController<S, F> {
  /// Create a controller over the given collaborators.
  ///
  /// When the store already holds the current generation (a previous host
  /// process installed it), the controller starts out waiting in
  /// `Installed` instead of `Parsed`.
  pub fn new(
    config: Config,
    store: Arc<S>,
    fetcher: Arc<F>,
    notifier: Arc<dyn Notifier>,
  ) -> Result<Self> {
    let state = if store.has(&config.cache.version)? {
      WorkerState::Installed
    } else {
      WorkerState::Parsed
    };

    Ok(Self {
      config,
      store,
      fetcher,
      notifier,
      state: Mutex::new(state),
    })
  }

  /// Current lifecycle state.
  pub fn state(&self) -> Result<WorkerState> {
    self
      .state
      .lock()
      .map(|s| *s)
      .map_err(|e| eyre!("State lock poisoned: {}", e))
  }

  fn transition(&self, to: WorkerState) -> Result<()> {
    let mut state = self
      .state
      .lock()
      .map_err(|e| eyre!("State lock poisoned: {}", e))?;

    let from = *state;
    if !is_valid_transition(from, to) {
      return Err(eyre!("Invalid worker state transition: {} -> {}", from, to));
    }

    debug!(from = %from, to = %to, "state transition");
    *state = to;
    Ok(())
  }

  /// Dispatch a host-delivered event to its handler.
  pub async fn handle(&self, event: WorkerEvent) -> Result<Option<Response>> {
    match event {
      WorkerEvent::Install => self.on_install().await.map(|_| None),
      WorkerEvent::Activate => self.on_activate().await.map(|_| None),
      WorkerEvent::Fetch(request) => self.on_fetch(&request).await.map(Some),
      WorkerEvent::Message(command) => self.on_message(command).await.map(|_| None),
      WorkerEvent::Sync(event) => self.on_sync(event).await.map(|_| None),
      WorkerEvent::Push(payload) => self.on_push(&payload).await.map(|_| None),
      WorkerEvent::NotificationClick(click) => {
        self.on_notification_click(click).await.map(|_| None)
      }
    }
  }

  /// Install the current generation.
  ///
  /// Fetches the full seed asset list and writes it into the generation in
  /// one batch. Any seed asset that fails to fetch, or answers with a
  /// non-cacheable response, rejects the whole install; the store is left
  /// exactly as it was and any previously installed generation keeps
  /// serving.
  pub async fn on_install(&self) -> Result<()> {
    self.transition(WorkerState::Installing)?;
    let generation = self.config.cache.version.clone();
    info!(
      generation = %generation,
      assets = self.config.cache.seed_assets.len(),
      "installing generation"
    );

    match self.install_batch(&generation).await {
      Ok(count) => {
        self.transition(WorkerState::Installed)?;
        info!(generation = %generation, entries = count, "generation installed, waiting");
        Ok(())
      }
      Err(e) => {
        let _ = self.transition(WorkerState::Redundant);
        Err(e.wrap_err(format!("Install of generation {} failed", generation)))
      }
    }
  }

  async fn install_batch(&self, generation: &str) -> Result<usize> {
    let requests = self
      .config
      .cache
      .seed_assets
      .iter()
      .map(|path| self.config.seed_request(path))
      .collect::<Result<Vec<Request>>>()?;

    let fetches = requests.into_iter().map(|request| async move {
      let response = self.fetcher.fetch(&request).await?;
      if !response.is_cacheable() {
        return Err(eyre!(
          "Seed asset {} is not cacheable (status {})",
          request.url,
          response.status
        ));
      }
      Ok::<(Request, Response), Report>((request, response))
    });

    let pairs = try_join_all(fetches).await?;

    // Every seed asset fetched; only now touch the store.
    self.store.open(generation)?;
    for (request, response) in &pairs {
      if let Err(e) = self.store.put(generation, request, response) {
        // Never leave a partially populated generation behind.
        let _ = self.store.delete(generation);
        return Err(eyre!("Failed to write seed entry {}: {}", request.url, e));
      }
    }

    Ok(pairs.len())
  }

  /// Activate the current generation: delete every generation whose name is
  /// not the current tag, then claim control of open pages.
  ///
  /// Activating an already-active controller is a no-op.
  pub async fn on_activate(&self) -> Result<()> {
    if self.state()? == WorkerState::Activated {
      debug!("already active, nothing to do");
      return Ok(());
    }

    self.transition(WorkerState::Activating)?;
    let current = self.config.cache.version.clone();

    match self.purge_stale(&current) {
      Ok(purged) => {
        self.transition(WorkerState::Activated)?;
        info!(generation = %current, purged, "activated, claiming clients");
        Ok(())
      }
      Err(e) => {
        let _ = self.transition(WorkerState::Redundant);
        Err(e.wrap_err(format!("Activation of generation {} failed", current)))
      }
    }
  }

  fn purge_stale(&self, current: &str) -> Result<usize> {
    let mut purged = 0;
    for name in self.store.names()? {
      // Never the current generation.
      if name != current && self.store.delete(&name)? {
        info!(generation = %name, "purged stale generation");
        purged += 1;
      }
    }
    Ok(purged)
  }

  /// Serve an intercepted request.
  ///
  /// Cache-first: a hit is returned without a network round-trip. On a miss
  /// a fresh copy of the request goes to the network; a cacheable response
  /// (status 200, same-origin, not redirected) is duplicated into the
  /// current generation before the original is returned. A network failure
  /// never escapes: navigations degrade to the cached root page and every
  /// other request to a synthesized 408.
  pub async fn on_fetch(&self, request: &Request) -> Result<Response> {
    let state = self.state()?;
    if !state.can_intercept_fetch() {
      return Err(eyre!("Worker is not active (state: {})", state));
    }

    let generation = &self.config.cache.version;

    match self.store.match_request(generation, request) {
      Ok(Some(cached)) => {
        debug!(url = %request.url, "cache hit");
        return Ok(cached);
      }
      Ok(None) => {}
      Err(e) => warn!(url = %request.url, "cache lookup failed, treating as miss: {}", e),
    }

    let outbound = request.copy();
    match self.fetcher.fetch(&outbound).await {
      Ok(response) => {
        if response.is_cacheable() {
          let duplicate = response.copy();
          if let Err(e) = self.store.put(generation, request, &duplicate) {
            // The response already on its way out is unaffected.
            warn!(url = %request.url, "cache write failed: {}", e);
          }
        }
        Ok(response)
      }
      Err(e) => {
        debug!(url = %request.url, "network fetch failed: {}", e);
        if request.navigate {
          if let Ok(Some(root)) = self.root_fallback() {
            return Ok(root);
          }
        }
        Ok(Response::timeout())
      }
    }
  }

  fn root_fallback(&self) -> Result<Option<Response>> {
    let root = self.config.seed_request(&self.config.cache.root)?;
    self
      .store
      .match_request(&self.config.cache.version, &root)
  }

  /// Handle a command posted by a controlled page.
  pub async fn on_message(&self, command: MessageCommand) -> Result<()> {
    match command {
      MessageCommand::SkipWaiting => {
        info!("skip-waiting requested, promoting waiting generation");
        // Promotion runs the normal activation (purge, then claim).
        self.on_activate().await
      }
    }
  }

  /// Run the background reconciliation task for a registered sync tag.
  ///
  /// Failures are contained here: the host owns the retry policy, so the
  /// event always resolves.
  pub async fn on_sync(&self, event: SyncEvent) -> Result<()> {
    if event.tag != self.config.sync.tag {
      debug!(tag = %event.tag, "ignoring unregistered sync tag");
      return Ok(());
    }

    info!(tag = %event.tag, last_chance = event.last_chance, "background sync");
    if let Err(e) = self.reconcile().await {
      warn!(tag = %event.tag, "background sync failed: {}", e);
    }
    Ok(())
  }

  /// Best-effort reconciliation. The deployment this controller serves keeps
  /// no offline write queue yet, so the flush is simulated by a fixed delay.
  async fn reconcile(&self) -> Result<()> {
    tokio::time::sleep(Duration::from_millis(self.config.sync.delay_ms)).await;
    Ok(())
  }

  /// Display a notification for a received push payload.
  pub async fn on_push(&self, raw: &[u8]) -> Result<()> {
    let payload = PushPayload::parse(raw);
    debug!(title = %payload.title, "push received");
    let notification = Notification::from_push(&payload, &self.config.notifications.icon);
    self.notifier.show(&notification)
  }

  /// Route a notification click: `close` dismisses, anything else opens the
  /// app root.
  pub async fn on_notification_click(&self, click: NotificationClick) -> Result<()> {
    match click.action.as_deref() {
      Some(ACTION_CLOSE) => {
        debug!("notification dismissed");
        Ok(())
      }
      _ => {
        let url = self.config.root_url()?;
        self.notifier.open_window(url.as_str())
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStore;
  use crate::http::ResponseKind;
  use crate::worker::events::ACTION_EXPLORE;
  use async_trait::async_trait;
  use std::collections::BTreeMap;
  use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
  use url::Url;

  /// Scripted fetcher: answers 200 same-origin bodies by default, with
  /// per-path failures, statuses and origins, and counts every call.
  #[derive(Default)]
  struct TestFetch {
    failing: Vec<String>,
    cross_origin: Vec<String>,
    statuses: BTreeMap<String, u16>,
    fail_all: AtomicBool,
    calls: AtomicUsize,
  }

  impl TestFetch {
    fn ok() -> Self {
      Self::default()
    }

    fn failing(paths: &[&str]) -> Self {
      Self {
        failing: paths.iter().map(|p| p.to_string()).collect(),
        ..Self::default()
      }
    }

    fn set_offline(&self) {
      self.fail_all.store(true, Ordering::SeqCst);
    }

    fn calls(&self) -> usize {
      self.calls.load(Ordering::SeqCst)
    }
  }

  #[async_trait]
  impl Fetch for TestFetch {
    async fn fetch(&self, request: &Request) -> Result<Response> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      let path = request.url.path().to_string();

      if self.fail_all.load(Ordering::SeqCst) || self.failing.contains(&path) {
        return Err(eyre!("connection refused"));
      }

      let status = self.statuses.get(&path).copied().unwrap_or(200);
      let kind = if self.cross_origin.contains(&path) {
        ResponseKind::Cors
      } else {
        ResponseKind::Basic
      };

      Ok(
        Response::new(status)
          .with_kind(kind)
          .with_url(request.url.as_str())
          .with_body(format!("body:{}", path).into_bytes()),
      )
    }
  }

  #[derive(Default)]
  struct RecordingNotifier {
    shown: Mutex<Vec<Notification>>,
    opened: Mutex<Vec<String>>,
  }

  impl Notifier for RecordingNotifier {
    fn show(&self, notification: &Notification) -> Result<()> {
      self.shown.lock().unwrap().push(notification.clone());
      Ok(())
    }

    fn open_window(&self, url: &str) -> Result<()> {
      self.opened.lock().unwrap().push(url.to_string());
      Ok(())
    }
  }

  fn test_config() -> Config {
    let mut config = Config::default();
    config.cache.version = "araise-v2".to_string();
    config.cache.origin = "https://araise.test".to_string();
    config.cache.seed_assets = vec![
      "/".to_string(),
      "/dashboard".to_string(),
      "/static/css/main.css".to_string(),
    ];
    config.sync.delay_ms = 1;
    config
  }

  type TestController = CacheController<MemoryStore, TestFetch>;

  fn make_worker(
    fetch: TestFetch,
  ) -> (
    TestController,
    Arc<MemoryStore>,
    Arc<TestFetch>,
    Arc<RecordingNotifier>,
  ) {
    make_worker_with_store(fetch, Arc::new(MemoryStore::new()))
  }

  fn make_worker_with_store(
    fetch: TestFetch,
    store: Arc<MemoryStore>,
  ) -> (
    TestController,
    Arc<MemoryStore>,
    Arc<TestFetch>,
    Arc<RecordingNotifier>,
  ) {
    let fetch = Arc::new(fetch);
    let notifier = Arc::new(RecordingNotifier::default());
    let worker = CacheController::new(
      test_config(),
      Arc::clone(&store),
      Arc::clone(&fetch),
      Arc::clone(&notifier) as Arc<dyn Notifier>,
    )
    .unwrap();
    (worker, store, fetch, notifier)
  }

  fn request(url: &str) -> Request {
    Request::get(Url::parse(url).unwrap())
  }

  fn navigation(url: &str) -> Request {
    Request::navigation(Url::parse(url).unwrap())
  }

  async fn active_worker() -> (
    TestController,
    Arc<MemoryStore>,
    Arc<TestFetch>,
    Arc<RecordingNotifier>,
  ) {
    let (worker, store, fetch, notifier) = make_worker(TestFetch::ok());
    worker.on_install().await.unwrap();
    worker.on_activate().await.unwrap();
    (worker, store, fetch, notifier)
  }

  #[tokio::test]
  async fn test_install_populates_seed_assets() {
    let (worker, store, fetch, _) = make_worker(TestFetch::ok());
    worker.on_install().await.unwrap();

    assert_eq!(worker.state().unwrap(), WorkerState::Installed);
    assert_eq!(store.names().unwrap(), vec!["araise-v2".to_string()]);
    assert_eq!(store.entries("araise-v2").unwrap().len(), 3);
    assert_eq!(fetch.calls(), 3);
  }

  #[tokio::test]
  async fn test_install_is_atomic_on_fetch_failure() {
    let (worker, store, _, _) = make_worker(TestFetch::failing(&["/dashboard"]));

    assert!(worker.on_install().await.is_err());
    // No entry of the batch survives, not even the assets that did fetch.
    assert!(store.names().unwrap().is_empty());
    assert_eq!(worker.state().unwrap(), WorkerState::Redundant);
  }

  #[tokio::test]
  async fn test_install_rejects_non_cacheable_seed() {
    let mut fetch = TestFetch::ok();
    fetch.statuses.insert("/dashboard".to_string(), 404);
    let (worker, store, _, _) = make_worker(fetch);

    assert!(worker.on_install().await.is_err());
    assert!(store.names().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_activation_purges_stale_generations() {
    let store = Arc::new(MemoryStore::new());
    store
      .put(
        "araise-v1",
        &request("https://araise.test/"),
        &Response::new(200),
      )
      .unwrap();

    let (worker, store, _, _) = make_worker_with_store(TestFetch::ok(), store);
    worker.on_install().await.unwrap();
    worker.on_activate().await.unwrap();

    assert_eq!(store.names().unwrap(), vec!["araise-v2".to_string()]);
    assert_eq!(worker.state().unwrap(), WorkerState::Activated);
  }

  #[tokio::test]
  async fn test_reactivation_is_a_noop() {
    let (worker, store, _, _) = active_worker().await;

    // A generation appearing after activation is only purged by the next
    // real activation, not by a repeated activate of the current one.
    store.open("araise-v1").unwrap();
    worker.on_activate().await.unwrap();

    let names = store.names().unwrap();
    assert!(names.contains(&"araise-v1".to_string()));
    assert!(names.contains(&"araise-v2".to_string()));
  }

  #[tokio::test]
  async fn test_activate_without_install_fails() {
    let (worker, _, _, _) = make_worker(TestFetch::ok());
    assert!(worker.on_activate().await.is_err());
  }

  #[tokio::test]
  async fn test_fetch_hit_skips_network() {
    let (worker, _, fetch, _) = active_worker().await;
    assert_eq!(fetch.calls(), 3);

    let response = worker
      .on_fetch(&request("https://araise.test/dashboard"))
      .await
      .unwrap();

    assert_eq!(response.body.as_deref(), Some(b"body:/dashboard".as_ref()));
    assert_eq!(fetch.calls(), 3);
  }

  #[tokio::test]
  async fn test_fetch_miss_populates_cache() {
    let (worker, _, fetch, _) = active_worker().await;

    let first = worker
      .on_fetch(&request("https://araise.test/water-log"))
      .await
      .unwrap();
    assert_eq!(fetch.calls(), 4);

    let second = worker
      .on_fetch(&request("https://araise.test/water-log"))
      .await
      .unwrap();
    assert_eq!(fetch.calls(), 4);
    assert_eq!(first.body, second.body);
  }

  #[tokio::test]
  async fn test_cross_origin_response_is_not_cached() {
    let mut fetch = TestFetch::ok();
    fetch.cross_origin.push("/cdn/font.woff2".to_string());
    let (worker, store, _, _) = make_worker(fetch);
    worker.on_install().await.unwrap();
    worker.on_activate().await.unwrap();

    let response = worker
      .on_fetch(&request("https://araise.test/cdn/font.woff2"))
      .await
      .unwrap();
    assert_eq!(response.kind, ResponseKind::Cors);
    assert_eq!(response.status, 200);

    // Not in the cache: a repeat goes to the network again.
    assert_eq!(store.entries("araise-v2").unwrap().len(), 3);
    worker
      .on_fetch(&request("https://araise.test/cdn/font.woff2"))
      .await
      .unwrap();
    assert_eq!(store.entries("araise-v2").unwrap().len(), 3);
  }

  #[tokio::test]
  async fn test_non_200_response_is_not_cached() {
    let mut fetch = TestFetch::ok();
    fetch.statuses.insert("/api/history".to_string(), 500);
    let (worker, store, fetch, _) = make_worker(fetch);
    worker.on_install().await.unwrap();
    worker.on_activate().await.unwrap();

    let response = worker
      .on_fetch(&request("https://araise.test/api/history"))
      .await
      .unwrap();
    assert_eq!(response.status, 500);

    worker
      .on_fetch(&request("https://araise.test/api/history"))
      .await
      .unwrap();
    assert_eq!(fetch.calls(), 5);
    assert_eq!(store.entries("araise-v2").unwrap().len(), 3);
  }

  #[tokio::test]
  async fn test_navigation_falls_back_to_cached_root() {
    let (worker, _, fetch, _) = active_worker().await;
    fetch.set_offline();

    let response = worker
      .on_fetch(&navigation("https://araise.test/workout"))
      .await
      .unwrap();

    assert_eq!(response.body.as_deref(), Some(b"body:/".as_ref()));
  }

  #[tokio::test]
  async fn test_failed_non_navigation_gets_timeout_response() {
    let (worker, _, fetch, _) = active_worker().await;
    fetch.set_offline();

    let response = worker
      .on_fetch(&request("https://araise.test/api/history"))
      .await
      .unwrap();

    assert_eq!(response.status, 408);
    assert_eq!(response.status_text, "Request Timeout");
  }

  #[tokio::test]
  async fn test_fetch_before_activation_is_rejected() {
    let (worker, _, _, _) = make_worker(TestFetch::ok());
    worker.on_install().await.unwrap();

    assert!(worker
      .on_fetch(&request("https://araise.test/dashboard"))
      .await
      .is_err());
  }

  #[tokio::test]
  async fn test_adopts_installed_state_from_store() {
    let store = Arc::new(MemoryStore::new());
    store.open("araise-v2").unwrap();

    let (worker, _, _, _) = make_worker_with_store(TestFetch::ok(), store);
    assert_eq!(worker.state().unwrap(), WorkerState::Installed);
    worker.on_activate().await.unwrap();
    assert_eq!(worker.state().unwrap(), WorkerState::Activated);
  }

  #[tokio::test]
  async fn test_skip_waiting_promotes_waiting_generation() {
    let (worker, store, _, _) = make_worker(TestFetch::ok());
    store.open("araise-v1").unwrap();
    worker.on_install().await.unwrap();
    assert_eq!(worker.state().unwrap(), WorkerState::Installed);

    worker.on_message(MessageCommand::SkipWaiting).await.unwrap();

    assert_eq!(worker.state().unwrap(), WorkerState::Activated);
    assert_eq!(store.names().unwrap(), vec!["araise-v2".to_string()]);
  }

  #[tokio::test]
  async fn test_sync_with_registered_tag_resolves() {
    let (worker, _, _, _) = active_worker().await;
    worker
      .on_sync(SyncEvent::new("sync-user-data", false))
      .await
      .unwrap();
  }

  #[tokio::test]
  async fn test_sync_with_unknown_tag_is_ignored() {
    let (worker, _, _, _) = active_worker().await;
    worker
      .on_sync(SyncEvent::new("sync-something-else", true))
      .await
      .unwrap();
  }

  #[tokio::test]
  async fn test_push_shows_notification() {
    let (worker, _, _, notifier) = active_worker().await;
    worker
      .on_push(br#"{"title":"Workout done","body":"Nice job!","primaryKey":7}"#)
      .await
      .unwrap();

    let shown = notifier.shown.lock().unwrap();
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].title, "Workout done");
    assert_eq!(shown[0].primary_key, Some(7));
    assert_eq!(shown[0].actions.len(), 2);
  }

  #[tokio::test]
  async fn test_malformed_push_uses_placeholders() {
    let (worker, _, _, notifier) = active_worker().await;
    worker.on_push(b"definitely not json").await.unwrap();

    let shown = notifier.shown.lock().unwrap();
    assert_eq!(shown[0].title, "ARAISE");
    assert_eq!(shown[0].body, "You have a new notification.");
  }

  #[tokio::test]
  async fn test_notification_click_explore_opens_root() {
    let (worker, _, _, notifier) = active_worker().await;
    worker
      .on_notification_click(NotificationClick::action(ACTION_EXPLORE))
      .await
      .unwrap();

    let opened = notifier.opened.lock().unwrap();
    assert_eq!(opened.len(), 1);
    assert_eq!(opened[0], "https://araise.test/");
  }

  #[tokio::test]
  async fn test_notification_body_click_opens_root() {
    let (worker, _, _, notifier) = active_worker().await;
    worker
      .on_notification_click(NotificationClick::body())
      .await
      .unwrap();

    assert_eq!(notifier.opened.lock().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_notification_click_close_only_dismisses() {
    let (worker, _, _, notifier) = active_worker().await;
    worker
      .on_notification_click(NotificationClick::action(ACTION_CLOSE))
      .await
      .unwrap();

    assert!(notifier.opened.lock().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_handle_dispatches_events() {
    let (worker, _, _, _) = make_worker(TestFetch::ok());

    assert!(worker.handle(WorkerEvent::Install).await.unwrap().is_none());
    assert!(worker.handle(WorkerEvent::Activate).await.unwrap().is_none());

    let response = worker
      .handle(WorkerEvent::Fetch(request("https://araise.test/dashboard")))
      .await
      .unwrap();
    assert_eq!(response.unwrap().status, 200);
  }
}
