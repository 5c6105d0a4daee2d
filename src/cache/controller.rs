//! Cache controller: install/activate lifecycle and per-request strategies.
//!
//! Modeled on a page's service worker. Every GET goes through [`handle`],
//! which classifies the URL and serves it cache-first, network-first or
//! stale-while-revalidate. Other methods pass through untouched.
//!
//! [`handle`]: CacheController::handle

use reqwest::Method;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use url::Url;

use super::storage::CacheStorage;
use super::strategy::{classify, Strategy};
use super::traits::{
  cache_key, CacheSource, FetchError, FetchTransport, Request, Response, Served,
};
use crate::store::StoreError;

/// Versioned cache namespace names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheNames {
  /// Prefix shared by every namespace this site ever created
  pub prefix: String,
  pub static_name: String,
  pub dynamic_name: String,
}

impl CacheNames {
  pub fn new(prefix: &str, version: &str) -> Self {
    Self {
      prefix: prefix.to_string(),
      static_name: format!("{}-static-{}", prefix, version),
      dynamic_name: format!("{}-dynamic-{}", prefix, version),
    }
  }

  fn is_current(&self, name: &str) -> bool {
    name == self.static_name || name == self.dynamic_name
  }
}

/// Outcome of pre-populating the static cache.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InstallReport {
  pub cached: Vec<String>,
  pub failed: Vec<(String, String)>,
}

/// Cache controller that serves requests from cache and network.
///
/// Cheap to clone; clones share storage, transport and pending revalidations.
#[derive(Clone)]
pub struct CacheController {
  storage: Arc<dyn CacheStorage>,
  transport: Arc<dyn FetchTransport>,
  names: Arc<CacheNames>,
  origin: Url,
  static_assets: Arc<Vec<String>>,
  /// Served to navigations when everything else fails
  fallback_document: &'static str,
  controlling: Arc<AtomicBool>,
  revalidations: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl CacheController {
  pub fn new(
    storage: Arc<dyn CacheStorage>,
    transport: Arc<dyn FetchTransport>,
    names: CacheNames,
    origin: Url,
    static_assets: Vec<String>,
  ) -> Self {
    Self {
      storage,
      transport,
      names: Arc::new(names),
      origin,
      static_assets: Arc::new(static_assets),
      fallback_document: "/index.html",
      controlling: Arc::new(AtomicBool::new(false)),
      revalidations: Arc::new(Mutex::new(Vec::new())),
    }
  }

  pub fn names(&self) -> &CacheNames {
    &self.names
  }

  pub fn storage(&self) -> &dyn CacheStorage {
    self.storage.as_ref()
  }

  /// Resolve a path (or absolute URL) against the site origin.
  pub fn resolve(&self, target: &str) -> Result<Url, url::ParseError> {
    self.origin.join(target)
  }

  /// Pre-populate the static cache with the fixed asset list.
  ///
  /// Always completes: failed assets are logged and reported, never
  /// rethrown, so a partial static cache never blocks installation.
  pub async fn install(&self) -> InstallReport {
    info!(cache = %self.names.static_name, "installing static cache");

    if let Err(e) = self.storage.open(&self.names.static_name) {
      error!(error = %e, "failed to open static cache");
    }

    let fetches = self.static_assets.iter().map(|asset| async move {
      let url = self
        .resolve(asset)
        .map_err(|e| FetchError::network(&self.origin, e))?;
      let response = self.transport.fetch(&Request::get(url.clone())).await?;
      if !response.is_cacheable() {
        return Err(FetchError::network(
          &url,
          format!("unexpected status {}", response.status),
        ));
      }
      self
        .storage
        .put(&self.names.static_name, &cache_key(&url), &response)
        .map_err(|e| FetchError::network(&url, e))
    });
    let results = futures::future::join_all(fetches).await;

    let mut report = InstallReport::default();
    for (asset, result) in self.static_assets.iter().zip(results) {
      match result {
        Ok(()) => report.cached.push(asset.clone()),
        Err(e) => {
          error!(asset = %asset, error = %e, "static asset not cached");
          report.failed.push((asset.clone(), e.to_string()));
        }
      }
    }

    info!(
      cached = report.cached.len(),
      failed = report.failed.len(),
      "static cache installed"
    );
    report
  }

  /// Delete every namespace other than the current static and dynamic
  /// caches, then take control of requests immediately.
  pub fn activate(&self) -> Result<Vec<String>, StoreError> {
    info!("activating cache controller");
    let deleted = self.purge(|_| true)?;
    self.controlling.store(true, Ordering::SeqCst);
    Ok(deleted)
  }

  /// Install when the static cache is missing, then activate.
  pub async fn start(&self) -> Result<Vec<String>, StoreError> {
    let installed = self
      .storage
      .keys()?
      .iter()
      .any(|name| name == &self.names.static_name);
    if !installed {
      self.install().await;
    }
    self.activate()
  }

  pub fn is_controlling(&self) -> bool {
    self.controlling.load(Ordering::SeqCst)
  }

  /// Periodic cleanup: same rule as activation, limited to our own prefix.
  pub fn sweep(&self) -> Result<Vec<String>, StoreError> {
    let prefix = format!("{}-", self.names.prefix);
    self.purge(|name| name.starts_with(&prefix))
  }

  /// Run [`sweep`](Self::sweep) every `every` while the returned task lives.
  pub fn spawn_sweeper(&self, every: Duration) -> JoinHandle<()> {
    let controller = self.clone();
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(every);
      // The first tick completes immediately; activation already cleaned up
      ticker.tick().await;
      loop {
        ticker.tick().await;
        if let Err(e) = controller.sweep() {
          warn!(error = %e, "periodic cache sweep failed");
        }
      }
    })
  }

  fn purge(&self, eligible: impl Fn(&str) -> bool) -> Result<Vec<String>, StoreError> {
    let mut deleted = Vec::new();
    for name in self.storage.keys()? {
      if self.names.is_current(&name) || !eligible(&name) {
        continue;
      }
      info!(cache = %name, "deleting old cache");
      if self.storage.delete(&name)? {
        deleted.push(name);
      }
    }
    Ok(deleted)
  }

  /// Serve one request.
  pub async fn handle(&self, request: Request) -> Result<Served, FetchError> {
    if request.method != Method::GET || !self.is_controlling() {
      let response = self.transport.fetch(&request).await?;
      return Ok(Served::new(response, CacheSource::Passthrough));
    }

    let strategy = classify(request.url.path(), &self.static_assets);
    debug!(url = %request.url, %strategy, "handling request");

    match strategy {
      Strategy::CacheFirst => self.cache_first(&request).await,
      Strategy::NetworkFirst => self.network_first(&request).await,
      Strategy::StaleWhileRevalidate => self.stale_while_revalidate(&request).await,
    }
  }

  /// Cache-first strategy.
  ///
  /// 1. Any cached entry wins, no network involved
  /// 2. Otherwise fetch, storing a copy of a 200 in the dynamic cache
  /// 3. On network failure, navigations get the cached root document
  pub async fn cache_first(&self, request: &Request) -> Result<Served, FetchError> {
    if let Some(cached) = self.lookup(&request.cache_key()) {
      return Ok(Served::new(cached, CacheSource::Cache));
    }

    match self.transport.fetch(request).await {
      Ok(response) => {
        self.store_dynamic(request, &response);
        Ok(Served::new(response, CacheSource::Network))
      }
      Err(e) => {
        warn!(url = %request.url, error = %e, "cache-first fetch failed");
        self.offline_fallback(request, e)
      }
    }
  }

  /// Network-first strategy.
  ///
  /// 1. Fetch, storing a copy of a 200 in the dynamic cache
  /// 2. On network failure, serve the cached entry for this request
  /// 3. Failing that, navigations get the cached root document
  pub async fn network_first(&self, request: &Request) -> Result<Served, FetchError> {
    match self.transport.fetch(request).await {
      Ok(response) => {
        self.store_dynamic(request, &response);
        Ok(Served::new(response, CacheSource::Network))
      }
      Err(e) => {
        warn!(url = %request.url, error = %e, "network failed, trying cache");
        if let Some(cached) = self.lookup(&request.cache_key()) {
          return Ok(Served::new(cached, CacheSource::Offline));
        }
        self.offline_fallback(request, e)
      }
    }
  }

  /// Stale-while-revalidate strategy.
  ///
  /// A dynamic-cache hit is returned at once while a background fetch
  /// refreshes the entry for next time. On a miss the caller waits for the
  /// network instead. Concurrent revalidations of one URL race; the last
  /// write wins.
  pub async fn stale_while_revalidate(&self, request: &Request) -> Result<Served, FetchError> {
    let key = request.cache_key();
    let cached = match self.storage.match_in(&self.names.dynamic_name, &key) {
      Ok(cached) => cached,
      Err(e) => {
        warn!(url = %request.url, error = %e, "cache lookup failed");
        None
      }
    };

    let Some(cached) = cached else {
      let response = self.transport.fetch(request).await?;
      self.store_dynamic(request, &response);
      return Ok(Served::new(response, CacheSource::Network));
    };

    let controller = self.clone();
    let request = request.clone();
    let task = tokio::spawn(async move {
      match controller.transport.fetch(&request).await {
        Ok(response) => controller.store_dynamic(&request, &response),
        Err(e) => debug!(url = %request.url, error = %e, "background revalidation failed"),
      }
    });
    if let Ok(mut pending) = self.revalidations.lock() {
      pending.retain(|t| !t.is_finished());
      pending.push(task);
    }

    Ok(Served::new(cached, CacheSource::CacheStale))
  }

  /// Wait for every background revalidation started so far.
  pub async fn settle(&self) {
    let pending: Vec<JoinHandle<()>> = match self.revalidations.lock() {
      Ok(mut pending) => pending.drain(..).collect(),
      Err(_) => return,
    };
    for result in futures::future::join_all(pending).await {
      if let Err(e) = result {
        warn!(error = %e, "revalidation task failed");
      }
    }
  }

  fn lookup(&self, key: &str) -> Option<Response> {
    match self.storage.match_any(key) {
      Ok(hit) => hit,
      Err(e) => {
        warn!(key, error = %e, "cache lookup failed, treating as miss");
        None
      }
    }
  }

  fn store_dynamic(&self, request: &Request, response: &Response) {
    if !response.is_cacheable() {
      return;
    }
    if let Err(e) = self
      .storage
      .put(&self.names.dynamic_name, &request.cache_key(), response)
    {
      warn!(url = %request.url, error = %e, "failed to cache response");
    }
  }

  fn offline_fallback(&self, request: &Request, error: FetchError) -> Result<Served, FetchError> {
    if request.is_navigation() {
      let fallback = self
        .resolve(self.fallback_document)
        .ok()
        .and_then(|url| self.lookup(&cache_key(&url)));
      if let Some(document) = fallback {
        info!(url = %request.url, "serving cached root document offline");
        return Ok(Served::new(document, CacheSource::OfflineFallback));
      }
    }
    Err(error)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::storage::MemoryStorage;
  use async_trait::async_trait;
  use std::collections::HashMap;
  use std::sync::atomic::AtomicUsize;

  const ORIGIN: &str = "https://flick.test/";

  /// Transport with a fixed outcome per path; unknown paths fail.
  struct ScriptedTransport {
    outcomes: Mutex<HashMap<String, Option<Response>>>,
    calls: AtomicUsize,
  }

  impl ScriptedTransport {
    fn new() -> Self {
      Self {
        outcomes: Mutex::new(HashMap::new()),
        calls: AtomicUsize::new(0),
      }
    }

    fn respond(&self, path: &str, status: u16, body: &str) {
      self
        .outcomes
        .lock()
        .unwrap()
        .insert(path.to_string(), Some(Response::new(status, body)));
    }

    fn fail(&self, path: &str) {
      self.outcomes.lock().unwrap().insert(path.to_string(), None);
    }

    fn calls(&self) -> usize {
      self.calls.load(Ordering::SeqCst)
    }
  }

  #[async_trait]
  impl FetchTransport for ScriptedTransport {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      let outcome = self
        .outcomes
        .lock()
        .unwrap()
        .get(request.url.path())
        .cloned()
        .flatten();
      outcome.ok_or_else(|| FetchError::network(&request.url, "offline"))
    }
  }

  fn url(path: &str) -> Url {
    Url::parse(ORIGIN).unwrap().join(path).unwrap()
  }

  fn assets() -> Vec<String> {
    ["/", "/index.html", "/new-style.css", "/manifest.json"]
      .iter()
      .map(|s| s.to_string())
      .collect()
  }

  fn controller(version: &str) -> (CacheController, Arc<MemoryStorage>, Arc<ScriptedTransport>) {
    let storage = Arc::new(MemoryStorage::new());
    let transport = Arc::new(ScriptedTransport::new());
    let controller = CacheController::new(
      storage.clone(),
      transport.clone(),
      CacheNames::new("3dflick", version),
      Url::parse(ORIGIN).unwrap(),
      assets(),
    );
    controller.activate().unwrap();
    (controller, storage, transport)
  }

  fn body(served: &Served) -> &str {
    std::str::from_utf8(&served.response.body).unwrap()
  }

  #[test]
  fn test_cache_names() {
    let names = CacheNames::new("3dflick", "v2.0");
    assert_eq!(names.static_name, "3dflick-static-v2.0");
    assert_eq!(names.dynamic_name, "3dflick-dynamic-v2.0");
  }

  #[tokio::test]
  async fn test_cache_first_miss_then_hit() {
    let (controller, storage, transport) = controller("v1");
    transport.respond("/images/a.png", 200, "png");

    let served = controller
      .handle(Request::get(url("/images/a.png")))
      .await
      .unwrap();
    assert_eq!(served.source, CacheSource::Network);
    assert!(storage
      .match_in("3dflick-dynamic-v1", &cache_key(&url("/images/a.png")))
      .unwrap()
      .is_some());

    let served = controller
      .handle(Request::get(url("/images/a.png")))
      .await
      .unwrap();
    assert_eq!(served.source, CacheSource::Cache);
    assert_eq!(body(&served), "png");
    assert_eq!(transport.calls(), 1);
  }

  #[tokio::test]
  async fn test_non_200_is_returned_but_not_cached() {
    let (controller, storage, transport) = controller("v1");
    transport.respond("/images/missing.png", 404, "nope");

    let served = controller
      .handle(Request::get(url("/images/missing.png")))
      .await
      .unwrap();
    assert_eq!(served.response.status, 404);
    assert!(storage
      .urls("3dflick-dynamic-v1")
      .unwrap_or_default()
      .is_empty());
  }

  #[tokio::test]
  async fn test_cache_first_offline_navigation_gets_root_document() {
    let (controller, storage, transport) = controller("v1");
    storage
      .put(
        "3dflick-static-v1",
        &cache_key(&url("/index.html")),
        &Response::new(200, "<html>"),
      )
      .unwrap();
    transport.fail("/");

    // "/" is a static asset but is not cached here, so the fetch is attempted
    let served = controller.handle(Request::navigate(url("/"))).await.unwrap();
    assert_eq!(served.source, CacheSource::OfflineFallback);
    assert_eq!(body(&served), "<html>");

    let err = controller.handle(Request::get(url("/"))).await;
    assert!(err.is_err());
  }

  #[tokio::test]
  async fn test_network_first_success_caches() {
    let (controller, storage, transport) = controller("v1");
    transport.respond("/api/stats", 200, "{}");

    let served = controller.handle(Request::get(url("/api/stats"))).await.unwrap();
    assert_eq!(served.source, CacheSource::Network);
    assert!(storage
      .match_in("3dflick-dynamic-v1", &cache_key(&url("/api/stats")))
      .unwrap()
      .is_some());
  }

  #[tokio::test]
  async fn test_network_first_falls_back_in_order() {
    let (controller, storage, transport) = controller("v1");
    transport.respond("/api/stats", 200, "fresh");
    controller.handle(Request::get(url("/api/stats"))).await.unwrap();

    transport.fail("/api/stats");
    let served = controller.handle(Request::get(url("/api/stats"))).await.unwrap();
    assert_eq!(served.source, CacheSource::Offline);
    assert_eq!(body(&served), "fresh");

    // Uncached page: navigation gets the root document, anything else errors
    storage
      .put(
        "3dflick-static-v1",
        &cache_key(&url("/index.html")),
        &Response::new(200, "<html>"),
      )
      .unwrap();
    let served = controller
      .handle(Request::navigate(url("/gallery")))
      .await
      .unwrap();
    assert_eq!(served.source, CacheSource::OfflineFallback);

    let err = controller.handle(Request::get(url("/api/other"))).await;
    assert!(matches!(err, Err(FetchError::Network { .. })));
  }

  #[tokio::test]
  async fn test_stale_while_revalidate_refreshes_in_background() {
    let (controller, storage, transport) = controller("v1");
    let key = cache_key(&url("/js/app.js"));
    storage
      .put("3dflick-dynamic-v1", &key, &Response::new(200, "old"))
      .unwrap();
    transport.respond("/js/app.js", 200, "new");

    let served = controller.handle(Request::get(url("/js/app.js"))).await.unwrap();
    assert_eq!(served.source, CacheSource::CacheStale);
    assert_eq!(body(&served), "old");

    controller.settle().await;
    assert_eq!(transport.calls(), 1);
    let refreshed = storage.match_in("3dflick-dynamic-v1", &key).unwrap().unwrap();
    assert_eq!(refreshed.body, b"new");
  }

  #[tokio::test]
  async fn test_stale_while_revalidate_miss_waits_for_network() {
    let (controller, _storage, transport) = controller("v1");
    transport.respond("/css/extra.css", 200, "body{}");

    let served = controller
      .handle(Request::get(url("/css/extra.css")))
      .await
      .unwrap();
    assert_eq!(served.source, CacheSource::Network);

    transport.fail("/js/gone.js");
    assert!(controller.handle(Request::get(url("/js/gone.js"))).await.is_err());
  }

  #[tokio::test]
  async fn test_failed_revalidation_keeps_stale_entry() {
    let (controller, storage, transport) = controller("v1");
    let key = cache_key(&url("/js/app.js"));
    storage
      .put("3dflick-dynamic-v1", &key, &Response::new(200, "old"))
      .unwrap();
    transport.fail("/js/app.js");

    let served = controller.handle(Request::get(url("/js/app.js"))).await.unwrap();
    assert_eq!(body(&served), "old");
    controller.settle().await;
    let kept = storage.match_in("3dflick-dynamic-v1", &key).unwrap().unwrap();
    assert_eq!(kept.body, b"old");
  }

  #[tokio::test]
  async fn test_activate_deletes_old_versions() {
    let storage = Arc::new(MemoryStorage::new());
    for name in [
      "3dflick-static-v1",
      "3dflick-dynamic-v1",
      "3dflick-static-v2",
      "3dflick-dynamic-v2",
    ] {
      storage.open(name).unwrap();
    }
    let controller = CacheController::new(
      storage.clone(),
      Arc::new(ScriptedTransport::new()),
      CacheNames::new("3dflick", "v2"),
      Url::parse(ORIGIN).unwrap(),
      assets(),
    );
    assert!(!controller.is_controlling());

    let deleted = controller.activate().unwrap();
    assert_eq!(deleted, vec!["3dflick-static-v1", "3dflick-dynamic-v1"]);
    assert_eq!(
      storage.keys().unwrap(),
      vec!["3dflick-static-v2", "3dflick-dynamic-v2"]
    );
    assert!(controller.is_controlling());
  }

  #[tokio::test]
  async fn test_sweep_only_touches_own_prefix() {
    let (controller, storage, _transport) = controller("v2");
    storage.open("3dflick-dynamic-v1").unwrap();
    storage.open("other-app-cache").unwrap();

    let deleted = controller.sweep().unwrap();
    assert_eq!(deleted, vec!["3dflick-dynamic-v1"]);
    assert!(storage.keys().unwrap().contains(&"other-app-cache".to_string()));
  }

  #[tokio::test]
  async fn test_sweeper_runs_periodically() {
    let (controller, storage, _transport) = controller("v2");
    let sweeper = controller.spawn_sweeper(Duration::from_millis(10));
    storage.open("3dflick-static-v1").unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    sweeper.abort();
    assert!(storage.keys().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_install_tolerates_failed_asset() {
    let storage = Arc::new(MemoryStorage::new());
    let transport = Arc::new(ScriptedTransport::new());
    transport.respond("/", 200, "<html>");
    transport.respond("/index.html", 200, "<html>");
    transport.respond("/new-style.css", 200, "body{}");
    transport.fail("/manifest.json");

    let controller = CacheController::new(
      storage.clone(),
      transport,
      CacheNames::new("3dflick", "v1"),
      Url::parse(ORIGIN).unwrap(),
      assets(),
    );
    let report = controller.install().await;
    assert_eq!(report.cached.len(), 3);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "/manifest.json");
    assert_eq!(storage.urls("3dflick-static-v1").unwrap().len(), 3);
  }

  #[tokio::test]
  async fn test_start_installs_once() {
    let storage = Arc::new(MemoryStorage::new());
    let transport = Arc::new(ScriptedTransport::new());
    for asset in assets() {
      transport.respond(&asset, 200, "x");
    }
    let controller = CacheController::new(
      storage,
      transport.clone(),
      CacheNames::new("3dflick", "v1"),
      Url::parse(ORIGIN).unwrap(),
      assets(),
    );

    controller.start().await.unwrap();
    controller.start().await.unwrap();
    assert_eq!(transport.calls(), 4);
    assert!(controller.is_controlling());
  }

  #[tokio::test]
  async fn test_non_get_passes_through() {
    let (controller, storage, transport) = controller("v1");
    transport.respond("/api/upload", 200, "ok");

    let request = Request::get(url("/api/upload")).with_method(Method::POST);
    let served = controller.handle(request).await.unwrap();
    assert_eq!(served.source, CacheSource::Passthrough);
    assert!(storage
      .urls("3dflick-dynamic-v1")
      .unwrap_or_default()
      .is_empty());
  }
}
