//! Unified read/write surface over the remote catalog and the local cache.

use color_eyre::Result;
use std::sync::Arc;

use crate::cache::{CacheStore, Subscription};
use crate::catalog::types::{CachedCatalogItem, CatalogItem};
use crate::catalog::CatalogClient;
use crate::error::FetchError;
use crate::worker::Worker;

/// Anime data repository.
///
/// Holds no state of its own between calls. Remote reads go through the
/// catalog client; everything else passes through to the cache store, run
/// on the worker so callers are never blocked on disk I/O.
///
/// Concurrent `persist` and `clear_all` calls are not coordinated here;
/// their interleaving is whatever the store allows.
pub struct AnimeDataRepository<C, S> {
  client: Arc<C>,
  store: Arc<S>,
  worker: Worker,
}

impl<C, S> Clone for AnimeDataRepository<C, S> {
  fn clone(&self) -> Self {
    Self {
      client: Arc::clone(&self.client),
      store: Arc::clone(&self.store),
      worker: self.worker.clone(),
    }
  }
}

impl<C, S> AnimeDataRepository<C, S>
where
  C: CatalogClient,
  S: CacheStore + 'static,
{
  pub fn new(client: C, store: S, worker: Worker) -> Self {
    Self {
      client: Arc::new(client),
      store: Arc::new(store),
      worker,
    }
  }

  /// Fetch the remote catalog, ranked by rating (highest first).
  ///
  /// Items with equal ratings keep their remote order. Failures with a
  /// recognised status come back as [`FetchError::Domain`]; anything else is
  /// the client's own error, untouched.
  pub async fn fetch_remote_list(&self) -> Result<Vec<CatalogItem>, FetchError> {
    let response = self.client.fetch().await.map_err(|e| {
      let err = FetchError::from_transport(e);
      match &err {
        FetchError::Domain(domain) => {
          tracing::warn!(kind = ?domain.kind, detail = ?domain.detail, "catalog fetch failed")
        }
        FetchError::Transport(transport) => {
          tracing::warn!(error = %transport, "catalog fetch failed")
        }
      }
      err
    })?;

    let mut items = response.into_items();
    rank_by_rating(&mut items);

    tracing::info!(count = items.len(), "fetched remote catalog");
    Ok(items)
  }

  /// Follow the cached row for `id`. Emits `None` while no row matches.
  pub fn get_by_id(&self, id: &str) -> Subscription<Result<Option<CachedCatalogItem>>> {
    self.store.stream_by_id(id)
  }

  /// Insert one row, returning its surrogate key.
  pub async fn persist(&self, item: CachedCatalogItem) -> Result<i64> {
    let store = Arc::clone(&self.store);
    self.worker.run_blocking(move || store.insert(&item)).await
  }

  /// Delete every cached row and restart the key sequence.
  pub async fn clear_all(&self) -> Result<()> {
    let store = Arc::clone(&self.store);
    self.worker.run_blocking(move || store.clear()).await?;

    tracing::info!("cleared catalog cache");
    Ok(())
  }

  /// Whether the cache holds no rows. Blocks on the store.
  pub fn is_empty(&self) -> Result<bool> {
    Ok(self.store.count()? == 0)
  }

  /// The cache contents as of now, in key order.
  pub async fn load_all_snapshot(&self) -> Result<Vec<CachedCatalogItem>> {
    self
      .store
      .stream_all()
      .first()
      .await
      .unwrap_or_else(|| Ok(Vec::new()))
  }

  /// Replace the cache with the current remote catalog, in rank order.
  ///
  /// A failed fetch leaves the cache as it was, and so does a failed write
  /// on stores whose `replace_all` is atomic. Returns the number of rows
  /// written.
  pub async fn refresh_cache(&self) -> Result<usize> {
    let items = self.fetch_remote_list().await?;
    let rows: Vec<CachedCatalogItem> = items.into_iter().map(CachedCatalogItem::unsaved).collect();

    let store = Arc::clone(&self.store);
    let keys = self.worker.run_blocking(move || store.replace_all(&rows)).await?;

    tracing::info!(count = keys.len(), "refreshed catalog cache");
    Ok(keys.len())
  }
}

/// Stable sort by rating, highest first.
fn rank_by_rating(items: &mut [CatalogItem]) {
  items.sort_by(|a, b| b.rating.total_cmp(&a.rating));
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::SqliteStore;
  use crate::catalog::api_types::{ApiAnime, ApiAnimeListResponse};
  use crate::catalog::types::{AnimeCountry, AnimeGenre, AnimeStatus};
  use crate::error::{DomainErrorKind, TransportError};
  use async_trait::async_trait;
  use color_eyre::eyre::eyre;
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::sync::Mutex;

  // ==========================================================================
  // Fakes
  // ==========================================================================

  type Responder = Box<dyn Fn() -> Result<ApiAnimeListResponse, TransportError> + Send + Sync>;

  struct FakeClient {
    respond: Responder,
    calls: Arc<AtomicU32>,
  }

  impl FakeClient {
    fn new(
      respond: impl Fn() -> Result<ApiAnimeListResponse, TransportError> + Send + Sync + 'static,
    ) -> (Self, Arc<AtomicU32>) {
      let calls = Arc::new(AtomicU32::new(0));
      let client = Self {
        respond: Box::new(respond),
        calls: Arc::clone(&calls),
      };
      (client, calls)
    }

    fn listing(items: &[(&'static str, f32)]) -> (Self, Arc<AtomicU32>) {
      let items = items.to_vec();
      Self::new(move || {
        Ok(ApiAnimeListResponse {
          data: Some(items.iter().map(|(id, rate)| api_anime(id, *rate)).collect()),
        })
      })
    }

    fn failing(status: u16, message: &'static str) -> (Self, Arc<AtomicU32>) {
      Self::new(move || {
        Err(TransportError::Status {
          status,
          message: message.to_string(),
        })
      })
    }
  }

  #[async_trait]
  impl CatalogClient for FakeClient {
    async fn fetch(&self) -> Result<ApiAnimeListResponse, TransportError> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      (self.respond)()
    }
  }

  /// Store that records calls and serves canned values.
  #[derive(Default)]
  struct FakeStore {
    calls: Arc<Mutex<Vec<String>>>,
    count: u64,
    rows: Vec<CachedCatalogItem>,
    fail_reset: bool,
    fail_insert: Option<&'static str>,
  }

  impl FakeStore {
    fn record(&self, call: impl Into<String>) {
      self.calls.lock().unwrap().push(call.into());
    }
  }

  impl CacheStore for FakeStore {
    fn insert(&self, row: &CachedCatalogItem) -> Result<i64> {
      self.record(format!("insert {}", row.item.id));
      if self.fail_insert == Some(row.item.id.as_str()) {
        return Err(eyre!("disk full"));
      }
      Ok(row.key)
    }

    fn delete_all(&self) -> Result<()> {
      self.record("delete_all");
      Ok(())
    }

    fn reset_sequence(&self) -> Result<()> {
      self.record("reset_sequence");
      if self.fail_reset {
        return Err(eyre!("database is locked"));
      }
      Ok(())
    }

    fn count(&self) -> Result<u64> {
      self.record("count");
      Ok(self.count)
    }

    fn stream_all(&self) -> Subscription<Result<Vec<CachedCatalogItem>>> {
      self.record("stream_all");
      Subscription::from_values(vec![Ok(self.rows.clone())])
    }

    fn stream_by_id(&self, id: &str) -> Subscription<Result<Option<CachedCatalogItem>>> {
      self.record(format!("stream_by_id {}", id));
      let row = self.rows.iter().find(|r| r.item.id == id).cloned();
      Subscription::from_values(vec![Ok(row)])
    }
  }

  /// Store whose "all rows" stream closes without emitting.
  struct SilentStore;

  impl CacheStore for SilentStore {
    fn insert(&self, _row: &CachedCatalogItem) -> Result<i64> {
      Ok(1)
    }

    fn delete_all(&self) -> Result<()> {
      Ok(())
    }

    fn reset_sequence(&self) -> Result<()> {
      Ok(())
    }

    fn count(&self) -> Result<u64> {
      Ok(0)
    }

    fn stream_all(&self) -> Subscription<Result<Vec<CachedCatalogItem>>> {
      Subscription::empty()
    }

    fn stream_by_id(&self, _id: &str) -> Subscription<Result<Option<CachedCatalogItem>>> {
      Subscription::empty()
    }
  }

  fn api_anime(id: &str, rate: f32) -> ApiAnime {
    ApiAnime {
      id: id.to_string(),
      title: format!("Anime {}", id),
      rate,
      status: AnimeStatus::Finished,
      country: AnimeCountry::JapAnime,
      genre: AnimeGenre::Legend,
      release_year: "2012".to_string(),
      description: "Some description".to_string(),
      image_url: String::new(),
    }
  }

  fn cached(key: i64, id: &str, rating: f32) -> CachedCatalogItem {
    CachedCatalogItem {
      key,
      item: CatalogItem::from(api_anime(id, rating)),
    }
  }

  fn repo<C: CatalogClient, S: CacheStore + 'static>(client: C, store: S) -> AnimeDataRepository<C, S> {
    AnimeDataRepository::new(client, store, Worker::current())
  }

  fn ids(items: &[CatalogItem]) -> Vec<&str> {
    items.iter().map(|i| i.id.as_str()).collect()
  }

  // ==========================================================================
  // Remote path
  // ==========================================================================

  #[tokio::test]
  async fn test_fetch_sorts_by_rating_descending() {
    let (client, calls) = FakeClient::listing(&[("01", 9.9), ("02", 10.0)]);
    let repo = repo(client, FakeStore::default());

    let items = repo.fetch_remote_list().await.unwrap();

    assert_eq!(ids(&items), vec!["02", "01"]);
    assert_eq!(items[0].title, "Anime 02");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_fetch_distinct_ratings_strictly_descending() {
    let (client, _) = FakeClient::listing(&[
      ("a", 3.5),
      ("b", 9.1),
      ("c", -1.0),
      ("d", 7.25),
      ("e", 0.0),
      ("f", 12.0),
    ]);
    let repo = repo(client, FakeStore::default());

    let items = repo.fetch_remote_list().await.unwrap();

    assert_eq!(ids(&items), vec!["f", "b", "d", "a", "e", "c"]);
    assert!(items.windows(2).all(|w| w[0].rating > w[1].rating));
  }

  #[tokio::test]
  async fn test_fetch_ties_keep_remote_order() {
    let (client, _) = FakeClient::listing(&[
      ("t1", 8.0),
      ("hi", 9.0),
      ("t2", 8.0),
      ("lo", 1.0),
      ("t3", 8.0),
    ]);
    let repo = repo(client, FakeStore::default());

    let items = repo.fetch_remote_list().await.unwrap();

    assert_eq!(ids(&items), vec!["hi", "t1", "t2", "t3", "lo"]);
  }

  #[tokio::test]
  async fn test_fetch_absent_collection_is_empty() {
    let (client, _) = FakeClient::new(|| Ok(ApiAnimeListResponse { data: None }));
    let repo = repo(client, FakeStore::default());

    let items = repo.fetch_remote_list().await.unwrap();
    assert!(items.is_empty());
  }

  #[tokio::test]
  async fn test_fetch_bad_request() {
    let (client, _) = FakeClient::failing(400, "Bad Request Error");
    let repo = repo(client, FakeStore::default());

    let err = repo.fetch_remote_list().await.unwrap_err();
    let domain = err.as_domain().expect("400 should be classified");
    assert_eq!(domain.kind, DomainErrorKind::BadRequest);
    assert_eq!(domain.message, "Bad Request Error");
  }

  #[tokio::test]
  async fn test_fetch_classifies_status_codes() {
    let cases = [
      (401, DomainErrorKind::Unauthorized, "Unauthorized Error"),
      (404, DomainErrorKind::NotFound, "Not Found Error"),
      (500, DomainErrorKind::Connection, "Connection Error"),
      (505, DomainErrorKind::Connection, "Connection Error"),
    ];

    for (status, kind, message) in cases {
      let (client, _) = FakeClient::failing(status, "server says no");
      let err = repo(client, FakeStore::default())
        .fetch_remote_list()
        .await
        .unwrap_err();

      let domain = err.as_domain().unwrap();
      assert_eq!(domain.kind, kind, "status {}", status);
      assert_eq!(domain.message, message);
      assert_eq!(domain.detail.as_deref(), Some("server says no"));
    }
  }

  #[tokio::test]
  async fn test_fetch_unlisted_status_is_reraised() {
    let (client, calls) = FakeClient::failing(409, "conflict");
    let repo = repo(client, FakeStore::default());

    let err = repo.fetch_remote_list().await.unwrap_err();

    match err {
      FetchError::Transport(TransportError::Status { status, ref message }) => {
        assert_eq!(status, 409);
        assert_eq!(message, "conflict");
      }
      ref other => panic!("expected original failure, got {:?}", other),
    }
    assert_eq!(err.kind(), DomainErrorKind::Generic);
    assert_eq!(calls.load(Ordering::SeqCst), 1, "no retry");
  }

  #[tokio::test]
  async fn test_fetch_touches_no_cache() {
    let (client, _) = FakeClient::listing(&[("01", 9.9)]);
    let store = FakeStore::default();
    let calls = Arc::clone(&store.calls);
    let repo = repo(client, store);

    repo.fetch_remote_list().await.unwrap();
    assert!(calls.lock().unwrap().is_empty());
  }

  // ==========================================================================
  // Cache path
  // ==========================================================================

  #[tokio::test]
  async fn test_get_by_id_emits_row() {
    let (client, _) = FakeClient::listing(&[]);
    let store = FakeStore {
      rows: vec![cached(1, "01", 8.0)],
      ..Default::default()
    };
    let repo = repo(client, store);

    let mut sub = repo.get_by_id("01");
    assert_eq!(sub.next().await.unwrap().unwrap(), Some(cached(1, "01", 8.0)));

    let mut missing = repo.get_by_id("99");
    assert_eq!(missing.next().await.unwrap().unwrap(), None);
  }

  #[tokio::test]
  async fn test_persist_inserts_once() {
    let (client, _) = FakeClient::listing(&[]);
    let store = FakeStore::default();
    let calls = Arc::clone(&store.calls);
    let repo = repo(client, store);

    let key = repo.persist(cached(1, "02", 10.0)).await.unwrap();

    assert_eq!(key, 1);
    assert_eq!(*calls.lock().unwrap(), vec!["insert 02"]);
  }

  #[tokio::test]
  async fn test_clear_all_deletes_then_resets() {
    let (client, _) = FakeClient::listing(&[]);
    let store = FakeStore::default();
    let calls = Arc::clone(&store.calls);
    let repo = repo(client, store);

    repo.clear_all().await.unwrap();
    assert_eq!(*calls.lock().unwrap(), vec!["delete_all", "reset_sequence"]);
  }

  #[tokio::test]
  async fn test_clear_all_failed_reset_propagates() {
    let (client, _) = FakeClient::listing(&[]);
    let store = FakeStore {
      fail_reset: true,
      ..Default::default()
    };
    let calls = Arc::clone(&store.calls);
    let repo = repo(client, store);

    let err = repo.clear_all().await.unwrap_err();
    assert_eq!(err.to_string(), "database is locked");
    // Rows were already deleted when the reset failed.
    assert_eq!(*calls.lock().unwrap(), vec!["delete_all", "reset_sequence"]);
  }

  #[tokio::test]
  async fn test_is_empty_follows_count() {
    let (client, _) = FakeClient::listing(&[]);
    let repo_full = repo(
      client,
      FakeStore {
        count: 10,
        ..Default::default()
      },
    );
    assert!(!repo_full.is_empty().unwrap());

    let (client, _) = FakeClient::listing(&[]);
    let repo_empty = repo(client, FakeStore::default());
    assert!(repo_empty.is_empty().unwrap());
  }

  #[tokio::test]
  async fn test_load_all_snapshot_returns_first_emission() {
    let (client, _) = FakeClient::listing(&[]);
    let rows = vec![cached(1, "02", 10.0), cached(2, "01", 9.9)];
    let store = FakeStore {
      rows: rows.clone(),
      ..Default::default()
    };
    let repo = repo(client, store);

    let snapshot = repo.load_all_snapshot().await.unwrap();
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot[0], rows[0]);
    assert_eq!(snapshot[1].key, 2);
  }

  #[tokio::test]
  async fn test_load_all_snapshot_without_emission_is_empty() {
    let (client, _) = FakeClient::listing(&[]);
    let repo = repo(client, SilentStore);

    assert!(repo.load_all_snapshot().await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_refresh_cache_default_replace_order() {
    let (client, _) = FakeClient::listing(&[("01", 9.9), ("02", 10.0)]);
    let store = FakeStore::default();
    let calls = Arc::clone(&store.calls);
    let repo = repo(client, store);

    assert_eq!(repo.refresh_cache().await.unwrap(), 2);
    assert_eq!(
      *calls.lock().unwrap(),
      vec!["delete_all", "reset_sequence", "insert 02", "insert 01"]
    );
  }

  #[tokio::test]
  async fn test_refresh_cache_write_failure_propagates() {
    let (client, _) = FakeClient::listing(&[("01", 9.9), ("02", 10.0)]);
    let store = FakeStore {
      fail_insert: Some("01"),
      ..Default::default()
    };
    let repo = repo(client, store);

    let err = repo.refresh_cache().await.unwrap_err();
    assert_eq!(err.to_string(), "disk full");
    assert!(err.downcast_ref::<FetchError>().is_none());
  }

  // ==========================================================================
  // Against SQLite
  // ==========================================================================

  fn sqlite_repo(items: &[(&'static str, f32)]) -> AnimeDataRepository<FakeClient, SqliteStore> {
    let (client, _) = FakeClient::listing(items);
    let store = SqliteStore::open_in_memory(Worker::current()).unwrap();
    repo(client, store)
  }

  #[tokio::test]
  async fn test_sqlite_is_empty_after_insert() {
    let repo = sqlite_repo(&[]);
    assert!(repo.is_empty().unwrap());

    repo
      .persist(cached(0, "01", 9.9))
      .await
      .unwrap();
    assert!(!repo.is_empty().unwrap());
  }

  #[tokio::test]
  async fn test_sqlite_clear_all_resets_key_sequence() {
    let repo = sqlite_repo(&[]);
    repo.persist(cached(0, "01", 9.9)).await.unwrap();
    repo.persist(cached(0, "02", 10.0)).await.unwrap();

    repo.clear_all().await.unwrap();
    assert!(repo.is_empty().unwrap());

    let key = repo.persist(cached(0, "03", 7.0)).await.unwrap();
    assert_eq!(key, 1);
  }

  #[tokio::test]
  async fn test_sqlite_snapshot_of_empty_store() {
    let repo = sqlite_repo(&[]);
    assert_eq!(repo.load_all_snapshot().await.unwrap(), vec![]);
  }

  #[tokio::test]
  async fn test_refresh_cache_replaces_rows_in_rank_order() {
    let repo = sqlite_repo(&[("01", 9.9), ("02", 10.0)]);
    repo.persist(cached(0, "stale", 1.0)).await.unwrap();

    let written = repo.refresh_cache().await.unwrap();
    assert_eq!(written, 2);

    let rows = repo.load_all_snapshot().await.unwrap();
    let keyed: Vec<(i64, &str)> = rows.iter().map(|r| (r.key, r.item.id.as_str())).collect();
    assert_eq!(keyed, vec![(1, "02"), (2, "01")]);
  }

  #[tokio::test]
  async fn test_refresh_cache_failure_keeps_cache() {
    let (client, _) = FakeClient::failing(503, "maintenance");
    let store = SqliteStore::open_in_memory(Worker::current()).unwrap();
    let repo = repo(client, store);
    repo.persist(cached(0, "01", 9.9)).await.unwrap();

    let err = repo.refresh_cache().await.unwrap_err();
    let fetch = err.downcast_ref::<FetchError>().expect("fetch error");
    assert_eq!(fetch.kind(), DomainErrorKind::Connection);
    assert!(!repo.is_empty().unwrap());
  }

  #[tokio::test]
  async fn test_refresh_cache_writes_nan_ratings() {
    let repo = sqlite_repo(&[("good", 9.0), ("odd", f32::NAN)]);

    assert_eq!(repo.refresh_cache().await.unwrap(), 2);
    let rows = repo.load_all_snapshot().await.unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().any(|r| r.item.id == "odd" && r.item.rating.is_nan()));
  }

  #[tokio::test]
  async fn test_get_by_id_follows_sqlite_changes() {
    let repo = sqlite_repo(&[]);
    let mut sub = repo.get_by_id("01");
    assert_eq!(sub.next().await.unwrap().unwrap(), None);

    repo.persist(cached(0, "01", 9.9)).await.unwrap();
    let row = sub.next().await.unwrap().unwrap().unwrap();
    assert_eq!(row.key, 1);
    assert_eq!(row.item.rating, 9.9);
  }
}
