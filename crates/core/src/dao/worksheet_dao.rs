use chrono::{DateTime, Local};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::errors::{short_url, CoreError};
use crate::models::worksheet::Worksheet;
use crate::sources::fetcher::Fetcher;
use crate::sources::traits::WorksheetSource;
use crate::storage::worksheet_storage::WorksheetStorage;

use super::cache::CacheRoot;

/// Generic data-access object of one externally sourced table.
///
/// The lifecycle is fetch → persist raw → parse → store → serve. The
/// source-specific pieces come from a [`WorksheetSource`]; everything
/// else is shared by every source.
///
/// State is either empty or cached. `load` runs under a per-DAO async
/// guard so concurrent callers never duplicate a fetch; readers take the
/// in-memory table without waiting for the guard and only ever see a
/// complete table.
pub struct WorksheetDao {
    source: Box<dyn WorksheetSource>,
    fetcher: Arc<dyn Fetcher>,
    storage: WorksheetStorage,
    load_guard: Mutex<()>,
    /// Completed loads; lets a non-forced caller that waited on the guard
    /// reuse the result of the load it waited for.
    generation: AtomicU64,
}

impl WorksheetDao {
    pub fn new(
        source: impl WorksheetSource + 'static,
        cache: &CacheRoot,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self::from_boxed(Box::new(source), cache, fetcher)
    }

    pub fn from_boxed(
        source: Box<dyn WorksheetSource>,
        cache: &CacheRoot,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        let storage = WorksheetStorage::new(cache.resolve(&source.data_path()));
        Self {
            source,
            fetcher,
            storage,
            load_guard: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn source(&self) -> &dyn WorksheetSource {
        self.source.as_ref()
    }

    pub fn name(&self) -> &str {
        self.source.name()
    }

    pub fn storage(&self) -> &WorksheetStorage {
        &self.storage
    }

    pub fn data_path(&self) -> &Path {
        self.storage.data_path()
    }

    pub fn grab_timestamp(&self) -> Option<DateTime<Local>> {
        self.storage.grab_timestamp()
    }

    /// In-memory table, never blocking.
    pub fn cached(&self) -> Option<Arc<Worksheet>> {
        self.storage.table()
    }

    pub fn is_cached(&self) -> bool {
        self.cached().is_some()
    }

    /// The in-memory table; with `force` the table is reloaded from the
    /// network first.
    pub async fn get(&self, force: bool) -> Result<Option<Arc<Worksheet>>, CoreError> {
        if force {
            return self.load(true).await;
        }
        Ok(self.cached())
    }

    /// Like [`get`](Self::get), but an empty DAO is populated on demand
    /// from the persisted table, the raw payload or the network, in that
    /// order.
    pub async fn access(&self, force: bool) -> Result<Option<Arc<Worksheet>>, CoreError> {
        if !force {
            if let Some(table) = self.cached() {
                return Ok(Some(table));
            }
        }
        self.load(force).await
    }

    /// Full fetch-and-parse cycle.
    ///
    /// Without `force` the persisted table or an already downloaded raw
    /// payload is reused when present. Transport errors are returned and
    /// leave the DAO empty. A source reporting "no data" stores its empty
    /// table. Any other failure is logged, clears the DAO and yields
    /// `Ok(None)`.
    ///
    /// A caller without `force` that waited behind a concurrent load takes
    /// that load's result. A forced load always runs its own cycle.
    #[instrument(skip(self), fields(source = %self.source.name()))]
    pub async fn load(&self, force: bool) -> Result<Option<Arc<Worksheet>>, CoreError> {
        let seen = self.generation.load(Ordering::Acquire);
        let _guard = self.load_guard.lock().await;
        if !force && self.generation.load(Ordering::Acquire) != seen {
            debug!("reusing result of a concurrent load");
            return Ok(self.cached());
        }

        let result = self.load_locked(force).await;
        self.generation.fetch_add(1, Ordering::AcqRel);
        result
    }

    async fn load_locked(&self, force: bool) -> Result<Option<Arc<Worksheet>>, CoreError> {
        let path = self.storage.data_path().to_path_buf();

        if !force {
            if let Some(table) = self.storage.load(true) {
                debug!(path = %path.display(), "restored persisted table");
                return Ok(Some(table));
            }
        }

        if force || !path.exists() {
            let url = self.source.data_url();
            debug!(url = %short_url(&url), "downloading");
            if let Err(e) = self.source.download(self.fetcher.as_ref(), &path).await {
                self.storage.clear();
                if e.is_retryable() || matches!(e, CoreError::FileIO(_)) {
                    warn!(url = %short_url(&url), error = %e, "download failed");
                    return Err(e);
                }
                error!(url = %short_url(&url), error = %e, "downloaded payload unusable");
                return Ok(None);
            }
        }

        match self.source.parse(&path) {
            Ok(table) => self.store(table),
            Err(CoreError::EmptySource(what)) => {
                info!(what = %what, "source reports no data");
                self.store(self.source.empty_worksheet())
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "parse failed");
                self.storage.clear();
                Ok(None)
            }
        }
    }

    fn store(&self, table: Worksheet) -> Result<Option<Arc<Worksheet>>, CoreError> {
        match self.storage.store(table) {
            Ok(table) => Ok(Some(table)),
            Err(e) => {
                error!(path = %self.storage.data_path().display(), error = %e, "cannot persist table");
                self.storage.clear();
                Err(e)
            }
        }
    }

    /// Drop the table from memory and the persisted cache.
    pub fn clear(&self) {
        self.storage.clear();
    }
}

impl std::fmt::Debug for WorksheetDao {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorksheetDao")
            .field("source", &self.source.name())
            .field("data_path", &self.storage.data_path())
            .field("cached", &self.is_cached())
            .finish()
    }
}
