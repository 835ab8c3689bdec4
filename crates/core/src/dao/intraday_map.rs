use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::models::range::RangeCode;
use crate::sources::fetcher::Fetcher;
use crate::sources::intraday::{IntradayKind, IntradaySource};

use super::cache::CacheRoot;
use super::worksheet_dao::WorksheetDao;

/// Keyed cache of intraday DAOs per `(ISIN, range code)`.
///
/// Entries live until evicted with [`delete`](Self::delete); there is no
/// expiry.
pub struct IntradayMap {
    kind: IntradayKind,
    cache: CacheRoot,
    fetcher: Arc<dyn Fetcher>,
    daos: Mutex<HashMap<(String, RangeCode), Arc<WorksheetDao>>>,
}

impl IntradayMap {
    pub fn new(kind: IntradayKind, cache: CacheRoot, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            kind,
            cache,
            fetcher,
            daos: Mutex::new(HashMap::new()),
        }
    }

    /// DAO of `isin` over `range`, created on first use.
    pub fn get_source(&self, isin: &str, range: &RangeCode) -> Arc<WorksheetDao> {
        let mut daos = self.daos.lock();
        daos.entry((isin.to_string(), range.clone()))
            .or_insert_with(|| {
                debug!(isin, range = %range, "creating intraday source");
                let source = IntradaySource::new(self.kind, isin, range.clone());
                Arc::new(WorksheetDao::new(source, &self.cache, self.fetcher.clone()))
            })
            .clone()
    }

    /// Evict every range of `isin`. Returns the number of evicted DAOs.
    pub fn delete(&self, isin: &str) -> usize {
        let mut daos = self.daos.lock();
        let before = daos.len();
        daos.retain(|(key, _), _| key != isin);
        before - daos.len()
    }

    pub fn len(&self) -> usize {
        self.daos.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.daos.lock().is_empty()
    }

    /// Every DAO currently held, for bulk refreshes.
    pub fn daos(&self) -> Vec<Arc<WorksheetDao>> {
        self.daos.lock().values().cloned().collect()
    }
}
