// ═══════════════════════════════════════════════════════════════════
// DAO Tests — fetch/persist/parse lifecycle, queries, refresh pool
// ═══════════════════════════════════════════════════════════════════

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use stock_monitor_core::dao::{CacheRoot, IntradayMap, RefreshOrchestrator, RefreshTask, WorksheetDao};
use stock_monitor_core::errors::CoreError;
use stock_monitor_core::models::column::ColumnTag;
use stock_monitor_core::models::price::close_series;
use stock_monitor_core::models::range::RangeCode;
use stock_monitor_core::models::worksheet::Cell;
use stock_monitor_core::services::QuoteLookup;
use stock_monitor_core::sources::{
    ArchiveSource, CurrentStockSource, Fetcher, IntradayKind, Payload, WorksheetSource,
};

// ═══════════════════════════════════════════════════════════════════
// Test Helpers — Mock Fetcher
// ═══════════════════════════════════════════════════════════════════

const CURRENT_STOCKS_HTML: &str = r#"
<html><body><table>
<tr><th>Nazwa</th><th>Skrót</th><th>Waluta</th><th>Kurs odn.</th><th>TKO</th>
    <th>Kurs otw.</th><th>Kurs min.</th><th>Kurs maks.</th><th>Kurs ost.</th>
    <th>Zm. do k.odn. (%)</th><th>Czas ost. trans.</th><th>Wolumen</th><th>Obrót</th></tr>
<tr><td>ABCORP</td><td>ABC</td><td>PLN</td><td>10,00</td><td>-</td><td>10,10</td>
    <td>9,90</td><td>12,10</td><td>12,00</td><td>20,00</td><td>16:59:59</td><td>1 000</td><td>12 000</td></tr>
<tr><td>XYZCORP</td><td>XYZ</td><td>PLN</td><td>20,00</td><td>-</td><td>-</td>
    <td>-</td><td>-</td><td>-</td><td>-</td><td>-</td><td>0</td><td>0</td></tr>
</table></body></html>
"#;

/// Serves canned bodies by URL fragment and counts calls. The first
/// `failures` calls fail with a transport error. Every fetch yields once,
/// so overlapping loads interleave.
struct MockFetcher {
    routes: Vec<(&'static str, String)>,
    calls: AtomicUsize,
    failures: AtomicUsize,
}

impl MockFetcher {
    fn new(routes: Vec<(&'static str, String)>) -> Self {
        Self {
            routes,
            calls: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
        }
    }

    fn failing(self, failures: usize) -> Self {
        self.failures.store(failures, Ordering::SeqCst);
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str, out_path: &Path) -> Result<Payload, CoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(CoreError::Network {
                url: url.to_string(),
                cause: "connection refused".into(),
            });
        }
        let body = self
            .routes
            .iter()
            .find(|(fragment, _)| url.contains(fragment))
            .map(|(_, body)| body.clone())
            .unwrap_or_default();
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(out_path, &body)?;
        Ok(Payload::Text(body))
    }
}

fn stock_fetcher() -> Arc<MockFetcher> {
    Arc::new(MockFetcher::new(vec![(
        "GPWQuotations",
        CURRENT_STOCKS_HTML.to_string(),
    )]))
}

fn current_stock_dao(cache: &CacheRoot, fetcher: Arc<MockFetcher>) -> WorksheetDao {
    WorksheetDao::new(CurrentStockSource, cache, fetcher)
}

// ═══════════════════════════════════════════════════════════════════
// Lifecycle
// ═══════════════════════════════════════════════════════════════════

mod lifecycle {
    use super::*;

    #[tokio::test]
    async fn access_fetches_parses_and_persists() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = CacheRoot::new(tmp.path());
        let fetcher = stock_fetcher();
        let dao = current_stock_dao(&cache, fetcher.clone());

        assert!(dao.get(false).await.unwrap().is_none());
        assert_eq!(fetcher.calls(), 0);

        let table = dao.access(false).await.unwrap().unwrap();
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.columns[1], "Skrót");
        assert_eq!(fetcher.calls(), 1);
        assert!(dao.data_path().exists());
        assert!(dao.storage().table_path().exists());
        assert!(dao.grab_timestamp().is_some());

        // cached: no second fetch
        dao.access(false).await.unwrap().unwrap();
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn persisted_table_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = CacheRoot::new(tmp.path());
        let fetcher = stock_fetcher();

        let stored = current_stock_dao(&cache, fetcher.clone())
            .access(false)
            .await
            .unwrap()
            .unwrap();

        let restored = current_stock_dao(&cache, fetcher.clone())
            .access(false)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(*restored, *stored);
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn force_refetches() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = CacheRoot::new(tmp.path());
        let fetcher = stock_fetcher();
        let dao = current_stock_dao(&cache, fetcher.clone());

        dao.access(false).await.unwrap();
        dao.get(true).await.unwrap().unwrap();
        dao.access(true).await.unwrap().unwrap();
        assert_eq!(fetcher.calls(), 3);
    }

    #[tokio::test]
    async fn network_error_leaves_dao_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = CacheRoot::new(tmp.path());
        let fetcher = Arc::new(
            MockFetcher::new(vec![("GPWQuotations", CURRENT_STOCKS_HTML.to_string())]).failing(1),
        );
        let dao = current_stock_dao(&cache, fetcher.clone());

        let err = dao.access(true).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(err, CoreError::Network { .. }));
        assert!(!dao.is_cached());

        // next attempt succeeds
        assert!(dao.access(true).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn parse_failure_yields_none() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = CacheRoot::new(tmp.path());
        let fetcher = Arc::new(MockFetcher::new(vec![(
            "GPWQuotations",
            "<html><body>maintenance</body></html>".to_string(),
        )]));
        let dao = current_stock_dao(&cache, fetcher);

        assert!(dao.access(false).await.unwrap().is_none());
        assert!(!dao.is_cached());
        assert!(!dao.storage().table_path().exists());
    }

    #[tokio::test]
    async fn empty_source_stores_empty_table() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = CacheRoot::new(tmp.path());
        let fetcher = Arc::new(MockFetcher::new(vec![(
            "archiwum-notowan",
            "<html><body><p>Brak danych dla wybranych kryteriów.</p></body></html>".to_string(),
        )]));
        let date = NaiveDate::from_ymd_opt(2024, 12, 25).unwrap();
        let dao = WorksheetDao::new(ArchiveSource::new(date), &cache, fetcher);

        let table = dao.access(false).await.unwrap().unwrap();
        assert!(table.is_empty());
        assert!(table.column_count() > 0);
        assert!(dao.is_cached());
    }

    #[tokio::test]
    async fn concurrent_access_fetches_once() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = CacheRoot::new(tmp.path());
        let fetcher = stock_fetcher();
        let dao = Arc::new(current_stock_dao(&cache, fetcher.clone()));

        let (a, b) = tokio::join!(dao.access(false), dao.access(false));
        assert!(a.unwrap().is_some());
        assert!(b.unwrap().is_some());
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn forced_load_behind_running_load_fetches_again() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = CacheRoot::new(tmp.path());
        let fetcher = stock_fetcher();
        let dao = current_stock_dao(&cache, fetcher.clone());

        let (plain, forced) = tokio::join!(dao.load(false), dao.load(true));
        assert!(plain.unwrap().is_some());
        assert!(forced.unwrap().is_some());
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn clear_drops_persisted_table() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = CacheRoot::new(tmp.path());
        let dao = current_stock_dao(&cache, stock_fetcher());
        dao.access(false).await.unwrap();

        dao.clear();
        assert!(!dao.is_cached());
        assert!(!dao.storage().table_path().exists());
        assert!(dao.grab_timestamp().is_none());
    }
}

// ═══════════════════════════════════════════════════════════════════
// Queries
// ═══════════════════════════════════════════════════════════════════

mod queries {
    use super::*;

    async fn loaded_dao(tmp: &Path) -> WorksheetDao {
        let dao = current_stock_dao(&CacheRoot::new(tmp), stock_fetcher());
        dao.access(false).await.unwrap();
        dao
    }

    #[tokio::test]
    async fn lookups_by_tag() {
        let tmp = tempfile::tempdir().unwrap();
        let dao = loaded_dao(tmp.path()).await;
        let query = dao.query();

        assert_eq!(
            query.data_by_value(ColumnTag::Ticker, "ABC", ColumnTag::RecentValue).unwrap(),
            Some(&Cell::Number(12.0))
        );
        assert_eq!(
            query.data_by_index(ColumnTag::StockName, 1).unwrap(),
            Some(&Cell::Text("XYZCORP".into()))
        );
        assert!(query.row_by_value(ColumnTag::Ticker, "NOPE").unwrap().is_none());

        let rows = query.rows_by_values(ColumnTag::Ticker, &["XYZ", "ABC"]).unwrap();
        assert_eq!(rows.row_count(), 2);
        // table order is kept
        assert_eq!(rows.cell(0, 1), Some(&Cell::Text("ABC".into())));
    }

    #[tokio::test]
    async fn unsupported_column_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let dao = loaded_dao(tmp.path()).await;
        let err = dao
            .query()
            .data_by_value(ColumnTag::Ticker, "ABC", ColumnTag::Dividend)
            .unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedColumn { .. }));
        assert!(err.to_string().contains("DIVIDEND"));
    }

    #[test]
    fn unsupported_column_fails_on_empty_dao() {
        let tmp = tempfile::tempdir().unwrap();
        let dao = current_stock_dao(&CacheRoot::new(tmp.path()), stock_fetcher());
        assert!(dao.query().column_index(ColumnTag::Holder).is_err());
        assert!(dao.query().row_by_value(ColumnTag::Ticker, "ABC").unwrap().is_none());
    }

    #[tokio::test]
    async fn table_query_resolves_quotes() {
        let tmp = tempfile::tempdir().unwrap();
        let dao = loaded_dao(tmp.path()).await;
        let query = dao.query();

        let abc = query.quote("ABC").unwrap().unwrap();
        assert_eq!(abc.name, "ABCORP");
        assert_eq!(abc.reference, Some(10.0));
        assert_eq!(abc.recent, Some(12.0));
        assert_eq!(abc.change_to_ref, Some(20.0));

        // no trade yet: valued at the reference price
        let xyz = query.quote("XYZ").unwrap().unwrap();
        assert_eq!(xyz.recent, None);
        assert_eq!(xyz.price(), Some(20.0));

        assert_eq!(query.ticker_for_name("ABCORP").unwrap(), Some("ABC".to_string()));
        assert!(query.quote("NOPE").unwrap().is_none());
    }
}

// ═══════════════════════════════════════════════════════════════════
// Intraday map
// ═══════════════════════════════════════════════════════════════════

mod intraday_map {
    use super::*;

    #[test]
    fn one_dao_per_isin_and_range() {
        let tmp = tempfile::tempdir().unwrap();
        let map = IntradayMap::new(IntradayKind::Stock, CacheRoot::new(tmp.path()), stock_fetcher());

        let a = map.get_source("PLABC0000001", &RangeCode::Day1);
        let b = map.get_source("PLABC0000001", &RangeCode::Day1);
        let c = map.get_source("PLABC0000001", &RangeCode::Month1);
        let d = map.get_source("PLXYZ0000001", &RangeCode::Day1);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_ne!(a.data_path(), c.data_path());
        assert_eq!(map.len(), 3);

        assert_eq!(map.delete("PLABC0000001"), 2);
        assert_eq!(map.len(), 1);
        assert!(Arc::ptr_eq(&d, &map.get_source("PLXYZ0000001", &RangeCode::Day1)));
        assert_eq!(map.delete("missing"), 0);
    }

    const HISTORY_JSON: &str = r#"[{"data":[
        {"t":1700000000,"o":10,"h":11,"l":9,"c":10.5,"v":100},
        {"t":1700086400,"o":10.5,"h":12,"l":10,"c":11.5,"v":200}
    ]}]"#;

    const SESSION_JSON: &str = r#"[{"data":[
        {"t":1700172000,"o":11.5,"h":12.5,"l":11,"c":12,"v":50},
        {"t":1700175600,"o":12,"h":13,"l":12,"c":12.75,"v":70}
    ]}]"#;

    fn chart_fetcher() -> Arc<MockFetcher> {
        Arc::new(MockFetcher::new(vec![
            ("RANGE", HISTORY_JSON.to_string()),
            ("CURR", SESSION_JSON.to_string()),
        ]))
    }

    #[tokio::test]
    async fn multi_day_range_appends_current_session() {
        let tmp = tempfile::tempdir().unwrap();
        let fetcher = chart_fetcher();
        let map = IntradayMap::new(IntradayKind::Stock, CacheRoot::new(tmp.path()), fetcher.clone());

        let dao = map.get_source("PLABC0000001", &RangeCode::Month1);
        let table = dao.access(false).await.unwrap().unwrap();
        // range payload and current session
        assert_eq!(fetcher.calls(), 2);

        let closes = close_series(&table);
        assert_eq!(closes.len(), 3);
        assert_eq!(closes[1].value, 11.5);
        assert_eq!(closes[2].value, 12.75);
        assert!(closes[1].time < closes[2].time);
    }

    #[tokio::test]
    async fn single_day_range_is_not_augmented() {
        let tmp = tempfile::tempdir().unwrap();
        let fetcher = chart_fetcher();
        let map = IntradayMap::new(IntradayKind::Stock, CacheRoot::new(tmp.path()), fetcher.clone());

        let table = map
            .get_source("PLABC0000001", &RangeCode::Day1)
            .access(false)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetcher.calls(), 1);
        assert_eq!(close_series(&table).len(), 2);
    }
}

// ═══════════════════════════════════════════════════════════════════
// Refresh orchestrator
// ═══════════════════════════════════════════════════════════════════

mod orchestrator {
    use super::*;

    /// Task failing `failures` times with `error` before succeeding.
    fn flaky(label: &str, failures: usize, error: fn() -> CoreError, attempts: Arc<AtomicUsize>) -> RefreshTask {
        let remaining = Arc::new(Mutex::new(failures));
        RefreshTask::new(label, move || {
            let remaining = remaining.clone();
            let attempts = attempts.clone();
            Box::pin(async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                let mut left = remaining.lock();
                if *left > 0 {
                    *left -= 1;
                    return Err(error());
                }
                Ok(())
            })
        })
    }

    fn network() -> CoreError {
        CoreError::Network {
            url: "https://example.invalid".into(),
            cause: "timeout".into(),
        }
    }

    fn parse() -> CoreError {
        CoreError::Parse {
            source_name: "test".into(),
            message: "bad".into(),
        }
    }

    fn pool() -> RefreshOrchestrator {
        RefreshOrchestrator::new(2, 3).with_retry_delay(Duration::ZERO)
    }

    #[tokio::test]
    async fn retries_transport_errors() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let report = pool()
            .run(vec![flaky("flaky", 2, network, attempts.clone())])
            .await;
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(report.retries, 2);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_retry_limit() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let report = pool()
            .run(vec![flaky("down", 10, network, attempts.clone())])
            .await;
        assert_eq!(report.failed, 1);
        assert_eq!(report.failures[0].0, "down");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let report = pool()
            .run(vec![flaky("broken", 1, parse, attempts.clone())])
            .await;
        assert_eq!(report.failed, 1);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn runs_every_task_and_signals_finish() {
        let pool = pool();
        let mut finished = pool.finished();
        let attempts = Arc::new(AtomicUsize::new(0));
        let tasks = (0..7)
            .map(|i| flaky(&format!("task{i}"), 0, network, attempts.clone()))
            .collect();

        let report = pool.spawn(tasks).await.unwrap();
        assert_eq!(report.total, 7);
        assert_eq!(report.succeeded, 7);
        assert!(finished.has_changed().unwrap());
        assert_eq!(*finished.borrow_and_update(), 1);
    }

    #[tokio::test]
    async fn refreshes_daos() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = CacheRoot::new(tmp.path());
        let fetcher = Arc::new(
            MockFetcher::new(vec![("GPWQuotations", CURRENT_STOCKS_HTML.to_string())]).failing(1),
        );
        let dao = Arc::new(current_stock_dao(&cache, fetcher.clone()));

        let report = pool().run(vec![RefreshTask::access(dao.clone(), false)]).await;
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.retries, 1);
        assert!(dao.is_cached());
        assert_eq!(fetcher.calls(), 2);
    }

    #[test]
    fn source_names_label_tasks() {
        let tmp = tempfile::tempdir().unwrap();
        let dao = Arc::new(current_stock_dao(&CacheRoot::new(tmp.path()), stock_fetcher()));
        assert_eq!(RefreshTask::get(dao.clone(), true).label(), CurrentStockSource.name());
    }
}
