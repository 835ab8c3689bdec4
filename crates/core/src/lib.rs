pub mod config;
pub mod dao;
pub mod errors;
pub mod models;
pub mod notify;
pub mod services;
pub mod sources;
pub mod storage;

use chrono::{Days, Local, NaiveDate, NaiveDateTime};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use config::CoreConfig;
use dao::{CacheRoot, IntradayMap, RefreshOrchestrator, RefreshReport, RefreshTask, WorksheetDao};
use errors::CoreError;
use models::{
    analytics::{MarkerRow, SellRow, TransactionRow, WalletStockRow, WalletSummary},
    column::ColumnTag,
    favorites::{FavData, ALL_GROUP, MARKERS_GROUP, WALLET_GROUP},
    marker::{MarkerEntry, Markers},
    notes::Notes,
    price::{close_series, SeriesPoint},
    range::RangeCode,
    transaction::TransactionMatchMode,
    user_data::UserData,
    wallet::Wallet,
};
use notify::{EventBus, Topic};
use services::{ChartService, ImportReport, ImportService, WalletService};
use sources::{
    ArchiveSource, CurrentIndexSource, CurrentStockSource, DividendsSource, EspiSource, Fetcher,
    GlobalIndexSource, HttpFetcher, IndicatorsSource, IntradayKind, IsinMapSource,
    PublishedReportsSource, ReportsSource, ShortSellSource,
};
use storage::UserDataManager;

/// Days covered by the published-reports DAO, counted back from today.
const PUBLISHED_REPORTS_DAYS: u64 = 30;

/// Main entry point of the Stock Monitor core.
///
/// Owns every data-access object, the user's wallet, favourites, markers
/// and notes, and derives the wallet views from them. Mutators publish on
/// the [`EventBus`] and keep the automatic favourite groups in sync.
#[must_use]
pub struct DataContainer {
    config: CoreConfig,
    cache: CacheRoot,
    fetcher: Arc<dyn Fetcher>,
    user_storage: UserDataManager,
    user_data: UserData,
    events: Arc<EventBus>,
    orchestrator: RefreshOrchestrator,

    current_stock: Arc<WorksheetDao>,
    current_index: Arc<WorksheetDao>,
    global_index: Arc<WorksheetDao>,
    isin_map: Arc<WorksheetDao>,
    indicators: Arc<WorksheetDao>,
    espi: Arc<WorksheetDao>,
    dividends: Arc<WorksheetDao>,
    reports: Arc<WorksheetDao>,
    published_reports: Arc<WorksheetDao>,
    short_sell_current: Arc<WorksheetDao>,
    short_sell_history: Arc<WorksheetDao>,
    archives: Mutex<HashMap<NaiveDate, Arc<WorksheetDao>>>,
    stock_intraday: IntradayMap,
    index_intraday: IntradayMap,

    /// Tracks whether user data changed since the last save/load.
    dirty: bool,
}

impl std::fmt::Debug for DataContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataContainer")
            .field("cache", &self.cache.dir())
            .field("user_dir", &self.user_storage.dir())
            .field("wallet_stocks", &self.user_data.wallet.len())
            .field("match_mode", &self.user_data.match_mode)
            .field("dirty", &self.dirty)
            .finish()
    }
}

impl DataContainer {
    /// Container fetching over HTTP with the configured timeout.
    pub fn new(config: CoreConfig) -> Result<Self, CoreError> {
        let fetcher = Arc::new(HttpFetcher::with_timeout(Duration::from_secs(
            config.fetch_timeout_secs,
        )));
        Self::with_fetcher(config, fetcher)
    }

    /// Container using an explicit fetch capability.
    pub fn with_fetcher(config: CoreConfig, fetcher: Arc<dyn Fetcher>) -> Result<Self, CoreError> {
        config.validate()?;
        let cache = CacheRoot::new(&config.cache_dir);
        let today = Local::now().date_naive();
        let reports_from = today
            .checked_sub_days(Days::new(PUBLISHED_REPORTS_DAYS))
            .unwrap_or(today);

        let dao = |source: Box<dyn sources::WorksheetSource>| {
            Arc::new(WorksheetDao::from_boxed(source, &cache, fetcher.clone()))
        };

        Ok(Self {
            current_stock: dao(Box::new(CurrentStockSource)),
            current_index: dao(Box::new(CurrentIndexSource)),
            global_index: dao(Box::new(GlobalIndexSource)),
            isin_map: dao(Box::new(IsinMapSource)),
            indicators: dao(Box::new(IndicatorsSource)),
            espi: dao(Box::new(EspiSource::default())),
            dividends: dao(Box::new(DividendsSource)),
            reports: dao(Box::new(ReportsSource)),
            published_reports: dao(Box::new(PublishedReportsSource::new(reports_from, today))),
            short_sell_current: dao(Box::new(ShortSellSource::current())),
            short_sell_history: dao(Box::new(ShortSellSource::history())),
            archives: Mutex::new(HashMap::new()),
            stock_intraday: IntradayMap::new(IntradayKind::Stock, cache.clone(), fetcher.clone()),
            index_intraday: IntradayMap::new(IntradayKind::Index, cache.clone(), fetcher.clone()),
            user_storage: UserDataManager::new(&config.user_dir),
            user_data: UserData {
                match_mode: config.match_mode,
                ..UserData::default()
            },
            events: Arc::new(EventBus::new()),
            orchestrator: RefreshOrchestrator::new(config.refresh_workers, config.refresh_retries),
            cache,
            fetcher,
            config,
            dirty: false,
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn cache(&self) -> &CacheRoot {
        &self.cache
    }

    pub fn fetcher(&self) -> Arc<dyn Fetcher> {
        self.fetcher.clone()
    }

    pub fn events(&self) -> Arc<EventBus> {
        self.events.clone()
    }

    pub fn orchestrator(&self) -> &RefreshOrchestrator {
        &self.orchestrator
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    // ── Data access objects ─────────────────────────────────────────

    pub fn current_stock(&self) -> &Arc<WorksheetDao> {
        &self.current_stock
    }

    pub fn current_index(&self) -> &Arc<WorksheetDao> {
        &self.current_index
    }

    pub fn global_index(&self) -> &Arc<WorksheetDao> {
        &self.global_index
    }

    pub fn isin_map(&self) -> &Arc<WorksheetDao> {
        &self.isin_map
    }

    pub fn indicators(&self) -> &Arc<WorksheetDao> {
        &self.indicators
    }

    pub fn espi(&self) -> &Arc<WorksheetDao> {
        &self.espi
    }

    pub fn dividends(&self) -> &Arc<WorksheetDao> {
        &self.dividends
    }

    pub fn reports(&self) -> &Arc<WorksheetDao> {
        &self.reports
    }

    pub fn published_reports(&self) -> &Arc<WorksheetDao> {
        &self.published_reports
    }

    pub fn short_sell_current(&self) -> &Arc<WorksheetDao> {
        &self.short_sell_current
    }

    pub fn short_sell_history(&self) -> &Arc<WorksheetDao> {
        &self.short_sell_history
    }

    /// Every DAO refreshed by [`refresh_all`](Self::refresh_all).
    pub fn fixed_daos(&self) -> Vec<Arc<WorksheetDao>> {
        vec![
            self.current_stock.clone(),
            self.current_index.clone(),
            self.global_index.clone(),
            self.isin_map.clone(),
            self.indicators.clone(),
            self.espi.clone(),
            self.dividends.clone(),
            self.reports.clone(),
            self.published_reports.clone(),
            self.short_sell_current.clone(),
            self.short_sell_history.clone(),
        ]
    }

    /// End-of-day archive of `date`, created on first use.
    pub fn archive_dao(&self, date: NaiveDate) -> Arc<WorksheetDao> {
        self.archives
            .lock()
            .entry(date)
            .or_insert_with(|| {
                Arc::new(WorksheetDao::new(
                    ArchiveSource::new(date),
                    &self.cache,
                    self.fetcher.clone(),
                ))
            })
            .clone()
    }

    pub fn stock_intraday(&self, isin: &str, range: &RangeCode) -> Arc<WorksheetDao> {
        self.stock_intraday.get_source(isin, range)
    }

    pub fn index_intraday(&self, isin: &str, range: &RangeCode) -> Arc<WorksheetDao> {
        self.index_intraday.get_source(isin, range)
    }

    /// Evict every cached range of a stock's intraday series.
    pub fn close_stock_intraday(&self, isin: &str) -> usize {
        self.stock_intraday.delete(isin)
    }

    pub fn close_index_intraday(&self, isin: &str) -> usize {
        self.index_intraday.delete(isin)
    }

    /// ISIN of `ticker` according to the ISIN map.
    pub fn isin_of(&self, ticker: &str) -> Result<Option<String>, CoreError> {
        let query = self.isin_map.query();
        let cell = query.data_by_value(ColumnTag::Ticker, ticker, ColumnTag::Isin)?;
        Ok(cell.and_then(|c| c.as_str()).map(str::to_string))
    }

    /// Refresh every fixed DAO on the worker pool.
    ///
    /// Without `force` DAOs that already hold data are left alone.
    pub async fn refresh_all(&self, force: bool) -> RefreshReport {
        let tasks = self
            .fixed_daos()
            .into_iter()
            .map(|dao| RefreshTask::access(dao, force))
            .collect();
        let report = self.orchestrator.run(tasks).await;
        self.events.publish(Topic::StockDataChanged);
        self.events.publish(Topic::RefreshFinished);
        report
    }

    // ── User data ───────────────────────────────────────────────────

    pub fn user_data(&self) -> &UserData {
        &self.user_data
    }

    pub fn wallet(&self) -> &Wallet {
        &self.user_data.wallet
    }

    pub fn favs(&self) -> &FavData {
        &self.user_data.favs
    }

    pub fn markers(&self) -> &Markers {
        &self.user_data.markers
    }

    pub fn notes(&self) -> &Notes {
        &self.user_data.notes
    }

    pub fn match_mode(&self) -> TransactionMatchMode {
        self.user_data.match_mode
    }

    /// Persist every user bundle. Clears the unsaved-changes flag.
    pub fn save_user_data(&mut self) -> Result<(), CoreError> {
        self.user_storage.save(&self.user_data)?;
        self.dirty = false;
        Ok(())
    }

    /// Replace the user data with the persisted bundles.
    pub fn load_user_data(&mut self) -> Result<(), CoreError> {
        self.user_data = self.user_storage.load()?;
        self.dirty = false;
        self.sync_auto_favs();
        for topic in [
            Topic::WalletChanged,
            Topic::FavsChanged,
            Topic::MarkersChanged,
            Topic::NotesChanged,
        ] {
            self.events.publish(topic);
        }
        Ok(())
    }

    pub fn set_match_mode(&mut self, mode: TransactionMatchMode) {
        if self.user_data.match_mode == mode {
            return;
        }
        self.user_data.match_mode = mode;
        self.dirty = true;
        self.events.publish(Topic::WalletChanged);
    }

    pub fn set_stock_header(&mut self, column: usize, label: impl Into<String>) {
        self.user_data.stock_headers.insert(column, label.into());
        self.dirty = true;
    }

    // ── Transactions ────────────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    pub fn add_transaction(
        &mut self,
        stock_name: &str,
        ticker: &str,
        amount: i64,
        unit_price: f64,
        time: NaiveDateTime,
        commission: f64,
        join_similar: bool,
    ) {
        self.user_data.wallet.add_transaction(
            stock_name,
            ticker,
            amount,
            unit_price,
            time,
            commission,
            join_similar,
        );
        self.wallet_changed();
    }

    pub fn remove_transaction(
        &mut self,
        stock_name: &str,
        ticker: &str,
        amount: i64,
        unit_price: f64,
        time: NaiveDateTime,
        commission: f64,
    ) -> bool {
        let removed = self.user_data.wallet.remove_transaction(
            stock_name, ticker, amount, unit_price, time, commission,
        );
        if removed {
            self.wallet_changed();
        }
        removed
    }

    /// Import a broker export and merge it into the wallet. Stock names
    /// are resolved through the current-stock table.
    pub fn import_transactions<R: Read>(&mut self, reader: R) -> Result<ImportReport, CoreError> {
        let (imported, report) = {
            let quotes = self.current_stock.query();
            ImportService::new().import_transactions(reader, &quotes)?
        };
        self.user_data.wallet.merge(&imported, true);
        self.wallet_changed();
        Ok(report)
    }

    pub fn clear_wallet(&mut self) {
        self.user_data.wallet.clear();
        self.wallet_changed();
    }

    fn wallet_changed(&mut self) {
        self.dirty = true;
        self.events.publish(Topic::WalletChanged);
        self.sync_auto_favs();
    }

    // ── Favourites ──────────────────────────────────────────────────

    pub fn add_fav_group(&mut self, name: &str) {
        self.user_data.favs.add_group(name);
        self.favs_changed();
    }

    pub fn rename_fav_group(&mut self, old: &str, new: &str) -> bool {
        let renamed = self.user_data.favs.rename_group(old, new);
        if renamed {
            self.favs_changed();
        }
        renamed
    }

    pub fn delete_fav_group(&mut self, name: &str) -> bool {
        let deleted = self.user_data.favs.delete_group(name);
        if deleted {
            self.favs_changed();
        }
        deleted
    }

    pub fn reorder_fav_groups(&mut self, order: &[&str]) {
        self.user_data.favs.reorder_groups(order);
        self.favs_changed();
    }

    pub fn add_favs<S: AsRef<str>>(&mut self, group: &str, tickers: &[S]) {
        self.user_data.favs.add_favs(group, tickers);
        self.favs_changed();
    }

    pub fn remove_fav(&mut self, group: &str, ticker: &str) -> bool {
        let removed = self.user_data.favs.remove_fav(group, ticker);
        if removed {
            self.favs_changed();
        }
        removed
    }

    fn favs_changed(&mut self) {
        self.dirty = true;
        self.sync_all_group();
        self.events.publish(Topic::FavsChanged);
    }

    /// Refresh the automatic groups from the wallet and the markers.
    /// Publishes a favs change only when a group actually changed.
    fn sync_auto_favs(&mut self) {
        let held: Vec<String> = self.user_data.wallet.current_stock().into_iter().collect();
        let marked: Vec<String> = self.user_data.markers.tickers_set().into_iter().collect();

        let favs = &mut self.user_data.favs;
        let mut changed = favs.set_favs(WALLET_GROUP, held);
        changed |= favs.set_favs(MARKERS_GROUP, marked);
        changed |= self.sync_all_group();
        if changed {
            debug!("automatic favourite groups updated");
            self.events.publish(Topic::FavsChanged);
        }
    }

    fn sync_all_group(&mut self) -> bool {
        let union = self.user_data.favs.union_except(ALL_GROUP);
        self.user_data.favs.set_favs(ALL_GROUP, union)
    }

    // ── Markers ─────────────────────────────────────────────────────

    pub fn add_marker(&mut self, entry: MarkerEntry) -> Uuid {
        let id = self.user_data.markers.add(entry);
        self.markers_changed();
        id
    }

    pub fn update_marker(&mut self, entry: MarkerEntry) -> bool {
        let updated = self.user_data.markers.update(entry);
        if updated {
            self.markers_changed();
        }
        updated
    }

    pub fn remove_marker(&mut self, id: Uuid) -> bool {
        let removed = self.user_data.markers.remove(id);
        if removed {
            self.markers_changed();
        }
        removed
    }

    fn markers_changed(&mut self) {
        self.dirty = true;
        self.events.publish(Topic::MarkersChanged);
        self.sync_auto_favs();
    }

    // ── Notes ───────────────────────────────────────────────────────

    pub fn set_note(&mut self, title: &str, text: impl Into<String>) {
        self.user_data.notes.set(title, text);
        self.notes_changed();
    }

    pub fn rename_note(&mut self, old: &str, new: &str) -> bool {
        let renamed = self.user_data.notes.rename(old, new);
        if renamed {
            self.notes_changed();
        }
        renamed
    }

    pub fn remove_note(&mut self, title: &str) -> bool {
        let removed = self.user_data.notes.remove(title);
        if removed {
            self.notes_changed();
        }
        removed
    }

    fn notes_changed(&mut self) {
        self.dirty = true;
        self.events.publish(Topic::NotesChanged);
    }

    // ── Wallet views ────────────────────────────────────────────────

    fn wallet_service(&self) -> WalletService {
        WalletService::new(self.user_data.match_mode)
    }

    /// Headline numbers priced with the in-memory current-stock table.
    pub fn wallet_summary(&self) -> Result<WalletSummary, CoreError> {
        let quotes = self.current_stock.query();
        self.wallet_service().wallet_summary(&self.user_data.wallet, &quotes)
    }

    pub fn wallet_stock_rows(&self, show_soldout: bool) -> Result<Vec<WalletStockRow>, CoreError> {
        let quotes = self.current_stock.query();
        self.wallet_service()
            .wallet_stock_rows(&self.user_data.wallet, &quotes, show_soldout)
    }

    pub fn wallet_buy_transactions(&self, group_by_day: bool) -> Result<Vec<TransactionRow>, CoreError> {
        let quotes = self.current_stock.query();
        self.wallet_service()
            .wallet_buy_transactions(&self.user_data.wallet, &quotes, group_by_day)
    }

    pub fn wallet_sell_transactions(&self, group_by_day: bool) -> Vec<SellRow> {
        self.wallet_service()
            .wallet_sell_transactions(&self.user_data.wallet, group_by_day)
    }

    pub fn all_transactions(&self, group_by_day: bool) -> Result<Vec<TransactionRow>, CoreError> {
        let quotes = self.current_stock.query();
        self.wallet_service()
            .all_transactions(&self.user_data.wallet, &quotes, group_by_day)
    }

    pub fn marker_rows(&self) -> Result<Vec<MarkerRow>, CoreError> {
        let quotes = self.current_stock.query();
        self.wallet_service()
            .marker_rows(&self.user_data.markers, &quotes)
    }

    // ── Wallet history ──────────────────────────────────────────────

    /// Close series of every wallet ticker over `range`.
    ///
    /// The intraday DAOs are loaded on the worker pool, so transport
    /// errors are retried and one failing ticker never fails the others.
    /// Tickers without an ISIN or without data are skipped.
    async fn wallet_price_series(&self, range: &RangeCode) -> Result<BTreeMap<String, Vec<SeriesPoint>>, CoreError> {
        let report = self
            .orchestrator
            .run(vec![RefreshTask::access(Arc::clone(&self.isin_map), false)])
            .await;
        if report.failed > 0 || !self.isin_map.is_cached() {
            warn!("isin map unavailable, wallet history is empty");
        }

        let mut daos = Vec::new();
        for ticker in self.user_data.wallet.tickers() {
            let Some(isin) = self.isin_of(&ticker)? else {
                debug!(ticker = %ticker, "no isin for ticker");
                continue;
            };
            daos.push((ticker, self.stock_intraday(&isin, range)));
        }

        let tasks = daos
            .iter()
            .map(|(_, dao)| RefreshTask::access(Arc::clone(dao), false))
            .collect();
        let report = self.orchestrator.run(tasks).await;

        let mut prices = BTreeMap::new();
        for (ticker, dao) in daos {
            match dao.cached() {
                Some(table) => {
                    prices.insert(ticker, close_series(&table));
                }
                None => warn!(ticker = %ticker, source = %dao.name(), "no intraday data, ticker left out"),
            }
        }
        info!(
            range = %range,
            tickers = prices.len(),
            failed = report.failed,
            "wallet price series loaded"
        );
        Ok(prices)
    }

    pub async fn wallet_value_history(&self, range: &RangeCode) -> Result<Vec<SeriesPoint>, CoreError> {
        let prices = self.wallet_price_series(range).await?;
        Ok(ChartService::new(self.user_data.match_mode)
            .wallet_value_history(&self.user_data.wallet, &prices))
    }

    pub async fn wallet_profit_history(
        &self,
        range: &RangeCode,
        overall: bool,
    ) -> Result<Vec<SeriesPoint>, CoreError> {
        let prices = self.wallet_price_series(range).await?;
        Ok(ChartService::new(self.user_data.match_mode)
            .wallet_profit_history(&self.user_data.wallet, &prices, overall))
    }

    /// Realized gain over `range`; gains realized before the range start
    /// are carried into its first point.
    pub fn wallet_gain_history(&self, range: &RangeCode) -> Vec<SeriesPoint> {
        let start = range
            .start_date(Local::now().date_naive())
            .and_then(|d| d.and_hms_opt(0, 0, 0));
        ChartService::new(self.user_data.match_mode).wallet_gain_history(&self.user_data.wallet, start)
    }
}
