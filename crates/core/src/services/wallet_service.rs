use chrono::{Local, NaiveDateTime};
use std::collections::HashMap;
use tracing::warn;

use crate::dao::query::TableQuery;
use crate::errors::CoreError;
use crate::models::analytics::{
    MarkerRow, SellRow, TransactionKind, TransactionRow, WalletStockRow, WalletSummary,
};
use crate::models::column::ColumnTag;
use crate::models::history::TransactionHistory;
use crate::models::marker::Markers;
use crate::models::transaction::{broker_commission, Transaction, TransactionMatchMode};
use crate::models::wallet::Wallet;

/// Live quote of one stock as far as the wallet views need it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StockQuote {
    pub name: String,
    pub ticker: String,
    pub reference: Option<f64>,
    pub recent: Option<f64>,
    /// Percentage change of `recent` to `reference` as published.
    pub change_to_ref: Option<f64>,
}

impl StockQuote {
    /// Price used for valuation: the last trade, or the reference price
    /// when the stock has not traded yet in the session.
    pub fn price(&self) -> Option<f64> {
        self.recent.or(self.reference)
    }
}

/// Resolves tickers and stock names against current market data.
pub trait QuoteLookup {
    fn quote(&self, ticker: &str) -> Result<Option<StockQuote>, CoreError>;

    fn ticker_for_name(&self, stock_name: &str) -> Result<Option<String>, CoreError>;
}

/// Static quotes keyed by ticker.
impl QuoteLookup for HashMap<String, StockQuote> {
    fn quote(&self, ticker: &str) -> Result<Option<StockQuote>, CoreError> {
        Ok(self.get(ticker).cloned())
    }

    fn ticker_for_name(&self, stock_name: &str) -> Result<Option<String>, CoreError> {
        Ok(self
            .values()
            .find(|q| q.name == stock_name)
            .map(|q| q.ticker.clone()))
    }
}

/// Quotes read from the current-stock table.
impl QuoteLookup for TableQuery<'_> {
    fn quote(&self, ticker: &str) -> Result<Option<StockQuote>, CoreError> {
        let name_col = self.column_index(ColumnTag::StockName)?;
        let reference_col = self.column_index(ColumnTag::Reference)?;
        let recent_col = self.column_index(ColumnTag::RecentValue)?;
        let change_col = self.column_index(ColumnTag::ChangeToRef)?;

        let Some(row) = self.row_by_value(ColumnTag::Ticker, ticker)? else {
            return Ok(None);
        };
        let number = |col: usize| row.get(col).and_then(|c| c.as_f64());
        Ok(Some(StockQuote {
            name: row.get(name_col).map(|c| c.to_string()).unwrap_or_default(),
            ticker: ticker.to_string(),
            reference: number(reference_col),
            recent: number(recent_col),
            change_to_ref: number(change_col),
        }))
    }

    fn ticker_for_name(&self, stock_name: &str) -> Result<Option<String>, CoreError> {
        let cell = self.data_by_value(ColumnTag::StockName, stock_name, ColumnTag::Ticker)?;
        Ok(cell.and_then(|c| c.as_str()).map(str::to_string))
    }
}

/// Wallet views combining the transaction histories with live quotes.
///
/// Every view uses the configured matching mode. Values are in the wallet
/// currency; a missing quote leaves the dependent fields empty instead of
/// failing the whole view.
pub struct WalletService {
    mode: TransactionMatchMode,
    now: Option<NaiveDateTime>,
}

impl WalletService {
    pub fn new(mode: TransactionMatchMode) -> Self {
        Self { mode, now: None }
    }

    /// Pin the time used for the sell commission of open positions.
    pub fn with_now(mut self, now: NaiveDateTime) -> Self {
        self.now = Some(now);
        self
    }

    pub fn mode(&self) -> TransactionMatchMode {
        self.mode
    }

    fn now(&self) -> NaiveDateTime {
        self.now.unwrap_or_else(|| Local::now().naive_local())
    }

    /// Value of selling `amount` at `price` now, net of the commission.
    fn sell_value(&self, amount: i64, price: f64) -> f64 {
        if amount == 0 {
            return 0.0;
        }
        let value = amount as f64 * price;
        value - broker_commission(value, self.now())
    }

    // ── Summary ─────────────────────────────────────────────────────

    /// Headline numbers of the wallet.
    ///
    /// Holdings without a quote are left out of the value, the profit and
    /// the reference change. Tickers whose sells cannot be matched against
    /// buys are logged and left out entirely.
    pub fn wallet_summary(&self, wallet: &Wallet, quotes: &dyn QuoteLookup) -> Result<WalletSummary, CoreError> {
        let mut wallet_value = 0.0;
        let mut wallet_profit = 0.0;
        let mut current_sum = 0.0;
        let mut reference_sum = 0.0;
        let mut gain = 0.0;
        let mut realized = 0.0;

        for ticker in wallet.tickers() {
            let history = wallet.ticker_history(&ticker);
            let matched = history.match_transactions(self.mode);
            if let Err(e) = matched.check() {
                warn!(ticker = %ticker, error = %e, "position left out of the wallet summary");
                continue;
            }
            gain += matched.gain(true);
            realized += history.overall_profit();

            let (amount, average_price) = matched.current_average();
            if amount == 0 {
                continue;
            }
            let Some(quote) = quotes.quote(&ticker)? else {
                continue;
            };
            let Some(price) = quote.price() else {
                continue;
            };
            let value = self.sell_value(amount, price);
            wallet_value += value;
            wallet_profit += value - amount as f64 * average_price;
            current_sum += amount as f64 * price;
            reference_sum += amount as f64 * quote.reference.unwrap_or(price);
        }

        let change_to_reference = if reference_sum == 0.0 {
            String::from("--")
        } else {
            format!("{:.2}%", (current_sum / reference_sum - 1.0) * 100.0)
        };

        Ok(WalletSummary {
            wallet_value,
            wallet_profit,
            change_to_reference,
            gain,
            overall_profit: realized + wallet_value,
        })
    }

    // ── Stock table ─────────────────────────────────────────────────

    /// One row per `(stock_name, ticker)`, sorted by profit percentage,
    /// best first. Rows without a profit sort last.
    ///
    /// A history whose sells cannot be matched against buys is logged and
    /// always listed, with every derived field empty.
    pub fn wallet_stock_rows(
        &self,
        wallet: &Wallet,
        quotes: &dyn QuoteLookup,
        show_soldout: bool,
    ) -> Result<Vec<WalletStockRow>, CoreError> {
        let mut rows = Vec::new();
        for (key, history) in wallet.iter() {
            let matched = history.match_transactions(self.mode);
            if let Err(e) = matched.check() {
                warn!(
                    stock = %key.stock_name,
                    ticker = %key.ticker,
                    error = %e,
                    "wallet row without matching buys"
                );
                rows.push(WalletStockRow::unresolved(
                    &key.stock_name,
                    &key.ticker,
                    history.current_amount(),
                ));
                continue;
            }
            let (amount, average_buy) = matched.current_average();
            if amount == 0 && !show_soldout {
                continue;
            }
            let quote = quotes.quote(&key.ticker)?;
            rows.push(self.stock_row(&key.stock_name, &key.ticker, history, amount, average_buy, quote));
        }

        let total: f64 = rows.iter().filter_map(|r| r.value).sum();
        for row in &mut rows {
            row.participation_pct = match row.value {
                Some(value) if total != 0.0 => Some(value / total * 100.0),
                _ => None,
            };
        }

        rows.sort_by(|a, b| {
            let a = a.profit_pct.unwrap_or(f64::NEG_INFINITY);
            let b = b.profit_pct.unwrap_or(f64::NEG_INFINITY);
            b.total_cmp(&a)
        });
        Ok(rows)
    }

    fn stock_row(
        &self,
        stock_name: &str,
        ticker: &str,
        history: &TransactionHistory,
        amount: i64,
        average_buy: f64,
        quote: Option<StockQuote>,
    ) -> WalletStockRow {
        let mut row = WalletStockRow::unresolved(stock_name, ticker, amount);
        row.average_buy = Some(average_buy);

        let price = quote.as_ref().and_then(StockQuote::price);
        let Some(price) = price else {
            if amount == 0 {
                row.overall_profit = Some(history.overall_profit());
            }
            return row;
        };
        let quote = quote.unwrap_or_default();

        row.current_unit = Some(price);
        row.change_to_ref_pct = quote.change_to_ref.or_else(|| {
            quote
                .reference
                .filter(|r| *r != 0.0)
                .map(|r| (price / r - 1.0) * 100.0)
        });
        row.change_to_ref_value = quote.reference.map(|r| amount as f64 * (price - r));
        row.value = Some(amount as f64 * price);

        let sell_value = self.sell_value(amount, price);
        let cost = amount as f64 * average_buy;
        if amount != 0 {
            let profit = sell_value - cost;
            row.profit = Some(profit);
            row.profit_pct = (cost != 0.0).then(|| profit / cost * 100.0);
        }
        row.overall_profit = Some(history.overall_profit() + sell_value);
        row
    }

    // ── Transaction tables ──────────────────────────────────────────

    /// Buys still held, newest first, with their profit at the current
    /// price.
    pub fn wallet_buy_transactions(
        &self,
        wallet: &Wallet,
        quotes: &dyn QuoteLookup,
        group_by_day: bool,
    ) -> Result<Vec<TransactionRow>, CoreError> {
        let mut rows = Vec::new();
        for (key, history) in wallet.iter() {
            let history = if group_by_day {
                history.group_by_day()
            } else {
                history.clone()
            };
            let price = quotes.quote(&key.ticker)?.and_then(|q| q.price());
            for t in history.current_transactions(self.mode).iter() {
                rows.push(self.transaction_row(&key.stock_name, &key.ticker, t, price));
            }
        }
        sort_newest_first(&mut rows);
        Ok(rows)
    }

    /// Matched sell slices, most recent sell first.
    pub fn wallet_sell_transactions(&self, wallet: &Wallet, group_by_day: bool) -> Vec<SellRow> {
        let mut rows = Vec::new();
        for (key, history) in wallet.iter() {
            let history = if group_by_day {
                history.group_by_day()
            } else {
                history.clone()
            };
            for pair in history.sell_transactions(self.mode) {
                let profit = pair.gain(true);
                let cost = pair.buy.value_with_commission();
                rows.push(SellRow {
                    stock_name: key.stock_name.clone(),
                    ticker: key.ticker.clone(),
                    buy_time: pair.buy.time,
                    sell_time: pair.sell.time,
                    amount: pair.buy.amount,
                    buy_unit: pair.buy.unit_price,
                    sell_unit: pair.sell.unit_price,
                    commission: pair.buy.commission_value() + pair.sell.commission_value(),
                    profit_pct: if cost != 0.0 { profit / cost * 100.0 } else { 0.0 },
                    profit,
                });
            }
        }
        rows.sort_by(|a, b| b.sell_time.cmp(&a.sell_time));
        rows
    }

    /// Every transaction, newest first. Buys carry the profit of selling
    /// them now; sells the difference against buying them back now.
    pub fn all_transactions(
        &self,
        wallet: &Wallet,
        quotes: &dyn QuoteLookup,
        group_by_day: bool,
    ) -> Result<Vec<TransactionRow>, CoreError> {
        let mut rows = Vec::new();
        for (key, history) in wallet.iter() {
            let history = if group_by_day {
                history.group_by_day()
            } else {
                history.clone()
            };
            let price = quotes.quote(&key.ticker)?.and_then(|q| q.price());
            for t in history.iter() {
                rows.push(self.transaction_row(&key.stock_name, &key.ticker, t, price));
            }
        }
        sort_newest_first(&mut rows);
        Ok(rows)
    }

    fn transaction_row(
        &self,
        stock_name: &str,
        ticker: &str,
        t: &Transaction,
        price: Option<f64>,
    ) -> TransactionRow {
        let amount = t.amount.abs();
        let commission = t.commission_value();
        let (profit, profit_pct) = match price {
            Some(price) if t.is_buy() => {
                let cost = t.value_with_commission();
                let profit = self.sell_value(amount, price) - cost;
                (Some(profit), (cost != 0.0).then(|| profit / cost * 100.0))
            }
            Some(price) => {
                let received = -t.value_with_commission();
                let profit = received - amount as f64 * price;
                let base = amount as f64 * price;
                (Some(profit), (base != 0.0).then(|| profit / base * 100.0))
            }
            None => (None, None),
        };
        TransactionRow {
            stock_name: stock_name.to_string(),
            ticker: ticker.to_string(),
            kind: if t.is_buy() {
                TransactionKind::Buy
            } else {
                TransactionKind::Sell
            },
            time: t.time,
            amount,
            unit_price: t.unit_price,
            commission,
            current_unit: price,
            profit_pct,
            profit,
        }
    }

    // ── Markers ─────────────────────────────────────────────────────

    /// Markers in their stored order. Tickers without a quote keep their
    /// row with the live fields empty.
    pub fn marker_rows(&self, markers: &Markers, quotes: &dyn QuoteLookup) -> Result<Vec<MarkerRow>, CoreError> {
        let mut rows = Vec::with_capacity(markers.len());
        for entry in markers.entries() {
            let quote = quotes.quote(&entry.ticker)?;
            let current_value = quote.as_ref().and_then(StockQuote::price);
            rows.push(MarkerRow {
                id: entry.id,
                ticker: entry.ticker.clone(),
                stock_name: quote.map(|q| q.name),
                current_value,
                operation: entry.operation,
                amount: entry.amount,
                value: entry.value,
                required_change: current_value.and_then(|cur| entry.required_change(cur)),
                required_value: current_value.map(|cur| entry.required_value(cur)),
                reached: current_value.map(|cur| entry.is_reached(cur)),
                color: entry.color.clone(),
                notes: entry.notes.clone(),
            });
        }
        Ok(rows)
    }
}

impl Default for WalletService {
    fn default() -> Self {
        Self::new(TransactionMatchMode::default())
    }
}

fn sort_newest_first(rows: &mut [TransactionRow]) {
    rows.sort_by(|a, b| b.time.cmp(&a.time));
}
