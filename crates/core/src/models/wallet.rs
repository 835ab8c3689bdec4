use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::history::TransactionHistory;
use super::transaction::TransactionMatchMode;

/// Wallet key. A ticker may appear under several names after a corporate
/// rename; queries by ticker union across such entries.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StockKey {
    pub stock_name: String,
    pub ticker: String,
}

impl StockKey {
    pub fn new(stock_name: impl Into<String>, ticker: impl Into<String>) -> Self {
        Self {
            stock_name: stock_name.into(),
            ticker: ticker.into(),
        }
    }
}

/// A current holding aggregated per ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletItem {
    pub ticker: String,
    pub amount: i64,
    /// Average unit price including buy commission.
    pub average_price: f64,
}

/// All transaction histories of the user, keyed by `(stock_name, ticker)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    stocks: BTreeMap<StockKey, TransactionHistory>,
}

impl Wallet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.stocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stocks.is_empty()
    }

    pub fn clear(&mut self) {
        self.stocks.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StockKey, &TransactionHistory)> {
        self.stocks.iter()
    }

    pub fn history(&self, stock_name: &str, ticker: &str) -> Option<&TransactionHistory> {
        self.stocks.get(&StockKey::new(stock_name, ticker))
    }

    /// Union of every history recorded under `ticker`.
    pub fn ticker_history(&self, ticker: &str) -> TransactionHistory {
        let transactions = self
            .stocks
            .iter()
            .filter(|(key, _)| key.ticker == ticker)
            .flat_map(|(_, history)| history.iter().cloned())
            .collect();
        TransactionHistory::from_transactions(transactions)
    }

    /// Names under which `ticker` was recorded.
    pub fn stock_names(&self, ticker: &str) -> Vec<&str> {
        self.stocks
            .keys()
            .filter(|key| key.ticker == ticker)
            .map(|key| key.stock_name.as_str())
            .collect()
    }

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
        self.stocks
            .entry(StockKey::new(stock_name, ticker))
            .or_default()
            .add(amount, unit_price, commission, time, join_similar);
    }

    /// Remove the exactly matching transaction. Histories left empty are
    /// dropped. Returns whether a transaction was removed.
    pub fn remove_transaction(
        &mut self,
        stock_name: &str,
        ticker: &str,
        amount: i64,
        unit_price: f64,
        time: NaiveDateTime,
        commission: f64,
    ) -> bool {
        let key = StockKey::new(stock_name, ticker);
        let Some(history) = self.stocks.get_mut(&key) else {
            return false;
        };
        let removed = history.rem(amount, unit_price, commission, time);
        if history.is_empty() {
            self.stocks.remove(&key);
        }
        removed
    }

    /// Merge another wallet into this one.
    ///
    /// Every transaction of `other` is removed from this wallet first and
    /// then added, so re-importing the same data does not double-count.
    pub fn merge(&mut self, other: &Wallet, join_similar: bool) {
        for (key, history) in &other.stocks {
            for t in history.iter() {
                self.remove_transaction(
                    &key.stock_name,
                    &key.ticker,
                    t.amount,
                    t.unit_price,
                    t.time,
                    t.commission,
                );
            }
        }
        for (key, history) in &other.stocks {
            for t in history.iter() {
                self.add_transaction(
                    &key.stock_name,
                    &key.ticker,
                    t.amount,
                    t.unit_price,
                    t.time,
                    t.commission,
                    join_similar,
                );
            }
        }
    }

    /// Non-zero holdings per ticker, ordered by ticker.
    pub fn current_items(&self, mode: TransactionMatchMode) -> Vec<WalletItem> {
        self.tickers()
            .into_iter()
            .filter_map(|ticker| {
                let (amount, average_price) = self.ticker_history(&ticker).current_average(mode);
                (amount != 0).then_some(WalletItem {
                    ticker,
                    amount,
                    average_price,
                })
            })
            .collect()
    }

    /// Tickers currently held.
    pub fn current_stock(&self) -> BTreeSet<String> {
        self.tickers()
            .into_iter()
            .filter(|ticker| self.ticker_history(ticker).current_amount() > 0)
            .collect()
    }

    /// Every ticker ever recorded.
    pub fn tickers(&self) -> BTreeSet<String> {
        self.stocks.keys().map(|key| key.ticker.clone()).collect()
    }

    pub fn overall_profit(&self) -> f64 {
        self.stocks.values().map(TransactionHistory::overall_profit).sum()
    }

    pub fn gain(&self, mode: TransactionMatchMode, include_commission: bool) -> f64 {
        self.stocks
            .values()
            .map(|h| h.gain(mode, include_commission))
            .sum()
    }
}
