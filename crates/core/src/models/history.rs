use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

use crate::errors::CoreError;

use super::price::SeriesPoint;
use super::transaction::{broker_commission, Transaction, TransactionMatchMode};

/// Fills of the same price placed this close together are treated as one
/// broker order split into parts.
pub const JOIN_SIMILAR_WINDOW_MINUTES: i64 = 5;

/// A matched pair: the slice of an open buy consumed by a slice of a sell.
///
/// Both slices carry the same absolute amount; the sell slice has the
/// sell's unit price and time and a negative amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoldPair {
    pub buy: Transaction,
    pub sell: Transaction,
}

impl SoldPair {
    /// Realized gain of this pair: `-sell.value - buy.value`.
    pub fn gain(&self, include_commission: bool) -> f64 {
        if include_commission {
            -self.sell.value_with_commission() - self.buy.value_with_commission()
        } else {
            -self.sell.value() - self.buy.value()
        }
    }
}

/// Outcome of matching sells against open buys.
#[derive(Debug, Clone, Default)]
pub struct MatchResult {
    /// Buys still held, newest first.
    pub remaining: TransactionHistory,
    /// Matched pairs in the order the sells were processed (oldest first).
    pub sold: Vec<SoldPair>,
    /// Amount of sold stock that had no open buy to match against.
    pub unmatched_amount: i64,
}

impl MatchResult {
    /// Amount still held and its average unit price including buy
    /// commission.
    pub fn current_average(&self) -> (i64, f64) {
        weighted_average(&self.remaining)
    }

    /// Realized gain over the matched pairs.
    pub fn gain(&self, include_commission: bool) -> f64 {
        self.sold.iter().map(|pair| pair.gain(include_commission)).sum()
    }

    pub fn is_complete(&self) -> bool {
        self.unmatched_amount == 0
    }

    /// Surface an incomplete match as an error.
    pub fn check(&self) -> Result<(), CoreError> {
        if self.is_complete() {
            Ok(())
        } else {
            Err(CoreError::InvariantViolated(format!(
                "{} sold without matching buy transactions",
                self.unmatched_amount
            )))
        }
    }
}

/// Ordered list of transactions of one stock, newest first.
///
/// Every mutation keeps the list sorted by time descending. Sorting is
/// stable, so transactions sharing a timestamp keep their insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionHistory {
    transactions: Vec<Transaction>,
}

impl TransactionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_transactions(transactions: Vec<Transaction>) -> Self {
        let mut history = Self { transactions };
        history.sort();
        history
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn iter(&self) -> impl Iterator<Item = &Transaction> {
        self.transactions.iter()
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Transaction> {
        self.transactions.get(index)
    }

    pub fn most_recent(&self) -> Option<&Transaction> {
        self.transactions.first()
    }

    pub fn oldest(&self) -> Option<&Transaction> {
        self.transactions.last()
    }

    fn sort(&mut self) {
        self.transactions.sort_by(|a, b| b.time.cmp(&a.time));
    }

    // ── Mutation ────────────────────────────────────────────────────

    pub fn append(&mut self, amount: i64, unit_price: f64, commission: f64, time: NaiveDateTime) {
        self.transactions
            .push(Transaction::new(amount, unit_price, commission, time));
        self.sort();
    }

    pub fn append_transaction(&mut self, transaction: Transaction) {
        self.transactions.push(transaction);
        self.sort();
    }

    /// Add a transaction, optionally deduplicating.
    ///
    /// With `join_similar`:
    /// - an identical transaction already present makes this a no-op,
    /// - a transaction with the same unit price within
    ///   [`JOIN_SIMILAR_WINDOW_MINUTES`] absorbs the amount and commission,
    /// - otherwise the transaction is appended.
    pub fn add(
        &mut self,
        amount: i64,
        unit_price: f64,
        commission: f64,
        time: NaiveDateTime,
        join_similar: bool,
    ) {
        if join_similar {
            if self
                .transactions
                .iter()
                .any(|t| t.matches(amount, unit_price, commission, time))
            {
                return;
            }
            let window = Duration::minutes(JOIN_SIMILAR_WINDOW_MINUTES);
            if let Some(similar) = self.transactions.iter_mut().find(|t| {
                t.unit_price == unit_price
                    && (t.amount > 0) == (amount > 0)
                    && (t.time - time).abs() <= window
            }) {
                similar.amount += amount;
                similar.commission += commission;
                return;
            }
        }
        self.append(amount, unit_price, commission, time);
    }

    /// Remove the exactly matching transaction. Returns whether one was found.
    pub fn rem(&mut self, amount: i64, unit_price: f64, commission: f64, time: NaiveDateTime) -> bool {
        match self
            .transactions
            .iter()
            .position(|t| t.matches(amount, unit_price, commission, time))
        {
            Some(idx) => {
                self.transactions.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.transactions.clear();
    }

    // ── Plain queries ───────────────────────────────────────────────

    pub fn current_amount(&self) -> i64 {
        self.transactions.iter().map(|t| t.amount).sum()
    }

    /// Amount held just before `time` (transactions at `time` excluded).
    pub fn amount_before(&self, time: NaiveDateTime) -> i64 {
        self.transactions
            .iter()
            .filter(|t| t.time < time)
            .map(|t| t.amount)
            .sum()
    }

    /// Transactions strictly older than `time`.
    pub fn transactions_before(&self, time: NaiveDateTime) -> TransactionHistory {
        Self {
            transactions: self
                .transactions
                .iter()
                .filter(|t| t.time < time)
                .cloned()
                .collect(),
        }
    }

    /// Transactions at or after `time`.
    pub fn transactions_after(&self, time: NaiveDateTime) -> TransactionHistory {
        Self {
            transactions: self
                .transactions
                .iter()
                .filter(|t| t.time >= time)
                .cloned()
                .collect(),
        }
    }

    /// Collapse each day into at most one buy and one sell. Unit prices are
    /// weighted by amount, commissions are summed and each group takes the
    /// time of its latest transaction.
    pub fn group_by_day(&self) -> TransactionHistory {
        #[derive(Default)]
        struct Group {
            amount: i64,
            value: f64,
            commission: f64,
            time: Option<NaiveDateTime>,
        }

        impl Group {
            fn absorb(&mut self, t: &Transaction) {
                self.amount += t.amount;
                self.value += t.value();
                self.commission += t.commission_value();
                self.time = Some(self.time.map_or(t.time, |cur| cur.max(t.time)));
            }

            fn into_transaction(self) -> Option<Transaction> {
                let time = self.time?;
                if self.amount == 0 {
                    return None;
                }
                let unit_price = self.value / self.amount as f64;
                Some(Transaction::new(self.amount, unit_price, self.commission, time))
            }
        }

        let mut days: BTreeMap<NaiveDate, (Group, Group)> = BTreeMap::new();
        for t in &self.transactions {
            let (buys, sells) = days.entry(t.time.date()).or_default();
            if t.is_buy() {
                buys.absorb(t);
            } else if t.is_sell() {
                sells.absorb(t);
            }
        }

        let transactions = days
            .into_values()
            .flat_map(|(buys, sells)| [buys.into_transaction(), sells.into_transaction()])
            .flatten()
            .collect();
        Self::from_transactions(transactions)
    }

    /// Split the newest-first list at `index`.
    ///
    /// Returns `(before, after)`: `after` holds the transactions newer than
    /// `index`, `before` the older ones. The transaction at `index` itself
    /// goes to `after` when `current_after` is set, otherwise to `before`.
    pub fn split(&self, index: usize, current_after: bool) -> (TransactionHistory, TransactionHistory) {
        let cut = if current_after { index + 1 } else { index };
        let cut = cut.min(self.transactions.len());
        let after = Self {
            transactions: self.transactions[..cut].to_vec(),
        };
        let before = Self {
            transactions: self.transactions[cut..].to_vec(),
        };
        (before, after)
    }

    /// Scanning from the oldest end, index of the first transaction strictly
    /// newer than `time`.
    pub fn find_index(&self, time: NaiveDateTime) -> Option<usize> {
        (0..self.transactions.len())
            .rev()
            .find(|&idx| self.transactions[idx].time > time)
    }

    /// Sum of signed values including commission, negated: buys subtract,
    /// sells add.
    pub fn overall_profit(&self) -> f64 {
        -self
            .transactions
            .iter()
            .map(Transaction::value_with_commission)
            .sum::<f64>()
    }

    // ── Matching ────────────────────────────────────────────────────

    /// Match every sell against open buys according to `mode`.
    ///
    /// Transactions are replayed oldest first. Buys are opened; each sell
    /// consumes open buys one at a time until its amount is covered. A sell
    /// arriving with no open buys marks the result incomplete (history
    /// imported only partially) and the partial match is returned.
    pub fn match_transactions(&self, mode: TransactionMatchMode) -> MatchResult {
        let mut open: Vec<Transaction> = Vec::new();
        let mut sold = Vec::new();
        let mut unmatched_amount = 0;

        for trans in self.transactions.iter().rev() {
            let trans = trans.with_resolved_commission();
            if trans.is_buy() {
                // Replay is oldest-first, so each buy is the newest open one.
                open.insert(0, trans);
                continue;
            }
            if !trans.is_sell() {
                continue;
            }

            let sell_total = -trans.amount;
            let mut to_sell = sell_total;
            while to_sell > 0 {
                let Some(idx) = find_matching(&open, mode, &trans) else {
                    warn!(
                        sell = %trans,
                        missing = to_sell,
                        "sell transaction without open buys, history incomplete"
                    );
                    unmatched_amount += to_sell;
                    break;
                };

                let buy = &mut open[idx];
                let take = to_sell.min(buy.amount);
                let buy_commission = buy.commission * take as f64 / buy.amount as f64;
                let buy_slice = Transaction::new(take, buy.unit_price, buy_commission, buy.time);
                if take == buy.amount {
                    open.remove(idx);
                } else {
                    buy.amount -= take;
                    buy.commission -= buy_commission;
                }

                let sell_commission = trans.commission * take as f64 / sell_total as f64;
                let sell_slice =
                    Transaction::new(-take, trans.unit_price, sell_commission, trans.time);
                sold.push(SoldPair {
                    buy: buy_slice,
                    sell: sell_slice,
                });
                to_sell -= take;
            }
        }

        MatchResult {
            remaining: Self { transactions: open },
            sold,
            unmatched_amount,
        }
    }

    /// Buys still held after matching.
    pub fn current_transactions(&self, mode: TransactionMatchMode) -> TransactionHistory {
        self.match_transactions(mode).remaining
    }

    /// Matched pairs, oldest sell first.
    pub fn sell_transactions(&self, mode: TransactionMatchMode) -> Vec<SoldPair> {
        self.match_transactions(mode).sold
    }

    /// Amount held and its average unit price including buy commission.
    /// `(0, 0.0)` when nothing is held.
    pub fn current_average(&self, mode: TransactionMatchMode) -> (i64, f64) {
        self.match_transactions(mode).current_average()
    }

    /// Realized gain over all matched pairs.
    pub fn gain(&self, mode: TransactionMatchMode, include_commission: bool) -> f64 {
        self.match_transactions(mode).gain(include_commission)
    }

    /// Cumulative realized gain, one point per sell time.
    ///
    /// Points earlier than `start` are coalesced into a single point at
    /// `start` carrying the gain accumulated up to then.
    pub fn gain_history(
        &self,
        mode: TransactionMatchMode,
        include_commission: bool,
        start: Option<NaiveDateTime>,
    ) -> Vec<SeriesPoint> {
        let mut points: Vec<SeriesPoint> = Vec::new();
        let mut total = 0.0;
        for pair in self.match_transactions(mode).sold {
            total += pair.gain(include_commission);
            let time = match start {
                Some(start) if pair.sell.time < start => start,
                _ => pair.sell.time,
            };
            match points.last_mut() {
                Some(last) if last.time == time => last.value = total,
                _ => points.push(SeriesPoint::new(time, total)),
            }
        }
        points
    }

    // ── Projection onto price series ────────────────────────────────

    /// Split into transactions older than `first` and the remaining ones in
    /// chronological order.
    fn partition_at(&self, first: NaiveDateTime) -> (TransactionHistory, Vec<Transaction>) {
        let before = self.transactions_before(first);
        let mut pending: Vec<Transaction> = self
            .transactions
            .iter()
            .filter(|t| t.time >= first)
            .cloned()
            .collect();
        pending.reverse();
        (before, pending)
    }

    /// Market value of the holding at each bar of `prices` (sorted by time).
    ///
    /// Transactions at exactly a bar's time are counted for that bar.
    /// Leading zero rows are trimmed.
    pub fn calculate_value_history(&self, prices: &[SeriesPoint]) -> Vec<SeriesPoint> {
        let Some(first) = prices.first() else {
            return Vec::new();
        };
        let (before, pending) = self.partition_at(first.time);

        let mut amount = before.current_amount();
        let mut pending = pending.into_iter().peekable();
        let mut values = Vec::with_capacity(prices.len());
        for bar in prices {
            while let Some(trans) = pending.next_if(|t| t.time <= bar.time) {
                amount += trans.amount;
            }
            let value = if amount == 0 {
                0.0
            } else {
                amount as f64 * bar.value
            };
            values.push(SeriesPoint::new(bar.time, value));
        }

        let leading = values.iter().take_while(|p| p.value == 0.0).count();
        values.drain(..leading);
        values
    }

    /// Profit at each bar of `prices` assuming the holding is sold at the
    /// bar's close (net of the sell commission).
    ///
    /// With `overall` the realized component is the overall profit of all
    /// transactions up to the bar; otherwise it is minus the cost of the
    /// currently held average. Bars before the first transaction are 0.
    pub fn calculate_profit_history(
        &self,
        prices: &[SeriesPoint],
        mode: TransactionMatchMode,
        overall: bool,
    ) -> Vec<SeriesPoint> {
        let Some(first) = prices.first() else {
            return Vec::new();
        };
        let (mut accounted, pending) = self.partition_at(first.time);

        let mut pending = pending.into_iter().peekable();
        let mut average = weighted_average(&accounted.current_transactions(mode));
        let mut profits = Vec::with_capacity(prices.len());
        for bar in prices {
            let mut changed = false;
            while let Some(trans) = pending.next_if(|t| t.time <= bar.time) {
                // Chronological replay: each new transaction is the newest.
                accounted.transactions.insert(0, trans);
                changed = true;
            }
            if accounted.is_empty() {
                profits.push(SeriesPoint::new(bar.time, 0.0));
                continue;
            }
            if changed && !overall {
                average = weighted_average(&accounted.current_transactions(mode));
            }

            let amount = accounted.current_amount();
            let sell_value = if amount > 0 {
                let value = amount as f64 * bar.value;
                value - broker_commission(value, bar.time)
            } else {
                0.0
            };
            let profit = if overall {
                accounted.overall_profit() + sell_value
            } else {
                let (held, avg_price) = average;
                sell_value - held as f64 * avg_price
            };
            profits.push(SeriesPoint::new(bar.time, profit));
        }
        profits
    }
}

/// Pick the open buy consumed next by `sell`. `open` is newest first.
fn find_matching(
    open: &[Transaction],
    mode: TransactionMatchMode,
    sell: &Transaction,
) -> Option<usize> {
    if open.is_empty() {
        return None;
    }
    match mode {
        TransactionMatchMode::Oldest => Some(open.len() - 1),
        TransactionMatchMode::Best => cheapest(open),
        TransactionMatchMode::RecentProfit => open
            .iter()
            .position(|buy| buy.unit_price < sell.unit_price)
            .or_else(|| cheapest(open)),
    }
}

/// Lowest unit price; ties keep the lowest index.
fn cheapest(open: &[Transaction]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (idx, buy) in open.iter().enumerate() {
        match best {
            Some(b) if open[b].unit_price <= buy.unit_price => {}
            _ => best = Some(idx),
        }
    }
    best
}

fn weighted_average(buys: &TransactionHistory) -> (i64, f64) {
    let amount = buys.current_amount();
    if amount == 0 {
        return (0, 0.0);
    }
    let cost: f64 = buys.iter().map(Transaction::value_with_commission).sum();
    (amount, cost / amount as f64)
}
