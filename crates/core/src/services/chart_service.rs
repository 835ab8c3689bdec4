use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use tracing::debug;

use crate::models::price::SeriesPoint;
use crate::models::transaction::TransactionMatchMode;
use crate::models::wallet::Wallet;

/// Add two step series point by point.
///
/// The result has one point per distinct time of either input, strictly
/// increasing. At each time both operands contribute their latest value at
/// or before it; a side that has not started yet contributes 0, a side that
/// already ended keeps contributing its last value. Inputs must be sorted
/// by time; repeated times within one input collapse to the last value.
pub fn join_series(a: &[SeriesPoint], b: &[SeriesPoint]) -> Vec<SeriesPoint> {
    let mut joined = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    let (mut a_value, mut b_value) = (0.0, 0.0);

    loop {
        let time = match (a.get(i), b.get(j)) {
            (Some(pa), Some(pb)) => pa.time.min(pb.time),
            (Some(pa), None) => pa.time,
            (None, Some(pb)) => pb.time,
            (None, None) => break,
        };
        while let Some(p) = a.get(i).filter(|p| p.time == time) {
            a_value = p.value;
            i += 1;
        }
        while let Some(p) = b.get(j).filter(|p| p.time == time) {
            b_value = p.value;
            j += 1;
        }
        joined.push(SeriesPoint::new(time, a_value + b_value));
    }
    joined
}

/// Fold any number of series with [`join_series`].
pub fn join_all<I>(series: I) -> Vec<SeriesPoint>
where
    I: IntoIterator<Item = Vec<SeriesPoint>>,
{
    series
        .into_iter()
        .fold(Vec::new(), |acc, next| join_series(&acc, &next))
}

/// Wallet-level time series built from per-ticker histories.
///
/// Price series are supplied per ticker by the caller, already limited to
/// the requested range. Tickers without a price series are left out.
pub struct ChartService {
    mode: TransactionMatchMode,
}

impl ChartService {
    pub fn new(mode: TransactionMatchMode) -> Self {
        Self { mode }
    }

    /// Market value of the whole wallet over time.
    pub fn wallet_value_history(
        &self,
        wallet: &Wallet,
        prices: &BTreeMap<String, Vec<SeriesPoint>>,
    ) -> Vec<SeriesPoint> {
        join_all(wallet.tickers().into_iter().filter_map(|ticker| {
            let series = prices.get(&ticker)?;
            let values = wallet.ticker_history(&ticker).calculate_value_history(series);
            debug!(ticker = %ticker, points = values.len(), "value history");
            Some(values)
        }))
    }

    /// Profit of the whole wallet over time, either of the held positions
    /// only or `overall` including everything already realized.
    pub fn wallet_profit_history(
        &self,
        wallet: &Wallet,
        prices: &BTreeMap<String, Vec<SeriesPoint>>,
        overall: bool,
    ) -> Vec<SeriesPoint> {
        join_all(wallet.tickers().into_iter().filter_map(|ticker| {
            let series = prices.get(&ticker)?;
            Some(
                wallet
                    .ticker_history(&ticker)
                    .calculate_profit_history(series, self.mode, overall),
            )
        }))
    }

    /// Cumulative realized gain of the whole wallet. Gains realized before
    /// `start` are carried into a single point at `start`.
    pub fn wallet_gain_history(&self, wallet: &Wallet, start: Option<NaiveDateTime>) -> Vec<SeriesPoint> {
        join_all(
            wallet
                .tickers()
                .into_iter()
                .map(|ticker| wallet.ticker_history(&ticker).gain_history(self.mode, true, start)),
        )
    }
}

impl Default for ChartService {
    fn default() -> Self {
        Self::new(TransactionMatchMode::default())
    }
}
