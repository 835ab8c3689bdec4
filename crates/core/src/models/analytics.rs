use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::marker::MarkerOperation;

/// Placeholder shown for values that cannot be computed.
pub const PLACEHOLDER: &str = "-";

/// Render an optional number with two decimals, or the placeholder.
pub fn format_cell(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:.2}"),
        None => PLACEHOLDER.to_string(),
    }
}

/// Headline numbers of the wallet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletSummary {
    /// Market value of the holdings, net of the commission of selling them.
    pub wallet_value: f64,

    /// Unrealized profit of the current holdings.
    pub wallet_profit: f64,

    /// Change of the holdings against the reference prices, e.g. `"1.25%"`,
    /// or `"--"` when the reference basket is zero.
    pub change_to_reference: String,

    /// Realized gain over all matched sells, commissions included.
    pub gain: f64,

    /// Overall profit: signed sum of all transactions plus the wallet value.
    pub overall_profit: f64,
}

/// One row of the wallet table, per `(stock_name, ticker)`.
///
/// Quote-dependent fields are `None` when the current quote is missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletStockRow {
    pub stock_name: String,
    pub ticker: String,
    pub amount: i64,
    /// Average buy price including commission.
    pub average_buy: Option<f64>,
    pub current_unit: Option<f64>,
    /// Percentage change of the current price to the reference price.
    pub change_to_ref_pct: Option<f64>,
    /// Change of the position's value to the reference, in wallet currency.
    pub change_to_ref_value: Option<f64>,
    pub value: Option<f64>,
    /// Share of the position in the wallet value.
    pub participation_pct: Option<f64>,
    pub profit_pct: Option<f64>,
    pub profit: Option<f64>,
    pub overall_profit: Option<f64>,
}

impl WalletStockRow {
    /// Row carrying only its identity and amount.
    pub fn unresolved(stock_name: &str, ticker: &str, amount: i64) -> Self {
        Self {
            stock_name: stock_name.to_string(),
            ticker: ticker.to_string(),
            amount,
            average_buy: None,
            current_unit: None,
            change_to_ref_pct: None,
            change_to_ref_value: None,
            value: None,
            participation_pct: None,
            profit_pct: None,
            profit: None,
            overall_profit: None,
        }
    }

    /// Cells in display order, placeholders included.
    pub fn cells(&self) -> Vec<String> {
        vec![
            self.stock_name.clone(),
            self.ticker.clone(),
            self.amount.to_string(),
            self.average_buy
                .map_or_else(|| PLACEHOLDER.to_string(), |v| format!("{v:.4}")),
            format_cell(self.current_unit),
            format_cell(self.change_to_ref_pct),
            format_cell(self.change_to_ref_value),
            format_cell(self.value),
            format_cell(self.participation_pct),
            format_cell(self.profit_pct),
            format_cell(self.profit),
            format_cell(self.overall_profit),
        ]
    }
}

/// Kind of a transaction row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionKind {
    Buy,
    Sell,
}

/// One transaction with its profit computed against the current price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRow {
    pub stock_name: String,
    pub ticker: String,
    pub kind: TransactionKind,
    pub time: NaiveDateTime,
    /// Absolute amount.
    pub amount: i64,
    pub unit_price: f64,
    pub commission: f64,
    pub current_unit: Option<f64>,
    pub profit_pct: Option<f64>,
    pub profit: Option<f64>,
}

/// One matched sell slice with its realized result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SellRow {
    pub stock_name: String,
    pub ticker: String,
    pub buy_time: NaiveDateTime,
    pub sell_time: NaiveDateTime,
    pub amount: i64,
    pub buy_unit: f64,
    pub sell_unit: f64,
    pub commission: f64,
    pub profit_pct: f64,
    pub profit: f64,
}

/// A marker enriched with the live quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerRow {
    pub id: Uuid,
    pub ticker: String,
    pub stock_name: Option<String>,
    pub current_value: Option<f64>,
    pub operation: MarkerOperation,
    pub amount: i64,
    pub value: f64,
    pub required_change: Option<f64>,
    pub required_value: Option<f64>,
    pub reached: Option<bool>,
    pub color: String,
    pub notes: String,
}
