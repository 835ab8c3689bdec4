use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Broker commission rate applied to the transaction value.
pub const COMMISSION_RATE: f64 = 0.0039;

/// Minimal commission for transactions up to and including
/// [`COMMISSION_FLOOR_CHANGE`].
pub const COMMISSION_FLOOR_OLD: f64 = 3.0;

/// Minimal commission for transactions after [`COMMISSION_FLOOR_CHANGE`].
pub const COMMISSION_FLOOR: f64 = 5.0;

/// Last day on which the old commission floor applied.
pub const COMMISSION_FLOOR_CHANGE: (i32, u32, u32) = (2020, 10, 6);

/// Broker commission for a transaction of `value` made at `time`:
/// `max(floor, rate * |value|)`.
pub fn broker_commission(value: f64, time: NaiveDateTime) -> f64 {
    let (y, m, d) = COMMISSION_FLOOR_CHANGE;
    let floor = match NaiveDate::from_ymd_opt(y, m, d) {
        Some(change) if time.date() <= change => COMMISSION_FLOOR_OLD,
        _ => COMMISSION_FLOOR,
    };
    (value.abs() * COMMISSION_RATE).max(floor)
}

/// Policy selecting which open buy is consumed by each sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TransactionMatchMode {
    /// First in, first out.
    Oldest,
    /// Cheapest open buy first.
    #[default]
    Best,
    /// Most recent open buy that the sell is profitable against, else `Best`.
    RecentProfit,
}

impl std::fmt::Display for TransactionMatchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionMatchMode::Oldest => write!(f, "OLDEST"),
            TransactionMatchMode::Best => write!(f, "BEST"),
            TransactionMatchMode::RecentProfit => write!(f, "RECENT_PROFIT"),
        }
    }
}

impl std::str::FromStr for TransactionMatchMode {
    type Err = crate::errors::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "OLDEST" => Ok(TransactionMatchMode::Oldest),
            "BEST" => Ok(TransactionMatchMode::Best),
            "RECENT_PROFIT" => Ok(TransactionMatchMode::RecentProfit),
            other => Err(crate::errors::CoreError::ValidationError(format!(
                "Unknown transaction match mode: {other}"
            ))),
        }
    }
}

/// A single buy or sell of one stock.
///
/// Sign convention: `amount > 0` is a buy, `amount < 0` is a sell.
/// A `commission` of 0 means "not given"; [`Transaction::commission_value`]
/// substitutes the broker rule in that case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub amount: i64,
    pub unit_price: f64,
    pub commission: f64,
    pub time: NaiveDateTime,
}

impl Transaction {
    pub fn new(amount: i64, unit_price: f64, commission: f64, time: NaiveDateTime) -> Self {
        Self {
            amount,
            unit_price,
            commission,
            time,
        }
    }

    pub fn is_buy(&self) -> bool {
        self.amount > 0
    }

    pub fn is_sell(&self) -> bool {
        self.amount < 0
    }

    /// Signed value without commission: positive for buys, negative for sells.
    pub fn value(&self) -> f64 {
        self.amount as f64 * self.unit_price
    }

    /// Commission as given, or the broker rule when none was recorded.
    pub fn commission_value(&self) -> f64 {
        if self.commission != 0.0 {
            self.commission
        } else {
            broker_commission(self.value(), self.time)
        }
    }

    /// Signed value with commission added: cash spent on a buy is
    /// `value_with_commission`, cash received on a sell is its negation.
    pub fn value_with_commission(&self) -> f64 {
        self.value() + self.commission_value()
    }

    /// Copy with the lazy commission materialised.
    pub fn with_resolved_commission(&self) -> Self {
        Self {
            commission: self.commission_value(),
            ..self.clone()
        }
    }

    pub fn matches(&self, amount: i64, unit_price: f64, commission: f64, time: NaiveDateTime) -> bool {
        self.amount == amount
            && self.unit_price == unit_price
            && self.commission == commission
            && self.time == time
    }
}

impl std::fmt::Display for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = if self.is_buy() { "BUY" } else { "SELL" };
        write!(
            f,
            "{kind} {} @ {:.2} (+{:.2}) {}",
            self.amount.abs(),
            self.unit_price,
            self.commission,
            self.time
        )
    }
}
