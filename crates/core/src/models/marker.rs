use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Whether a marker waits for a buying or a selling opportunity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarkerOperation {
    Buy,
    Sell,
}

impl std::fmt::Display for MarkerOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MarkerOperation::Buy => write!(f, "BUY"),
            MarkerOperation::Sell => write!(f, "SELL"),
        }
    }
}

/// A price-level alert on a ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerEntry {
    pub id: Uuid,
    pub ticker: String,
    pub operation: MarkerOperation,
    pub amount: i64,
    /// Target unit price.
    pub value: f64,
    pub color: String,
    #[serde(default)]
    pub notes: String,
}

impl MarkerEntry {
    pub fn new(ticker: impl Into<String>, operation: MarkerOperation, amount: i64, value: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            ticker: ticker.into(),
            operation,
            amount,
            value,
            color: String::from("#ffff00"),
            notes: String::new(),
        }
    }

    /// Percentage change of the current price needed to reach the target.
    pub fn required_change(&self, current_value: f64) -> Option<f64> {
        (current_value != 0.0).then(|| (self.value / current_value - 1.0) * 100.0)
    }

    /// Per-unit price difference between the target and the current price.
    pub fn required_value(&self, current_value: f64) -> f64 {
        self.value - current_value
    }

    /// Whether the current price already satisfies the marker.
    pub fn is_reached(&self, current_value: f64) -> bool {
        match self.operation {
            MarkerOperation::Buy => current_value <= self.value,
            MarkerOperation::Sell => current_value >= self.value,
        }
    }
}

/// Ordered list of markers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Markers {
    entries: Vec<MarkerEntry>,
}

impl Markers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[MarkerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn add(&mut self, entry: MarkerEntry) -> Uuid {
        let id = entry.id;
        self.entries.push(entry);
        id
    }

    pub fn get(&self, id: Uuid) -> Option<&MarkerEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Replace the marker with the same id. Returns false if none exists.
    pub fn update(&mut self, entry: MarkerEntry) -> bool {
        match self.entries.iter_mut().find(|e| e.id == entry.id) {
            Some(slot) => {
                *slot = entry;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: Uuid) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        self.entries.len() != before
    }

    pub fn tickers_set(&self) -> BTreeSet<String> {
        self.entries.iter().map(|e| e.ticker.clone()).collect()
    }
}
