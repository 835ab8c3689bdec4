use chrono::NaiveDateTime;
use csv::{ReaderBuilder, StringRecord, Trim};
use std::collections::BTreeSet;
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

use crate::errors::CoreError;
use crate::models::wallet::Wallet;
use crate::services::wallet_service::QuoteLookup;

const SOURCE_NAME: &str = "transactions import";

/// Timestamp layout of the `trans_time` column.
pub const TRANS_TIME_FORMAT: &str = "%d.%m.%Y %H:%M:%S";

/// Outcome of a transaction import.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    /// Transactions added to the imported wallet.
    pub imported: usize,
    /// Stock names that could not be mapped to a ticker, in first-seen order.
    pub skipped_names: Vec<String>,
}

/// Positions of the required and optional columns in the header.
struct Columns {
    trans_time: usize,
    name: usize,
    k_s: usize,
    amount: usize,
    unit_price: usize,
    commission: Option<usize>,
}

impl Columns {
    fn from_header(header: &StringRecord) -> Result<Self, CoreError> {
        let find = |name: &str| header.iter().position(|h| h.trim().eq_ignore_ascii_case(name));
        let require = |name: &str| {
            find(name).ok_or_else(|| CoreError::parse(SOURCE_NAME, format!("missing column '{name}'")))
        };
        Ok(Self {
            trans_time: require("trans_time")?,
            name: require("name")?,
            k_s: require("k_s")?,
            amount: require("amount")?,
            unit_price: require("unit_price")?,
            commission: find("commission_value"),
        })
    }
}

/// Reads broker transaction exports into a [`Wallet`].
///
/// Expected columns: `trans_time` (`DD.MM.YYYY HH:MM:SS`), `name`,
/// `k_s` (`K` buy, `S` sell), `amount`, `unit_price` and optionally
/// `commission_value`. Both `,` and `;` separated files are accepted,
/// numbers may use a decimal comma. Fills of one order are joined.
pub struct ImportService;

impl ImportService {
    pub fn new() -> Self {
        Self
    }

    pub fn import_file(&self, path: &Path, quotes: &dyn QuoteLookup) -> Result<(Wallet, ImportReport), CoreError> {
        let file = std::fs::File::open(path)?;
        self.import_transactions(file, quotes)
    }

    /// Parse every row and map stock names to tickers through `quotes`.
    /// Rows with unknown names are skipped and reported.
    pub fn import_transactions<R: Read>(
        &self,
        mut reader: R,
        quotes: &dyn QuoteLookup,
    ) -> Result<(Wallet, ImportReport), CoreError> {
        let mut content = String::new();
        reader.read_to_string(&mut content)?;
        let content = content.trim_start_matches('\u{feff}');

        let first_line = content.lines().next().unwrap_or_default();
        let delimiter = if first_line.contains(';') { b';' } else { b',' };

        let mut csv = ReaderBuilder::new()
            .delimiter(delimiter)
            .trim(Trim::All)
            .flexible(true)
            .from_reader(content.as_bytes());
        let columns = Columns::from_header(csv.headers()?)?;

        let mut wallet = Wallet::new();
        let mut report = ImportReport::default();
        let mut skipped = BTreeSet::new();

        for (line, record) in csv.records().enumerate() {
            let record = record?;
            let field = |idx: usize| record.get(idx).unwrap_or("");
            if record.iter().all(str::is_empty) {
                continue;
            }
            let row = line + 2;

            let name = field(columns.name);
            let time = NaiveDateTime::parse_from_str(field(columns.trans_time), TRANS_TIME_FORMAT)
                .map_err(|e| CoreError::parse(SOURCE_NAME, format!("row {row}: bad trans_time: {e}")))?;
            let amount = parse_decimal(field(columns.amount))
                .ok_or_else(|| CoreError::parse(SOURCE_NAME, format!("row {row}: bad amount")))?
                .round() as i64;
            let unit_price = parse_decimal(field(columns.unit_price))
                .ok_or_else(|| CoreError::parse(SOURCE_NAME, format!("row {row}: bad unit_price")))?;
            let commission = columns
                .commission
                .and_then(|idx| parse_decimal(field(idx)))
                .unwrap_or(0.0);
            let amount = match field(columns.k_s).to_ascii_uppercase().as_str() {
                "K" => amount.abs(),
                "S" => -amount.abs(),
                other => {
                    return Err(CoreError::parse(
                        SOURCE_NAME,
                        format!("row {row}: unknown operation '{other}'"),
                    ))
                }
            };

            let Some(ticker) = quotes.ticker_for_name(name)? else {
                if skipped.insert(name.to_string()) {
                    warn!(name, "no ticker for stock name, skipping its transactions");
                    report.skipped_names.push(name.to_string());
                }
                continue;
            };

            wallet.add_transaction(name, &ticker, amount, unit_price, time, commission, true);
            report.imported += 1;
        }

        info!(
            imported = report.imported,
            skipped = report.skipped_names.len(),
            "transactions imported"
        );
        Ok((wallet, report))
    }
}

impl Default for ImportService {
    fn default() -> Self {
        Self::new()
    }
}

/// Number with an optional decimal comma and thousands spaces.
fn parse_decimal(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_comma_and_spaces() {
        assert_eq!(parse_decimal("1 234,50"), Some(1234.5));
        assert_eq!(parse_decimal("3.25"), Some(3.25));
        assert_eq!(parse_decimal(""), None);
        assert_eq!(parse_decimal("abc"), None);
    }
}
