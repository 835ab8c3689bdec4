use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::errors::CoreError;
use crate::models::column::ColumnMap;
use crate::models::price::{candles_to_worksheet, Candle, CANDLE_COLUMNS, CANDLE_COLUMN_MAP};
use crate::models::range::{IntradayQuery, RangeCode};
use crate::models::worksheet::Worksheet;

use super::fetcher::Fetcher;
use super::traits::WorksheetSource;

/// Instrument family; stocks and indexes are served by different hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntradayKind {
    Stock,
    Index,
}

impl IntradayKind {
    fn base_url(&self) -> &'static str {
        match self {
            IntradayKind::Stock => "https://www.gpw.pl",
            IntradayKind::Index => "https://gpwbenchmark.pl",
        }
    }

    fn dir(&self) -> &'static str {
        match self {
            IntradayKind::Stock => "stock",
            IntradayKind::Index => "index",
        }
    }
}

#[derive(Debug, Serialize)]
struct ChartRequest<'a> {
    isin: &'a str,
    mode: &'a str,
    from: Option<String>,
    to: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    #[serde(default)]
    data: Vec<ChartPoint>,
}

#[derive(Debug, Deserialize)]
struct ChartPoint {
    t: i64,
    o: Option<f64>,
    h: Option<f64>,
    l: Option<f64>,
    c: Option<f64>,
    v: Option<f64>,
}

/// Candle series of one instrument over one range code.
///
/// Multi-day ranges also download the current session (`CURR`) next to
/// the main payload; its last bar is appended to the series when newer.
#[derive(Debug, Clone)]
pub struct IntradaySource {
    kind: IntradayKind,
    isin: String,
    range: RangeCode,
    today: NaiveDate,
}

impl IntradaySource {
    pub fn new(kind: IntradayKind, isin: impl Into<String>, range: RangeCode) -> Self {
        Self {
            kind,
            isin: isin.into(),
            range,
            today: Local::now().date_naive(),
        }
    }

    /// Anchor date of computed ranges.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn isin(&self) -> &str {
        &self.isin
    }

    pub fn range(&self) -> &RangeCode {
        &self.range
    }

    fn query_url(&self, query: &IntradayQuery) -> String {
        let base = format!("{}/chart-json.php", self.kind.base_url());
        let request = [ChartRequest {
            isin: &self.isin,
            mode: &query.mode,
            from: query.from.map(|d| d.format("%Y-%m-%d").to_string()),
            to: query.to.map(|d| d.format("%Y-%m-%d").to_string()),
        }];
        let req = serde_json::to_string(&request).unwrap_or_default();
        match reqwest::Url::parse_with_params(&base, &[("req", req.as_str())]) {
            Ok(url) => url.to_string(),
            Err(_) => format!("{base}?req={req}"),
        }
    }

    fn current_session_url(&self) -> String {
        self.query_url(&RangeCode::Day1.query(self.today))
    }

    /// Sibling file holding the current-session payload of multi-day ranges.
    fn session_path(path: &Path) -> PathBuf {
        path.with_extension("curr.json")
    }
}

#[async_trait]
impl WorksheetSource for IntradaySource {
    fn name(&self) -> &str {
        match self.kind {
            IntradayKind::Stock => "stock_intraday",
            IntradayKind::Index => "index_intraday",
        }
    }

    fn data_path(&self) -> String {
        format!(
            "intraday/{}/{}_{}.json",
            self.kind.dir(),
            self.isin,
            self.range.code()
        )
    }

    fn data_url(&self) -> String {
        self.query_url(&self.range.query(self.today))
    }

    async fn download(&self, fetcher: &dyn Fetcher, path: &Path) -> Result<(), CoreError> {
        fetcher.fetch(&self.data_url(), path).await?;
        if self.range.is_multi_day() {
            let session = Self::session_path(path);
            if let Err(e) = fetcher.fetch(&self.current_session_url(), &session).await {
                // The historical part is still usable without the tail.
                warn!(source = self.name(), isin = %self.isin, error = %e, "current session fetch failed");
                let _ = std::fs::remove_file(&session);
            }
        }
        Ok(())
    }

    fn parse(&self, path: &Path) -> Result<Worksheet, CoreError> {
        let mut candles = parse_chart_payload(self.name(), path)?;

        if self.range.is_multi_day() {
            let session = Self::session_path(path);
            if session.exists() {
                match parse_chart_payload(self.name(), &session) {
                    Ok(current) => append_newer_tail(&mut candles, &current),
                    Err(e) => debug!(source = self.name(), error = %e, "no current session tail"),
                }
            }
        }

        if candles.is_empty() {
            return Err(CoreError::EmptySource(format!("{} {}", self.name(), self.isin)));
        }
        Ok(candles_to_worksheet(&candles))
    }

    fn empty_worksheet(&self) -> Worksheet {
        Worksheet::empty_with_columns(&CANDLE_COLUMNS)
    }

    fn columns(&self) -> ColumnMap {
        CANDLE_COLUMN_MAP
    }
}

/// Append the last bar of `current` when it is newer than the last bar of
/// `candles`.
fn append_newer_tail(candles: &mut Vec<Candle>, current: &[Candle]) {
    let Some(tail) = current.last() else {
        return;
    };
    let is_newer = candles.last().map_or(true, |last| tail.time > last.time);
    if is_newer {
        candles.push(*tail);
    }
}

/// Parse a chart-json payload into sanitized bars sorted by time.
pub fn parse_chart_payload(source_name: &str, path: &Path) -> Result<Vec<Candle>, CoreError> {
    let content = std::fs::read_to_string(path)?;
    parse_chart_json(source_name, &content)
}

pub fn parse_chart_json(source_name: &str, content: &str) -> Result<Vec<Candle>, CoreError> {
    let responses: Vec<ChartResponse> = serde_json::from_str(content)
        .map_err(|e| CoreError::parse(source_name, format!("invalid chart payload: {e}")))?;

    let mut candles: Vec<Candle> = responses
        .into_iter()
        .flat_map(|r| r.data)
        .filter_map(|p| {
            let time = DateTime::from_timestamp(p.t, 0)?
                .with_timezone(&Local)
                .naive_local();
            let close = p.c?;
            let candle = Candle {
                time,
                open: p.o.unwrap_or(0.0),
                high: p.h.unwrap_or(close),
                low: p.l.unwrap_or(close),
                close,
                volume: p.v.unwrap_or(f64::NAN),
            };
            Some(candle.sanitized())
        })
        .collect();
    candles.sort_by_key(|c| c.time);
    Ok(candles)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_is_keyed_by_isin_and_range() {
        let source = IntradaySource::new(IntradayKind::Stock, "PLOPTTC00011", RangeCode::Month1);
        assert_eq!(source.data_path(), "intraday/stock/PLOPTTC00011_1M.json");
    }

    #[test]
    fn day_range_uses_current_mode() {
        let source = IntradaySource::new(IntradayKind::Index, "PL9999999995", RangeCode::Day1);
        let url = source.data_url();
        assert!(url.starts_with("https://gpwbenchmark.pl/chart-json.php?req="));
        assert!(url.contains("CURR"));
    }

    #[test]
    fn missing_volume_and_zero_open_are_repaired() {
        let json = r#"[{"isin":"X","data":[
            {"t":1700000060,"o":0,"h":5,"l":0,"c":5,"v":null},
            {"t":1700000000,"o":0,"h":5,"l":0,"c":5,"v":0}
        ]}]"#;
        let candles = parse_chart_json("test", json).unwrap();
        assert_eq!(candles.len(), 2);
        for c in &candles {
            assert_eq!(c.open, 5.0);
            assert_eq!(c.volume, 0.0);
        }
        assert!(candles[0].time < candles[1].time);
    }

    #[test]
    fn tail_is_appended_only_when_newer() {
        let json = r#"[{"data":[{"t":1700000000,"o":1,"h":1,"l":1,"c":1,"v":1}]}]"#;
        let newer = r#"[{"data":[{"t":1700086400,"o":2,"h":2,"l":2,"c":2,"v":2}]}]"#;
        let mut candles = parse_chart_json("test", json).unwrap();
        let current = parse_chart_json("test", newer).unwrap();

        append_newer_tail(&mut candles, &current);
        assert_eq!(candles.len(), 2);
        append_newer_tail(&mut candles, &current);
        assert_eq!(candles.len(), 2);
    }
}
