use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::column::ColumnTag;
use super::worksheet::Worksheet;

/// A single `(time, value)` point of a price, value or profit series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub time: NaiveDateTime,
    pub value: f64,
}

impl SeriesPoint {
    pub fn new(time: NaiveDateTime, value: f64) -> Self {
        Self { time, value }
    }
}

/// One OHLCV bar of an intraday or historical series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Repair known defects of the intraday source: missing volume becomes
    /// 0, and an opening price of 0 paired with 0 volume is replaced by the
    /// close so the bar does not render as a spike to zero.
    pub fn sanitized(mut self) -> Self {
        if self.volume.is_nan() {
            self.volume = 0.0;
        }
        if self.open == 0.0 && self.volume == 0.0 {
            self.open = self.close;
        }
        self
    }
}

/// Column layout shared by every candle worksheet.
pub const CANDLE_COLUMNS: [&str; 6] = ["t", "o", "h", "l", "c", "v"];

/// Position of each tag in a candle worksheet.
pub const CANDLE_COLUMN_MAP: &[(ColumnTag, usize)] = &[
    (ColumnTag::Time, 0),
    (ColumnTag::Opening, 1),
    (ColumnTag::Max, 2),
    (ColumnTag::Min, 3),
    (ColumnTag::Closing, 4),
    (ColumnTag::Volume, 5),
];

/// Build a candle worksheet from bars.
pub fn candles_to_worksheet(candles: &[Candle]) -> Worksheet {
    let mut sheet = Worksheet::empty_with_columns(&CANDLE_COLUMNS);
    for c in candles {
        sheet.push_row(vec![
            c.time.into(),
            c.open.into(),
            c.high.into(),
            c.low.into(),
            c.close.into(),
            c.volume.into(),
        ]);
    }
    sheet
}

/// Read bars back from a candle worksheet. Rows with a missing time or
/// close are skipped.
pub fn candles_from_worksheet(sheet: &Worksheet) -> Vec<Candle> {
    sheet
        .rows
        .iter()
        .filter_map(|row| {
            let num = |idx: usize| row.get(idx).and_then(|c| c.as_f64()).unwrap_or(0.0);
            Some(Candle {
                time: row.first()?.as_time()?,
                open: num(1),
                high: num(2),
                low: num(3),
                close: row.get(4)?.as_f64()?,
                volume: num(5),
            })
        })
        .collect()
}

/// `(time, close)` series of a candle worksheet, sorted by time.
pub fn close_series(sheet: &Worksheet) -> Vec<SeriesPoint> {
    let mut points: Vec<SeriesPoint> = candles_from_worksheet(sheet)
        .into_iter()
        .map(|c| SeriesPoint::new(c.time, c.close))
        .collect();
    points.sort_by_key(|p| p.time);
    points
}
