use std::path::Path;

use crate::errors::CoreError;
use crate::models::column::{ColumnMap, ColumnTag};
use crate::models::worksheet::Worksheet;

use super::html::{self, TableLayout};
use super::traits::WorksheetSource;

const KNF_BASE: &str = "https://rss.knf.gov.pl/RssOuterView/faces";

const SHORT_SELL_LAYOUT: TableLayout = TableLayout {
    css: "table",
    header: &[
        "Posiadacz pozycji",
        "Nazwa emitenta",
        "ISIN",
        "Wielkość pozycji (%)",
        "Data pozycji",
    ],
};

/// Which register of net short positions to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortSellKind {
    /// Positions currently above the disclosure threshold.
    Current,
    /// Every disclosed position change.
    History,
}

/// Net short positions disclosed to the financial supervisor.
#[derive(Debug, Clone)]
pub struct ShortSellSource {
    kind: ShortSellKind,
}

impl ShortSellSource {
    pub fn new(kind: ShortSellKind) -> Self {
        Self { kind }
    }

    pub fn current() -> Self {
        Self::new(ShortSellKind::Current)
    }

    pub fn history() -> Self {
        Self::new(ShortSellKind::History)
    }
}

impl WorksheetSource for ShortSellSource {
    fn name(&self) -> &str {
        match self.kind {
            ShortSellKind::Current => "short_sell_current",
            ShortSellKind::History => "short_sell_history",
        }
    }

    fn data_path(&self) -> String {
        format!("knf/{}.html", self.name())
    }

    fn data_url(&self) -> String {
        match self.kind {
            ShortSellKind::Current => format!("{KNF_BASE}/hspList.xhtml"),
            ShortSellKind::History => format!("{KNF_BASE}/hspHistList.xhtml"),
        }
    }

    fn parse(&self, path: &Path) -> Result<Worksheet, CoreError> {
        let content = html::read_text(path)?;
        if html::has_no_data_marker(&content) {
            return Err(CoreError::EmptySource(self.name().to_string()));
        }
        html::parse_with_layout(self.name(), &content, &SHORT_SELL_LAYOUT)
    }

    fn empty_worksheet(&self) -> Worksheet {
        Worksheet::empty_with_columns(SHORT_SELL_LAYOUT.header)
    }

    fn columns(&self) -> ColumnMap {
        &[
            (ColumnTag::Holder, 0),
            (ColumnTag::StockName, 1),
            (ColumnTag::Isin, 2),
            (ColumnTag::PositionPct, 3),
            (ColumnTag::Date, 4),
        ]
    }
}
