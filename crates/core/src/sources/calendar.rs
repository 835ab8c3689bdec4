use chrono::NaiveDate;
use std::path::Path;

use crate::errors::CoreError;
use crate::models::column::{ColumnMap, ColumnTag};
use crate::models::worksheet::Worksheet;

use super::html::{self, TableLayout};
use super::traits::WorksheetSource;

const STOCKWATCH_BASE: &str = "https://www.stockwatch.pl";
const STREFA_BASE: &str = "https://strefainwestorow.pl";

// ── Dividends ───────────────────────────────────────────────────────

const DIVIDENDS_LAYOUT: TableLayout = TableLayout {
    css: "table",
    header: &[
        "Nazwa",
        "Okres",
        "Dywidenda na akcję",
        "Stopa dywidendy (%)",
        "Dzień ustalenia prawa",
        "Dzień wypłaty",
        "Status",
    ],
};

/// Calendar of declared dividends.
#[derive(Debug, Clone, Default)]
pub struct DividendsSource;

impl WorksheetSource for DividendsSource {
    fn name(&self) -> &str {
        "dividends"
    }

    fn data_path(&self) -> String {
        "calendar/dividends.html".to_string()
    }

    fn data_url(&self) -> String {
        format!("{STOCKWATCH_BASE}/dywidendy/")
    }

    fn parse(&self, path: &Path) -> Result<Worksheet, CoreError> {
        let content = html::read_text(path)?;
        let mut sheet = html::parse_with_layout(self.name(), &content, &DIVIDENDS_LAYOUT)?;
        // The calendar ends with a source note spanning the whole row.
        html::drop_trailer(&mut sheet, html::is_footnote_row);
        Ok(sheet)
    }

    fn columns(&self) -> ColumnMap {
        &[
            (ColumnTag::StockName, 0),
            (ColumnTag::ReportPeriod, 1),
            (ColumnTag::Dividend, 2),
            (ColumnTag::DividendYield, 3),
            (ColumnTag::Date, 4),
        ]
    }
}

// ── Financial reports ───────────────────────────────────────────────

const REPORTS_LAYOUT: TableLayout = TableLayout {
    css: "table",
    header: &["Nazwa", "Raport", "Okres", "Data publikacji"],
};

/// Upcoming financial reports.
#[derive(Debug, Clone, Default)]
pub struct ReportsSource;

impl WorksheetSource for ReportsSource {
    fn name(&self) -> &str {
        "finance_reports"
    }

    fn data_path(&self) -> String {
        "calendar/reports.html".to_string()
    }

    fn data_url(&self) -> String {
        format!("{STREFA_BASE}/kalendarium/raporty-finansowe/nadchodzace")
    }

    fn parse(&self, path: &Path) -> Result<Worksheet, CoreError> {
        let content = html::read_text(path)?;
        if html::has_no_data_marker(&content) {
            return Err(CoreError::EmptySource(self.name().to_string()));
        }
        html::parse_with_layout(self.name(), &content, &REPORTS_LAYOUT)
    }

    fn empty_worksheet(&self) -> Worksheet {
        Worksheet::empty_with_columns(REPORTS_LAYOUT.header)
    }

    fn columns(&self) -> ColumnMap {
        &[
            (ColumnTag::StockName, 0),
            (ColumnTag::ReportType, 1),
            (ColumnTag::ReportPeriod, 2),
            (ColumnTag::Date, 3),
        ]
    }
}

/// Financial reports published within an inclusive date range.
#[derive(Debug, Clone)]
pub struct PublishedReportsSource {
    from: NaiveDate,
    to: NaiveDate,
}

impl PublishedReportsSource {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Self {
        Self { from, to }
    }
}

impl WorksheetSource for PublishedReportsSource {
    fn name(&self) -> &str {
        "published_finance_reports"
    }

    fn data_path(&self) -> String {
        format!(
            "calendar/published_{}_{}.html",
            self.from.format("%Y-%m-%d"),
            self.to.format("%Y-%m-%d")
        )
    }

    fn data_url(&self) -> String {
        format!(
            "{STREFA_BASE}/kalendarium/raporty-finansowe/opublikowane?date_from={}&date_to={}",
            self.from.format("%Y-%m-%d"),
            self.to.format("%Y-%m-%d")
        )
    }

    fn parse(&self, path: &Path) -> Result<Worksheet, CoreError> {
        let content = html::read_text(path)?;
        if html::has_no_data_marker(&content) {
            return Err(CoreError::EmptySource(self.name().to_string()));
        }
        html::parse_with_layout(self.name(), &content, &REPORTS_LAYOUT)
    }

    fn empty_worksheet(&self) -> Worksheet {
        Worksheet::empty_with_columns(REPORTS_LAYOUT.header)
    }

    fn columns(&self) -> ColumnMap {
        &[
            (ColumnTag::StockName, 0),
            (ColumnTag::ReportType, 1),
            (ColumnTag::ReportPeriod, 2),
            (ColumnTag::Date, 3),
        ]
    }
}
