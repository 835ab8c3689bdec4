use chrono::{NaiveDate, NaiveDateTime};
use scraper::Html;
use std::path::Path;

use crate::errors::CoreError;
use crate::models::column::{ColumnMap, ColumnTag};
use crate::models::worksheet::{Cell, Worksheet};

use super::html::{self, TableLayout};
use super::traits::WorksheetSource;

const GPW_BASE: &str = "https://www.gpw.pl";
const GPW_BENCHMARK_BASE: &str = "https://gpwbenchmark.pl";

// ── Current stocks ──────────────────────────────────────────────────

const CURRENT_STOCK_LAYOUT: TableLayout = TableLayout {
    css: "table",
    header: &[
        "Nazwa",
        "Skrót",
        "Waluta",
        "Kurs odn.",
        "TKO",
        "Kurs otw.",
        "Kurs min.",
        "Kurs maks.",
        "Kurs ost.",
        "Zm. do k.odn. (%)",
        "Czas ost. trans.",
        "Wolumen",
        "Obrót",
    ],
};

/// Session quotations of all shares listed on the main market.
#[derive(Debug, Clone, Default)]
pub struct CurrentStockSource;

impl WorksheetSource for CurrentStockSource {
    fn name(&self) -> &str {
        "gpw_current_stocks"
    }

    fn data_path(&self) -> String {
        "gpw/current_stocks.html".to_string()
    }

    fn data_url(&self) -> String {
        format!("{GPW_BASE}/ajaxindex.php?action=GPWQuotations&start=showTable&tab=all&lang=PL&full=1")
    }

    fn parse(&self, path: &Path) -> Result<Worksheet, CoreError> {
        let content = html::read_text(path)?;
        html::parse_with_layout(self.name(), &content, &CURRENT_STOCK_LAYOUT)
    }

    fn columns(&self) -> ColumnMap {
        &[
            (ColumnTag::StockName, 0),
            (ColumnTag::Ticker, 1),
            (ColumnTag::Currency, 2),
            (ColumnTag::Reference, 3),
            (ColumnTag::Tko, 4),
            (ColumnTag::Opening, 5),
            (ColumnTag::Min, 6),
            (ColumnTag::Max, 7),
            (ColumnTag::RecentValue, 8),
            (ColumnTag::ChangeToRef, 9),
            (ColumnTag::RecentTransTime, 10),
            (ColumnTag::Volume, 11),
            (ColumnTag::Turnover, 12),
        ]
    }
}

// ── Current indexes ─────────────────────────────────────────────────

const CURRENT_INDEX_LAYOUT: TableLayout = TableLayout {
    css: "table",
    header: &[
        "Nazwa",
        "ISIN",
        "Kurs odn.",
        "Kurs otw.",
        "Kurs min.",
        "Kurs maks.",
        "Wartość",
        "Zm. do k.odn. (%)",
        "Czas ost. notowania",
    ],
};

/// Session values of the GPW Benchmark indexes.
#[derive(Debug, Clone, Default)]
pub struct CurrentIndexSource;

impl WorksheetSource for CurrentIndexSource {
    fn name(&self) -> &str {
        "gpw_current_indexes"
    }

    fn data_path(&self) -> String {
        "gpw/current_indexes.html".to_string()
    }

    fn data_url(&self) -> String {
        format!("{GPW_BENCHMARK_BASE}/ajaxindex.php?action=GPWIndexes&start=showTable&tab=indexes&lang=PL")
    }

    fn parse(&self, path: &Path) -> Result<Worksheet, CoreError> {
        let content = html::read_text(path)?;
        html::parse_with_layout(self.name(), &content, &CURRENT_INDEX_LAYOUT)
    }

    fn columns(&self) -> ColumnMap {
        &[
            (ColumnTag::StockName, 0),
            (ColumnTag::Isin, 1),
            (ColumnTag::Reference, 2),
            (ColumnTag::Opening, 3),
            (ColumnTag::Min, 4),
            (ColumnTag::Max, 5),
            (ColumnTag::RecentValue, 6),
            (ColumnTag::ChangeToRef, 7),
            (ColumnTag::RecentTransTime, 8),
        ]
    }
}

// ── ISIN map ────────────────────────────────────────────────────────

const ISIN_MAP_LAYOUT: TableLayout = TableLayout {
    css: "table",
    header: &["Nazwa", "Skrót", "Nazwa pełna", "ISIN", "Rynek"],
};

/// Name, ticker and ISIN of every listed company.
#[derive(Debug, Clone, Default)]
pub struct IsinMapSource;

impl WorksheetSource for IsinMapSource {
    fn name(&self) -> &str {
        "gpw_isin_map"
    }

    fn data_path(&self) -> String {
        "gpw/isin_map.html".to_string()
    }

    fn data_url(&self) -> String {
        format!("{GPW_BASE}/ajaxindex.php?start=isinTab&format=html&action=GPWListaSp&lang=PL")
    }

    fn parse(&self, path: &Path) -> Result<Worksheet, CoreError> {
        let content = html::read_text(path)?;
        html::parse_with_layout(self.name(), &content, &ISIN_MAP_LAYOUT)
    }

    fn columns(&self) -> ColumnMap {
        &[
            (ColumnTag::StockName, 0),
            (ColumnTag::Ticker, 1),
            (ColumnTag::FullName, 2),
            (ColumnTag::Isin, 3),
            (ColumnTag::Market, 4),
        ]
    }
}

// ── Indicators ──────────────────────────────────────────────────────

const INDICATORS_LAYOUT: TableLayout = TableLayout {
    css: "table",
    header: &[
        "Nazwa",
        "ISIN",
        "Rynek",
        "Liczba wyemitowanych akcji",
        "Wartość rynkowa (mln zł)",
        "Wartość księgowa (mln zł)",
        "C/WK",
        "C/Z",
        "Stopa dywidendy (%)",
    ],
};

/// Market value, book value and price ratios per company.
#[derive(Debug, Clone, Default)]
pub struct IndicatorsSource;

impl WorksheetSource for IndicatorsSource {
    fn name(&self) -> &str {
        "gpw_indicators"
    }

    fn data_path(&self) -> String {
        "gpw/indicators.html".to_string()
    }

    fn data_url(&self) -> String {
        format!("{GPW_BASE}/wskazniki")
    }

    fn parse(&self, path: &Path) -> Result<Worksheet, CoreError> {
        let content = html::read_text(path)?;
        html::parse_with_layout(self.name(), &content, &INDICATORS_LAYOUT)
    }

    fn columns(&self) -> ColumnMap {
        &[
            (ColumnTag::StockName, 0),
            (ColumnTag::Isin, 1),
            (ColumnTag::Market, 2),
            (ColumnTag::SharesCount, 3),
            (ColumnTag::MarketValue, 4),
            (ColumnTag::BookValue, 5),
            (ColumnTag::PriceToBook, 6),
            (ColumnTag::PriceToEarnings, 7),
            (ColumnTag::DividendYield, 8),
        ]
    }
}

// ── Archive ─────────────────────────────────────────────────────────

const ARCHIVE_LAYOUT: TableLayout = TableLayout {
    css: "table",
    header: &[
        "Nazwa",
        "ISIN",
        "Waluta",
        "Kurs otwarcia",
        "Kurs max",
        "Kurs min",
        "Kurs zamknięcia",
        "Zmiana (%)",
        "Wolumen",
        "Liczba transakcji",
        "Obrót (tys.)",
    ],
};

/// End-of-day quotations of a single session.
#[derive(Debug, Clone)]
pub struct ArchiveSource {
    date: NaiveDate,
}

impl ArchiveSource {
    pub fn new(date: NaiveDate) -> Self {
        Self { date }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }
}

impl WorksheetSource for ArchiveSource {
    fn name(&self) -> &str {
        "gpw_archive"
    }

    fn data_path(&self) -> String {
        format!("gpw/archive/{}.html", self.date.format("%Y-%m-%d"))
    }

    fn data_url(&self) -> String {
        format!(
            "{GPW_BASE}/archiwum-notowan?fetch=0&type=10&instrument=&date={}",
            self.date.format("%d-%m-%Y")
        )
    }

    fn parse(&self, path: &Path) -> Result<Worksheet, CoreError> {
        let content = html::read_text(path)?;
        // Sessions without trading (holidays, weekends) print a marker
        // instead of the table.
        if html::has_no_data_marker(&content) {
            return Err(CoreError::EmptySource(format!(
                "{} {}",
                self.name(),
                self.date
            )));
        }
        html::parse_with_layout(self.name(), &content, &ARCHIVE_LAYOUT)
    }

    fn empty_worksheet(&self) -> Worksheet {
        Worksheet::empty_with_columns(ARCHIVE_LAYOUT.header)
    }

    fn columns(&self) -> ColumnMap {
        &[
            (ColumnTag::StockName, 0),
            (ColumnTag::Isin, 1),
            (ColumnTag::Currency, 2),
            (ColumnTag::Opening, 3),
            (ColumnTag::Max, 4),
            (ColumnTag::Min, 5),
            (ColumnTag::Closing, 6),
            (ColumnTag::ChangeToRef, 7),
            (ColumnTag::Volume, 8),
            (ColumnTag::Turnover, 10),
        ]
    }
}

// ── ESPI/EBI announcements ──────────────────────────────────────────

const ESPI_COLUMNS: [&str; 4] = ["Czas", "Nazwa", "Tytuł", "URL"];

/// Recent ESPI/EBI announcements. The page is a list, not a table.
#[derive(Debug, Clone)]
pub struct EspiSource {
    limit: usize,
}

impl EspiSource {
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }
}

impl Default for EspiSource {
    fn default() -> Self {
        Self::new(100)
    }
}

impl WorksheetSource for EspiSource {
    fn name(&self) -> &str {
        "gpw_espi"
    }

    fn data_path(&self) -> String {
        format!("gpw/espi_{}.html", self.limit)
    }

    fn data_url(&self) -> String {
        format!(
            "{GPW_BASE}/ajaxindex.php?start=ajaxEspiList&action=GPWEspiReportUnion&format=html&lang=PL&offset=0&limit={}",
            self.limit
        )
    }

    fn parse(&self, path: &Path) -> Result<Worksheet, CoreError> {
        let content = html::read_text(path)?;
        parse_espi_list(self.name(), &content)
    }

    fn empty_worksheet(&self) -> Worksheet {
        Worksheet::empty_with_columns(&ESPI_COLUMNS)
    }

    fn columns(&self) -> ColumnMap {
        &[
            (ColumnTag::Date, 0),
            (ColumnTag::StockName, 1),
            (ColumnTag::Title, 2),
            (ColumnTag::Url, 3),
        ]
    }
}

fn parse_espi_list(source_name: &str, content: &str) -> Result<Worksheet, CoreError> {
    if html::has_no_data_marker(content) {
        return Err(CoreError::EmptySource(source_name.to_string()));
    }

    let document = Html::parse_document(content);
    let item_sel = html::selector(source_name, "li")?;
    let date_sel = html::selector(source_name, ".date")?;
    let name_sel = html::selector(source_name, ".name")?;
    let link_sel = html::selector(source_name, "a")?;

    let mut sheet = Worksheet::empty_with_columns(&ESPI_COLUMNS);
    for item in document.select(&item_sel) {
        let Some(link) = item.select(&link_sel).next() else {
            continue;
        };
        let time_text = item
            .select(&date_sel)
            .next()
            .map(|e| html::element_text(&e))
            .unwrap_or_default();
        let time = match NaiveDateTime::parse_from_str(&time_text, "%d-%m-%Y %H:%M:%S") {
            Ok(t) => Cell::Time(t),
            Err(_) => html::coerce_cell(&time_text),
        };
        let name = item
            .select(&name_sel)
            .next()
            .map(|e| html::element_text(&e))
            .unwrap_or_default();
        let href = link.value().attr("href").unwrap_or_default();
        let url = if href.starts_with("http") || href.is_empty() {
            href.to_string()
        } else {
            format!("{GPW_BASE}/{}", href.trim_start_matches('/'))
        };

        sheet.push_row(vec![
            time,
            Cell::text(name),
            Cell::text(html::element_text(&link)),
            Cell::text(url),
        ]);
    }

    if sheet.is_empty() {
        return Err(CoreError::parse(source_name, "no announcements found"));
    }
    Ok(sheet)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_path_depends_on_date_only() {
        let a = ArchiveSource::new(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        let b = ArchiveSource::new(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(a.data_path(), b.data_path());
        assert_eq!(a.data_path(), "gpw/archive/2024-03-01.html");
        assert!(a.data_url().contains("date=01-03-2024"));
    }

    #[test]
    fn espi_list_is_parsed() {
        let html = r#"<ul>
            <li><span class="date">18-10-2026 17:01:02</span><strong class="name">ABC SA</strong>
                <a href="/espi?id=1">Raport bieżący 12/2026</a></li>
            <li>no link here</li>
        </ul>"#;
        let sheet = parse_espi_list("gpw_espi", html).unwrap();
        assert_eq!(sheet.row_count(), 1);
        assert!(sheet.cell(0, 0).unwrap().as_time().is_some());
        assert_eq!(sheet.cell(0, 1), Some(&Cell::text("ABC SA")));
        assert_eq!(sheet.cell(0, 3), Some(&Cell::text("https://www.gpw.pl/espi?id=1")));
    }
}
