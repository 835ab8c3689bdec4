//! Helpers shared by the HTML-table sources: table extraction with header
//! flattening, Polish number coercion and the "no data" marker check.

use scraper::{ElementRef, Html, Selector};
use std::path::Path;

use crate::errors::CoreError;
use crate::models::worksheet::{Cell, Worksheet};

/// Localized markers the exchange pages print instead of an empty table.
const NO_DATA_MARKERS: &[&str] = &[
    "Brak danych dla wybranych kryteriów",
    "Brak danych",
    "brak danych",
];

/// Placeholders the sources use for missing values.
const MISSING_VALUES: &[&str] = &["", "-", "--", "---", "x", "n/a"];

/// Read a raw payload as text. Invalid UTF-8 sequences are replaced.
pub fn read_text(path: &Path) -> Result<String, CoreError> {
    let bytes = std::fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

pub fn has_no_data_marker(content: &str) -> bool {
    NO_DATA_MARKERS.iter().any(|marker| content.contains(marker))
}

pub fn selector(source_name: &str, css: &str) -> Result<Selector, CoreError> {
    Selector::parse(css)
        .map_err(|e| CoreError::parse(source_name, format!("invalid selector '{css}': {e}")))
}

/// Text of an element with whitespace runs collapsed to single spaces.
pub fn element_text(element: &ElementRef<'_>) -> String {
    let raw: String = element.text().collect();
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse a number written the Polish way: `"1 234,56"`, `"12,5%"`,
/// `"+0,35"`. Returns `None` for placeholders and non-numbers.
pub fn parse_number(text: &str) -> Option<f64> {
    let cleaned: String = text
        .trim()
        .trim_end_matches('%')
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}')
        .collect();
    if cleaned.is_empty() || MISSING_VALUES.contains(&cleaned.as_str()) {
        return None;
    }
    let normalized = cleaned.replace(',', ".");
    let normalized = normalized.strip_prefix('+').unwrap_or(&normalized);
    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Coerce raw cell text into a typed cell.
pub fn coerce_cell(text: &str) -> Cell {
    let trimmed = text.trim();
    if MISSING_VALUES.contains(&trimmed) {
        return Cell::Empty;
    }
    match parse_number(trimmed) {
        Some(v) => Cell::Number(v),
        None => Cell::Text(trimmed.to_string()),
    }
}

fn span(element: &ElementRef<'_>) -> usize {
    element
        .value()
        .attr("colspan")
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(1)
        .max(1)
}

/// Flatten stacked header rows into one label per column. Cells spanning
/// several columns repeat their label; labels of one column are joined
/// with `" / "`, skipping empty and repeated parts.
fn flatten_headers(levels: &[Vec<(String, usize)>]) -> Vec<String> {
    let width = levels
        .iter()
        .map(|row| row.iter().map(|(_, s)| s).sum::<usize>())
        .max()
        .unwrap_or(0);
    let mut columns: Vec<Vec<String>> = vec![Vec::new(); width];

    for row in levels {
        let mut pos = 0;
        for (label, colspan) in row {
            for column in columns.iter_mut().skip(pos).take(*colspan) {
                if !label.is_empty() && column.last() != Some(label) {
                    column.push(label.clone());
                }
            }
            pos += colspan;
        }
    }

    columns
        .into_iter()
        .enumerate()
        .map(|(idx, parts)| {
            if parts.is_empty() {
                format!("column_{idx}")
            } else {
                parts.join(" / ")
            }
        })
        .collect()
}

/// Extract the first table matching `table_css` into a worksheet.
///
/// Header rows are the rows made of `th` cells (a `thead` is not
/// required); stacked headers are flattened. Data rows shorter than the
/// header are padded with empty cells. Every data cell goes through
/// [`coerce_cell`].
pub fn parse_table(source_name: &str, html: &str, table_css: &str) -> Result<Worksheet, CoreError> {
    let document = Html::parse_document(html);
    let table_sel = selector(source_name, table_css)?;
    let tr_sel = selector(source_name, "tr")?;
    let th_sel = selector(source_name, "th")?;
    let cell_sel = selector(source_name, "th, td")?;

    let table = document
        .select(&table_sel)
        .next()
        .ok_or_else(|| CoreError::parse(source_name, format!("no table matching '{table_css}'")))?;

    let mut header_levels: Vec<Vec<(String, usize)>> = Vec::new();
    let mut body: Vec<Vec<Cell>> = Vec::new();

    for tr in table.select(&tr_sel) {
        let cells: Vec<ElementRef<'_>> = tr.select(&cell_sel).collect();
        if cells.is_empty() {
            continue;
        }
        let is_header = body.is_empty() && tr.select(&th_sel).count() == cells.len();
        if is_header {
            header_levels.push(cells.iter().map(|c| (element_text(c), span(c))).collect());
            continue;
        }
        let mut row = Vec::with_capacity(cells.len());
        for cell in &cells {
            let text = element_text(cell);
            for _ in 0..span(cell) {
                row.push(coerce_cell(&text));
            }
        }
        body.push(row);
    }

    let mut columns = flatten_headers(&header_levels);
    let width = body.iter().map(Vec::len).max().unwrap_or(0).max(columns.len());
    while columns.len() < width {
        columns.push(format!("column_{}", columns.len()));
    }

    let mut sheet = Worksheet::new(columns);
    for mut row in body {
        row.resize(width, Cell::Empty);
        sheet.push_row(row);
    }
    Ok(sheet)
}

/// Fixed layout of a source table: where to find it and the canonical
/// names of its leading columns.
#[derive(Debug, Clone, Copy)]
pub struct TableLayout {
    pub css: &'static str,
    pub header: &'static [&'static str],
}

/// Extract a table and rename its columns after `layout.header`. Extra
/// trailing columns are cut off; a narrower table is a parse error.
pub fn parse_with_layout(
    source_name: &str,
    html: &str,
    layout: &TableLayout,
) -> Result<Worksheet, CoreError> {
    let mut sheet = parse_table(source_name, html, layout.css)?;
    drop_blank_rows(&mut sheet);

    let width = layout.header.len();
    if sheet.column_count() < width {
        return Err(CoreError::parse(
            source_name,
            format!("expected {width} columns, found {}", sheet.column_count()),
        ));
    }
    sheet.columns = layout.header.iter().map(|c| c.to_string()).collect();
    for row in &mut sheet.rows {
        row.truncate(width);
    }
    Ok(sheet)
}

/// Footnote lines carry at most one non-empty cell.
pub fn is_footnote_row(row: &[Cell]) -> bool {
    row.iter().filter(|c| !c.is_empty()).count() <= 1
}

/// Drop trailing rows accepted by `is_trailer` (summary lines such as
/// "Razem" or footnotes).
pub fn drop_trailer(sheet: &mut Worksheet, is_trailer: impl Fn(&[Cell]) -> bool) {
    while sheet.rows.last().is_some_and(|row| is_trailer(row)) {
        sheet.rows.pop();
    }
}

/// Rows where every cell is empty are table decoration.
pub fn drop_blank_rows(sheet: &mut Worksheet) {
    sheet.rows.retain(|row| row.iter().any(|c| !c.is_empty()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_polish_numbers() {
        assert_eq!(parse_number("1 234,56"), Some(1234.56));
        assert_eq!(parse_number("12,5%"), Some(12.5));
        assert_eq!(parse_number("+0,35"), Some(0.35));
        assert_eq!(parse_number("-1,5"), Some(-1.5));
        assert_eq!(parse_number("1\u{a0}000"), Some(1000.0));
        assert_eq!(parse_number("-"), None);
        assert_eq!(parse_number("PKN"), None);
    }

    #[test]
    fn coerces_cells() {
        assert_eq!(coerce_cell(" --- "), Cell::Empty);
        assert_eq!(coerce_cell("3,20"), Cell::Number(3.2));
        assert_eq!(coerce_cell("ORLEN"), Cell::Text("ORLEN".into()));
    }

    #[test]
    fn flattens_stacked_headers() {
        let html = r#"
            <table class="t">
              <tr><th rowspan="2">Nazwa</th><th colspan="2">Kurs</th></tr>
              <tr><th></th><th>odn.</th><th>ost.</th></tr>
              <tr><td>ABC</td><td>10,00</td><td>10,50</td></tr>
              <tr><td>XYZ</td><td>-</td></tr>
            </table>"#;
        let sheet = parse_table("test", html, "table.t").unwrap();
        assert_eq!(sheet.columns, vec!["Nazwa", "Kurs / odn.", "Kurs / ost."]);
        assert_eq!(sheet.row_count(), 2);
        assert_eq!(sheet.cell(0, 2), Some(&Cell::Number(10.5)));
        assert_eq!(sheet.cell(1, 1), Some(&Cell::Empty));
        assert_eq!(sheet.cell(1, 2), Some(&Cell::Empty));
    }

    #[test]
    fn missing_table_is_a_parse_error() {
        let err = parse_table("test", "<html><p>nothing</p></html>", "table").unwrap_err();
        assert!(matches!(err, CoreError::Parse { .. }));
    }

    #[test]
    fn drops_trailer_rows() {
        let mut sheet = Worksheet::new(vec!["a".into(), "b".into()]);
        sheet.push_row(vec![Cell::text("x"), Cell::Number(1.0)]);
        sheet.push_row(vec![Cell::text("Razem"), Cell::Number(1.0)]);
        drop_trailer(&mut sheet, |row| row[0].matches("Razem"));
        assert_eq!(sheet.row_count(), 1);
    }

    #[test]
    fn layout_renames_and_cuts_columns() {
        let html = r#"<table><tr><th>a</th><th>b</th><th>c</th></tr>
            <tr><td>1</td><td>2</td><td>3</td></tr></table>"#;
        let layout = TableLayout {
            css: "table",
            header: &["first", "second"],
        };
        let sheet = parse_with_layout("test", html, &layout).unwrap();
        assert_eq!(sheet.columns, vec!["first", "second"]);
        assert_eq!(sheet.rows[0].len(), 2);

        let too_wide = TableLayout {
            css: "table",
            header: &["1", "2", "3", "4"],
        };
        assert!(parse_with_layout("test", html, &too_wide).is_err());
    }

    #[test]
    fn detects_no_data_marker() {
        assert!(has_no_data_marker("<div>Brak danych dla wybranych kryteriów.</div>"));
        assert!(!has_no_data_marker("<table></table>"));
    }
}
