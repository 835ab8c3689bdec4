use std::path::Path;

use crate::errors::CoreError;
use crate::models::column::{ColumnMap, ColumnTag};
use crate::models::worksheet::{Cell, Worksheet};

use super::html::{self, TableLayout};
use super::traits::WorksheetSource;

const GLOBAL_INDEX_LAYOUT: TableLayout = TableLayout {
    css: "table",
    header: &["Nazwa", "Kurs", "Zmiana (%)", "Zmiana", "Czas"],
};

/// Major world indexes.
#[derive(Debug, Clone, Default)]
pub struct GlobalIndexSource;

impl WorksheetSource for GlobalIndexSource {
    fn name(&self) -> &str {
        "global_indexes"
    }

    fn data_path(&self) -> String {
        "global/indexes.html".to_string()
    }

    fn data_url(&self) -> String {
        "https://www.money.pl/gielda/gieldy-swiatowe/".to_string()
    }

    fn parse(&self, path: &Path) -> Result<Worksheet, CoreError> {
        let content = html::read_text(path)?;
        let mut sheet = html::parse_with_layout(self.name(), &content, &GLOBAL_INDEX_LAYOUT)?;
        // Section captions ("Europa", "Azja") are rows without a value.
        sheet.rows.retain(|row| !matches!(row.get(1), Some(Cell::Empty) | None));
        Ok(sheet)
    }

    fn columns(&self) -> ColumnMap {
        &[
            (ColumnTag::StockName, 0),
            (ColumnTag::RecentValue, 1),
            (ColumnTag::ChangeToRef, 2),
            (ColumnTag::RecentTransTime, 4),
        ]
    }
}
