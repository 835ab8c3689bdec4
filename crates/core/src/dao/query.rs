use std::sync::Arc;

use crate::errors::CoreError;
use crate::models::column::ColumnTag;
use crate::models::worksheet::{Cell, Worksheet};
use crate::sources::traits::WorksheetSource;

use super::worksheet_dao::WorksheetDao;

/// Column lookups by semantic tag over a snapshot of a DAO's table.
///
/// A tag the source does not map fails with
/// [`CoreError::UnsupportedColumn`], whether or not the table is loaded.
/// Result rows keep the order of the underlying table.
pub struct TableQuery<'a> {
    source: &'a dyn WorksheetSource,
    table: Arc<Worksheet>,
}

impl<'a> TableQuery<'a> {
    pub fn new(source: &'a dyn WorksheetSource, table: Arc<Worksheet>) -> Self {
        Self { source, table }
    }

    pub fn table(&self) -> &Worksheet {
        &self.table
    }

    pub fn column_index(&self, tag: ColumnTag) -> Result<usize, CoreError> {
        self.source.column_index(tag)
    }

    pub fn data_by_index(&self, tag: ColumnTag, row: usize) -> Result<Option<&Cell>, CoreError> {
        let column = self.column_index(tag)?;
        Ok(self.table.cell(row, column))
    }

    /// First row whose `match_tag` column equals `value`.
    pub fn row_by_value(&self, match_tag: ColumnTag, value: &str) -> Result<Option<&[Cell]>, CoreError> {
        let column = self.column_index(match_tag)?;
        Ok(self
            .table
            .rows
            .iter()
            .find(|row| row.get(column).is_some_and(|c| c.matches(value)))
            .map(|row| row.as_slice()))
    }

    /// Every row whose `match_tag` column is one of `values`.
    pub fn rows_by_values<S: AsRef<str>>(
        &self,
        match_tag: ColumnTag,
        values: &[S],
    ) -> Result<Worksheet, CoreError> {
        let column = self.column_index(match_tag)?;
        let mut result = Worksheet::new(self.table.columns.clone());
        for row in &self.table.rows {
            let hit = row
                .get(column)
                .is_some_and(|c| values.iter().any(|v| c.matches(v.as_ref())));
            if hit {
                result.push_row(row.clone());
            }
        }
        Ok(result)
    }

    /// Cell of `result_tag` in the first row whose `match_tag` equals
    /// `value`.
    pub fn data_by_value(
        &self,
        match_tag: ColumnTag,
        value: &str,
        result_tag: ColumnTag,
    ) -> Result<Option<&Cell>, CoreError> {
        let result_column = self.column_index(result_tag)?;
        let row = self.row_by_value(match_tag, value)?;
        Ok(row.and_then(|r| r.get(result_column)))
    }
}

impl WorksheetDao {
    /// Query over the current in-memory table; an empty DAO is queried
    /// as an empty table.
    pub fn query(&self) -> TableQuery<'_> {
        let table = self
            .cached()
            .unwrap_or_else(|| Arc::new(Worksheet::default()));
        TableQuery::new(self.source(), table)
    }
}
