use async_trait::async_trait;
use std::path::Path;

use crate::errors::CoreError;
use crate::models::column::{ColumnMap, ColumnTag};
use crate::models::worksheet::Worksheet;

use super::fetcher::Fetcher;

/// Description of one externally sourced table.
///
/// A source is a plain value built from its selectors (date, ISIN, range
/// code, ...). It says where the data lives, where it is cached and how
/// raw bytes become a [`Worksheet`]; the generic
/// [`WorksheetDao`](crate::dao::worksheet_dao::WorksheetDao) runs the
/// lifecycle around it. Adding a source never touches the DAO.
#[async_trait]
pub trait WorksheetSource: Send + Sync {
    /// Human-readable name of this source (for logs/errors).
    fn name(&self) -> &str;

    /// Cache key relative to the cache root. Must be a deterministic
    /// function of the construction parameters.
    fn data_path(&self) -> String;

    /// URL of the raw payload.
    fn data_url(&self) -> String;

    /// Retrieve the raw payload into `path`.
    async fn download(&self, fetcher: &dyn Fetcher, path: &Path) -> Result<(), CoreError> {
        fetcher.fetch(&self.data_url(), path).await?;
        Ok(())
    }

    /// Parse the raw payload at `path`. Returns
    /// [`CoreError::EmptySource`] when the source legitimately reports
    /// that there is no data.
    fn parse(&self, path: &Path) -> Result<Worksheet, CoreError>;

    /// Table stored when the source reports "no data".
    fn empty_worksheet(&self) -> Worksheet {
        Worksheet::default()
    }

    /// Semantic tags supported by this source and their column positions.
    fn columns(&self) -> ColumnMap {
        &[]
    }

    /// Position of `tag`, or [`CoreError::UnsupportedColumn`].
    fn column_index(&self, tag: ColumnTag) -> Result<usize, CoreError> {
        self.columns()
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, idx)| *idx)
            .ok_or_else(|| CoreError::UnsupportedColumn {
                source_name: self.name().to_string(),
                column: tag.to_string(),
            })
    }
}
