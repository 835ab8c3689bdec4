use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

use crate::errors::CoreError;
use crate::models::worksheet::{Cell, Worksheet};

/// Output format of an exported worksheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputFormat {
    Csv,
    /// Tab-separated text, opened directly by spreadsheet applications.
    Xls,
    /// Bincode worksheet, loadable with [`read_pickle`].
    Pickle,
}

/// File extensions and the format each one selects.
const EXTENSIONS: &[(&str, OutputFormat)] = &[
    ("csv", OutputFormat::Csv),
    ("xls", OutputFormat::Xls),
    ("xlsx", OutputFormat::Xls),
    ("tsv", OutputFormat::Xls),
    ("pickle", OutputFormat::Pickle),
    ("pkl", OutputFormat::Pickle),
    ("bin", OutputFormat::Pickle),
];

impl OutputFormat {
    /// Deduce the format from the file extension (case-insensitive).
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        EXTENSIONS
            .iter()
            .find(|(known, _)| *known == ext)
            .map(|(_, format)| *format)
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Xls => "xls",
            OutputFormat::Pickle => "pickle",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(OutputFormat::Csv),
            "xls" => Ok(OutputFormat::Xls),
            "pickle" => Ok(OutputFormat::Pickle),
            other => Err(CoreError::ValidationError(format!(
                "unknown output format '{other}' (expected csv, xls or pickle)"
            ))),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.extension())
    }
}

fn cell_field(cell: &Cell) -> String {
    match cell {
        Cell::Empty => String::new(),
        other => other.to_string(),
    }
}

fn write_delimited(sheet: &Worksheet, path: &Path, delimiter: u8) -> Result<(), CoreError> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_path(path)?;
    writer.write_record(&sheet.columns)?;
    for row in &sheet.rows {
        writer.write_record(row.iter().map(cell_field))?;
    }
    writer.flush()?;
    Ok(())
}

/// Write `sheet` to `path` in `format`, creating parent directories.
pub fn write_worksheet(sheet: &Worksheet, path: &Path, format: OutputFormat) -> Result<(), CoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    match format {
        OutputFormat::Csv => write_delimited(sheet, path, b','),
        OutputFormat::Xls => write_delimited(sheet, path, b'\t'),
        OutputFormat::Pickle => {
            let bytes = bincode::serialize(sheet)
                .map_err(|e| CoreError::Serialization(format!("Failed to serialize worksheet: {e}")))?;
            std::fs::write(path, bytes)?;
            Ok(())
        }
    }
}

/// Read back a worksheet written as [`OutputFormat::Pickle`].
pub fn read_pickle(path: &Path) -> Result<Worksheet, CoreError> {
    let bytes = std::fs::read(path)?;
    bincode::deserialize(&bytes)
        .map_err(|e| CoreError::Deserialization(format!("Failed to deserialize worksheet: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_follows_extension_table() {
        assert_eq!(OutputFormat::from_path(Path::new("out/a.CSV")), Some(OutputFormat::Csv));
        assert_eq!(OutputFormat::from_path(Path::new("a.xlsx")), Some(OutputFormat::Xls));
        assert_eq!(OutputFormat::from_path(Path::new("a.pkl")), Some(OutputFormat::Pickle));
        // A name merely containing "csv" does not select a format.
        assert_eq!(OutputFormat::from_path(Path::new("csv_dump.txt")), None);
        assert_eq!(OutputFormat::from_path(Path::new("noext")), None);
    }

    #[test]
    fn parses_cli_names() {
        assert_eq!("CSV".parse::<OutputFormat>().unwrap(), OutputFormat::Csv);
        assert!("json".parse::<OutputFormat>().is_err());
    }
}
