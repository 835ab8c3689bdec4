use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A single cell of a parsed worksheet.
///
/// Sources deliver loosely typed data; parsers coerce what they can into
/// numbers and timestamps and keep the rest as text. `Empty` stands for
/// the placeholders sources use for missing values ("-", "", "---").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum Cell {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Time(NaiveDateTime),
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Cell::Text(value.into())
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    /// Numeric view of the cell. Text cells are not coerced here; parsers
    /// are responsible for producing `Number` cells.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<NaiveDateTime> {
        match self {
            Cell::Time(t) => Some(*t),
            _ => None,
        }
    }

    /// Compare against a lookup key. Text cells compare exactly, numbers
    /// compare by their display form.
    pub fn matches(&self, key: &str) -> bool {
        match self {
            Cell::Text(s) => s == key,
            Cell::Number(_) | Cell::Time(_) => self.to_string() == key,
            Cell::Empty => false,
        }
    }
}

impl std::fmt::Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cell::Empty => write!(f, "-"),
            Cell::Text(s) => write!(f, "{s}"),
            Cell::Number(v) => write!(f, "{v}"),
            Cell::Time(t) => write!(f, "{}", t.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

impl From<f64> for Cell {
    fn from(v: f64) -> Self {
        Cell::Number(v)
    }
}

impl From<&str> for Cell {
    fn from(v: &str) -> Self {
        Cell::Text(v.to_string())
    }
}

impl From<String> for Cell {
    fn from(v: String) -> Self {
        Cell::Text(v)
    }
}

impl From<NaiveDateTime> for Cell {
    fn from(v: NaiveDateTime) -> Self {
        Cell::Time(v)
    }
}

/// A two-dimensional table with named columns. Row order is the order
/// the parser produced; equality is value-based.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Worksheet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Worksheet {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// A table with the given header and no rows. Used for sources that
    /// legitimately report "no data".
    pub fn empty_with_columns(columns: &[&str]) -> Self {
        Self::new(columns.iter().map(|c| c.to_string()).collect())
    }

    pub fn push_row(&mut self, row: Vec<Cell>) {
        self.rows.push(row);
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&Cell> {
        self.rows.get(row).and_then(|r| r.get(column))
    }

    pub fn last_row(&self) -> Option<&[Cell]> {
        self.rows.last().map(|r| r.as_slice())
    }

    /// Position of a column by its header name.
    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}
