use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use std::io::{Cursor, Read};
use std::path::Path;
use tracing::debug;
use zip::ZipArchive;

use crate::errors::CoreError;
use crate::models::column::{ColumnMap, ColumnTag};
use crate::models::worksheet::{Cell, Worksheet};

use super::fetcher::{write_payload, Fetcher};
use super::html::parse_number;
use super::traits::WorksheetSource;

const METASTOCK_COLUMNS: [&str; 7] = ["Ticker", "Czas", "Otwarcie", "Max", "Min", "Zamknięcie", "Wolumen"];

/// Tick data of every instrument for one session, published as a zipped
/// MetaStock text export.
#[derive(Debug, Clone)]
pub struct MetaStockSource {
    date: NaiveDate,
}

impl MetaStockSource {
    pub fn new(date: NaiveDate) -> Self {
        Self { date }
    }

    /// Name of the archive member holding the session.
    fn member_name(&self) -> String {
        format!("{}.prn", self.date.format("%Y%m%d"))
    }
}

#[async_trait]
impl WorksheetSource for MetaStockSource {
    fn name(&self) -> &str {
        "metastock_intraday"
    }

    fn data_path(&self) -> String {
        format!("metastock/{}", self.member_name())
    }

    fn data_url(&self) -> String {
        format!(
            "https://info.bossa.pl/pub/intraday/mstock/daily/{}.zip",
            self.date.format("%Y%m%d")
        )
    }

    async fn download(&self, fetcher: &dyn Fetcher, path: &Path) -> Result<(), CoreError> {
        let zip_path = path.with_extension("zip");
        let payload = fetcher.fetch(&self.data_url(), &zip_path).await?;

        let member = self.member_name();
        let buf = {
            let mut archive = ZipArchive::new(Cursor::new(payload.as_bytes()))
                .map_err(|e| CoreError::parse(self.name(), format!("invalid archive: {e}")))?;
            let mut entry = archive
                .by_name(&member)
                .map_err(|e| CoreError::parse(self.name(), format!("member {member}: {e}")))?;
            let mut buf = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut buf)?;
            buf
        };
        debug!(source = self.name(), member = %member, bytes = buf.len(), "extracted archive member");
        write_payload(path, &buf).await
    }

    fn parse(&self, path: &Path) -> Result<Worksheet, CoreError> {
        let file = std::fs::File::open(path)?;
        parse_prn(self.name(), file)
    }

    fn empty_worksheet(&self) -> Worksheet {
        Worksheet::empty_with_columns(&METASTOCK_COLUMNS)
    }

    fn columns(&self) -> ColumnMap {
        &[
            (ColumnTag::Ticker, 0),
            (ColumnTag::Time, 1),
            (ColumnTag::Opening, 2),
            (ColumnTag::Max, 3),
            (ColumnTag::Min, 4),
            (ColumnTag::Closing, 5),
            (ColumnTag::Volume, 6),
        ]
    }
}

/// Parse `TICKER,PER,YYYYMMDD,HHMMSS,OPEN,HIGH,LOW,CLOSE,VOL[,OPENINT]`
/// records. A `<TICKER>,...` header line is skipped when present.
fn parse_prn(source_name: &str, reader: impl Read) -> Result<Worksheet, CoreError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut sheet = Worksheet::empty_with_columns(&METASTOCK_COLUMNS);
    for (line, record) in csv_reader.records().enumerate() {
        let record = record?;
        if record.get(0).is_some_and(|f| f.starts_with('<')) {
            continue;
        }
        if record.len() < 9 {
            return Err(CoreError::parse(
                source_name,
                format!("line {}: expected 9 fields, found {}", line + 1, record.len()),
            ));
        }

        let stamp = format!("{}{:0>6}", &record[2], &record[3]);
        let time = NaiveDateTime::parse_from_str(&stamp, "%Y%m%d%H%M%S").map_err(|e| {
            CoreError::parse(source_name, format!("line {}: bad timestamp '{stamp}': {e}", line + 1))
        })?;
        let number = |idx: usize| parse_number(&record[idx]).map(Cell::Number).unwrap_or_default();

        sheet.push_row(vec![
            Cell::text(&record[0]),
            Cell::Time(time),
            number(4),
            number(5),
            number(6),
            number(7),
            number(8),
        ]);
    }

    if sheet.is_empty() {
        return Err(CoreError::EmptySource(source_name.to_string()));
    }
    Ok(sheet)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_and_path_follow_the_date() {
        let source = MetaStockSource::new(NaiveDate::from_ymd_opt(2024, 5, 6).unwrap());
        assert_eq!(source.data_path(), "metastock/20240506.prn");
        assert!(source.data_url().ends_with("/20240506.zip"));
    }

    #[test]
    fn parses_prn_records() {
        let prn = "<TICKER>,<PER>,<DTYYYYMMDD>,<TIME>,<OPEN>,<HIGH>,<LOW>,<CLOSE>,<VOL>,<OPENINT>\n\
                   PKNORLEN,0,20240506,90001,61.5,61.9,61.4,61.8,1200,0\n";
        let sheet = parse_prn("test", prn.as_bytes()).unwrap();
        assert_eq!(sheet.row_count(), 1);
        assert_eq!(sheet.cell(0, 0), Some(&Cell::text("PKNORLEN")));
        let time = sheet.cell(0, 1).and_then(|c| c.as_time()).unwrap();
        assert_eq!(time.format("%H:%M:%S").to_string(), "09:00:01");
        assert_eq!(sheet.cell(0, 5), Some(&Cell::Number(61.8)));
    }

    #[test]
    fn header_only_file_is_empty_source() {
        let prn = "<TICKER>,<PER>,<DTYYYYMMDD>,<TIME>,<OPEN>,<HIGH>,<LOW>,<CLOSE>,<VOL>\n";
        let err = parse_prn("test", prn.as_bytes()).unwrap_err();
        assert!(matches!(err, CoreError::EmptySource(_)));
    }
}
