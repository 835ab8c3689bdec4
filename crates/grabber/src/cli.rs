use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use stock_monitor_core::storage::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "grabber")]
#[command(about = "Download GPW market data and store it as a table", long_about = None)]
pub struct Cli {
    /// Output format: csv, xls or pickle. Deduced from --out_path when missing.
    #[arg(long = "out_format", global = true)]
    pub out_format: Option<OutputFormat>,

    /// Output file.
    #[arg(long = "out_path", global = true, conflicts_with = "out_dir")]
    pub out_path: Option<PathBuf>,

    /// Output directory; the file is named after the source.
    #[arg(long = "out_dir", global = true)]
    pub out_dir: Option<PathBuf>,

    /// Directory of downloaded and parsed sources.
    #[arg(long = "cache_dir", global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Core configuration file (JSON).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Debug logging.
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
#[command(rename_all = "snake_case")]
pub enum Command {
    /// Current quotations of all shares
    CurrentStock,
    /// Current values of GPW indexes
    CurrentIndex,
    /// Stock name, ticker and ISIN mapping
    IsinMap,
    /// Market indicators (market value, P/BV, P/E, dividend yield)
    Indicators,
    /// Recent ESPI/EBI announcements
    Espi {
        /// Number of announcements to fetch
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },
    /// End-of-day archive of a session
    Archive {
        /// Session date, YYYY-MM-DD
        #[arg(long)]
        date: NaiveDate,
    },
    /// Dividend calendar
    Dividends,
    /// Calendar of financial reports
    Reports,
    /// Financial reports published in a date range
    PublishedReports {
        #[arg(long)]
        from: NaiveDate,
        #[arg(long)]
        to: NaiveDate,
    },
    /// World indexes
    GlobalIndexes,
    /// Intraday quotations of all shares of one session (MetaStock)
    Metastock {
        /// Session date, YYYY-MM-DD
        #[arg(long)]
        date: NaiveDate,
    },
    /// Currently disclosed short positions
    ShortSellCurrent,
    /// Historical short positions
    ShortSellHistory,
    /// Intraday chart of one instrument
    Intraday {
        #[arg(long)]
        isin: String,
        /// Range code: 1D, 14D, 1M, 3M, 6M, 1R, 2R, 3R or MAX
        #[arg(long, default_value = "1D")]
        range: String,
        /// The ISIN is an index
        #[arg(long)]
        index: bool,
    },
    /// Every current source into --out_dir; requires --out_format
    AllCurrent,
    /// Run the commands listed in a JSON file, one after another
    ConfigMode {
        /// `{"<command>": ["--arg", "value", ...], ...}`
        #[arg(long)]
        file: PathBuf,
    },
}

impl Command {
    /// Subcommand name as typed on the command line.
    pub fn name(&self) -> &'static str {
        match self {
            Command::CurrentStock => "current_stock",
            Command::CurrentIndex => "current_index",
            Command::IsinMap => "isin_map",
            Command::Indicators => "indicators",
            Command::Espi { .. } => "espi",
            Command::Archive { .. } => "archive",
            Command::Dividends => "dividends",
            Command::Reports => "reports",
            Command::PublishedReports { .. } => "published_reports",
            Command::GlobalIndexes => "global_indexes",
            Command::Metastock { .. } => "metastock",
            Command::ShortSellCurrent => "short_sell_current",
            Command::ShortSellHistory => "short_sell_history",
            Command::Intraday { .. } => "intraday",
            Command::AllCurrent => "all_current",
            Command::ConfigMode { .. } => "config_mode",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_output_options() {
        let cli = Cli::try_parse_from(["grabber", "current_stock", "--out_format", "xls", "--out_dir", "out"]).unwrap();
        assert!(matches!(cli.command, Command::CurrentStock));
        assert_eq!(cli.out_format, Some(OutputFormat::Xls));
        assert_eq!(cli.out_dir, Some(PathBuf::from("out")));
    }

    #[test]
    fn out_path_conflicts_with_out_dir() {
        let parsed = Cli::try_parse_from(["grabber", "isin_map", "--out_path", "a.csv", "--out_dir", "b"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn subcommand_arguments() {
        let cli = Cli::try_parse_from(["grabber", "archive", "--date", "2024-03-01"]).unwrap();
        match cli.command {
            Command::Archive { date } => assert_eq!(date, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()),
            other => panic!("unexpected {other:?}"),
        }

        let cli = Cli::try_parse_from(["grabber", "intraday", "--isin", "PL0000000001"]).unwrap();
        match &cli.command {
            Command::Intraday { range, index, .. } => {
                assert_eq!(range, "1D");
                assert!(!index);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(cli.command.name(), "intraday");
    }

    #[test]
    fn unknown_format_is_rejected() {
        assert!(Cli::try_parse_from(["grabber", "reports", "--out_format", "json"]).is_err());
    }
}
