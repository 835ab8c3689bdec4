mod cli;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use stock_monitor_core::config::CoreConfig;
use stock_monitor_core::dao::{CacheRoot, WorksheetDao};
use stock_monitor_core::models::range::RangeCode;
use stock_monitor_core::sources::{
    ArchiveSource, CurrentIndexSource, CurrentStockSource, DividendsSource, EspiSource, Fetcher,
    GlobalIndexSource, HttpFetcher, IndicatorsSource, IntradayKind, IntradaySource, IsinMapSource,
    MetaStockSource, PublishedReportsSource, ReportsSource, ShortSellSource, WorksheetSource,
};
use stock_monitor_core::storage::{write_worksheet, OutputFormat};

use crate::cli::{Cli, Command};

/// Where and how the grabbed table is written.
#[derive(Debug, Clone)]
struct Output {
    format: Option<OutputFormat>,
    path: Option<PathBuf>,
    dir: Option<PathBuf>,
}

impl Output {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            format: cli.out_format,
            path: cli.out_path.clone(),
            dir: cli.out_dir.clone(),
        }
    }

    fn format(&self) -> OutputFormat {
        self.format
            .or_else(|| self.path.as_deref().and_then(OutputFormat::from_path))
            .unwrap_or(OutputFormat::Csv)
    }

    /// Target file of the source named `name`.
    fn target(&self, name: &str) -> PathBuf {
        if let Some(path) = &self.path {
            return path.clone();
        }
        let file = format!("{name}.{}", self.format().extension());
        match &self.dir {
            Some(dir) => dir.join(file),
            None => PathBuf::from(file),
        }
    }
}

/// Shared state of one grabber run.
struct Grabber {
    cache: CacheRoot,
    fetcher: Arc<dyn Fetcher>,
}

impl Grabber {
    fn new(config: &CoreConfig, cache_dir: Option<PathBuf>) -> Self {
        let cache_dir = cache_dir.unwrap_or_else(|| config.cache_dir.clone());
        Self {
            cache: CacheRoot::new(cache_dir),
            fetcher: Arc::new(HttpFetcher::with_timeout(Duration::from_secs(
                config.fetch_timeout_secs,
            ))),
        }
    }

    /// Fetch `source` fresh and write its table.
    async fn grab(&self, source: Box<dyn WorksheetSource>, output: &Output) -> Result<PathBuf> {
        let dao = WorksheetDao::from_boxed(source, &self.cache, self.fetcher.clone());
        let name = dao.name().to_string();
        let table = dao
            .load(true)
            .await
            .with_context(|| format!("failed to grab {name}"))?
            .with_context(|| format!("no data for {name}"))?;

        let target = output.target(&name);
        write_worksheet(&table, &target, output.format())
            .with_context(|| format!("cannot write {}", target.display()))?;
        info!(source = %name, rows = table.row_count(), path = %target.display(), "table written");
        Ok(target)
    }

    async fn run(&self, command: Command, output: &Output) -> Result<()> {
        let source: Box<dyn WorksheetSource> = match command {
            Command::CurrentStock => Box::new(CurrentStockSource),
            Command::CurrentIndex => Box::new(CurrentIndexSource),
            Command::IsinMap => Box::new(IsinMapSource),
            Command::Indicators => Box::new(IndicatorsSource),
            Command::Espi { limit } => Box::new(EspiSource::new(limit)),
            Command::Archive { date } => Box::new(ArchiveSource::new(date)),
            Command::Dividends => Box::new(DividendsSource),
            Command::Reports => Box::new(ReportsSource),
            Command::PublishedReports { from, to } => Box::new(PublishedReportsSource::new(from, to)),
            Command::GlobalIndexes => Box::new(GlobalIndexSource),
            Command::Metastock { date } => Box::new(MetaStockSource::new(date)),
            Command::ShortSellCurrent => Box::new(ShortSellSource::current()),
            Command::ShortSellHistory => Box::new(ShortSellSource::history()),
            Command::Intraday { isin, range, index } => {
                let kind = if index {
                    IntradayKind::Index
                } else {
                    IntradayKind::Stock
                };
                Box::new(IntradaySource::new(kind, isin, RangeCode::parse(&range)))
            }
            Command::AllCurrent => return self.all_current(output).await,
            Command::ConfigMode { .. } => bail!("config_mode cannot be nested"),
        };
        self.grab(source, output).await?;
        Ok(())
    }

    /// Grab every current source into the output directory.
    async fn all_current(&self, output: &Output) -> Result<()> {
        let Some(format) = output.format else {
            bail!("all_current requires --out_format");
        };
        let output = Output {
            format: Some(format),
            path: None,
            dir: Some(output.dir.clone().unwrap_or_else(|| PathBuf::from("."))),
        };

        let sources: Vec<Box<dyn WorksheetSource>> = vec![
            Box::new(CurrentStockSource),
            Box::new(CurrentIndexSource),
            Box::new(IsinMapSource),
            Box::new(IndicatorsSource),
            Box::new(EspiSource::default()),
            Box::new(DividendsSource),
            Box::new(ReportsSource),
            Box::new(GlobalIndexSource),
            Box::new(ShortSellSource::current()),
        ];
        let mut failed = 0;
        for source in sources {
            if let Err(e) = self.grab(source, &output).await {
                error!(error = %format!("{e:#}"), "grab failed");
                failed += 1;
            }
        }
        if failed > 0 {
            bail!("{failed} sources failed");
        }
        Ok(())
    }

    /// Run every `"command": [args...]` entry of a JSON file in order.
    async fn config_mode(&self, file: &Path) -> Result<()> {
        let content = std::fs::read_to_string(file)
            .with_context(|| format!("cannot read {}", file.display()))?;
        let entries: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(&content).context("config file is not a JSON object")?;

        for (name, args) in entries {
            let args: Vec<String> = serde_json::from_value(args)
                .with_context(|| format!("arguments of '{name}' must be a list of strings"))?;
            let argv = ["grabber".to_string(), name.clone()].into_iter().chain(args);
            let cli = Cli::try_parse_from(argv).with_context(|| format!("invalid entry '{name}'"))?;
            if matches!(cli.command, Command::ConfigMode { .. }) {
                warn!("skipping nested config_mode entry");
                continue;
            }
            info!(command = cli.command.name(), "running config entry");
            let output = Output::from_cli(&cli);
            self.run(cli.command, &output).await?;
        }
        Ok(())
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => CoreConfig::from_file(path)?,
        None => CoreConfig::default(),
    };
    let grabber = Grabber::new(&config, cli.cache_dir.clone());
    let output = Output::from_cli(&cli);

    match cli.command {
        Command::ConfigMode { file } => grabber.config_mode(&file).await,
        command => grabber.run(command, &output).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(format: Option<OutputFormat>, path: Option<&str>, dir: Option<&str>) -> Output {
        Output {
            format,
            path: path.map(PathBuf::from),
            dir: dir.map(PathBuf::from),
        }
    }

    #[test]
    fn format_is_deduced_from_path() {
        assert_eq!(output(None, Some("t.pkl"), None).format(), OutputFormat::Pickle);
        assert_eq!(output(Some(OutputFormat::Xls), Some("t.pkl"), None).format(), OutputFormat::Xls);
        assert_eq!(output(None, None, None).format(), OutputFormat::Csv);
    }

    #[test]
    fn target_is_named_after_the_source() {
        let out = output(Some(OutputFormat::Xls), None, Some("dump"));
        assert_eq!(out.target("gpw_isin_map"), PathBuf::from("dump/gpw_isin_map.xls"));
        assert_eq!(output(None, Some("x.csv"), None).target("ignored"), PathBuf::from("x.csv"));
        assert_eq!(output(None, None, None).target("espi"), PathBuf::from("espi.csv"));
    }
}
