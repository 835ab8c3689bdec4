use serde::{Deserialize, Serialize};

/// Semantic column concepts the core looks up regardless of which source
/// provides them. Each source maps the tags it supports to positional
/// indices of its parsed table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ColumnTag {
    Ticker,
    Isin,
    StockName,
    FullName,
    Currency,
    Date,
    Time,
    Opening,
    Min,
    Max,
    Closing,
    Volume,
    Turnover,
    Reference,
    Tko,
    RecentValue,
    ChangeToRef,
    RecentTransTime,
    Market,
    SharesCount,
    MarketValue,
    BookValue,
    PriceToBook,
    PriceToEarnings,
    DividendYield,
    Dividend,
    Title,
    Url,
    ReportType,
    ReportPeriod,
    Holder,
    PositionPct,
}

impl std::fmt::Display for ColumnTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ColumnTag::Ticker => "TICKER",
            ColumnTag::Isin => "ISIN",
            ColumnTag::StockName => "STOCK_NAME",
            ColumnTag::FullName => "FULL_NAME",
            ColumnTag::Currency => "CURRENCY",
            ColumnTag::Date => "DATE",
            ColumnTag::Time => "TIME",
            ColumnTag::Opening => "OPENING",
            ColumnTag::Min => "MIN",
            ColumnTag::Max => "MAX",
            ColumnTag::Closing => "CLOSING",
            ColumnTag::Volume => "VOLUME",
            ColumnTag::Turnover => "TURNOVER",
            ColumnTag::Reference => "REFERENCE",
            ColumnTag::Tko => "TKO",
            ColumnTag::RecentValue => "RECENT_VALUE",
            ColumnTag::ChangeToRef => "CHANGE_TO_REF",
            ColumnTag::RecentTransTime => "RECENT_TRANS_TIME",
            ColumnTag::Market => "MARKET",
            ColumnTag::SharesCount => "SHARES_COUNT",
            ColumnTag::MarketValue => "MARKET_VALUE",
            ColumnTag::BookValue => "BOOK_VALUE",
            ColumnTag::PriceToBook => "PRICE_TO_BOOK",
            ColumnTag::PriceToEarnings => "PRICE_TO_EARNINGS",
            ColumnTag::DividendYield => "DIVIDEND_YIELD",
            ColumnTag::Dividend => "DIVIDEND",
            ColumnTag::Title => "TITLE",
            ColumnTag::Url => "URL",
            ColumnTag::ReportType => "REPORT_TYPE",
            ColumnTag::ReportPeriod => "REPORT_PERIOD",
            ColumnTag::Holder => "HOLDER",
            ColumnTag::PositionPct => "POSITION_PCT",
        };
        write!(f, "{name}")
    }
}

/// Mapping of semantic tags to positional column indices for one source.
pub type ColumnMap = &'static [(ColumnTag, usize)];
