pub mod calendar;
pub mod fetcher;
pub mod global_indexes;
pub mod gpw;
pub mod html;
pub mod intraday;
pub mod metastock;
pub mod short_sell;
pub mod traits;

pub use calendar::{DividendsSource, PublishedReportsSource, ReportsSource};
pub use fetcher::{Fetcher, HttpFetcher, Payload};
pub use global_indexes::GlobalIndexSource;
pub use gpw::{
    ArchiveSource, CurrentIndexSource, CurrentStockSource, EspiSource, IndicatorsSource,
    IsinMapSource,
};
pub use intraday::{IntradayKind, IntradaySource};
pub use metastock::MetaStockSource;
pub use short_sell::{ShortSellKind, ShortSellSource};
pub use traits::WorksheetSource;
