pub mod cache;
pub mod intraday_map;
pub mod orchestrator;
pub mod query;
pub mod worksheet_dao;

pub use cache::CacheRoot;
pub use intraday_map::IntradayMap;
pub use orchestrator::{RefreshOrchestrator, RefreshReport, RefreshTask};
pub use query::TableQuery;
pub use worksheet_dao::WorksheetDao;
