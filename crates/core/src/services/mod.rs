pub mod chart_service;
pub mod import_service;
pub mod wallet_service;

pub use chart_service::{join_all, join_series, ChartService};
pub use import_service::{ImportReport, ImportService};
pub use wallet_service::{QuoteLookup, StockQuote, WalletService};
