pub mod export;
pub mod format;
pub mod manager;
pub mod worksheet_storage;

pub use export::{read_pickle, write_worksheet, OutputFormat};
pub use manager::UserDataManager;
pub use worksheet_storage::{StorageRecord, WorksheetStorage};
