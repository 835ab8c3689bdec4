pub mod analytics;
pub mod column;
pub mod favorites;
pub mod history;
pub mod marker;
pub mod notes;
pub mod price;
pub mod range;
pub mod transaction;
pub mod user_data;
pub mod wallet;
pub mod worksheet;
