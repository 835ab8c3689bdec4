use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::favorites::FavData;
use super::marker::Markers;
use super::notes::Notes;
use super::transaction::TransactionMatchMode;
use super::wallet::Wallet;

/// All user-managed state. Each field is persisted as its own bundle
/// file under the user data directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserData {
    pub wallet: Wallet,

    pub favs: FavData,

    pub markers: Markers,

    pub notes: Notes,

    /// Matching policy used by every wallet view.
    pub match_mode: TransactionMatchMode,

    /// Custom header labels of the stock table, keyed by column index.
    #[serde(default)]
    pub stock_headers: BTreeMap<usize, String>,
}
