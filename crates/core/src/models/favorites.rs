use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Group mirroring the tickers currently held in the wallet.
pub const WALLET_GROUP: &str = "Wallet";
/// Group mirroring the tickers that have markers.
pub const MARKERS_GROUP: &str = "Markers";
/// Group mirroring the union of all other groups.
pub const ALL_GROUP: &str = "All";

/// A named, ordered set of tickers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FavGroup {
    pub name: String,
    pub tickers: Vec<String>,
}

/// Ordered mapping `group name → ordered set of tickers`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FavData {
    groups: Vec<FavGroup>,
}

impl FavData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn groups(&self) -> &[FavGroup] {
        &self.groups
    }

    pub fn group_names(&self) -> Vec<&str> {
        self.groups.iter().map(|g| g.name.as_str()).collect()
    }

    pub fn group(&self, name: &str) -> Option<&[String]> {
        self.groups
            .iter()
            .find(|g| g.name == name)
            .map(|g| g.tickers.as_slice())
    }

    pub fn contains_group(&self, name: &str) -> bool {
        self.groups.iter().any(|g| g.name == name)
    }

    fn group_mut(&mut self, name: &str) -> &mut FavGroup {
        let idx = match self.groups.iter().position(|g| g.name == name) {
            Some(idx) => idx,
            None => {
                self.groups.push(FavGroup {
                    name: name.to_string(),
                    tickers: Vec::new(),
                });
                self.groups.len() - 1
            }
        };
        &mut self.groups[idx]
    }

    /// Create an empty group at the end. Existing groups are left as is.
    pub fn add_group(&mut self, name: &str) {
        self.group_mut(name);
    }

    /// Rename a group in place. Returns false when `old` does not exist or
    /// `new` is already taken.
    pub fn rename_group(&mut self, old: &str, new: &str) -> bool {
        if self.contains_group(new) {
            return false;
        }
        match self.groups.iter_mut().find(|g| g.name == old) {
            Some(group) => {
                group.name = new.to_string();
                true
            }
            None => false,
        }
    }

    pub fn delete_group(&mut self, name: &str) -> bool {
        let before = self.groups.len();
        self.groups.retain(|g| g.name != name);
        self.groups.len() != before
    }

    /// Reorder groups to follow `order`. Groups not named keep their
    /// relative order after the named ones.
    pub fn reorder_groups(&mut self, order: &[&str]) {
        let mut reordered = Vec::with_capacity(self.groups.len());
        for name in order {
            if let Some(idx) = self.groups.iter().position(|g| g.name == *name) {
                reordered.push(self.groups.remove(idx));
            }
        }
        reordered.append(&mut self.groups);
        self.groups = reordered;
    }

    /// Set-union `tickers` into the group, keeping existing order and
    /// appending new tickers in the order given.
    pub fn add_favs<S: AsRef<str>>(&mut self, group: &str, tickers: &[S]) {
        let group = self.group_mut(group);
        for ticker in tickers {
            let ticker = ticker.as_ref();
            if !group.tickers.iter().any(|t| t == ticker) {
                group.tickers.push(ticker.to_string());
            }
        }
    }

    pub fn remove_fav(&mut self, group: &str, ticker: &str) -> bool {
        match self.groups.iter_mut().find(|g| g.name == group) {
            Some(group) => {
                let before = group.tickers.len();
                group.tickers.retain(|t| t != ticker);
                group.tickers.len() != before
            }
            None => false,
        }
    }

    /// Replace the group's content. Returns whether anything changed.
    pub fn set_favs(&mut self, group: &str, tickers: Vec<String>) -> bool {
        let group = self.group_mut(group);
        if group.tickers == tickers {
            return false;
        }
        group.tickers = tickers;
        true
    }

    /// Tickers of every group except `excluded`, in first-seen order.
    pub fn union_except(&self, excluded: &str) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut union = Vec::new();
        for group in self.groups.iter().filter(|g| g.name != excluded) {
            for ticker in &group.tickers {
                if seen.insert(ticker.as_str()) {
                    union.push(ticker.clone());
                }
            }
        }
        union
    }
}
