use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::errors::CoreError;
use crate::models::transaction::TransactionMatchMode;

/// Runtime configuration of the core. Every field has a default, so a
/// config file only needs to name what it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Root of the downloaded/parsed source cache.
    pub cache_dir: PathBuf,

    /// Directory of the persisted user bundles (wallet, favs, ...).
    pub user_dir: PathBuf,

    /// Parallel workers of the background refresh pool.
    pub refresh_workers: usize,

    /// Attempts per refresh callable on transport errors.
    pub refresh_retries: u32,

    /// Per-request network timeout.
    pub fetch_timeout_secs: u64,

    /// Matching policy used when no user data overrides it.
    pub match_mode: TransactionMatchMode,
}

impl Default for CoreConfig {
    fn default() -> Self {
        let base = std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".stock-monitor");
        Self {
            cache_dir: base.join("cache"),
            user_dir: base.join("data"),
            refresh_workers: 6,
            refresh_retries: 3,
            fetch_timeout_secs: 30,
            match_mode: TransactionMatchMode::Best,
        }
    }
}

impl CoreConfig {
    /// Load a JSON config file. A missing file yields the defaults.
    pub fn from_file(path: &Path) -> Result<Self, CoreError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: CoreConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Configuration rooted at a single directory (tests, portable mode).
    pub fn with_base_dir(base: &Path) -> Self {
        Self {
            cache_dir: base.join("cache"),
            user_dir: base.join("data"),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.refresh_workers == 0 {
            return Err(CoreError::ValidationError(
                "refresh_workers must be at least 1".into(),
            ));
        }
        if self.refresh_retries == 0 {
            return Err(CoreError::ValidationError(
                "refresh_retries must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
