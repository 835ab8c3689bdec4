use chrono::NaiveDateTime;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::errors::CoreError;
use crate::models::favorites::FavData;
use crate::models::user_data::UserData;
use crate::models::wallet::Wallet;

use super::format;

/// Version of the user data set as a whole, stored in the `version` bundle.
pub const DATA_VERSION: u16 = 2;

pub const WALLET_VERSION: u16 = 2;
pub const FAVS_VERSION: u16 = 2;
pub const MARKERS_VERSION: u16 = 1;
pub const NOTES_VERSION: u16 = 1;
pub const MATCH_MODE_VERSION: u16 = 1;
pub const STOCK_HEADERS_VERSION: u16 = 1;

pub const BACKUP_FILE: &str = "backup.zip";

const BUNDLES: [&str; 7] = [
    "version",
    "favs",
    "notes",
    "wallet",
    "markers",
    "match_mode",
    "stock_headers",
];

/// Wallet class version 1: `(stock_name, ticker, [(amount, unit_price,
/// commission, time)])` with positional transaction tuples.
pub type LegacyWallet = Vec<(String, String, Vec<(i64, f64, f64, NaiveDateTime)>)>;

/// Favs class version 1: groups without a user-defined order.
pub type LegacyFavs = BTreeMap<String, Vec<String>>;

/// Saves and loads [`UserData`] as one versioned bundle file per part.
///
/// Each bundle is `SMUD` + class version + bincode payload (see
/// [`format`]). Older class versions are upgraded through an explicit
/// conversion chain; an unknown version resets that part to its default.
pub struct UserDataManager {
    dir: PathBuf,
}

impl UserDataManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn bundle_path(&self, bundle: &str) -> PathBuf {
        self.dir.join(format!("{bundle}.bin"))
    }

    /// Write every bundle, then refresh the backup archive.
    pub fn save(&self, data: &UserData) -> Result<(), CoreError> {
        std::fs::create_dir_all(&self.dir)?;

        self.write_bundle("version", 1, &DATA_VERSION)?;
        self.write_bundle("favs", FAVS_VERSION, &data.favs)?;
        self.write_bundle("notes", NOTES_VERSION, &data.notes)?;
        self.write_bundle("wallet", WALLET_VERSION, &data.wallet)?;
        self.write_bundle("markers", MARKERS_VERSION, &data.markers)?;
        self.write_bundle("match_mode", MATCH_MODE_VERSION, &data.match_mode)?;
        self.write_bundle("stock_headers", STOCK_HEADERS_VERSION, &data.stock_headers)?;

        self.write_backup()?;
        info!(dir = %self.dir.display(), "user data saved");
        Ok(())
    }

    /// Load every bundle. Missing bundles yield defaults; bundles that
    /// cannot be decoded are logged and reset to defaults.
    pub fn load(&self) -> Result<UserData, CoreError> {
        if let Some(version) = self.load_part("version", |v, p| decode_current::<u16>(v, 1, "version", p))? {
            if version > DATA_VERSION {
                warn!(version, supported = DATA_VERSION, "user data written by a newer version");
            }
        }

        Ok(UserData {
            wallet: self.load_part("wallet", decode_wallet)?.unwrap_or_default(),
            favs: self.load_part("favs", decode_favs)?.unwrap_or_default(),
            markers: self
                .load_part("markers", |v, p| decode_current(v, MARKERS_VERSION, "markers", p))?
                .unwrap_or_default(),
            notes: self
                .load_part("notes", |v, p| decode_current(v, NOTES_VERSION, "notes", p))?
                .unwrap_or_default(),
            match_mode: self
                .load_part("match_mode", |v, p| {
                    decode_current(v, MATCH_MODE_VERSION, "match_mode", p)
                })?
                .unwrap_or_default(),
            stock_headers: self
                .load_part("stock_headers", |v, p| {
                    decode_current(v, STOCK_HEADERS_VERSION, "stock_headers", p)
                })?
                .unwrap_or_default(),
        })
    }

    fn write_bundle<T: Serialize>(&self, bundle: &str, version: u16, value: &T) -> Result<(), CoreError> {
        let payload = bincode::serialize(value)
            .map_err(|e| CoreError::Serialization(format!("Failed to serialize {bundle}: {e}")))?;
        std::fs::write(self.bundle_path(bundle), format::write_file(version, &payload))?;
        Ok(())
    }

    /// Read and decode one bundle. `Ok(None)` when the file is missing or
    /// could not be decoded; I/O failures are returned.
    fn load_part<T>(
        &self,
        bundle: &str,
        decode: impl FnOnce(u16, &[u8]) -> Result<T, CoreError>,
    ) -> Result<Option<T>, CoreError> {
        let path = self.bundle_path(bundle);
        if !path.exists() {
            debug!(bundle, "bundle missing, using defaults");
            return Ok(None);
        }
        let bytes = std::fs::read(&path)?;

        let decoded = format::read_file(&bytes).and_then(|(version, payload)| decode(version, payload));
        match decoded {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(bundle, error = %e, "cannot restore bundle, resetting to defaults");
                Ok(None)
            }
        }
    }

    fn write_backup(&self) -> Result<(), CoreError> {
        let file = File::create(self.dir.join(BACKUP_FILE))?;
        let mut zip = ZipWriter::new(file);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for bundle in BUNDLES {
            let path = self.bundle_path(bundle);
            if !path.exists() {
                continue;
            }
            let bytes = std::fs::read(&path)?;
            zip.start_file(format!("{bundle}.bin"), options)?;
            zip.write_all(&bytes)?;
        }
        zip.finish()?;
        Ok(())
    }
}

fn deserialize<T: DeserializeOwned>(bundle: &str, payload: &[u8]) -> Result<T, CoreError> {
    bincode::deserialize(payload)
        .map_err(|e| CoreError::Deserialization(format!("Failed to deserialize {bundle}: {e}")))
}

/// Bundles with a single known class version.
fn decode_current<T: DeserializeOwned>(
    version: u16,
    expected: u16,
    bundle: &str,
    payload: &[u8],
) -> Result<T, CoreError> {
    if version != expected {
        return Err(CoreError::PersistenceSkew {
            bundle: bundle.to_string(),
            version,
        });
    }
    deserialize(bundle, payload)
}

fn decode_wallet(version: u16, payload: &[u8]) -> Result<Wallet, CoreError> {
    match version {
        1 => {
            let legacy: LegacyWallet = deserialize("wallet", payload)?;
            Ok(upgrade_wallet(legacy))
        }
        WALLET_VERSION => deserialize("wallet", payload),
        other => Err(CoreError::PersistenceSkew {
            bundle: "wallet".into(),
            version: other,
        }),
    }
}

fn decode_favs(version: u16, payload: &[u8]) -> Result<FavData, CoreError> {
    match version {
        1 => {
            let legacy: LegacyFavs = deserialize("favs", payload)?;
            Ok(upgrade_favs(legacy))
        }
        FAVS_VERSION => deserialize("favs", payload),
        other => Err(CoreError::PersistenceSkew {
            bundle: "favs".into(),
            version: other,
        }),
    }
}

/// Wallet v1 → v2: positional tuples become named transactions.
pub fn upgrade_wallet(legacy: LegacyWallet) -> Wallet {
    let mut wallet = Wallet::new();
    for (stock_name, ticker, transactions) in legacy {
        for (amount, unit_price, commission, time) in transactions {
            wallet.add_transaction(&stock_name, &ticker, amount, unit_price, time, commission, false);
        }
    }
    wallet
}

/// Favs v1 → v2: groups are ordered by name.
pub fn upgrade_favs(legacy: LegacyFavs) -> FavData {
    let mut favs = FavData::new();
    for (group, tickers) in legacy {
        favs.add_group(&group);
        favs.add_favs(&group, &tickers);
    }
    favs
}
