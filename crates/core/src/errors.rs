use thiserror::Error;

/// Unified error type for the entire stock-monitor-core library.
/// Every public function returns `Result<T, CoreError>`.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Network ─────────────────────────────────────────────────────
    #[error("Network error fetching {url}: {cause}")]
    Network { url: String, cause: String },

    #[error("HTTP status {code} fetching {url}")]
    HttpStatus { code: u16, url: String },

    // ── Source data ─────────────────────────────────────────────────
    #[error("Parse error ({source_name}): {message}")]
    Parse {
        source_name: String,
        message: String,
    },

    #[error("Source reported no data: {0}")]
    EmptySource(String),

    #[error("Column {column} is not supported by {source_name}")]
    UnsupportedColumn {
        source_name: String,
        column: String,
    },

    #[error("Invalid range code: {0}")]
    InvalidRangeCode(String),

    // ── Business logic ──────────────────────────────────────────────
    #[error("Invariant violated: {0}")]
    InvariantViolated(String),

    #[error("Validation failed: {0}")]
    ValidationError(String),

    // ── Persistence ─────────────────────────────────────────────────
    #[error("Persisted {bundle} has incompatible version {version}")]
    PersistenceSkew { bundle: String, version: u16 },

    #[error("Invalid file format: {0}")]
    InvalidFileFormat(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("File I/O error: {0}")]
    FileIO(String),
}

impl CoreError {
    /// Transport failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Network { .. } | CoreError::HttpStatus { .. })
    }

    pub(crate) fn parse(source_name: &str, message: impl Into<String>) -> Self {
        CoreError::Parse {
            source_name: source_name.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn network(url: &str, cause: impl std::fmt::Display) -> Self {
        CoreError::Network {
            url: short_url(url),
            cause: cause.to_string(),
        }
    }
}

/// Strip the query string so logged and reported URLs stay short and
/// never carry request parameters verbatim.
pub fn short_url(url: &str) -> String {
    match url.find('?') {
        Some(idx) => format!("{}?<query redacted>", &url[..idx]),
        None => url.to_string(),
    }
}

// ── Conversion helpers (From impls) ─────────────────────────────────

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        CoreError::FileIO(e.to_string())
    }
}

impl From<bincode::Error> for CoreError {
    fn from(e: bincode::Error) -> Self {
        CoreError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Deserialization(e.to_string())
    }
}

impl From<csv::Error> for CoreError {
    fn from(e: csv::Error) -> Self {
        CoreError::Deserialization(format!("CSV error: {e}"))
    }
}

impl From<zip::result::ZipError> for CoreError {
    fn from(e: zip::result::ZipError) -> Self {
        CoreError::FileIO(format!("Zip error: {e}"))
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(e: reqwest::Error) -> Self {
        let url = e.url().map(|u| u.to_string()).unwrap_or_default();
        // reqwest's Display repeats the URL; keep only the cause chain.
        let cause = e.without_url().to_string();
        CoreError::network(&url, cause)
    }
}
