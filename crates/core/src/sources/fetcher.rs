use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::{redirect, Client};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::errors::{short_url, CoreError};

/// Several sources reject requests without a browser-like agent.
const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

const BROWSER_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,application/json;q=0.8,*/*;q=0.7";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Raw content of a fetched resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Bytes(Vec<u8>),
}

impl Payload {
    /// Text when the bytes are valid UTF-8, raw bytes otherwise.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        match String::from_utf8(bytes) {
            Ok(text) => Payload::Text(text),
            Err(e) => Payload::Bytes(e.into_bytes()),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Payload::Text(text) => text.as_bytes(),
            Payload::Bytes(bytes) => bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

/// Capability of retrieving a URL into a file.
///
/// Implementations never retry; retry policy belongs to the caller.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch `url`, write the raw body to `out_path` (creating parent
    /// directories) and return it.
    async fn fetch(&self, url: &str, out_path: &Path) -> Result<Payload, CoreError>;
}

/// `Fetcher` over HTTP(S) with redirects, a timeout and browser headers.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        headers.insert(ACCEPT, HeaderValue::from_static(BROWSER_ACCEPT));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("pl,en-US;q=0.7,en;q=0.3"));

        let client = Client::builder()
            .default_headers(headers)
            .redirect(redirect::Policy::limited(10))
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, out_path: &Path) -> Result<Payload, CoreError> {
        debug!(url = %short_url(url), path = %out_path.display(), "fetching");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CoreError::network(url, e.without_url()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CoreError::HttpStatus {
                code: status.as_u16(),
                url: short_url(url),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| CoreError::network(url, e.without_url()))?;

        write_payload(out_path, &bytes).await?;
        Ok(Payload::from_bytes(bytes.to_vec()))
    }
}

/// Write raw bytes to `path`, creating parent directories.
pub async fn write_payload(path: &Path, bytes: &[u8]) -> Result<(), CoreError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes).await?;
    Ok(())
}
