//! HTTP REST client for the depth snapshot endpoint.
//!
//! This module provides the [`RestClient`] used to fetch full order book
//! snapshots (`GET /api/v3/depth`). Market data endpoints are public, so no
//! request signing is involved.
//!
//! # Example
//!
//! ```rust,no_run
//! use depth_sync::client::RestClient;
//! use depth_sync::Config;
//!
//! # async fn example() -> depth_sync::Result<()> {
//! let config = Config::new("BTCUSDT");
//! let rest = RestClient::new(&config)?;
//!
//! let snapshot = rest.get_depth("BTCUSDT", 100).await?;
//! println!("{} bids at update {}", snapshot.bids.len(), snapshot.last_update_id);
//! # Ok(())
//! # }
//! ```

use reqwest::header::RETRY_AFTER;
use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::config::Config;
use crate::error::{ApiError, Error};
use crate::orderbook::SnapshotSource;
use crate::types::messages::ApiErrorBody;
use crate::types::Snapshot;

/// Path of the order book snapshot endpoint
const DEPTH_PATH: &str = "/api/v3/depth";

/// HTTP client for the REST API
#[derive(Debug, Clone)]
pub struct RestClient {
    client: Client,
    base_url: Url,
    snapshot_limit: u32,
}

impl RestClient {
    /// Create a new REST client
    ///
    /// # Arguments
    ///
    /// * `config` - Client configuration (environment, timeout, snapshot depth)
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid or the HTTP client cannot
    /// be initialized.
    pub fn new(config: &Config) -> Result<Self, Error> {
        let client = Client::builder().timeout(config.timeout()).build()?;

        Ok(Self {
            client,
            base_url: Url::parse(config.rest_base_url())?,
            snapshot_limit: config.snapshot_limit(),
        })
    }

    /// Make a GET request to the API
    ///
    /// # Arguments
    ///
    /// * `path` - API path (without base URL)
    /// * `query` - Query string pairs
    ///
    /// # Returns
    ///
    /// Deserialized response body
    pub async fn get<T>(&self, path: &str, query: &[(&str, &str)]) -> Result<T, Error>
    where
        T: serde::de::DeserializeOwned,
    {
        let mut url = self.base_url.join(path)?;
        url.query_pairs_mut().extend_pairs(query);

        debug!(%url, "GET");
        let response = self.client.get(url).send().await?;

        self.handle_response(response).await
    }

    /// Fetch the order book snapshot for `symbol` with `limit` levels per side
    pub async fn get_depth(&self, symbol: &str, limit: u32) -> Result<Snapshot, Error> {
        let limit = limit.to_string();
        let snapshot: Snapshot = self
            .get(DEPTH_PATH, &[("symbol", symbol), ("limit", &limit)])
            .await?;

        debug!(
            symbol,
            last_update_id = snapshot.last_update_id,
            bids = snapshot.bids.len(),
            asks = snapshot.asks.len(),
            "snapshot received"
        );
        Ok(snapshot)
    }

    /// Handle the HTTP response, checking for errors
    async fn handle_response<T>(&self, response: reqwest::Response) -> Result<T, Error>
    where
        T: serde::de::DeserializeOwned,
    {
        let status = response.status();

        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
            let body = response.text().await.unwrap_or_default();
            return Err(error_from_status(status.as_u16(), retry_after.as_deref(), &body));
        }

        // Deserialize successful response
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(Error::from)
    }

    /// Get the base URL
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Levels per side requested by [`SnapshotSource::fetch_snapshot`]
    pub fn snapshot_limit(&self) -> u32 {
        self.snapshot_limit
    }
}

impl SnapshotSource for RestClient {
    async fn fetch_snapshot(&self, symbol: &str) -> Result<Snapshot, Error> {
        self.get_depth(symbol, self.snapshot_limit).await
    }
}

/// Map a non-success response to an [`Error`]
///
/// 429 (rate limited) and 418 (IP banned after ignoring 429s) become
/// [`Error::RateLimited`]; everything else is an [`Error::Api`], using the
/// `{"code", "msg"}` body when it parses.
fn error_from_status(status: u16, retry_after: Option<&str>, body: &str) -> Error {
    if status == 429 || status == 418 {
        return Error::RateLimited {
            retry_after_secs: retry_after.and_then(|s| s.trim().parse().ok()),
        };
    }

    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(err) => Error::Api(ApiError::with_code(status, err.code, err.msg)),
        Err(_) => Error::Api(ApiError::new(status, body)),
    }
}
