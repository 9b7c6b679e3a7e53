//! Error types for the depth-sync crate.
//!
//! This module defines the errors that can occur while fetching depth
//! snapshots, streaming diff events and keeping the local book in sync.

use thiserror::Error;

/// The main error type for this crate
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error (malformed payload or missing field)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A price or quantity could not be parsed as an exact decimal
    #[error("Decimal error: {0}")]
    Decimal(#[from] rust_decimal::Error),

    /// An endpoint URL could not be built
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Invalid configuration (empty symbol, zero retry budget, ...)
    #[error("Configuration error: {0}")]
    Config(String),

    /// API returned an error response
    #[error("API error ({}): {}", .0.status, .0.message)]
    Api(ApiError),

    /// Rate limit exceeded
    #[error("Rate limited{}", .retry_after_secs.map(|s| format!(", retry after {s}s")).unwrap_or_default())]
    RateLimited {
        /// Retry after this many seconds
        retry_after_secs: Option<u64>,
    },

    /// WebSocket connection closed (or the event stream ended)
    #[error("WebSocket connection closed")]
    ConnectionClosed,

    /// Orderbook sequence gap detected (missed messages)
    #[error("Sequence gap: expected update id {expected}, got {got}")]
    SequenceGap {
        /// First update id the book could accept
        expected: u64,
        /// First update id actually received
        got: u64,
    },

    /// The snapshot retry budget was exhausted before the book was initialized
    #[error("Failed to initialise order book after {attempts} snapshot attempts")]
    SnapshotRetriesExhausted {
        /// Number of attempts made
        attempts: u32,
    },

    /// The book has not received its first snapshot yet
    #[error("Order book not initialised")]
    NotInitialized,

    /// Operation timed out
    #[error("Operation timed out")]
    Timeout,

    /// A background task panicked or was cancelled
    #[error("Task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Error returned by the Binance API
///
/// Binance error bodies look like `{"code": -1121, "msg": "Invalid symbol."}`.
#[derive(Debug, Clone)]
pub struct ApiError {
    /// HTTP status code
    pub status: u16,
    /// Error code from API (if provided)
    pub code: Option<i64>,
    /// Error message
    pub message: String,
}

impl ApiError {
    /// Create a new API error
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            code: None,
            message: message.into(),
        }
    }

    /// Create an API error with an error code
    pub fn with_code(status: u16, code: i64, message: impl Into<String>) -> Self {
        Self {
            status,
            code: Some(code),
            message: message.into(),
        }
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    /// Check if this is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }
}

impl Error {
    /// Whether this error came from the transport (network, status, payload)
    ///
    /// The sync controller retries transport errors within its snapshot
    /// budget; any other fetch error ends the reconciliation immediately.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Http(_)
                | Error::WebSocket(_)
                | Error::Json(_)
                | Error::Decimal(_)
                | Error::Api(_)
                | Error::RateLimited { .. }
                | Error::ConnectionClosed
                | Error::Timeout
        )
    }
}
