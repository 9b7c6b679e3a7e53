//! WebSocket message envelopes and REST error bodies.
//!
//! Raw streams (`/ws/<symbol>@depth`) deliver the event object directly;
//! combined streams (`/stream?streams=...`) wrap it as `{"stream": ..., "data": ...}`.
//! Both shapes decode into [`StreamMessage`].

use serde::Deserialize;

use super::depth::DepthUpdate;

/// Message received on the diff-depth stream
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StreamMessage {
    /// Combined-stream envelope
    Combined {
        /// Stream name, e.g. `btcusdt@depth`
        stream: String,
        /// Wrapped event
        data: DepthUpdate,
    },
    /// Bare depth event from a raw stream
    Depth(DepthUpdate),
}

impl StreamMessage {
    /// Unwrap the depth event regardless of envelope
    pub fn into_update(self) -> DepthUpdate {
        match self {
            StreamMessage::Combined { data, .. } => data,
            StreamMessage::Depth(update) => update,
        }
    }
}

/// Error body returned by the REST API
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    /// Binance error code (negative)
    pub code: i64,
    /// Human-readable message
    pub msg: String,
}
