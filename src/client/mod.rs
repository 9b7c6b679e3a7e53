//! Transport clients for Binance market data.
//!
//! This module contains:
//!
//! - [`rest`] - HTTP client for the depth snapshot endpoint
//! - [`websocket`] - WebSocket client and producer task for the diff-depth stream

pub mod rest;
pub mod websocket;

pub use rest::RestClient;
pub use websocket::{spawn_depth_stream, DepthStream, ReconnectConfig, WebSocketClient};
