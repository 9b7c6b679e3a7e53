//! WebSocket client for the diff-depth stream.
//!
//! This module provides:
//!
//! - [`WebSocketClient`] - a single connection to `<symbol>@depth`
//! - [`DepthStream`] - the same, with reconnection and exponential backoff
//! - [`spawn_depth_stream`] - the producer task that forwards decoded events
//!   to the sync controller over a channel
//!
//! # Example
//!
//! ```rust,no_run
//! use depth_sync::client::WebSocketClient;
//! use depth_sync::Config;
//!
//! # async fn example() -> depth_sync::Result<()> {
//! let config = Config::new("BTCUSDT");
//! let mut ws = WebSocketClient::connect(&config).await?;
//!
//! while let Some(update) = ws.next().await {
//!     let update = update?;
//!     println!("{}..={}", update.first_update_id, update.final_update_id);
//! }
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::Error;
use crate::orderbook::controller::stopped;
use crate::types::messages::StreamMessage;
use crate::types::DepthUpdate;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket client for one diff-depth stream
///
/// # Thread Safety
///
/// This client is NOT thread-safe. It is meant to be owned by a single
/// producer task that hands events to other tasks over a channel.
#[derive(Debug)]
pub struct WebSocketClient {
    write: SplitSink<WsStream, Message>,
    read: SplitStream<WsStream>,
    read_timeout: Option<Duration>,
}

impl WebSocketClient {
    /// Connect to the diff-depth stream configured in `config`
    ///
    /// # Errors
    ///
    /// Returns an error if the stream URL is invalid or the handshake fails.
    pub async fn connect(config: &Config) -> Result<Self, Error> {
        let url = config.stream_url()?;
        Self::connect_url(url.as_str(), config.read_timeout()).await
    }

    /// Connect to an arbitrary stream URL
    ///
    /// `read_timeout` bounds the silence between two frames; `None` waits
    /// forever.
    pub async fn connect_url(url: &str, read_timeout: Option<Duration>) -> Result<Self, Error> {
        let (ws_stream, _response) = tokio_tungstenite::connect_async(url).await?;
        let (write, read) = ws_stream.split();
        debug!(url, "depth stream connected");

        Ok(Self {
            write,
            read,
            read_timeout,
        })
    }

    /// Receive the next depth event
    ///
    /// Pings are answered automatically. A payload that does not decode is
    /// returned as [`Error::Json`]; the connection stays usable.
    ///
    /// # Returns
    ///
    /// The next event, [`Error::Timeout`] if nothing arrived within the read
    /// timeout, or `None` if the connection is closed.
    pub async fn next(&mut self) -> Option<Result<DepthUpdate, Error>> {
        loop {
            let frame = match self.read_timeout {
                Some(limit) => match tokio::time::timeout(limit, self.read.next()).await {
                    Ok(frame) => frame?,
                    Err(_) => return Some(Err(Error::Timeout)),
                },
                None => self.read.next().await?,
            };

            match frame {
                Ok(Message::Text(text)) => {
                    let result = serde_json::from_str::<StreamMessage>(&text)
                        .map(StreamMessage::into_update)
                        .map_err(Error::from);
                    return Some(result);
                }
                Ok(Message::Ping(data)) => {
                    if let Err(e) = self.write.send(Message::Pong(data)).await {
                        return Some(Err(e.into()));
                    }
                }
                Ok(Message::Close(_)) => {
                    return Some(Err(Error::ConnectionClosed));
                }
                Ok(_) => {
                    // Binary, Pong, Frame
                    continue;
                }
                Err(e) => {
                    return Some(Err(e.into()));
                }
            }
        }
    }

    /// Close the WebSocket connection
    pub async fn close(&mut self) -> Result<(), Error> {
        self.write.close().await?;
        Ok(())
    }
}

/// Backoff policy for re-establishing a dropped depth stream
///
/// The wait before attempt `n` (counting from zero) is
/// `initial_delay * multiplier^n`, capped at `max_delay`. The attempt counter
/// resets as soon as an event arrives on the new connection.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use depth_sync::client::ReconnectConfig;
///
/// let policy = ReconnectConfig::new()
///     .with_max_retries(0)
///     .with_initial_delay(Duration::from_millis(500))
///     .with_max_delay(Duration::from_secs(10));
/// assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(1));
/// ```
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Attempts before giving up and ending the stream (0 = never give up)
    pub max_retries: u32,
    /// Wait before the first attempt
    pub initial_delay: Duration,
    /// Upper bound on any single wait
    pub max_delay: Duration,
    /// Growth factor between consecutive waits
    pub multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_retries: 10,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl ReconnectConfig {
    /// Default policy: 10 attempts, 100ms doubling up to 30s
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the attempt budget (0 = unlimited)
    #[must_use]
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the first wait
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the cap on a single wait
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the growth factor
    #[must_use]
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Wait before reconnection attempt `attempt` (zero-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let cap_ms = self.max_delay.as_millis() as f64;
        let ms = self.initial_delay.as_millis() as f64
            * self.multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        // NaN and infinity both fall through to the cap
        if ms >= 0.0 && ms < cap_ms {
            Duration::from_millis(ms as u64)
        } else {
            self.max_delay
        }
    }

    fn exhausted(&self, attempt: u32) -> bool {
        self.max_retries > 0 && attempt >= self.max_retries
    }
}

/// Diff-depth stream with automatic reconnection
///
/// A dropped, closed or silent connection is replaced using exponential
/// backoff. The events missed in between show up downstream as a sequence
/// gap, which the sync controller answers with a resync.
///
/// # Example
///
/// ```rust,no_run
/// use depth_sync::Config;
/// use depth_sync::client::websocket::{DepthStream, ReconnectConfig};
///
/// # async fn example() -> depth_sync::Result<()> {
/// let config = Config::new("BTCUSDT");
/// let mut stream = DepthStream::connect(config, ReconnectConfig::default()).await?;
/// assert!(stream.is_connected());
///
/// loop {
///     match stream.next().await {
///         Some(Ok(update)) => {
///             // Handle event
///         }
///         Some(Err(e)) => {
///             // Malformed payload, or reconnection gave up
///             eprintln!("Error: {}", e);
///         }
///         None => break,
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub struct DepthStream {
    /// The underlying WebSocket client
    client: Option<WebSocketClient>,
    /// Configuration for the stream connection
    config: Config,
    /// Reconnection configuration
    reconnect_config: ReconnectConfig,
    /// Failed reconnection attempts since the last delivered event
    reconnect_attempt: u32,
}

impl std::fmt::Debug for DepthStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DepthStream")
            .field("symbol", &self.config.symbol())
            .field("connected", &self.is_connected())
            .field("reconnect_attempt", &self.reconnect_attempt)
            .finish()
    }
}

impl DepthStream {
    /// Connect to the diff-depth stream with reconnection support
    ///
    /// The first connection is not retried; its failure is returned.
    pub async fn connect(config: Config, reconnect_config: ReconnectConfig) -> Result<Self, Error> {
        let client = WebSocketClient::connect(&config).await?;

        Ok(Self {
            client: Some(client),
            config,
            reconnect_config,
            reconnect_attempt: 0,
        })
    }

    /// Whether a connection is currently open
    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    /// Failed reconnection attempts since the last delivered event
    pub fn reconnect_attempt(&self) -> u32 {
        self.reconnect_attempt
    }

    /// Receive the next event, reconnecting if necessary
    ///
    /// Decode failures are passed through as [`Error::Json`] without touching
    /// the connection. Any other failure drops the connection and reconnects;
    /// if the retry budget runs out the error is returned.
    pub async fn next(&mut self) -> Option<Result<DepthUpdate, Error>> {
        loop {
            if let Some(ref mut client) = self.client {
                match client.next().await {
                    Some(Ok(update)) => {
                        self.reconnect_attempt = 0;
                        return Some(Ok(update));
                    }
                    Some(Err(Error::Json(e))) => {
                        return Some(Err(Error::Json(e)));
                    }
                    Some(Err(e)) => {
                        warn!(symbol = self.config.symbol(), error = %e, "depth stream lost");
                        self.client = None;
                    }
                    None => {
                        warn!(symbol = self.config.symbol(), "depth stream ended by peer");
                        self.client = None;
                    }
                }
            } else if let Err(e) = self.attempt_reconnect().await {
                return Some(Err(e));
            }
        }
    }

    /// Attempt to reconnect with exponential backoff
    async fn attempt_reconnect(&mut self) -> Result<(), Error> {
        loop {
            if self.reconnect_config.exhausted(self.reconnect_attempt) {
                return Err(Error::ConnectionClosed);
            }

            let delay = self.reconnect_config.delay_for_attempt(self.reconnect_attempt);
            tokio::time::sleep(delay).await;

            self.reconnect_attempt += 1;

            match WebSocketClient::connect(&self.config).await {
                Ok(client) => {
                    info!(
                        symbol = self.config.symbol(),
                        attempt = self.reconnect_attempt,
                        "depth stream reconnected"
                    );
                    self.client = Some(client);
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        symbol = self.config.symbol(),
                        attempt = self.reconnect_attempt,
                        error = %e,
                        "reconnect failed"
                    );
                }
            }
        }
    }

    /// Close the WebSocket connection
    pub async fn close(&mut self) -> Result<(), Error> {
        if let Some(ref mut client) = self.client {
            client.close().await?;
        }
        self.client = None;
        Ok(())
    }
}

/// Spawn the producer task for the diff-depth stream
///
/// The task connects, then forwards every decoded event to `updates` in
/// receipt order. Malformed messages are logged and dropped. The task ends,
/// closing the channel, when `shutdown` is set, the receiver is dropped, or
/// reconnection gives up.
///
/// # Errors
///
/// The join handle yields the initial connection error, or the error that
/// ended reconnection.
pub fn spawn_depth_stream(
    config: Config,
    reconnect_config: ReconnectConfig,
    updates: mpsc::UnboundedSender<DepthUpdate>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<Result<(), Error>> {
    tokio::spawn(async move {
        let symbol = config.symbol().to_owned();
        let mut stream = tokio::select! {
            biased;
            _ = stopped(&mut shutdown) => return Ok(()),
            stream = DepthStream::connect(config, reconnect_config) => stream?,
        };
        info!(%symbol, "subscribed to depth stream");

        let mut dropped = 0u64;
        let result = loop {
            let next = tokio::select! {
                biased;
                _ = stopped(&mut shutdown) => break Ok(()),
                next = stream.next() => next,
            };

            match next {
                Some(Ok(update)) => {
                    if updates.send(update).is_err() {
                        debug!(%symbol, "update receiver dropped");
                        break Ok(());
                    }
                }
                Some(Err(Error::Json(e))) => {
                    dropped += 1;
                    warn!(%symbol, error = %e, dropped, "dropping malformed depth message");
                }
                Some(Err(e)) => {
                    error!(
                        %symbol,
                        error = %e,
                        attempts = stream.reconnect_attempt(),
                        "depth stream gave up"
                    );
                    break Err(e);
                }
                None => break Ok(()),
            }
        };

        if let Err(e) = stream.close().await {
            debug!(%symbol, error = %e, "error closing depth stream");
        }
        info!(%symbol, "depth stream stopped");
        result
    })
}
