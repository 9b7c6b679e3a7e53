//! # depth-sync
//!
//! A locally maintained [Binance](https://binance.com) spot order book, kept
//! consistent by reconciling a REST depth snapshot with the diff-depth
//! WebSocket stream.
//!
//! ## Features
//!
//! - **Snapshot/stream reconciliation** - Buffer, validate, replay, go live
//! - **Gap detection** - Any missed update triggers a full resync
//! - **Exact prices** - `rust_decimal` end to end, no floating point
//! - **Concurrent readers** - Consistent top-of-book views while the sync task writes
//! - **Async/Await** - Built on Tokio
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use depth_sync::{Config, DepthSync};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), depth_sync::Error> {
//!     let config = Config::new("BTCUSDT");
//!     let handle = DepthSync::new(config).start()?;
//!
//!     tokio::time::sleep(std::time::Duration::from_secs(5)).await;
//!     if let Some(top) = handle.store().top_levels(5) {
//!         println!("{}", top);
//!     }
//!
//!     handle.shutdown().await
//! }
//! ```
//!
//! ## Synchronization
//!
//! Diff events carry an inclusive range of update ids `[U, u]`. The book
//! remembers the last applied id and accepts an event only if it overlaps or
//! directly follows it:
//!
//! - `u <= last` - stale, ignored
//! - `U > last + 1` - gap, the book is invalidated and rebuilt from a fresh snapshot
//! - otherwise - each level is upserted, or removed when its quantity is zero
//!
//! ## Architecture
//!
//! This crate is organized into several modules:
//!
//! - [`client`] - REST snapshot client and WebSocket diff-stream producer
//! - [`types`] - Wire types for snapshots, depth events and price levels
//! - [`orderbook`] - Order book, shared store and sync controller
//! - [`config`] - Instrument, environment and sync tuning
//! - [`error`] - Error types for the crate
//!
//! ## Performance
//!
//! - `BTreeMap` for sorted price levels, best price at one end
//! - `parking_lot` read/write lock; readers never block each other
//! - Unbounded channel between the stream task and the controller, so the
//!   socket is drained even while a snapshot request is in flight

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::info;

pub mod client;
pub mod config;
pub mod error;
pub mod orderbook;
pub mod types;

// Re-export main types at crate root for convenience
pub use config::Config;
pub use error::Error;

use client::{spawn_depth_stream, ReconnectConfig, RestClient};
use orderbook::{OrderBookStore, SyncController, SyncState};

/// Result type alias using the crate's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Builder that wires the stream task, the sync controller and the store
///
/// # Example
///
/// ```rust,no_run
/// use depth_sync::{Config, DepthSync};
/// use depth_sync::client::ReconnectConfig;
///
/// # async fn example() -> depth_sync::Result<()> {
/// let config = Config::new("ETHUSDT");
/// let handle = DepthSync::new(config)
///     .with_reconnect(ReconnectConfig::new().with_max_retries(0))
///     .start()?;
///
/// let mut state = handle.state();
/// state.wait_for(|s| s.is_live()).await.ok();
/// println!("mid: {:?}", handle.store().mid_price());
///
/// handle.shutdown().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct DepthSync {
    config: Config,
    reconnect: ReconnectConfig,
}

impl DepthSync {
    /// Create a builder for `config`
    pub fn new(config: Config) -> Self {
        Self {
            config,
            reconnect: ReconnectConfig::default(),
        }
    }

    /// Set the stream reconnection policy
    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Spawn the stream and sync tasks
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be built. Connection and snapshot failures surface later,
    /// through [`DepthSyncHandle::join`] or [`DepthSyncHandle::shutdown`].
    pub fn start(self) -> Result<DepthSyncHandle> {
        self.config.validate()?;

        let symbol = self.config.symbol().to_owned();
        let store = Arc::new(OrderBookStore::new(symbol.clone()));
        let rest = RestClient::new(&self.config)?;
        let (shutdown, stop_rx) = watch::channel(false);
        let (tx, rx) = mpsc::unbounded_channel();

        // stream first, so events are buffered before the first snapshot request
        let stream_task = spawn_depth_stream(self.config.clone(), self.reconnect, tx, stop_rx.clone());

        let controller = SyncController::new(
            symbol.clone(),
            Arc::clone(&store),
            rest,
            self.config.sync().clone(),
        );
        let state = controller.subscribe_state();
        let sync_task = tokio::spawn(controller.run(rx, stop_rx));

        info!(%symbol, "depth sync started");
        Ok(DepthSyncHandle {
            symbol,
            store,
            state,
            shutdown,
            stream_task,
            sync_task,
        })
    }
}

/// Handle to a running [`DepthSync`]
///
/// Dropping the handle does not stop the tasks; call
/// [`shutdown`](DepthSyncHandle::shutdown).
#[derive(Debug)]
pub struct DepthSyncHandle {
    symbol: String,
    store: Arc<OrderBookStore>,
    state: watch::Receiver<SyncState>,
    shutdown: watch::Sender<bool>,
    stream_task: JoinHandle<Result<()>>,
    sync_task: JoinHandle<Result<()>>,
}

impl DepthSyncHandle {
    /// The symbol being tracked
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// The shared order book
    pub fn store(&self) -> &Arc<OrderBookStore> {
        &self.store
    }

    /// Watch the controller state
    pub fn state(&self) -> watch::Receiver<SyncState> {
        self.state.clone()
    }

    /// Whether the book is currently live
    pub fn is_live(&self) -> bool {
        self.state.borrow().is_live()
    }

    /// Whether the sync task has stopped on its own
    pub fn is_finished(&self) -> bool {
        self.sync_task.is_finished()
    }

    /// Wait for the sync task to end, then stop the stream task
    ///
    /// # Errors
    ///
    /// Returns the error that ended synchronization, e.g.
    /// [`Error::SnapshotRetriesExhausted`] on failed startup.
    pub async fn join(self) -> Result<()> {
        let sync_result = flatten(self.sync_task.await);
        self.shutdown.send_replace(true);
        let stream_result = flatten(self.stream_task.await);
        combine(sync_result, stream_result)
    }

    /// Signal both tasks to stop and wait for them
    pub async fn shutdown(self) -> Result<()> {
        info!(symbol = %self.symbol, "shutting down depth sync");
        self.shutdown.send_replace(true);
        let sync_result = flatten(self.sync_task.await);
        let stream_result = flatten(self.stream_task.await);
        combine(sync_result, stream_result)
    }
}

fn flatten(joined: std::result::Result<Result<()>, tokio::task::JoinError>) -> Result<()> {
    joined.map_err(Error::from).and_then(|result| result)
}

/// Prefer the stream's error when it is what closed the event channel
fn combine(sync_result: Result<()>, stream_result: Result<()>) -> Result<()> {
    match (sync_result, stream_result) {
        (Err(Error::ConnectionClosed), Err(stream_err)) => Err(stream_err),
        (sync_result, _) => sync_result,
    }
}
