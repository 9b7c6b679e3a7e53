//! Local order book and its synchronization.
//!
//! - [`book`] - Sorted bid/ask sides with sequence tracking
//! - [`store`] - Lock-protected book shared between the sync task and readers
//! - [`buffer`] - FIFO of diff events received before the book is synced
//! - [`controller`] - Snapshot/stream reconciliation state machine
//!
//! # Example
//!
//! ```rust
//! use depth_sync::orderbook::{ApplyOutcome, OrderBook};
//! use depth_sync::types::{DepthUpdate, PriceLevel};
//!
//! let mut book = OrderBook::new("BTCUSDT");
//! book.set_snapshot(
//!     &[PriceLevel::parse("100.00", "1").unwrap()],
//!     &[PriceLevel::parse("100.02", "2").unwrap()],
//!     100,
//! );
//!
//! let update = DepthUpdate::new(101, 102, vec![PriceLevel::parse("100.01", "3").unwrap()], vec![]);
//! assert_eq!(book.apply_update(&update), ApplyOutcome::Applied);
//!
//! if let Some(bid) = book.best_bid() {
//!     println!("Best bid: {} @ {}", bid.quantity, bid.price);
//! }
//! ```

pub mod book;
pub mod buffer;
pub mod controller;
pub mod store;

pub use book::{ApplyOutcome, OrderBook, TopOfBook};
pub use buffer::UpdateBuffer;
pub use controller::{ReplayReport, SnapshotSource, SyncController, SyncState, UpdateDisposition};
pub use store::OrderBookStore;
