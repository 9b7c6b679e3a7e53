//! Thread-safe wrapper around [`OrderBook`].
//!
//! # Design
//!
//! The store keeps the book behind a `parking_lot::RwLock`. Every mutation
//! holds the write lock for the whole operation, so a reader sees either the
//! state before or after a snapshot install / diff apply, never a mix.
//!
//! Each method is atomic on its own. Two consecutive calls (say
//! [`current_sequence`](OrderBookStore::current_sequence) followed by
//! [`best_bid`](OrderBookStore::best_bid)) may straddle a write; use
//! [`top_levels`](OrderBookStore::top_levels), which returns the sequence
//! number together with the levels, when a joint view is needed.

use parking_lot::RwLock;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::error::Error;
use crate::types::{DepthUpdate, PriceLevel, UpdateId};

use super::book::{ApplyOutcome, OrderBook, TopOfBook};

/// Shared order book for one instrument
///
/// # Example
///
/// ```rust
/// use depth_sync::orderbook::{ApplyOutcome, OrderBookStore};
/// use depth_sync::types::{DepthUpdate, PriceLevel};
///
/// let store = OrderBookStore::new("BTCUSDT");
/// assert!(store.top_levels(5).is_none());
///
/// let bid = PriceLevel::parse("50000.00", "1.5").unwrap();
/// store.set_snapshot(&[bid], &[], 100);
///
/// let removal = PriceLevel::parse("50000.00", "0").unwrap();
/// let update = DepthUpdate::new(101, 105, vec![removal], vec![]);
/// assert_eq!(store.apply_update(&update), ApplyOutcome::Applied);
/// assert_eq!(store.current_sequence(), 105);
/// ```
#[derive(Debug, Default)]
pub struct OrderBookStore {
    book: RwLock<OrderBook>,
}

impl OrderBookStore {
    /// Create an empty, uninitialized store
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            book: RwLock::new(OrderBook::new(symbol)),
        }
    }

    /// Replace both sides and the sequence number in one step
    ///
    /// Returns `false`, leaving the store untouched, if `last_update_id` is
    /// below the current sequence. The sequence is kept across
    /// [`invalidate`](OrderBookStore::invalidate), so this also holds after
    /// a resync.
    pub fn set_snapshot(&self, bids: &[PriceLevel], asks: &[PriceLevel], last_update_id: UpdateId) -> bool {
        let mut book = self.book.write();
        if !book.set_snapshot(bids, asks, last_update_id) {
            warn!(
                symbol = book.symbol(),
                snapshot_id = last_update_id,
                current = book.last_update_id(),
                "refusing snapshot older than the book"
            );
            return false;
        }
        debug!(
            symbol = book.symbol(),
            last_update_id,
            bid_levels = book.num_levels().0,
            ask_levels = book.num_levels().1,
            "snapshot installed"
        );
        true
    }

    /// Apply a diff event, see [`OrderBook::apply_update`]
    pub fn apply_update(&self, update: &DepthUpdate) -> ApplyOutcome {
        self.book.write().apply_update(update)
    }

    /// Apply a diff event, turning a gap into [`Error::SequenceGap`]
    ///
    /// Convenience for callers that propagate errors with `?`.
    pub fn try_apply_update(&self, update: &DepthUpdate) -> Result<ApplyOutcome, Error> {
        let mut book = self.book.write();
        match book.apply_update(update) {
            ApplyOutcome::Gap if book.is_initialized() => Err(Error::SequenceGap {
                expected: book.last_update_id() + 1,
                got: update.first_update_id,
            }),
            ApplyOutcome::Gap => Err(Error::NotInitialized),
            outcome => Ok(outcome),
        }
    }

    /// Best `n` levels per side with the sequence number, read atomically
    ///
    /// Returns `None` until the first snapshot is installed.
    pub fn top_levels(&self, n: usize) -> Option<TopOfBook> {
        let book = self.book.read();
        book.is_initialized().then(|| book.top_levels(n))
    }

    /// Last applied update id
    pub fn current_sequence(&self) -> UpdateId {
        self.book.read().last_update_id()
    }

    /// Whether a snapshot has been installed
    pub fn is_initialized(&self) -> bool {
        self.book.read().is_initialized()
    }

    /// Best bid, `None` if uninitialized or the side is empty
    pub fn best_bid(&self) -> Option<PriceLevel> {
        let book = self.book.read();
        book.is_initialized().then(|| book.best_bid()).flatten()
    }

    /// Best ask, `None` if uninitialized or the side is empty
    pub fn best_ask(&self) -> Option<PriceLevel> {
        let book = self.book.read();
        book.is_initialized().then(|| book.best_ask()).flatten()
    }

    /// Mid price, `None` unless initialized with both sides non-empty
    pub fn mid_price(&self) -> Option<Decimal> {
        let book = self.book.read();
        book.is_initialized().then(|| book.mid_price()).flatten()
    }

    /// Spread, `None` unless initialized with both sides non-empty
    pub fn spread(&self) -> Option<Decimal> {
        let book = self.book.read();
        book.is_initialized().then(|| book.spread()).flatten()
    }

    /// Number of levels `(bids, asks)`
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInitialized`] before the first snapshot.
    pub fn depth(&self) -> Result<(usize, usize), Error> {
        let book = self.book.read();
        if !book.is_initialized() {
            return Err(Error::NotInitialized);
        }
        Ok(book.num_levels())
    }

    /// Clone the whole book for inspection without holding the lock
    pub fn get_orderbook(&self) -> Option<OrderBook> {
        let book = self.book.read();
        book.is_initialized().then(|| book.clone())
    }

    /// Drop the book contents and return to the uninitialized state
    ///
    /// The sequence number is kept.
    pub fn invalidate(&self) {
        self.book.write().clear();
    }
}
