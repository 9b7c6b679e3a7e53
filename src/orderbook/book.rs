//! Core orderbook data structure.
//!
//! This implementation uses `BTreeMap` for sorted price levels, providing:
//!
//! - O(log n) insertion, deletion, and lookup
//! - O(log n) access to best bid/ask (via `last_key_value` / `first_key_value`)
//! - Ordered iteration for depth-of-book queries

use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::Decimal;

use crate::types::{DepthUpdate, Price, PriceLevel, Quantity, UpdateId};

/// Result of applying a [`DepthUpdate`] to a book
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The update was applied and the sequence advanced
    Applied,
    /// The update is already reflected in the book (`u <= lastUpdateId`)
    Stale,
    /// The update starts past `lastUpdateId + 1`; the book was left untouched
    Gap,
}

/// Local orderbook for a single instrument.
///
/// # Design Decisions
///
/// 1. **Decimal prices**: Prices and quantities are `rust_decimal::Decimal`
///    parsed from the exchange's strings, so ordering is exact.
///
/// 2. **BTreeMap**: Both sides are stored ascending. Bids are read from the
///    back (best = highest), asks from the front (best = lowest).
///
/// 3. **Sequence tracking**: `last_update_id` is the id of the last diff
///    absorbed. Updates at or below it are stale; updates starting beyond
///    `last_update_id + 1` indicate missed messages.
///
/// 4. **No zero levels**: A zero quantity always removes the price.
///
/// # Thread Safety
///
/// This struct is `Send + Sync` but not internally synchronized. Use
/// [`OrderBookStore`](super::OrderBookStore) for shared access.
#[derive(Debug, Clone)]
pub struct OrderBook {
    /// Instrument symbol
    symbol: String,

    /// Bid levels: price -> quantity
    /// Sorted ascending by price (best bid = highest = last)
    bids: BTreeMap<Price, Quantity>,

    /// Ask levels: price -> quantity
    /// Sorted ascending by price (best ask = lowest = first)
    asks: BTreeMap<Price, Quantity>,

    /// Last update id absorbed (snapshot or diff)
    last_update_id: UpdateId,

    /// Whether a snapshot has been installed
    initialized: bool,
}

impl OrderBook {
    /// Create a new empty, uninitialized orderbook
    #[must_use]
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            last_update_id: 0,
            initialized: false,
        }
    }

    /// Get the symbol
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Get the last applied update id
    #[must_use]
    pub const fn last_update_id(&self) -> UpdateId {
        self.last_update_id
    }

    /// Whether a snapshot has been installed
    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Replace the entire book with a snapshot
    ///
    /// Zero-quantity levels are skipped. A snapshot older than the book's
    /// current sequence is refused (returns `false`) and the book is left
    /// as it was, so `last_update_id` never goes backwards.
    pub fn set_snapshot(
        &mut self,
        bids: &[PriceLevel],
        asks: &[PriceLevel],
        last_update_id: UpdateId,
    ) -> bool {
        if last_update_id < self.last_update_id {
            return false;
        }

        self.bids.clear();
        self.asks.clear();

        for level in bids.iter().filter(|l| !l.is_removal()) {
            self.bids.insert(level.price, level.quantity);
        }
        for level in asks.iter().filter(|l| !l.is_removal()) {
            self.asks.insert(level.price, level.quantity);
        }

        self.last_update_id = last_update_id;
        self.initialized = true;
        true
    }

    /// Apply a diff event
    ///
    /// Levels are absolute: a non-zero quantity replaces the level, zero
    /// removes it (removing an absent price is fine). On [`ApplyOutcome::Stale`]
    /// and [`ApplyOutcome::Gap`] the book is not modified. An uninitialized
    /// book has nothing to apply onto and always reports `Gap`.
    pub fn apply_update(&mut self, update: &DepthUpdate) -> ApplyOutcome {
        if !self.initialized {
            return ApplyOutcome::Gap;
        }

        // Ignore old events
        if update.final_update_id <= self.last_update_id {
            return ApplyOutcome::Stale;
        }

        if update.first_update_id > self.last_update_id + 1 {
            return ApplyOutcome::Gap;
        }

        Self::apply_levels(&mut self.bids, &update.bids);
        Self::apply_levels(&mut self.asks, &update.asks);

        self.last_update_id = update.final_update_id;
        ApplyOutcome::Applied
    }

    fn apply_levels(side: &mut BTreeMap<Price, Quantity>, levels: &[PriceLevel]) {
        for level in levels {
            if level.is_removal() {
                side.remove(&level.price);
            } else {
                side.insert(level.price, level.quantity);
            }
        }
    }

    /// Get the best bid (highest bid)
    #[must_use]
    pub fn best_bid(&self) -> Option<PriceLevel> {
        self.bids
            .last_key_value()
            .map(|(&p, &q)| PriceLevel::new(p, q))
    }

    /// Get the best ask (lowest ask)
    #[must_use]
    pub fn best_ask(&self) -> Option<PriceLevel> {
        self.asks
            .first_key_value()
            .map(|(&p, &q)| PriceLevel::new(p, q))
    }

    /// Get the mid price
    ///
    /// Returns `(best bid + best ask) / 2`, or `None` if either side is empty.
    #[must_use]
    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid.price + ask.price) / Decimal::TWO),
            _ => None,
        }
    }

    /// Get the spread
    #[must_use]
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask.price - bid.price),
            _ => None,
        }
    }

    /// Check if the book is crossed (best bid >= best ask)
    ///
    /// This shouldn't happen in a healthy market but is useful for validation.
    #[must_use]
    pub fn is_crossed(&self) -> bool {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => bid.price >= ask.price,
            _ => false,
        }
    }

    /// Get all bid levels, sorted by price descending (best first)
    pub fn bids(&self) -> impl Iterator<Item = PriceLevel> + '_ {
        self.bids.iter().rev().map(|(&p, &q)| PriceLevel::new(p, q))
    }

    /// Get all ask levels, sorted by price ascending (best first)
    pub fn asks(&self) -> impl Iterator<Item = PriceLevel> + '_ {
        self.asks.iter().map(|(&p, &q)| PriceLevel::new(p, q))
    }

    /// Get the top N bid levels
    #[must_use]
    pub fn top_bids(&self, n: usize) -> Vec<PriceLevel> {
        self.bids().take(n).collect()
    }

    /// Get the top N ask levels
    #[must_use]
    pub fn top_asks(&self, n: usize) -> Vec<PriceLevel> {
        self.asks().take(n).collect()
    }

    /// Capture the best `n` levels of both sides and the sequence number
    #[must_use]
    pub fn top_levels(&self, n: usize) -> TopOfBook {
        TopOfBook {
            symbol: self.symbol.clone(),
            bids: self.top_bids(n),
            asks: self.top_asks(n),
            last_update_id: self.last_update_id,
        }
    }

    /// Get total bid quantity
    #[must_use]
    pub fn total_bid_quantity(&self) -> Quantity {
        self.bids.values().sum()
    }

    /// Get total ask quantity
    #[must_use]
    pub fn total_ask_quantity(&self) -> Quantity {
        self.asks.values().sum()
    }

    /// Clear the orderbook back to the uninitialized state
    pub fn clear(&mut self) {
        self.bids.clear();
        self.asks.clear();
        self.initialized = false;
    }

    /// Check if the orderbook is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Get the number of price levels `(bids, asks)`
    #[must_use]
    pub fn num_levels(&self) -> (usize, usize) {
        (self.bids.len(), self.asks.len())
    }
}

impl Default for OrderBook {
    fn default() -> Self {
        Self::new("")
    }
}

/// Consistent view of the best levels of both sides at one sequence number
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopOfBook {
    /// Instrument symbol
    pub symbol: String,
    /// Best bids, highest first
    pub bids: Vec<PriceLevel>,
    /// Best asks, lowest first
    pub asks: Vec<PriceLevel>,
    /// Update id the view corresponds to
    pub last_update_id: UpdateId,
}

impl TopOfBook {
    /// Best bid, if any
    pub fn best_bid(&self) -> Option<PriceLevel> {
        self.bids.first().copied()
    }

    /// Best ask, if any
    pub fn best_ask(&self) -> Option<PriceLevel> {
        self.asks.first().copied()
    }

    /// Mid price, `None` unless both sides have a level
    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid.price + ask.price) / Decimal::TWO),
            _ => None,
        }
    }
}

impl fmt::Display for TopOfBook {
    /// Ladder view: asks with the best ask at the bottom, the mid price,
    /// then bids with the best bid at the top.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Order Book {} (Top {})", self.symbol, self.bids.len().max(self.asks.len()))?;

        writeln!(f, "--- ASKS ---")?;
        writeln!(f, "{:>20}{:>20}", "Price", "Quantity")?;
        for level in self.asks.iter().rev() {
            writeln!(f, "{:>20}{:>20}", level.price, level.quantity)?;
        }

        if let Some(mid) = self.mid_price() {
            writeln!(f, "--- MID: {} ---", mid.normalize())?;
        }

        writeln!(f, "--- BIDS ---")?;
        writeln!(f, "{:>20}{:>20}", "Price", "Quantity")?;
        for level in &self.bids {
            writeln!(f, "{:>20}{:>20}", level.price, level.quantity)?;
        }

        write!(f, "[Last Update ID: {}]", self.last_update_id)
    }
}
