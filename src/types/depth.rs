//! Depth snapshot and diff event types.
//!
//! These are the structured values handed to the order book. They deserialize
//! directly from Binance's payloads:
//!
//! - REST `GET /api/v3/depth`: `{"lastUpdateId": 1027024, "bids": [["4.00000000", "431.00000000"]], "asks": [...]}`
//! - Stream `<symbol>@depth`: `{"e": "depthUpdate", "E": 1672515782136, "s": "BNBBTC", "U": 157, "u": 160, "b": [...], "a": [...]}`

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Price, Quantity, TimestampMs, UpdateId};
use crate::error::Error;

/// A single `[price, quantity]` level
///
/// A zero quantity in a diff event means "remove this price".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(Price, Quantity)", into = "(Price, Quantity)")]
pub struct PriceLevel {
    /// Level price
    pub price: Price,
    /// Total quantity resting at this price
    pub quantity: Quantity,
}

impl PriceLevel {
    /// Create a level from decimals
    pub const fn new(price: Price, quantity: Quantity) -> Self {
        Self { price, quantity }
    }

    /// Parse a level from its textual representation
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decimal`] if either field is not a valid decimal.
    pub fn parse(price: &str, quantity: &str) -> Result<Self, Error> {
        Ok(Self {
            price: Decimal::from_str(price)?,
            quantity: Decimal::from_str(quantity)?,
        })
    }

    /// Whether this level removes its price
    pub fn is_removal(&self) -> bool {
        self.quantity.is_zero()
    }
}

impl From<(Price, Quantity)> for PriceLevel {
    fn from((price, quantity): (Price, Quantity)) -> Self {
        Self { price, quantity }
    }
}

impl From<PriceLevel> for (Price, Quantity) {
    fn from(level: PriceLevel) -> Self {
        (level.price, level.quantity)
    }
}

/// Incremental book change covering update ids `first_update_id..=final_update_id`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthUpdate {
    /// Event time (ms)
    #[serde(rename = "E", default)]
    pub event_time: TimestampMs,
    /// Symbol
    #[serde(rename = "s", default)]
    pub symbol: String,
    /// First update id in event (`U`)
    #[serde(rename = "U")]
    pub first_update_id: UpdateId,
    /// Final update id in event (`u`)
    #[serde(rename = "u")]
    pub final_update_id: UpdateId,
    /// Bids to be updated
    #[serde(rename = "b")]
    pub bids: Vec<PriceLevel>,
    /// Asks to be updated
    #[serde(rename = "a")]
    pub asks: Vec<PriceLevel>,
}

impl DepthUpdate {
    /// Create an update with no metadata (event time / symbol)
    pub fn new(
        first_update_id: UpdateId,
        final_update_id: UpdateId,
        bids: Vec<PriceLevel>,
        asks: Vec<PriceLevel>,
    ) -> Self {
        Self {
            event_time: 0,
            symbol: String::new(),
            first_update_id,
            final_update_id,
            bids,
            asks,
        }
    }

    /// Whether the event's id range is well formed (`U <= u`)
    pub fn is_well_formed(&self) -> bool {
        self.first_update_id <= self.final_update_id
    }
}

/// Full point-in-time book state up to `last_update_id`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Sequence number the snapshot is consistent with
    #[serde(rename = "lastUpdateId")]
    pub last_update_id: UpdateId,
    /// Bid levels (best first)
    pub bids: Vec<PriceLevel>,
    /// Ask levels (best first)
    pub asks: Vec<PriceLevel>,
}

impl Snapshot {
    /// Create a snapshot
    pub fn new(last_update_id: UpdateId, bids: Vec<PriceLevel>, asks: Vec<PriceLevel>) -> Self {
        Self {
            last_update_id,
            bids,
            asks,
        }
    }
}
