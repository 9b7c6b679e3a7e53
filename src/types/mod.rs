//! Market data types.
//!
//! - [`depth`] - Price levels, depth snapshots and diff events
//! - [`messages`] - WebSocket envelopes and REST error bodies

pub mod depth;
pub mod messages;

pub use depth::{DepthUpdate, PriceLevel, Snapshot};
pub use messages::StreamMessage;

/// Price as an exact decimal
///
/// Binance sends prices as strings such as `"50000.01000000"`. They are parsed
/// straight into [`rust_decimal::Decimal`] so adjacent levels never collapse
/// or reorder the way they can with `f64`.
pub type Price = rust_decimal::Decimal;

/// Quantity as an exact decimal
pub type Quantity = rust_decimal::Decimal;

/// Exchange-assigned book sequence number
pub type UpdateId = u64;

/// Timestamp in milliseconds since Unix epoch
pub type TimestampMs = u64;
