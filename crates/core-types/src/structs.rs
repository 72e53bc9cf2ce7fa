use crate::enums::OrderSide;
use crate::error::CoreError;
use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The timestamp layout the broker bridge uses for `open_time`.
pub const BROKER_TIME_FORMAT: &str = "%Y.%m.%d %H:%M:%S";

/// A single OHLCV bar as returned by a price feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kline {
    pub open_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub interval: String,
}

/// A market order to be placed through the broker gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub lots: Decimal,
    pub magic: i64,
    /// Identity tag used later to recognise the resulting order.
    pub comment: String,
}

/// A discrete Fibonacci zone label.
///
/// Upward crossings produce even codes, downward crossings odd codes. The
/// codes are ordered but not contiguous, so only equality and set membership
/// are meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneCode(pub i8);

impl fmt::Display for ZoneCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One entry of the broker's open-order snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenOrder {
    pub symbol: String,
    pub side: OrderSide,
    pub comment: String,
    pub lots: Decimal,
    pub magic: i64,
    /// Broker-reported open time, formatted as `BROKER_TIME_FORMAT`.
    pub open_time: String,
    /// Unrealized profit and loss in account currency.
    pub pnl: Decimal,
}

impl OpenOrder {
    /// Parses the broker-reported open time. The value carries no offset.
    pub fn parsed_open_time(&self) -> Result<NaiveDateTime, CoreError> {
        NaiveDateTime::parse_from_str(&self.open_time, BROKER_TIME_FORMAT).map_err(|e| {
            CoreError::InvalidInput("open_time".to_string(), format!("'{}': {}", self.open_time, e))
        })
    }
}

/// Point-in-time snapshot of the broker's open orders, keyed by ticket.
pub type OpenOrders = BTreeMap<u64, OpenOrder>;
