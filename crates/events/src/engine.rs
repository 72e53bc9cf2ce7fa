use crate::messages::BrokerMessage;
use chrono::{DateTime, Utc};
use core_types::OpenOrders;
use rust_decimal::Decimal;

/// Everything that can arrive on the engine's queue.
///
/// Producers (the broker bridge, the paper broker, the clock and the refresh
/// timer) only ever enqueue; the engine loop is the single consumer.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A price update, also used as the heartbeat that drives schedules.
    Tick {
        symbol: String,
        bid: Decimal,
        ask: Decimal,
        at: DateTime<Utc>,
    },
    Broker(BrokerMessage),
    /// A fresh snapshot of the broker's open orders.
    OrdersChanged(OpenOrders),
    /// Time to pull new bars and re-read the gating zone.
    RefreshZones { at: DateTime<Utc> },
}
