//! # Cassandra Strategy Library
//!
//! The pure decision logic of the engine: the Fibonacci level ladder, the zone
//! classification of closing prices, the rolling zone history and the gate that
//! turns the previous close's zone into an entry permission.
//!
//! Nothing here places orders. The only I/O is the `PriceFeed` the history is
//! refreshed through, which callers inject.

pub mod calendar;
pub mod error;
pub mod fibonacci;
pub mod gate;
pub mod zone_history;

pub use error::StrategyError;
pub use fibonacci::{Level, LevelSet, classify, compute_levels};
pub use gate::ZoneGate;
pub use zone_history::{RefreshOutcome, ZoneHistoryStore, ZoneSample};
