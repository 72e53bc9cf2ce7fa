//! # Cassandra Executor Crate
//!
//! Order execution backends that stand in for the broker bridge. The engine only
//! ever talks to a `BrokerGateway`, so it cannot tell the paper broker from the
//! real thing.
//!
//! ## Public API
//!
//! - `PaperBroker`: an in-memory broker that fills every request immediately and
//!   reports back the way the bridge does, through the engine's event queue.
//! - `ExecutorError`: The specific error types that can be returned from this crate.

pub mod error;
pub mod paper;

pub use error::ExecutorError;
pub use paper::PaperBroker;
