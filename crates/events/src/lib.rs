//! # Cassandra Events
//!
//! This crate defines the closed set of messages that flow into and out of the
//! order-lifecycle controllers: the engine's input queue, free-text records
//! coming back from the broker bridge, and the state transitions each
//! controller reports after handling an event.
//!
//! As a Layer 0 crate, it depends only on `core-types`.

// Declare the modules that make up this crate.
pub mod engine;
pub mod messages;

// Re-export the core types to provide a clean public API.
pub use engine::EngineEvent;
pub use messages::{BrokerMessage, CLOSE_CONFIRMATION_MARKER, ErrorMsg, InfoMsg, OrderTransition};
