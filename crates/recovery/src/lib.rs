//! # Cassandra Recovery Store
//!
//! Persists the one fact about an open order that the broker cannot give back
//! after a restart: the exact local instant the engine attributes its open to.
//!
//! One JSON document per ticket, named `{ticket}_cassandra.json`, inside the
//! configured orders directory. The store is written once when a position is
//! confirmed and read on startup for every order the broker still reports.

pub mod error;
pub mod repository;

pub use error::RecoveryError;
pub use repository::{RecoveryRecord, RecoveryRepository};
