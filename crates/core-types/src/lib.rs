pub mod enums;
pub mod error;
pub mod structs;

// Re-export the core types to provide a clean public API.
pub use enums::OrderSide;
pub use error::CoreError;
pub use structs::{BROKER_TIME_FORMAT, Kline, OpenOrder, OpenOrders, OrderRequest, ZoneCode};
