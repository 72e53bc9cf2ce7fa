use api_client::error::ApiError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("No open order with ticket {0}")]
    UnknownTicket(u64),

    #[error("Invalid lot size {requested} for ticket {ticket} holding {available}")]
    InvalidLots {
        ticket: u64,
        requested: String,
        available: String,
    },

    #[error("Order lots must be positive, got {0}")]
    NonPositiveLots(String),
}

impl From<ExecutorError> for ApiError {
    fn from(e: ExecutorError) -> Self {
        ApiError::Broker(e.to_string())
    }
}
