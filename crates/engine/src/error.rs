use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("API client error: {0}")]
    ApiClient(#[from] api_client::error::ApiError),

    #[error("Strategy error: {0}")]
    Strategy(#[from] strategies::StrategyError),
}

/// Failures inside one controller. None of them leave the controller.
#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("Malformed broker order: {0}")]
    BrokerProtocol(String),
}
