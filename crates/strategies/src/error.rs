use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StrategyError {
    #[error("Fibonacci top price {top} must be greater than base price {base}")]
    InvalidRange { base: Decimal, top: Decimal },
}
