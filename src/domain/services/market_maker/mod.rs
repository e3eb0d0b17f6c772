use rust_decimal::Decimal;
use thiserror::Error;

pub mod market_maker;

pub use self::market_maker::{
    MarketMaker, MarketMakerConfig, MarketMakerStatus, Quote, SideStatus, MARKET_MAKER_ACCOUNT,
};

/// Errors raised by the market maker.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MarketMakerError {
    /// Fair prices must lie inside the tradable band.
    #[error("Fair price must be between 0.01 and 0.99, got {0}")]
    InvalidFairPrice(Decimal),
}

pub type MarketMakerResult<T> = Result<T, MarketMakerError>;
