use thiserror::Error;

pub mod matching_engine;

/// Re-export key types for convenience
pub use self::matching_engine::MatchingEngine;
pub use crate::domain::models::orderbook::MatchResult;

/// Errors that can occur during matching engine operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MatchingError {
    /// The order failed validation and was not applied to any book.
    #[error("Invalid order for processing: {0}")]
    InvalidOrder(String),
}

/// Type alias for Result with MatchingError
pub type MatchingResult<T> = Result<T, MatchingError>;
