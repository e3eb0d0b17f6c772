use thiserror::Error;
use uuid::Uuid;

use crate::domain::services::ledger::LedgerError;

pub mod settlement_service;

pub use self::settlement_service::{
    LeaderboardEntry, MarketHistoryEntry, MarketSettlementSummary, PositionSettlement,
    SettlementService,
};

/// Errors raised by market lifecycle and settlement operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SettlementError {
    #[error("Market not found: {0}")]
    MarketNotFound(Uuid),

    #[error("Market already resolved: {0}")]
    AlreadyResolved(Uuid),

    #[error("Market not open: {0}")]
    MarketNotOpen(Uuid),

    #[error("Ledger error during settlement: {0}")]
    Ledger(#[from] LedgerError),
}

pub type SettlementResult<T> = Result<T, SettlementError>;
