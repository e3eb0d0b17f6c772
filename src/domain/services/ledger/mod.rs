use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::models::position::PositionError;

pub mod ledger;

pub use self::ledger::{AccountBalance, EntryKind, Ledger, LedgerEntry};

/// Errors that can occur while moving balances or shares.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LedgerError {
    #[error("Account {0} not found")]
    AccountNotFound(Uuid),

    #[error("Account {0} already exists")]
    AccountExists(Uuid),

    #[error("Insufficient balance for {user_id}: required {required}, available {available}")]
    InsufficientBalance {
        user_id: Uuid,
        required: Decimal,
        available: Decimal,
    },

    #[error("Amount must be positive, got {0}")]
    InvalidAmount(Decimal),

    #[error(transparent)]
    Position(#[from] PositionError),
}

pub type LedgerResult<T> = Result<T, LedgerError>;
