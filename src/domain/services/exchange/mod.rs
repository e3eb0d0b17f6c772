use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

#[cfg(test)]
use mockall::mock;

use crate::domain::models::position::Position;
use crate::domain::models::types::{Market, OrderRecord, OrderStatus, OutcomeSide};
use crate::domain::services::ledger::{AccountBalance, LedgerError};
use crate::domain::services::market_maker::MarketMakerError;
use crate::domain::services::matching_engine::MatchingError;
use crate::domain::services::settlement::SettlementError;

pub mod exchange;
pub mod exchange_worker;

pub use self::exchange::{Exchange, MarketDeletion, MarketListing, OrderOutcome};
pub use self::exchange_worker::{ExchangeClient, ExchangeWorker, WorkerError};

/// Durable storage the exchange rebuilds its state from after a restart.
///
/// The exchange never writes through this trait; persisting markets, balances, positions and
/// order records is the responsibility of whoever owns the storage.
pub trait OrderStore: Send + Sync {
    /// Every known market.
    fn load_markets(&self) -> Result<Vec<Market>, StoreError>;

    /// Balance of every account.
    fn load_accounts(&self) -> Result<Vec<AccountBalance>, StoreError>;

    /// Every position, flat ones included so realized P&L survives.
    fn load_positions(&self) -> Result<Vec<Position>, StoreError>;

    /// Order records still in `Open` or `Partial` status.
    fn load_open_orders(&self) -> Result<Vec<OrderRecord>, StoreError>;
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    #[error("Order store unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced by the exchange coordinator.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExchangeError {
    #[error(transparent)]
    Matching(#[from] MatchingError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Settlement(#[from] SettlementError),

    #[error(transparent)]
    MarketMaker(#[from] MarketMakerError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Order {0} not found")]
    OrderNotFound(Uuid),

    #[error("Order {0} already exists")]
    DuplicateOrder(Uuid),

    #[error("Order {order_id} does not belong to {user_id}")]
    NotOrderOwner { order_id: Uuid, user_id: Uuid },

    #[error("Order {order_id} is not cancellable in status {status:?}")]
    OrderNotCancellable { order_id: Uuid, status: OrderStatus },

    #[error("Account {0} is reserved for the market maker")]
    ReservedAccount(Uuid),

    #[error("Insufficient balance. Need {required}, have {available}")]
    InsufficientBalance { required: Decimal, available: Decimal },

    #[error("Insufficient {side} shares. Have {available}, need {requested}")]
    InsufficientShares {
        side: OutcomeSide,
        requested: u64,
        available: u64,
    },
}

pub type ExchangeResult<T> = Result<T, ExchangeError>;

#[cfg(test)]
mock! {
    pub OrderStore {}

    impl OrderStore for OrderStore {
        fn load_markets(&self) -> Result<Vec<Market>, StoreError>;

        fn load_accounts(&self) -> Result<Vec<AccountBalance>, StoreError>;

        fn load_positions(&self) -> Result<Vec<Position>, StoreError>;

        fn load_open_orders(&self) -> Result<Vec<OrderRecord>, StoreError>;
    }
}
