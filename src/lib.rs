// Expose the modules
pub mod config;
pub mod domain;

// Re-export key types for easier usage
pub use config::{Config, ConfigError};
pub use domain::models::orderbook::{
    BookSnapshot, DepthLevel, MarketBookSnapshot, MatchResult, PlannedFill,
};
pub use domain::models::position::{Position, PositionSummary};
pub use domain::models::types::{
    Market, MarketStatus, Order, OrderAction, OrderRecord, OrderStatus, OrderType, OutcomeSide,
    Trade,
};
pub use domain::services::exchange::{
    Exchange, ExchangeClient, ExchangeError, ExchangeWorker, MarketDeletion, MarketListing,
    OrderOutcome, OrderStore, StoreError, WorkerError,
};
pub use domain::services::ledger::{AccountBalance, Ledger, LedgerError};
pub use domain::services::market_maker::{MarketMaker, MarketMakerConfig, MARKET_MAKER_ACCOUNT};
pub use domain::services::matching_engine::{MatchingEngine, MatchingError};
pub use domain::services::settlement::{SettlementError, SettlementService};
