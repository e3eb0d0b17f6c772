use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::types::{OutcomeSide, Trade};

/// An order sitting on the book waiting to be matched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestingOrder {
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub price: Decimal,
    /// Remaining quantity, always positive while on the book.
    pub quantity: u64,
    pub timestamp: DateTime<Utc>,
    pub is_market_maker: bool,
}

/// Aggregated quantity at one price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DepthLevel {
    pub price: Decimal,
    pub quantity: u64,
}

/// Read-only view of a single book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookSnapshot {
    /// Best (highest) bid first.
    pub bids: Vec<DepthLevel>,
    /// Best (lowest) ask first.
    pub asks: Vec<DepthLevel>,
    pub best_bid: Option<Decimal>,
    pub best_ask: Option<Decimal>,
    pub spread: Option<Decimal>,
    pub mid_price: Option<Decimal>,
}

/// Snapshots of both contract books of one market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketBookSnapshot {
    pub market_id: Uuid,
    pub yes: BookSnapshot,
    pub no: BookSnapshot,
}

impl MarketBookSnapshot {
    pub fn side(&self, side: OutcomeSide) -> &BookSnapshot {
        match side {
            OutcomeSide::Yes => &self.yes,
            OutcomeSide::No => &self.no,
        }
    }
}

/// Represents the outcome of a matching operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub order_id: Uuid,
    /// Trades in execution order.
    pub trades: Vec<Trade>,
    pub filled_quantity: u64,
    pub remaining_quantity: u64,
    /// True when a limit remainder was placed on the book.
    pub added_to_book: bool,
    /// Resting orders removed by self-trade prevention, in the order they were met.
    pub self_trade_cancelled: Vec<Uuid>,
}

/// A fill an order would make against one resting order, computed without touching the book.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlannedFill {
    pub resting_order_id: Uuid,
    pub resting_user_id: Uuid,
    /// Resting price, which is also the execution price.
    pub price: Decimal,
    pub quantity: u64,
}

impl PlannedFill {
    pub fn total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

impl MatchResult {
    pub fn fully_filled(&self) -> bool {
        self.remaining_quantity == 0
    }

    /// Quantity-weighted execution price rounded to 4 dp, `None` when nothing traded.
    pub fn average_price(&self) -> Option<Decimal> {
        if self.filled_quantity == 0 {
            return None;
        }
        let value: Decimal = self.trades.iter().map(|t| t.total).sum();
        Some((value / Decimal::from(self.filled_quantity)).round_dp(4))
    }
}
