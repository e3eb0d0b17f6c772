//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// This module defines the core data types used throughout the exchange, including submitted
// orders, executed trades, order records and the status/side enums of a binary-outcome market.
//
// | Section            | Description                                                      |
// |--------------------|------------------------------------------------------------------|
// | CONSTANTS          | Tradable price band and the payout per winning share.            |
// | ENUMS              | OutcomeSide, OrderAction, OrderType, OrderStatus, MarketStatus.  |
// | STRUCTS            | Order, Trade, OrderRecord, Market.                               |
// | Potential Errors   | Errors raised while parsing the enums from strings.              |
// | TESTS              | Unit tests for the defined types.                                |
//--------------------------------------------------------------------------------------------------

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

//--------------------------------------------------------------------------------------------------
//  CONSTANTS
//--------------------------------------------------------------------------------------------------

/// Lowest price a limit order may carry.
pub const MIN_PRICE: Decimal = dec!(0.01);

/// Highest price a limit order may carry.
pub const MAX_PRICE: Decimal = dec!(0.99);

/// Amount paid for each winning share at resolution.
pub const PAYOUT_PER_SHARE: Decimal = dec!(1);

/// Returns true when `price` lies inside the tradable band `[MIN_PRICE, MAX_PRICE]`.
#[inline]
pub fn is_valid_price(price: Decimal) -> bool {
    price >= MIN_PRICE && price <= MAX_PRICE
}

//--------------------------------------------------------------------------------------------------
//  ENUMS
//--------------------------------------------------------------------------------------------------
// | Name          | Description                                         |
// |---------------|-----------------------------------------------------|
// | OutcomeSide   | Which contract of the market (YES / NO).            |
// | OrderAction   | Direction of an order (BUY / SELL).                 |
// | OrderType     | LIMIT or MARKET.                                    |
// | OrderStatus   | Lifecycle of an order record.                       |
// | MarketStatus  | Lifecycle of a market.                              |
//--------------------------------------------------------------------------------------------------

/// One of the two complementary contracts traded in a market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OutcomeSide {
    /// Pays out when the market resolves true.
    Yes,
    /// Pays out when the market resolves false.
    No,
}

impl OutcomeSide {
    /// Both sides, YES first.
    pub const ALL: [OutcomeSide; 2] = [OutcomeSide::Yes, OutcomeSide::No];

    pub fn opposite(&self) -> Self {
        match self {
            Self::Yes => Self::No,
            Self::No => Self::Yes,
        }
    }

    /// The side that pays out for a given resolution.
    pub fn winning(outcome: bool) -> Self {
        if outcome { Self::Yes } else { Self::No }
    }
}

impl fmt::Display for OutcomeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Yes => write!(f, "YES"),
            Self::No => write!(f, "NO"),
        }
    }
}

impl FromStr for OutcomeSide {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "YES" => Ok(Self::Yes),
            "NO" => Ok(Self::No),
            _ => Err(TypeError::InvalidSide(s.to_string())),
        }
    }
}

/// Direction of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderAction {
    Buy,
    Sell,
}

impl OrderAction {
    pub fn opposite(&self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl fmt::Display for OrderAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

impl FromStr for OrderAction {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BUY" => Ok(Self::Buy),
            "SELL" => Ok(Self::Sell),
            _ => Err(TypeError::InvalidAction(s.to_string())),
        }
    }
}

/// Represents the type of an order, influencing its matching behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    /// Executes at its own price or better; any remainder rests on the book.
    Limit,
    /// Executes immediately against whatever liquidity exists; any remainder is dropped.
    Market,
}

impl FromStr for OrderType {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LIMIT" => Ok(Self::Limit),
            "MARKET" => Ok(Self::Market),
            _ => Err(TypeError::InvalidOrderType(s.to_string())),
        }
    }
}

/// Status of an order record as seen by account holders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    /// Resting with nothing filled yet.
    Open,
    /// Some quantity filled, remainder still resting.
    Partial,
    /// Fully executed.
    Filled,
    /// Removed from the book, or a market order that found no liquidity.
    Cancelled,
}

impl OrderStatus {
    /// True while the order may still trade or be cancelled.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Open | Self::Partial)
    }

    /// Status implied by how much of `quantity` has been filled.
    pub fn from_fill(filled: u64, quantity: u64) -> Self {
        if filled >= quantity {
            Self::Filled
        } else if filled > 0 {
            Self::Partial
        } else {
            Self::Open
        }
    }
}

/// Lifecycle of a market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MarketStatus {
    /// Accepting orders.
    Open,
    /// Trading halted, awaiting resolution.
    Closed,
    /// Outcome known and positions settled.
    Resolved,
}

//--------------------------------------------------------------------------------------------------
//  STRUCTS
//--------------------------------------------------------------------------------------------------
// | Name          | Description                                                 |
// |---------------|-------------------------------------------------------------|
// | Order         | A submitted intent to trade.                                |
// | Trade         | A completed execution between a buyer and a seller.         |
// | OrderRecord   | The caller-side record of an order and its fill progress.   |
// | Market        | A binary question with its lifecycle status.                |
//--------------------------------------------------------------------------------------------------

/// A submitted order.
///
/// `price` is present exactly when `order_type` is `Limit`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Unique identifier for the order.
    pub id: Uuid,
    /// Account that submitted the order.
    pub user_id: Uuid,
    /// Market the order trades in.
    pub market_id: Uuid,
    /// Contract being traded.
    pub side: OutcomeSide,
    pub action: OrderAction,
    pub order_type: OrderType,
    /// Limit price in `[0.01, 0.99]`, `None` for market orders.
    pub price: Option<Decimal>,
    /// Number of shares, always positive.
    pub quantity: u64,
    /// Set on orders generated by the market maker.
    pub is_market_maker: bool,
}

impl Order {
    /// Builds a limit order with a fresh id.
    pub fn limit(
        user_id: Uuid,
        market_id: Uuid,
        side: OutcomeSide,
        action: OrderAction,
        price: Decimal,
        quantity: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            market_id,
            side,
            action,
            order_type: OrderType::Limit,
            price: Some(price),
            quantity,
            is_market_maker: false,
        }
    }

    /// Builds a market order with a fresh id.
    pub fn market(
        user_id: Uuid,
        market_id: Uuid,
        side: OutcomeSide,
        action: OrderAction,
        quantity: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            market_id,
            side,
            action,
            order_type: OrderType::Market,
            price: None,
            quantity,
            is_market_maker: false,
        }
    }
}

/// Represents a completed trade resulting from matching two orders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Unique identifier for the trade.
    pub id: Uuid,
    pub market_id: Uuid,
    /// Contract that changed hands.
    pub side: OutcomeSide,
    pub buyer_order_id: Uuid,
    pub seller_order_id: Uuid,
    pub buyer_user_id: Uuid,
    pub seller_user_id: Uuid,
    /// Execution price, always the resting order's price.
    pub price: Decimal,
    pub quantity: u64,
    /// `price × quantity`.
    pub total: Decimal,
    pub executed_at: DateTime<Utc>,
}

/// The caller-side view of an order: the original intent plus its fill progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub order: Order,
    pub filled_quantity: u64,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

impl OrderRecord {
    pub fn new(order: Order) -> Self {
        Self {
            order,
            filled_quantity: 0,
            status: OrderStatus::Open,
            created_at: Utc::now(),
        }
    }

    /// Quantity not yet executed.
    pub fn remaining_quantity(&self) -> u64 {
        self.order.quantity.saturating_sub(self.filled_quantity)
    }

    /// Adds `quantity` to the filled amount and recomputes the status.
    pub fn record_fill(&mut self, quantity: u64) {
        self.filled_quantity = (self.filled_quantity + quantity).min(self.order.quantity);
        self.status = OrderStatus::from_fill(self.filled_quantity, self.order.quantity);
    }
}

/// A binary question that trades as a YES and a NO contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Market {
    pub id: Uuid,
    pub question: String,
    pub status: MarketStatus,
    /// `Some(true)` when YES won, `Some(false)` when NO won.
    pub resolved_outcome: Option<bool>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Market {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            question: question.into(),
            status: MarketStatus::Open,
            resolved_outcome: None,
            resolved_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == MarketStatus::Open
    }
}

//--------------------------------------------------------------------------------------------------
//  Potential Errors
//--------------------------------------------------------------------------------------------------
/// Represents errors that can occur while converting external values into these types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypeError {
    /// Occurs when a side string is neither YES nor NO.
    #[error("Invalid side specified: {0}")]
    InvalidSide(String),
    /// Occurs when an action string is neither BUY nor SELL.
    #[error("Invalid action specified: {0}")]
    InvalidAction(String),
    /// Occurs when an order type string is neither LIMIT nor MARKET.
    #[error("Invalid order type specified: {0}")]
    InvalidOrderType(String),
}

//--------------------------------------------------------------------------------------------------
//  TESTS
//--------------------------------------------------------------------------------------------------
// | Name                       | Description                                      |
// |----------------------------|--------------------------------------------------|
// | test_price_band            | Band edges are inclusive.                        |
// | test_side_helpers          | opposite / winning / parsing.                    |
// | test_status_from_fill      | Status derived from fill progress.               |
// | test_record_fill           | OrderRecord fill bookkeeping.                    |
// | test_serde_names           | Enums serialize in upper case.                   |
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_band() {
        assert!(is_valid_price(dec!(0.01)));
        assert!(is_valid_price(dec!(0.99)));
        assert!(is_valid_price(dec!(0.5)));
        assert!(!is_valid_price(dec!(0.00)));
        assert!(!is_valid_price(dec!(1.00)));
        assert!(!is_valid_price(dec!(0.009)));
    }

    #[test]
    fn test_side_helpers() {
        assert_eq!(OutcomeSide::Yes.opposite(), OutcomeSide::No);
        assert_eq!(OutcomeSide::winning(true), OutcomeSide::Yes);
        assert_eq!(OutcomeSide::winning(false), OutcomeSide::No);
        assert_eq!("yes".parse::<OutcomeSide>(), Ok(OutcomeSide::Yes));
        assert_eq!("SELL".parse::<OrderAction>(), Ok(OrderAction::Sell));
        assert_eq!("market".parse::<OrderType>(), Ok(OrderType::Market));
        assert_eq!(
            "maybe".parse::<OutcomeSide>(),
            Err(TypeError::InvalidSide("maybe".to_string()))
        );
    }

    #[test]
    fn test_status_from_fill() {
        assert_eq!(OrderStatus::from_fill(0, 10), OrderStatus::Open);
        assert_eq!(OrderStatus::from_fill(4, 10), OrderStatus::Partial);
        assert_eq!(OrderStatus::from_fill(10, 10), OrderStatus::Filled);
        assert!(OrderStatus::Partial.is_active());
        assert!(!OrderStatus::Cancelled.is_active());
    }

    #[test]
    fn test_record_fill() {
        let order = Order::limit(
            Uuid::new_v4(),
            Uuid::new_v4(),
            OutcomeSide::Yes,
            OrderAction::Buy,
            dec!(0.40),
            10,
        );
        let mut record = OrderRecord::new(order);
        record.record_fill(3);
        assert_eq!(record.status, OrderStatus::Partial);
        assert_eq!(record.remaining_quantity(), 7);
        record.record_fill(7);
        assert_eq!(record.status, OrderStatus::Filled);
        assert_eq!(record.remaining_quantity(), 0);
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&OutcomeSide::Yes).unwrap();
        assert_eq!(json, "\"YES\"");
        let json = serde_json::to_string(&OrderStatus::Partial).unwrap();
        assert_eq!(json, "\"PARTIAL\"");
    }
}
