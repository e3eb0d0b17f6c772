//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// This module implements the limit order book of a binary-outcome market. Each contract (YES and
// NO) has its own book; every book keeps bids and asks in price-time priority (FIFO per level).
//
// | Component        | Description                                                             |
// |------------------|-------------------------------------------------------------------------|
// | PriceLevel       | FIFO queue of resting orders at one price                               |
// | OrderBookSide    | Price levels of one side, best first, linear scan                       |
// | OrderBook        | Bid side + ask side of one contract                                     |
// | MarketOrderBooks | YES book + NO book of one market                                        |
//
//--------------------------------------------------------------------------------------------------
// STRUCTS
//--------------------------------------------------------------------------------------------------
// | Name             | Description                                       | Key Methods             |
// |------------------|---------------------------------------------------|-------------------------|
// | PriceLevel       | Orders at a specific price                        | add_order               |
// |                  |                                                   | remove_order            |
// |                  |                                                   | total_quantity          |
// |------------------|---------------------------------------------------|-------------------------|
// | OrderBookSide    | One side of a book                                | add_order               |
// |                  |                                                   | remove_order            |
// |                  |                                                   | best_price / depth      |
// |------------------|---------------------------------------------------|-------------------------|
// | OrderBook        | Both sides of one contract                        | spread / mid_price      |
// |                  |                                                   | snapshot                |
//
//--------------------------------------------------------------------------------------------------
// TESTS
//--------------------------------------------------------------------------------------------------
// | Name                          | Description                                              |
// |-------------------------------|----------------------------------------------------------|
// | test_empty_orderbook          | Verifies initial empty state                             |
// | test_level_fifo               | Orders at one price keep arrival order                   |
// | test_bid_levels_descending    | Bids sorted high to low                                  |
// | test_ask_levels_ascending     | Asks sorted low to high                                  |
// | test_remove_order             | Removal drops empty levels, misses return None           |
// | test_spread_and_mid           | Rounded spread and mid price                             |
// | test_depth_aggregates         | Depth aggregates quantity per level                      |
// | test_drain                    | Draining empties both sides                              |
//--------------------------------------------------------------------------------------------------

use std::collections::VecDeque;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::models::orderbook::{BookSnapshot, DepthLevel, RestingOrder};
use crate::domain::models::types::{OrderAction, OutcomeSide};

/// Which side of a book an order rests on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BookSide {
    /// Buy interest, best is highest.
    Bid,
    /// Sell interest, best is lowest.
    Ask,
}

impl BookSide {
    pub fn opposite(&self) -> Self {
        match self {
            Self::Bid => Self::Ask,
            Self::Ask => Self::Bid,
        }
    }
}

impl From<OrderAction> for BookSide {
    fn from(action: OrderAction) -> Self {
        match action {
            OrderAction::Buy => Self::Bid,
            OrderAction::Sell => Self::Ask,
        }
    }
}

/// Represents a price level in the order book, maintaining a FIFO queue of orders
/// at the same price point.
#[derive(Debug, Clone)]
pub struct PriceLevel {
    /// The price for this level
    pub price: Decimal,
    /// FIFO queue of orders at this price level
    orders: VecDeque<RestingOrder>,
}

impl PriceLevel {
    pub fn new(price: Decimal) -> Self {
        Self {
            price,
            orders: VecDeque::with_capacity(4),
        }
    }

    /// Appends an order at the back of the queue.
    pub fn add_order(&mut self, order: RestingOrder) {
        self.orders.push_back(order);
    }

    /// Removes an order by id.
    ///
    /// # Returns
    /// * `Some(RestingOrder)` - The removed order
    /// * `None` - If no order with that id rests here
    pub fn remove_order(&mut self, order_id: Uuid) -> Option<RestingOrder> {
        let index = self.orders.iter().position(|o| o.order_id == order_id)?;
        self.orders.remove(index)
    }

    /// Sum of the remaining quantity of every order at this level.
    pub fn total_quantity(&self) -> u64 {
        self.orders.iter().map(|o| o.quantity).sum()
    }

    #[inline]
    pub fn front(&self) -> Option<&RestingOrder> {
        self.orders.front()
    }

    #[inline]
    pub fn front_mut(&mut self) -> Option<&mut RestingOrder> {
        self.orders.front_mut()
    }

    #[inline]
    pub fn pop_front(&mut self) -> Option<RestingOrder> {
        self.orders.pop_front()
    }

    pub fn contains(&self, order_id: Uuid) -> bool {
        self.orders.iter().any(|o| o.order_id == order_id)
    }

    pub fn orders(&self) -> impl Iterator<Item = &RestingOrder> {
        self.orders.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }
}

/// One side of a book. Levels are kept best first: bids strictly descending,
/// asks strictly ascending, never two levels at the same price and never an empty level.
#[derive(Debug, Clone)]
pub struct OrderBookSide {
    kind: BookSide,
    levels: Vec<PriceLevel>,
}

impl OrderBookSide {
    pub fn new(kind: BookSide) -> Self {
        Self {
            kind,
            levels: Vec::new(),
        }
    }

    pub fn kind(&self) -> BookSide {
        self.kind
    }

    /// True when `a` ranks ahead of `b` on this side.
    #[inline]
    fn ranks_ahead(&self, a: Decimal, b: Decimal) -> bool {
        match self.kind {
            BookSide::Bid => a > b,
            BookSide::Ask => a < b,
        }
    }

    /// Adds an order at the back of its price level, creating the level in sorted
    /// position when it does not exist yet.
    pub fn add_order(&mut self, order: RestingOrder) {
        let price = order.price;
        let at = self
            .levels
            .iter()
            .position(|l| !self.ranks_ahead(l.price, price))
            .unwrap_or(self.levels.len());
        if let Some(level) = self.levels.get_mut(at).filter(|l| l.price == price) {
            level.add_order(order);
            return;
        }
        let mut level = PriceLevel::new(price);
        level.add_order(order);
        self.levels.insert(at, level);
    }

    /// Removes an order resting at `price`. Empty levels are dropped.
    ///
    /// # Returns
    /// * `Some(RestingOrder)` - The removed order
    /// * `None` - If the level or the order does not exist
    pub fn remove_order(&mut self, order_id: Uuid, price: Decimal) -> Option<RestingOrder> {
        let index = self.levels.iter().position(|l| l.price == price)?;
        let removed = self.levels[index].remove_order(order_id)?;
        if self.levels[index].is_empty() {
            self.levels.remove(index);
        }
        Some(removed)
    }

    pub fn contains(&self, order_id: Uuid, price: Decimal) -> bool {
        self.levels
            .iter()
            .find(|l| l.price == price)
            .is_some_and(|l| l.contains(order_id))
    }

    #[inline]
    pub fn best_level(&self) -> Option<&PriceLevel> {
        self.levels.first()
    }

    #[inline]
    pub fn best_level_mut(&mut self) -> Option<&mut PriceLevel> {
        self.levels.first_mut()
    }

    #[inline]
    pub fn best_price(&self) -> Option<Decimal> {
        self.best_level().map(|l| l.price)
    }

    /// Drops the best level if matching emptied it.
    pub fn prune_best(&mut self) {
        if self.levels.first().is_some_and(PriceLevel::is_empty) {
            self.levels.remove(0);
        }
    }

    /// Up to `n` levels as `(price, aggregate quantity)`, best first.
    pub fn depth(&self, n: usize) -> Vec<DepthLevel> {
        self.levels
            .iter()
            .take(n)
            .map(|l| DepthLevel {
                price: l.price,
                quantity: l.total_quantity(),
            })
            .collect()
    }

    pub fn levels(&self) -> &[PriceLevel] {
        &self.levels
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn order_count(&self) -> usize {
        self.levels.iter().map(PriceLevel::order_count).sum()
    }

    /// Removes and returns every resting order, best level first.
    pub fn drain(&mut self) -> Vec<RestingOrder> {
        self.levels
            .drain(..)
            .flat_map(|level| level.orders.into_iter())
            .collect()
    }

    /// Checks the level ordering invariant.
    pub fn is_sorted(&self) -> bool {
        self.levels
            .windows(2)
            .all(|w| self.ranks_ahead(w[0].price, w[1].price))
    }
}

/// The bid and ask sides of one contract.
#[derive(Debug, Clone)]
pub struct OrderBook {
    pub bids: OrderBookSide,
    pub asks: OrderBookSide,
}

impl Default for OrderBook {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderBook {
    pub fn new() -> Self {
        Self {
            bids: OrderBookSide::new(BookSide::Bid),
            asks: OrderBookSide::new(BookSide::Ask),
        }
    }

    pub fn side(&self, kind: BookSide) -> &OrderBookSide {
        match kind {
            BookSide::Bid => &self.bids,
            BookSide::Ask => &self.asks,
        }
    }

    pub fn side_mut(&mut self, kind: BookSide) -> &mut OrderBookSide {
        match kind {
            BookSide::Bid => &mut self.bids,
            BookSide::Ask => &mut self.asks,
        }
    }

    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.best_price()
    }

    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.best_price()
    }

    /// `best_ask - best_bid` rounded to 2 dp, `None` when either side is empty.
    pub fn spread(&self) -> Option<Decimal> {
        let (bid, ask) = (self.best_bid()?, self.best_ask()?);
        Some((ask - bid).round_dp(2))
    }

    /// Midpoint of the best prices rounded to 2 dp, `None` when either side is empty.
    pub fn mid_price(&self) -> Option<Decimal> {
        let (bid, ask) = (self.best_bid()?, self.best_ask()?);
        Some(((bid + ask) / Decimal::TWO).round_dp(2))
    }

    /// True when the best bid meets or exceeds the best ask.
    pub fn is_crossed(&self) -> bool {
        matches!((self.best_bid(), self.best_ask()), (Some(b), Some(a)) if b >= a)
    }

    pub fn snapshot(&self, depth: usize) -> BookSnapshot {
        BookSnapshot {
            bids: self.bids.depth(depth),
            asks: self.asks.depth(depth),
            best_bid: self.best_bid(),
            best_ask: self.best_ask(),
            spread: self.spread(),
            mid_price: self.mid_price(),
        }
    }

    pub fn drain(&mut self) -> Vec<RestingOrder> {
        let mut orders = self.bids.drain();
        orders.extend(self.asks.drain());
        orders
    }
}

/// The YES and NO books of one market.
#[derive(Debug, Clone)]
pub struct MarketOrderBooks {
    pub market_id: Uuid,
    pub yes: OrderBook,
    pub no: OrderBook,
}

impl MarketOrderBooks {
    pub fn new(market_id: Uuid) -> Self {
        Self {
            market_id,
            yes: OrderBook::new(),
            no: OrderBook::new(),
        }
    }

    pub fn book(&self, side: OutcomeSide) -> &OrderBook {
        match side {
            OutcomeSide::Yes => &self.yes,
            OutcomeSide::No => &self.no,
        }
    }

    pub fn book_mut(&mut self, side: OutcomeSide) -> &mut OrderBook {
        match side {
            OutcomeSide::Yes => &mut self.yes,
            OutcomeSide::No => &mut self.no,
        }
    }

    pub fn drain(&mut self) -> Vec<RestingOrder> {
        let mut orders = self.yes.drain();
        orders.extend(self.no.drain());
        orders
    }
}
