//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// This module implements the core matching engine logic for processing orders and generating trades.
// The matching engine follows price-time priority to ensure fair order execution, and never lets a
// user trade against their own resting order.
//
// | Component                | Description                                                |
// |--------------------------|------------------------------------------------------------|
// | MatchingEngine           | Owns the YES/NO books of every market, matches orders      |
// | MatchResult              | Represents the outcome of a matching operation             |
// | MatchingError            | Validation failure, raised before any book mutation        |
//
//--------------------------------------------------------------------------------------------------
// FUNCTIONS
//--------------------------------------------------------------------------------------------------
// | Name                    | Description                                       | Return Type      |
// |-------------------------|---------------------------------------------------|------------------|
// | process_order           | Validate, match and rest a new order              | Result<MatchRes> |
// | plan_fills              | Fills an order would make, book left untouched    | Result<Vec<..>>  |
// | cancel_order            | Remove a resting order                            | bool             |
// | book_snapshot           | Depth and prices of both books of a market        | MarketBookSnap   |
// | cancel_market_orders    | Drain every resting order of a market             | Vec<RestingOrder>|
// | remove_market           | Forget a market's books                           | bool             |
//--------------------------------------------------------------------------------------------------

use std::collections::HashMap;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{MatchingError, MatchingResult};
use crate::domain::models::orderbook::{MarketBookSnapshot, MatchResult, PlannedFill, RestingOrder};
use crate::domain::models::types::{
    is_valid_price, Order, OrderAction, OrderType, OutcomeSide, Trade,
};
use crate::domain::services::orderbook::{BookSide, MarketOrderBooks, OrderBook, OrderBookSide};

/// The core matching engine responsible for processing orders and generating trades.
///
/// # Price-Time Priority
///
/// * Better prices are matched first (higher bids, lower asks)
/// * At the same price level, orders are matched in arrival order (FIFO)
/// * Every fill executes at the resting order's price
///
/// # Self-Trade Prevention
///
/// A resting order owned by the incoming order's user is removed from the book without a
/// trade, and matching continues with the next resting order.
#[derive(Debug, Default)]
pub struct MatchingEngine {
    /// Books per market, created on first reference
    books: HashMap<Uuid, MarketOrderBooks>,
}

impl MatchingEngine {
    pub fn new() -> Self {
        Self {
            books: HashMap::new(),
        }
    }

    /// Processes a new order through the matching engine.
    ///
    /// The order is validated first; a rejected order leaves every book untouched. It is then
    /// matched against the opposite side of its contract's book. A limit remainder rests at the
    /// order's own price, a market remainder is dropped.
    ///
    /// # Arguments
    ///
    /// * `order` - The order to process
    ///
    /// # Returns
    ///
    /// A `MatchResult` with the trades in execution order and the filled/remaining quantities
    ///
    /// # Errors
    ///
    /// Returns `InvalidOrder` when a limit order has no price or a price outside `[0.01, 0.99]`,
    /// or when the quantity is zero
    pub fn process_order(&mut self, order: &Order) -> MatchingResult<MatchResult> {
        Self::validate(order)?;

        let books = self
            .books
            .entry(order.market_id)
            .or_insert_with(|| MarketOrderBooks::new(order.market_id));
        let book = books.book_mut(order.side);

        let own_side = BookSide::from(order.action);
        let mut result = MatchResult {
            order_id: order.id,
            ..Default::default()
        };

        let remaining = Self::match_order(order, book.side_mut(own_side.opposite()), &mut result);

        result.filled_quantity = order.quantity - remaining;
        result.remaining_quantity = remaining;

        if remaining > 0 {
            if let (OrderType::Limit, Some(price)) = (order.order_type, order.price) {
                book.side_mut(own_side).add_order(RestingOrder {
                    order_id: order.id,
                    user_id: order.user_id,
                    price,
                    quantity: remaining,
                    timestamp: Utc::now(),
                    is_market_maker: order.is_market_maker,
                });
                result.added_to_book = true;
            }
        }

        debug!(
            order_id = %order.id,
            market_id = %order.market_id,
            side = %order.side,
            action = %order.action,
            trades = result.trades.len(),
            filled = result.filled_quantity,
            remaining = result.remaining_quantity,
            rested = result.added_to_book,
            "order processed"
        );

        Ok(result)
    }

    /// The fills `order` would produce against the current book, in execution order.
    ///
    /// Nothing is mutated. Resting orders of the same user are skipped, as matching would remove
    /// them without a trade.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOrder` under the same rules as [`process_order`](Self::process_order)
    pub fn plan_fills(&self, order: &Order) -> MatchingResult<Vec<PlannedFill>> {
        Self::validate(order)?;
        let Some(book) = self.book(order.market_id, order.side) else {
            return Ok(Vec::new());
        };
        let contra = book.side(BookSide::from(order.action).opposite());

        let mut fills = Vec::new();
        let mut remaining = order.quantity;
        for level in contra.levels() {
            if remaining == 0 || !Self::accepts(order, level.price) {
                break;
            }
            for resting in level.orders() {
                if remaining == 0 {
                    break;
                }
                if resting.user_id == order.user_id {
                    continue;
                }
                let quantity = remaining.min(resting.quantity);
                fills.push(PlannedFill {
                    resting_order_id: resting.order_id,
                    resting_user_id: resting.user_id,
                    price: resting.price,
                    quantity,
                });
                remaining -= quantity;
            }
        }
        Ok(fills)
    }

    /// Checks an order without touching any book.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOrder` for a missing or out-of-band limit price or a zero quantity
    pub fn validate(order: &Order) -> MatchingResult<()> {
        if order.order_type == OrderType::Limit {
            let Some(price) = order.price else {
                return Err(MatchingError::InvalidOrder("LIMIT orders require a price".to_string()));
            };
            if !is_valid_price(price) {
                return Err(MatchingError::InvalidOrder(
                    "Price must be between 0.01 and 0.99".to_string(),
                ));
            }
        }
        if order.quantity == 0 {
            return Err(MatchingError::InvalidOrder("Quantity must be positive".to_string()));
        }
        Ok(())
    }

    /// Whether a resting price is acceptable to the incoming order.
    #[inline]
    fn accepts(order: &Order, resting_price: Decimal) -> bool {
        match (order.order_type, order.price) {
            (OrderType::Market, _) | (OrderType::Limit, None) => true,
            (OrderType::Limit, Some(limit)) => match order.action {
                OrderAction::Buy => resting_price <= limit,
                OrderAction::Sell => resting_price >= limit,
            },
        }
    }

    /// Walks the opposite side best level first and returns the unfilled quantity.
    fn match_order(order: &Order, contra: &mut OrderBookSide, result: &mut MatchResult) -> u64 {
        let mut remaining = order.quantity;

        while remaining > 0 {
            let Some(level) = contra.best_level_mut() else {
                break;
            };
            if !Self::accepts(order, level.price) {
                break;
            }

            while remaining > 0 {
                let Some(resting) = level.front_mut() else {
                    break;
                };

                if resting.user_id == order.user_id {
                    if let Some(removed) = level.pop_front() {
                        warn!(
                            resting_order_id = %removed.order_id,
                            incoming_order_id = %order.id,
                            user_id = %order.user_id,
                            price = %removed.price,
                            "self-trade prevented, resting order removed"
                        );
                        result.self_trade_cancelled.push(removed.order_id);
                    }
                    continue;
                }

                let fill = remaining.min(resting.quantity);
                result.trades.push(Self::build_trade(order, resting, fill));
                resting.quantity -= fill;
                remaining -= fill;

                if resting.quantity == 0 {
                    level.pop_front();
                }
            }

            contra.prune_best();
        }

        remaining
    }

    fn build_trade(order: &Order, resting: &RestingOrder, quantity: u64) -> Trade {
        let (buyer_order_id, buyer_user_id, seller_order_id, seller_user_id) = match order.action {
            OrderAction::Buy => (order.id, order.user_id, resting.order_id, resting.user_id),
            OrderAction::Sell => (resting.order_id, resting.user_id, order.id, order.user_id),
        };
        Trade {
            id: Uuid::new_v4(),
            market_id: order.market_id,
            side: order.side,
            buyer_order_id,
            seller_order_id,
            buyer_user_id,
            seller_user_id,
            price: resting.price,
            quantity,
            total: resting.price * Decimal::from(quantity),
            executed_at: Utc::now(),
        }
    }

    /// Cancels a resting order.
    ///
    /// # Arguments
    ///
    /// * `market_id` - Market the order rests in
    /// * `order_id` - The order to remove
    /// * `side` - Contract of the order
    /// * `action` - BUY orders rest on the bid side, SELL orders on the ask side
    /// * `price` - Price level the order rests at
    ///
    /// # Returns
    ///
    /// `true` if an order was removed, `false` when the market, level or order does not exist
    pub fn cancel_order(
        &mut self,
        market_id: Uuid,
        order_id: Uuid,
        side: OutcomeSide,
        action: OrderAction,
        price: Decimal,
    ) -> bool {
        let Some(books) = self.books.get_mut(&market_id) else {
            return false;
        };
        let removed = books
            .book_mut(side)
            .side_mut(BookSide::from(action))
            .remove_order(order_id, price)
            .is_some();
        if removed {
            debug!(%order_id, %market_id, %side, %action, %price, "order cancelled");
        }
        removed
    }

    /// Depth and top-of-book of both contracts of a market, creating empty books for an
    /// unknown market.
    pub fn book_snapshot(&mut self, market_id: Uuid, depth: usize) -> MarketBookSnapshot {
        let books = self
            .books
            .entry(market_id)
            .or_insert_with(|| MarketOrderBooks::new(market_id));
        MarketBookSnapshot {
            market_id,
            yes: books.yes.snapshot(depth),
            no: books.no.snapshot(depth),
        }
    }

    /// Read access to one contract's book, if the market has been referenced.
    pub fn book(&self, market_id: Uuid, side: OutcomeSide) -> Option<&OrderBook> {
        self.books.get(&market_id).map(|b| b.book(side))
    }

    pub fn best_bid(&self, market_id: Uuid, side: OutcomeSide) -> Option<Decimal> {
        self.book(market_id, side).and_then(OrderBook::best_bid)
    }

    pub fn spread(&self, market_id: Uuid, side: OutcomeSide) -> Option<Decimal> {
        self.book(market_id, side).and_then(OrderBook::spread)
    }

    /// Whether `order_id` is resting at `price` on the side implied by `action`.
    pub fn contains_order(
        &self,
        market_id: Uuid,
        side: OutcomeSide,
        action: OrderAction,
        price: Decimal,
        order_id: Uuid,
    ) -> bool {
        self.book(market_id, side)
            .is_some_and(|b| b.side(BookSide::from(action)).contains(order_id, price))
    }

    /// Removes every resting order of a market from both books.
    pub fn cancel_market_orders(&mut self, market_id: Uuid) -> Vec<RestingOrder> {
        let drained = self
            .books
            .get_mut(&market_id)
            .map(MarketOrderBooks::drain)
            .unwrap_or_default();
        if !drained.is_empty() {
            debug!(%market_id, count = drained.len(), "market orders cancelled");
        }
        drained
    }

    /// Drops a market's books entirely.
    pub fn remove_market(&mut self, market_id: Uuid) -> bool {
        self.books.remove(&market_id).is_some()
    }

    pub fn market_count(&self) -> usize {
        self.books.len()
    }
}

//--------------------------------------------------------------------------------------------------
// TESTS
//--------------------------------------------------------------------------------------------------
// | Name                                   | Description                                        |
// |----------------------------------------|----------------------------------------------------|
// | test_limit_rests_on_empty_book         | Limit buy on empty book rests as best bid          |
// | test_cross_fills_at_resting_price      | Better-priced taker fills at maker price           |
// | test_market_order_walks_levels         | Market buy sweeps levels, excess dropped           |
// | test_price_priority                    | Better price fills before earlier arrival          |
// | test_time_priority                     | Equal prices fill FIFO                             |
// | test_self_trade_prevention             | Own resting order removed, next order fills        |
// | test_invalid_orders_rejected           | Validation leaves book untouched                   |
// | test_partial_fill_rests_remainder      | Limit remainder rests at own price                 |
// | test_cancel_order                      | Cancel hits once, then returns false               |
// | test_sell_attribution                  | Seller/buyer ids on a sell taker                   |
// | test_books_are_independent             | YES and NO books never match each other            |
// | test_cancel_market_orders              | Draining removes everything                        |
// | test_plan_fills_matches_execution      | Planned fills equal the trades, book untouched     |
// | prop_no_resting_cross                  | Random limit flow never leaves a crossed book      |
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    /// Creates a limit order for the given user in the given market.
    fn create_test_order(
        market_id: Uuid,
        user_id: Uuid,
        side: OutcomeSide,
        action: OrderAction,
        price: Decimal,
        quantity: u64,
    ) -> Order {
        Order::limit(user_id, market_id, side, action, price, quantity)
    }

    fn process(engine: &mut MatchingEngine, order: &Order) -> MatchResult {
        match engine.process_order(order) {
            Ok(r) => r,
            Err(e) => panic!("Failed to process order: {:?}", e),
        }
    }

    #[test]
    fn test_limit_rests_on_empty_book() {
        let mut engine = MatchingEngine::new();
        let market = Uuid::new_v4();
        let order = create_test_order(
            market,
            Uuid::new_v4(),
            OutcomeSide::Yes,
            OrderAction::Buy,
            dec!(0.40),
            10,
        );

        let result = process(&mut engine, &order);

        assert!(result.trades.is_empty());
        assert!(result.added_to_book);
        assert_eq!(result.remaining_quantity, 10);
        assert_eq!(engine.best_bid(market, OutcomeSide::Yes), Some(dec!(0.40)));
        assert_eq!(engine.best_bid(market, OutcomeSide::No), None);
    }

    #[test]
    fn test_cross_fills_at_resting_price() {
        let mut engine = MatchingEngine::new();
        let market = Uuid::new_v4();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

        let sell = create_test_order(market, alice, OutcomeSide::Yes, OrderAction::Sell, dec!(0.40), 10);
        process(&mut engine, &sell);
        let buy = create_test_order(market, bob, OutcomeSide::Yes, OrderAction::Buy, dec!(0.45), 10);
        let result = process(&mut engine, &buy);

        assert_eq!(result.trades.len(), 1);
        let trade = &result.trades[0];
        assert_eq!(trade.price, dec!(0.40));
        assert_eq!(trade.quantity, 10);
        assert_eq!(trade.total, dec!(4.00));
        assert_eq!(trade.buyer_user_id, bob);
        assert_eq!(trade.seller_user_id, alice);
        assert_eq!(trade.buyer_order_id, buy.id);
        assert_eq!(trade.seller_order_id, sell.id);
        assert!(result.fully_filled());
        assert!(!result.added_to_book);

        let snap = engine.book_snapshot(market, 10);
        assert!(snap.yes.bids.is_empty());
        assert!(snap.yes.asks.is_empty());
    }

    #[test]
    fn test_market_order_walks_levels() {
        let mut engine = MatchingEngine::new();
        let market = Uuid::new_v4();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

        process(&mut engine, &create_test_order(market, alice, OutcomeSide::Yes, OrderAction::Sell, dec!(0.50), 5));
        process(&mut engine, &create_test_order(market, alice, OutcomeSide::Yes, OrderAction::Sell, dec!(0.55), 5));

        let buy = Order::market(bob, market, OutcomeSide::Yes, OrderAction::Buy, 8);
        let result = process(&mut engine, &buy);

        let fills: Vec<_> = result.trades.iter().map(|t| (t.quantity, t.price)).collect();
        assert_eq!(fills, vec![(5, dec!(0.50)), (3, dec!(0.55))]);
        assert_eq!(result.filled_quantity, 8);
        assert_eq!(result.average_price(), Some(dec!(0.5188)));

        let snap = engine.book_snapshot(market, 10);
        assert_eq!(snap.yes.asks.len(), 1);
        assert_eq!(snap.yes.asks[0].price, dec!(0.55));
        assert_eq!(snap.yes.asks[0].quantity, 2);

        // Excess of a market order is dropped, never rested.
        let sweep = Order::market(bob, market, OutcomeSide::Yes, OrderAction::Buy, 10);
        let result = process(&mut engine, &sweep);
        assert_eq!(result.filled_quantity, 2);
        assert_eq!(result.remaining_quantity, 8);
        assert!(!result.added_to_book);
        assert_eq!(engine.best_bid(market, OutcomeSide::Yes), None);
    }

    #[test]
    fn test_price_priority() {
        let mut engine = MatchingEngine::new();
        let market = Uuid::new_v4();
        let taker = Uuid::new_v4();

        let worse = create_test_order(market, Uuid::new_v4(), OutcomeSide::No, OrderAction::Buy, dec!(0.30), 10);
        let better = create_test_order(market, Uuid::new_v4(), OutcomeSide::No, OrderAction::Buy, dec!(0.35), 10);
        process(&mut engine, &worse);
        process(&mut engine, &better);

        let sell = create_test_order(market, taker, OutcomeSide::No, OrderAction::Sell, dec!(0.30), 10);
        let result = process(&mut engine, &sell);
        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].buyer_order_id, better.id);
        assert_eq!(result.trades[0].price, dec!(0.35));
    }

    #[test]
    fn test_time_priority() {
        let mut engine = MatchingEngine::new();
        let market = Uuid::new_v4();

        let first = create_test_order(market, Uuid::new_v4(), OutcomeSide::Yes, OrderAction::Sell, dec!(0.60), 10);
        let second = create_test_order(market, Uuid::new_v4(), OutcomeSide::Yes, OrderAction::Sell, dec!(0.60), 10);
        process(&mut engine, &first);
        process(&mut engine, &second);

        let buy = create_test_order(market, Uuid::new_v4(), OutcomeSide::Yes, OrderAction::Buy, dec!(0.60), 15);
        let result = process(&mut engine, &buy);
        assert_eq!(result.trades.len(), 2);
        assert_eq!(result.trades[0].seller_order_id, first.id);
        assert_eq!(result.trades[0].quantity, 10);
        assert_eq!(result.trades[1].seller_order_id, second.id);
        assert_eq!(result.trades[1].quantity, 5);
    }

    #[test]
    fn test_self_trade_prevention() {
        let mut engine = MatchingEngine::new();
        let market = Uuid::new_v4();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

        let own = create_test_order(market, alice, OutcomeSide::Yes, OrderAction::Sell, dec!(0.50), 10);
        let other = create_test_order(market, bob, OutcomeSide::Yes, OrderAction::Sell, dec!(0.50), 10);
        process(&mut engine, &own);
        process(&mut engine, &other);

        let buy = create_test_order(market, alice, OutcomeSide::Yes, OrderAction::Buy, dec!(0.50), 10);
        let result = process(&mut engine, &buy);

        assert_eq!(result.self_trade_cancelled, vec![own.id]);
        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].seller_user_id, bob);
        assert!(result.fully_filled());
        assert!(!engine.contains_order(market, OutcomeSide::Yes, OrderAction::Sell, dec!(0.50), own.id));
        assert!(!engine.cancel_order(market, own.id, OutcomeSide::Yes, OrderAction::Sell, dec!(0.50)));
    }

    #[test]
    fn test_invalid_orders_rejected() {
        let mut engine = MatchingEngine::new();
        let market = Uuid::new_v4();
        let user = Uuid::new_v4();

        let mut no_price = create_test_order(market, user, OutcomeSide::Yes, OrderAction::Buy, dec!(0.50), 10);
        no_price.price = None;
        let high = create_test_order(market, user, OutcomeSide::Yes, OrderAction::Buy, dec!(1.00), 10);
        let low = create_test_order(market, user, OutcomeSide::Yes, OrderAction::Buy, dec!(0.00), 10);
        let empty = create_test_order(market, user, OutcomeSide::Yes, OrderAction::Buy, dec!(0.50), 0);

        for order in [&no_price, &high, &low, &empty] {
            assert!(matches!(
                engine.process_order(order),
                Err(MatchingError::InvalidOrder(_))
            ));
        }
        assert_eq!(engine.market_count(), 0);
    }

    #[test]
    fn test_partial_fill_rests_remainder() {
        let mut engine = MatchingEngine::new();
        let market = Uuid::new_v4();

        process(&mut engine, &create_test_order(market, Uuid::new_v4(), OutcomeSide::Yes, OrderAction::Sell, dec!(0.52), 4));
        let buy = create_test_order(market, Uuid::new_v4(), OutcomeSide::Yes, OrderAction::Buy, dec!(0.55), 10);
        let result = process(&mut engine, &buy);

        assert_eq!(result.filled_quantity, 4);
        assert_eq!(result.remaining_quantity, 6);
        assert!(result.added_to_book);
        let snap = engine.book_snapshot(market, 10);
        assert_eq!(snap.yes.best_bid, Some(dec!(0.55)));
        assert_eq!(snap.yes.bids[0].quantity, 6);
        assert_eq!(snap.yes.best_ask, None);
    }

    #[test]
    fn test_cancel_order() {
        let mut engine = MatchingEngine::new();
        let market = Uuid::new_v4();
        let order = create_test_order(market, Uuid::new_v4(), OutcomeSide::No, OrderAction::Sell, dec!(0.70), 10);
        process(&mut engine, &order);

        assert!(!engine.cancel_order(Uuid::new_v4(), order.id, OutcomeSide::No, OrderAction::Sell, dec!(0.70)));
        assert!(!engine.cancel_order(market, order.id, OutcomeSide::No, OrderAction::Sell, dec!(0.71)));
        assert!(engine.cancel_order(market, order.id, OutcomeSide::No, OrderAction::Sell, dec!(0.70)));
        let before = engine.book_snapshot(market, 10);
        assert!(!engine.cancel_order(market, order.id, OutcomeSide::No, OrderAction::Sell, dec!(0.70)));
        assert_eq!(engine.book_snapshot(market, 10), before);
    }

    #[test]
    fn test_sell_attribution() {
        let mut engine = MatchingEngine::new();
        let market = Uuid::new_v4();
        let (maker, taker) = (Uuid::new_v4(), Uuid::new_v4());

        let bid = create_test_order(market, maker, OutcomeSide::Yes, OrderAction::Buy, dec!(0.48), 10);
        process(&mut engine, &bid);
        let sell = Order::market(taker, market, OutcomeSide::Yes, OrderAction::Sell, 10);
        let result = process(&mut engine, &sell);

        let trade = &result.trades[0];
        assert_eq!(trade.buyer_user_id, maker);
        assert_eq!(trade.seller_user_id, taker);
        assert_eq!(trade.seller_order_id, sell.id);
        assert_eq!(trade.price, dec!(0.48));
    }

    #[test]
    fn test_books_are_independent() {
        let mut engine = MatchingEngine::new();
        let market = Uuid::new_v4();
        process(&mut engine, &create_test_order(market, Uuid::new_v4(), OutcomeSide::Yes, OrderAction::Sell, dec!(0.40), 10));
        let buy_no = create_test_order(market, Uuid::new_v4(), OutcomeSide::No, OrderAction::Buy, dec!(0.60), 10);
        let result = process(&mut engine, &buy_no);
        assert!(result.trades.is_empty());
        assert!(result.added_to_book);
    }

    #[test]
    fn test_plan_fills_matches_execution() {
        let mut engine = MatchingEngine::new();
        let market = Uuid::new_v4();
        let (alice, bob, carol) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        process(&mut engine, &create_test_order(market, bob, OutcomeSide::No, OrderAction::Sell, dec!(0.55), 10));
        process(&mut engine, &create_test_order(market, alice, OutcomeSide::No, OrderAction::Sell, dec!(0.56), 10));
        process(&mut engine, &create_test_order(market, carol, OutcomeSide::No, OrderAction::Sell, dec!(0.56), 10));
        process(&mut engine, &create_test_order(market, bob, OutcomeSide::No, OrderAction::Sell, dec!(0.60), 10));

        let buy = create_test_order(market, alice, OutcomeSide::No, OrderAction::Buy, dec!(0.56), 15);
        let planned = engine.plan_fills(&buy).unwrap();
        let shape: Vec<_> = planned.iter().map(|f| (f.resting_user_id, f.price, f.quantity)).collect();
        assert_eq!(shape, vec![(bob, dec!(0.55), 10), (carol, dec!(0.56), 5)]);
        assert_eq!(planned[1].total(), dec!(2.80));
        // planning leaves every resting order in place
        assert_eq!(engine.book(market, OutcomeSide::No).map(|b| b.asks.order_count()), Some(4));

        let result = process(&mut engine, &buy);
        let traded: Vec<_> = result.trades.iter().map(|t| (t.seller_user_id, t.price, t.quantity)).collect();
        assert_eq!(traded, shape);

        assert!(engine.plan_fills(&Order::market(alice, Uuid::new_v4(), OutcomeSide::Yes, OrderAction::Sell, 5)).unwrap().is_empty());
        assert!(engine
            .plan_fills(&create_test_order(market, alice, OutcomeSide::No, OrderAction::Buy, dec!(1.50), 5))
            .is_err());
    }

    #[test]
    fn test_cancel_market_orders() {
        let mut engine = MatchingEngine::new();
        let market = Uuid::new_v4();
        process(&mut engine, &create_test_order(market, Uuid::new_v4(), OutcomeSide::Yes, OrderAction::Sell, dec!(0.40), 10));
        process(&mut engine, &create_test_order(market, Uuid::new_v4(), OutcomeSide::No, OrderAction::Buy, dec!(0.30), 10));

        assert_eq!(engine.cancel_market_orders(market).len(), 2);
        assert!(engine.cancel_market_orders(market).is_empty());
        assert!(engine.cancel_market_orders(Uuid::new_v4()).is_empty());
        assert!(engine.remove_market(market));
        assert!(!engine.remove_market(market));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn arb_order() -> impl Strategy<Value = (u8, bool, bool, i64, u64)> {
            (0u8..3, any::<bool>(), any::<bool>(), 1i64..100, 1u64..50)
        }

        proptest! {
            #[test]
            fn prop_no_resting_cross(orders in prop::collection::vec(arb_order(), 1..60)) {
                let mut engine = MatchingEngine::new();
                let market = Uuid::new_v4();
                let users = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];

                for (user, yes, buy, cents, quantity) in orders {
                    let side = if yes { OutcomeSide::Yes } else { OutcomeSide::No };
                    let action = if buy { OrderAction::Buy } else { OrderAction::Sell };
                    let price = Decimal::new(cents, 2);
                    let order = Order::limit(users[user as usize], market, side, action, price, quantity);

                    let result = engine.process_order(&order).unwrap();
                    prop_assert_eq!(result.filled_quantity + result.remaining_quantity, quantity);
                    for trade in &result.trades {
                        prop_assert_ne!(trade.buyer_user_id, trade.seller_user_id);
                        match action {
                            OrderAction::Buy => {
                                prop_assert!(trade.price <= price);
                            }
                            OrderAction::Sell => {
                                prop_assert!(trade.price >= price);
                            }
                        }
                    }

                    for side in OutcomeSide::ALL {
                        let book = engine.book(market, side);
                        if let Some(book) = book {
                            prop_assert!(!book.is_crossed());
                            prop_assert!(book.bids.is_sorted());
                            prop_assert!(book.asks.is_sorted());
                        }
                    }
                }
            }
        }
    }
}
