//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// The exchange coordinator. Owns the matching engine, the market maker, the ledger, the market
// registry and the order records, and keeps them consistent: every trade the engine produces is
// booked in the ledger, reported to the market maker when it was a counterparty, and reflected
// in the order records of both sides.
//
// | Component      | Description                                                           |
// |----------------|-----------------------------------------------------------------------|
// | Exchange       | Single-writer owner of all exchange state                             |
// | OrderOutcome   | What a submission did: status, fills, trades, average price           |
// | MarketListing  | A market with the best bid of each contract                           |
// | MarketDeletion | What deleting a market cancelled and refunded                         |
// | ActiveOrders   | Open and partially filled order ids by owner and by market            |
//
//--------------------------------------------------------------------------------------------------
// FUNCTIONS
//--------------------------------------------------------------------------------------------------
// | Name                  | Description                                         | Return Type    |
// |-----------------------|-----------------------------------------------------|----------------|
// | create_market         | Register a market and seed quotes on both contracts | Market         |
// | markets               | Markets by status, newest first                     | Vec<Listing>   |
// | submit_order          | Pre-validate, match, book trades, refresh quotes    | OrderOutcome   |
// | cancel_order          | Owner-checked cancel, tolerant of book misses       | OrderRecord    |
// | recent_trades         | Executed trades of a market, newest first           | Vec<&Trade>    |
// | close_market          | Halt trading, cancel resting orders                 | usize          |
// | resolve_market        | Settle every position, cancel resting orders        | Summary        |
// | delete_market         | Cancel orders, optionally refund, drop the books    | MarketDeletion |
// | refresh_quotes        | Re-quote contracts whose spread is too wide         | usize          |
// | restore_from_store    | Reload ledger, replay open orders after a restart   | usize          |
//--------------------------------------------------------------------------------------------------

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{ExchangeError, ExchangeResult, OrderStore};
use crate::config::Config;
use crate::domain::models::orderbook::{MarketBookSnapshot, MatchResult, PlannedFill};
use crate::domain::models::position::{Position, PositionSummary};
use crate::domain::models::types::{
    Market, MarketStatus, Order, OrderAction, OrderRecord, OrderStatus, OrderType, OutcomeSide,
    Trade, MAX_PRICE,
};
use crate::domain::services::ledger::{Ledger, LedgerEntry, LedgerError};
use crate::domain::services::market_maker::{MarketMaker, MarketMakerStatus};
use crate::domain::services::matching_engine::MatchingEngine;
use crate::domain::services::settlement::{
    LeaderboardEntry, MarketHistoryEntry, MarketSettlementSummary, SettlementService,
};

/// Price used to value a contract with no bids.
const FALLBACK_PRICE: Decimal = dec!(0.50);

/// Result of submitting an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderOutcome {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub filled_quantity: u64,
    pub remaining_quantity: u64,
    pub trades: Vec<Trade>,
    pub average_price: Option<Decimal>,
    pub submitted_at: DateTime<Utc>,
}

/// A market as listed to traders. Prices are the best bid of each contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketListing {
    pub id: Uuid,
    pub question: String,
    pub status: MarketStatus,
    pub created_at: DateTime<Utc>,
    pub yes_price: Option<Decimal>,
    pub no_price: Option<Decimal>,
    pub resolved_outcome: Option<bool>,
}

/// Result of deleting a market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketDeletion {
    pub market_id: Uuid,
    /// Resting orders removed from the books.
    pub orders_cancelled: usize,
    pub users_refunded: usize,
    pub total_refunded: Decimal,
}

/// Ids of open and partially filled orders, by owner and by market.
#[derive(Debug, Default)]
struct ActiveOrders {
    by_user: HashMap<Uuid, HashSet<Uuid>>,
    by_market: HashMap<Uuid, HashSet<Uuid>>,
}

impl ActiveOrders {
    /// Adds or drops a record according to its current status.
    fn track(&mut self, record: &OrderRecord) {
        let order = &record.order;
        if record.status.is_active() {
            self.by_user.entry(order.user_id).or_default().insert(order.id);
            self.by_market.entry(order.market_id).or_default().insert(order.id);
        } else {
            Self::forget(&mut self.by_user, order.user_id, order.id);
            Self::forget(&mut self.by_market, order.market_id, order.id);
        }
    }

    fn forget(index: &mut HashMap<Uuid, HashSet<Uuid>>, key: Uuid, order_id: Uuid) {
        if let Some(ids) = index.get_mut(&key) {
            ids.remove(&order_id);
            if ids.is_empty() {
                index.remove(&key);
            }
        }
    }

    fn for_user(&self, user_id: Uuid) -> impl Iterator<Item = &Uuid> {
        self.by_user.get(&user_id).into_iter().flatten()
    }

    fn for_market(&self, market_id: Uuid) -> Vec<Uuid> {
        self.by_market
            .get(&market_id)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }
}

/// Single-writer owner of every piece of exchange state.
///
/// All mutating operations take `&mut self`; concurrent callers go through
/// [`ExchangeWorker`](super::ExchangeWorker), which serializes them on one thread.
#[derive(Debug)]
pub struct Exchange {
    config: Config,
    engine: MatchingEngine,
    market_maker: MarketMaker,
    ledger: Ledger,
    settlement: SettlementService,
    orders: HashMap<Uuid, OrderRecord>,
    active: ActiveOrders,
    /// Executed trades per market, oldest first.
    trades: HashMap<Uuid, Vec<Trade>>,
}

impl Exchange {
    pub fn new(config: Config) -> Self {
        let market_maker = MarketMaker::new(config.market_maker.clone());
        let ledger = Ledger::new(market_maker.account_id());
        Self {
            config,
            engine: MatchingEngine::new(),
            market_maker,
            ledger,
            settlement: SettlementService::new(),
            orders: HashMap::new(),
            active: ActiveOrders::default(),
            trades: HashMap::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    //----------------------------------------------------------------------------------------------
    // Accounts
    //----------------------------------------------------------------------------------------------

    /// Opens an account credited with the configured starting balance.
    pub fn open_account(&mut self, user_id: Uuid) -> ExchangeResult<Decimal> {
        if self.ledger.is_exempt(user_id) {
            return Err(ExchangeError::ReservedAccount(user_id));
        }
        self.ledger.open_account(user_id, self.config.starting_balance)?;
        Ok(self.config.starting_balance)
    }

    pub fn deposit(&mut self, user_id: Uuid, amount: Decimal) -> ExchangeResult<Decimal> {
        Ok(self.ledger.deposit(user_id, amount)?)
    }

    pub fn balance(&self, user_id: Uuid) -> Option<Decimal> {
        self.ledger.balance(user_id)
    }

    pub fn journal(&self, user_id: Uuid) -> Vec<&LedgerEntry> {
        self.ledger.journal(user_id)
    }

    //----------------------------------------------------------------------------------------------
    // Markets
    //----------------------------------------------------------------------------------------------

    /// Registers a market and seeds market-maker quotes on both contracts.
    pub fn create_market(&mut self, question: impl Into<String>) -> ExchangeResult<Market> {
        let market = self.settlement.create_market(question);
        for side in OutcomeSide::ALL {
            self.place_quotes(market.id, side)?;
        }
        Ok(market)
    }

    pub fn market(&self, market_id: Uuid) -> Option<&Market> {
        self.settlement.market(market_id)
    }

    /// Up to `limit` markets, newest first, optionally only those in `status`.
    pub fn markets(&self, status: Option<MarketStatus>, limit: usize) -> Vec<MarketListing> {
        let mut markets: Vec<&Market> = self
            .settlement
            .markets()
            .filter(|m| status.is_none_or(|s| m.status == s))
            .collect();
        markets.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        markets
            .into_iter()
            .take(limit)
            .map(|m| MarketListing {
                id: m.id,
                question: m.question.clone(),
                status: m.status,
                created_at: m.created_at,
                yes_price: self.engine.best_bid(m.id, OutcomeSide::Yes),
                no_price: self.engine.best_bid(m.id, OutcomeSide::No),
                resolved_outcome: m.resolved_outcome,
            })
            .collect()
    }

    /// Halts trading and cancels every resting order of the market.
    pub fn close_market(&mut self, market_id: Uuid) -> ExchangeResult<usize> {
        let cancelled = self.settlement.close_market(&mut self.engine, market_id)?;
        self.cancel_records(market_id);
        Ok(cancelled)
    }

    /// Resolves a market: resting orders are cancelled and every position is paid out.
    pub fn resolve_market(&mut self, market_id: Uuid, outcome: bool) -> ExchangeResult<MarketSettlementSummary> {
        let summary =
            self.settlement
                .resolve_market(&mut self.engine, &mut self.ledger, market_id, outcome)?;
        self.cancel_records(market_id);
        self.market_maker.remove_market(market_id);
        Ok(summary)
    }

    /// Takes a market out of service without resolving it.
    ///
    /// The market is marked closed, its resting orders are cancelled and its books and
    /// market-maker state are dropped. With `refund`, every position is handed back its cost
    /// basis and emptied. Trade history is kept.
    ///
    /// # Errors
    ///
    /// * `Settlement(MarketNotFound)` - Unknown market
    /// * `Settlement(AlreadyResolved)` - Resolved markets cannot be deleted
    pub fn delete_market(&mut self, market_id: Uuid, refund: bool) -> ExchangeResult<MarketDeletion> {
        self.settlement.retire_market(market_id)?;
        let orders_cancelled = self.engine.cancel_market_orders(market_id).len();
        self.cancel_records(market_id);

        let mut users_refunded = 0;
        let mut total_refunded = Decimal::ZERO;
        if refund {
            let mut holders: Vec<Uuid> = self
                .ledger
                .positions_in_market(market_id)
                .into_iter()
                .map(|p| p.user_id)
                .collect();
            holders.sort();
            for user_id in holders {
                match self.ledger.refund_position(user_id, market_id) {
                    Ok(amount) if amount > Decimal::ZERO => {
                        users_refunded += 1;
                        total_refunded += amount;
                    }
                    Ok(_) => {}
                    Err(e) => warn!(%market_id, %user_id, error = %e, "position not refunded"),
                }
            }
        }

        self.engine.remove_market(market_id);
        self.market_maker.remove_market(market_id);
        info!(%market_id, orders_cancelled, users_refunded, %total_refunded, "market deleted");

        Ok(MarketDeletion {
            market_id,
            orders_cancelled,
            users_refunded,
            total_refunded,
        })
    }

    fn cancel_records(&mut self, market_id: Uuid) -> usize {
        let ids = self.active.for_market(market_id);
        for order_id in &ids {
            self.update_record(*order_id, |r| r.status = OrderStatus::Cancelled);
        }
        debug!(%market_id, count = ids.len(), "order records cancelled");
        ids.len()
    }

    //----------------------------------------------------------------------------------------------
    // Orders
    //----------------------------------------------------------------------------------------------

    /// Submits an order on behalf of an account holder.
    ///
    /// The order is checked before it reaches the book: the market must be open, the order
    /// well formed, and the account able to cover it. A buy needs `quantity × price` (0.99 for a
    /// market order) of balance not already committed to resting buys; a sell needs shares not
    /// already committed to resting sells.
    ///
    /// # Errors
    ///
    /// * `ReservedAccount` - The order claims the market maker's identity
    /// * `DuplicateOrder` - An order with the same id was already submitted
    /// * `Settlement(MarketNotFound | MarketNotOpen)` - The market does not accept orders
    /// * `Matching(InvalidOrder)` - Bad price or quantity
    /// * `InsufficientBalance` / `InsufficientShares` - The account cannot cover the order
    pub fn submit_order(&mut self, order: Order) -> ExchangeResult<OrderOutcome> {
        if order.is_market_maker || self.ledger.is_exempt(order.user_id) {
            return Err(ExchangeError::ReservedAccount(order.user_id));
        }
        if self.orders.contains_key(&order.id) {
            return Err(ExchangeError::DuplicateOrder(order.id));
        }
        self.settlement.ensure_open(order.market_id)?;
        MatchingEngine::validate(&order)?;
        self.ensure_covered(&order)?;

        let result = self.execute(&order)?;

        let status = if result.fully_filled() {
            OrderStatus::Filled
        } else if result.filled_quantity > 0 {
            OrderStatus::Partial
        } else if order.order_type == OrderType::Market {
            OrderStatus::Cancelled
        } else {
            OrderStatus::Open
        };
        let mut record = OrderRecord::new(order.clone());
        record.filled_quantity = result.filled_quantity;
        record.status = status;
        self.insert_record(record);

        info!(
            order_id = %order.id,
            user_id = %order.user_id,
            market_id = %order.market_id,
            side = %order.side,
            action = %order.action,
            ?status,
            filled = result.filled_quantity,
            "order submitted"
        );

        // the trades are booked; a failed re-quote must not turn the submission into an error
        if !result.trades.is_empty() {
            if let Err(e) = self.refresh_side(order.market_id, order.side) {
                warn!(market_id = %order.market_id, side = %order.side, error = %e, "quote refresh failed");
            }
        }

        let average_price = result.average_price();
        Ok(OrderOutcome {
            order_id: order.id,
            status,
            filled_quantity: result.filled_quantity,
            remaining_quantity: result.remaining_quantity,
            trades: result.trades,
            average_price,
            submitted_at: Utc::now(),
        })
    }

    /// Fails unless the submitting account can cover the order on top of its resting orders.
    fn ensure_covered(&self, order: &Order) -> ExchangeResult<()> {
        match order.action {
            OrderAction::Buy => {
                let price = order.price.unwrap_or(MAX_PRICE);
                let required = Decimal::from(order.quantity) * price;
                let balance = self
                    .ledger
                    .balance(order.user_id)
                    .ok_or(LedgerError::AccountNotFound(order.user_id))?;
                let available = balance - self.committed_funds(order.user_id);
                if available < required {
                    return Err(ExchangeError::InsufficientBalance { required, available });
                }
            }
            OrderAction::Sell => {
                let held = self.ledger.shares(order.user_id, order.market_id, order.side);
                let available =
                    held.saturating_sub(self.committed_shares(order.user_id, order.market_id, order.side));
                if available < order.quantity {
                    return Err(ExchangeError::InsufficientShares {
                        side: order.side,
                        requested: order.quantity,
                        available,
                    });
                }
            }
        }
        Ok(())
    }

    /// Resting limit orders of one account that match `filter`.
    fn resting_records<'a>(
        &'a self,
        user_id: Uuid,
        filter: impl Fn(&Order) -> bool + 'a,
    ) -> impl Iterator<Item = &'a OrderRecord> + 'a {
        self.active
            .for_user(user_id)
            .filter_map(move |id| self.orders.get(id))
            .filter(move |r| r.order.order_type == OrderType::Limit && filter(&r.order))
    }

    /// Cash promised to resting buy orders.
    fn committed_funds(&self, user_id: Uuid) -> Decimal {
        self.resting_records(user_id, |o| o.action == OrderAction::Buy)
            .map(|r| Decimal::from(r.remaining_quantity()) * r.order.price.unwrap_or(Decimal::ZERO))
            .sum()
    }

    /// Shares promised to resting sell orders.
    fn committed_shares(&self, user_id: Uuid, market_id: Uuid, side: OutcomeSide) -> u64 {
        self.resting_records(user_id, move |o| {
            o.action == OrderAction::Sell && o.market_id == market_id && o.side == side
        })
        .map(OrderRecord::remaining_quantity)
        .sum()
    }

    fn insert_record(&mut self, record: OrderRecord) {
        self.active.track(&record);
        self.orders.insert(record.order.id, record);
    }

    /// Applies `update` to a record and re-indexes it.
    fn update_record(
        &mut self,
        order_id: Uuid,
        update: impl FnOnce(&mut OrderRecord),
    ) -> Option<&OrderRecord> {
        let record = self.orders.get_mut(&order_id)?;
        update(record);
        self.active.track(record);
        Some(&*record)
    }

    /// Runs an order through the engine and books every resulting trade.
    ///
    /// The ledger side of every fill is checked before the engine touches the book, so a trade
    /// is never produced that the ledger would then refuse.
    fn execute(&mut self, order: &Order) -> ExchangeResult<MatchResult> {
        self.ensure_settleable(order)?;
        let result = self.engine.process_order(order)?;

        for trade in &result.trades {
            self.book_trade(order, trade)?;
        }
        for order_id in &result.self_trade_cancelled {
            self.update_record(*order_id, |r| r.status = OrderStatus::Cancelled);
        }
        Ok(result)
    }

    /// Checks the fills `order` would make against the ledger.
    ///
    /// A resting order whose owner can no longer deliver (shares for a resting sell, cash for a
    /// resting buy) is pulled from the book and cancelled, and the fills are planned again. Once
    /// every resting counterparty can settle, the incoming account must be able to settle the
    /// total; otherwise the book is left as it is and the ledger error is returned.
    fn ensure_settleable(&mut self, order: &Order) -> ExchangeResult<()> {
        loop {
            let fills = self.engine.plan_fills(order)?;
            if let Some(fill) = self.first_unsettleable(order, &fills) {
                self.pull_resting(order, fill)?;
                continue;
            }

            match order.action {
                OrderAction::Buy => {
                    let total: Decimal = fills.iter().map(PlannedFill::total).sum();
                    self.ledger.ensure_balance(order.user_id, total)?;
                }
                OrderAction::Sell => {
                    let quantity: u64 = fills.iter().map(|f| f.quantity).sum();
                    self.ledger
                        .ensure_can_sell(order.user_id, order.market_id, order.side, quantity)?;
                }
            }
            return Ok(());
        }
    }

    /// First planned fill whose resting owner cannot cover it together with the fills before it.
    fn first_unsettleable(&self, order: &Order, fills: &[PlannedFill]) -> Option<PlannedFill> {
        let mut owed: HashMap<Uuid, (u64, Decimal)> = HashMap::new();
        fills.iter().copied().find(|fill| {
            let (quantity, total) = owed.entry(fill.resting_user_id).or_default();
            *quantity += fill.quantity;
            *total += fill.total();
            let covered = match order.action {
                OrderAction::Buy => {
                    self.ledger
                        .ensure_can_sell(fill.resting_user_id, order.market_id, order.side, *quantity)
                }
                OrderAction::Sell => self.ledger.ensure_balance(fill.resting_user_id, *total),
            };
            covered.is_err()
        })
    }

    fn pull_resting(&mut self, order: &Order, fill: PlannedFill) -> ExchangeResult<()> {
        let removed = self.engine.cancel_order(
            order.market_id,
            fill.resting_order_id,
            order.side,
            order.action.opposite(),
            fill.price,
        );
        if !removed {
            return Err(ExchangeError::OrderNotFound(fill.resting_order_id));
        }
        self.update_record(fill.resting_order_id, |r| r.status = OrderStatus::Cancelled);
        warn!(
            order_id = %fill.resting_order_id,
            user_id = %fill.resting_user_id,
            market_id = %order.market_id,
            "resting order can no longer settle, cancelled"
        );
        Ok(())
    }

    fn book_trade(&mut self, order: &Order, trade: &Trade) -> ExchangeResult<()> {
        self.ledger.apply_trade(trade)?;

        let mm = self.market_maker.account_id();
        if trade.buyer_user_id == mm {
            self.market_maker
                .on_trade(trade.market_id, trade.side, OrderAction::Buy, trade.quantity);
        }
        if trade.seller_user_id == mm {
            self.market_maker
                .on_trade(trade.market_id, trade.side, OrderAction::Sell, trade.quantity);
        }

        let resting_id = match order.action {
            OrderAction::Buy => trade.seller_order_id,
            OrderAction::Sell => trade.buyer_order_id,
        };
        self.update_record(resting_id, |r| r.record_fill(trade.quantity));
        self.trades.entry(trade.market_id).or_default().push(trade.clone());
        Ok(())
    }

    /// Cancels an open or partially filled order.
    ///
    /// An order that is no longer on the book (for example after a restart) is still marked
    /// cancelled.
    ///
    /// # Errors
    ///
    /// * `OrderNotFound` - Unknown order id
    /// * `NotOrderOwner` - The order belongs to another account
    /// * `OrderNotCancellable` - The order is already filled or cancelled
    pub fn cancel_order(&mut self, user_id: Uuid, order_id: Uuid) -> ExchangeResult<OrderRecord> {
        let record = self
            .orders
            .get(&order_id)
            .ok_or(ExchangeError::OrderNotFound(order_id))?;
        if record.order.user_id != user_id {
            return Err(ExchangeError::NotOrderOwner { order_id, user_id });
        }
        if !record.status.is_active() {
            return Err(ExchangeError::OrderNotCancellable {
                order_id,
                status: record.status,
            });
        }

        let order = record.order.clone();
        if let Some(price) = order.price {
            let removed =
                self.engine
                    .cancel_order(order.market_id, order_id, order.side, order.action, price);
            if !removed {
                warn!(%order_id, "order not resting on the book, marking cancelled");
            }
        }

        self.update_record(order_id, |r| r.status = OrderStatus::Cancelled)
            .cloned()
            .ok_or(ExchangeError::OrderNotFound(order_id))
    }

    pub fn order(&self, order_id: Uuid) -> Option<&OrderRecord> {
        self.orders.get(&order_id)
    }

    /// Orders of one account, newest first.
    pub fn orders_for_user(&self, user_id: Uuid) -> Vec<&OrderRecord> {
        let mut orders: Vec<&OrderRecord> = self
            .orders
            .values()
            .filter(|r| r.order.user_id == user_id)
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        orders
    }

    /// Up to `limit` trades of a market, most recent first.
    pub fn recent_trades(&self, market_id: Uuid, limit: usize) -> Vec<&Trade> {
        self.trades
            .get(&market_id)
            .map(|trades| trades.iter().rev().take(limit).collect())
            .unwrap_or_default()
    }

    //----------------------------------------------------------------------------------------------
    // Market maker
    //----------------------------------------------------------------------------------------------

    /// Re-quotes every contract of a market whose spread is undefined or wider than the
    /// configured threshold. Returns the number of quote orders placed.
    pub fn refresh_quotes(&mut self, market_id: Uuid) -> ExchangeResult<usize> {
        self.settlement.ensure_open(market_id)?;
        let mut placed = 0;
        for side in OutcomeSide::ALL {
            placed += self.refresh_side(market_id, side)?;
        }
        Ok(placed)
    }

    fn refresh_side(&mut self, market_id: Uuid, side: OutcomeSide) -> ExchangeResult<usize> {
        let spread = self.engine.spread(market_id, side);
        if spread.is_some_and(|s| s <= self.config.quote_refresh_spread) {
            return Ok(0);
        }
        debug!(%market_id, %side, ?spread, "refreshing quotes");
        self.place_quotes(market_id, side)
    }

    fn place_quotes(&mut self, market_id: Uuid, side: OutcomeSide) -> ExchangeResult<usize> {
        let mut placed = 0;
        for order in self.market_maker.generate_orders(market_id, side) {
            if self.orders.contains_key(&order.id) {
                continue;
            }
            let result = self.execute(&order)?;
            let mut record = OrderRecord::new(order);
            record.record_fill(result.filled_quantity);
            self.insert_record(record);
            placed += 1;
        }
        Ok(placed)
    }

    pub fn set_fair_price(&mut self, market_id: Uuid, yes_price: Decimal) -> ExchangeResult<()> {
        Ok(self.market_maker.set_fair_price(market_id, yes_price)?)
    }

    pub fn market_maker_status(&self, market_id: Uuid) -> MarketMakerStatus {
        self.market_maker.status(market_id)
    }

    //----------------------------------------------------------------------------------------------
    // Views
    //----------------------------------------------------------------------------------------------

    pub fn book_snapshot(&mut self, market_id: Uuid) -> MarketBookSnapshot {
        self.engine.book_snapshot(market_id, self.config.snapshot_depth)
    }

    pub fn position(&self, user_id: Uuid, market_id: Uuid) -> Option<&Position> {
        self.ledger.position(user_id, market_id)
    }

    /// A position valued at each contract's best bid, 0.50 when a contract has no bids.
    pub fn position_summary(&self, user_id: Uuid, market_id: Uuid) -> Option<PositionSummary> {
        let price = |side: OutcomeSide| {
            self.engine
                .best_bid(market_id, side)
                .unwrap_or(FALLBACK_PRICE)
        };
        self.ledger.position_summary(
            user_id,
            market_id,
            price(OutcomeSide::Yes),
            price(OutcomeSide::No),
        )
    }

    pub fn leaderboard(&self, limit: usize) -> Vec<LeaderboardEntry> {
        self.settlement.leaderboard(&self.ledger, limit)
    }

    pub fn user_history(&self, user_id: Uuid) -> Vec<MarketHistoryEntry> {
        self.settlement.user_history(&self.ledger, user_id)
    }

    //----------------------------------------------------------------------------------------------
    // Restart
    //----------------------------------------------------------------------------------------------

    /// Rebuilds exchange state from durable storage. Must run before any other traffic.
    ///
    /// Markets are registered first, then account balances and positions are loaded into the
    /// ledger. Every open or partially filled order with a price in an open market is then
    /// replayed in creation order as a limit order for its remaining quantity, without the
    /// uncommitted-funds checks of a fresh submission. A replay the ledger cannot settle,
    /// including one whose owner has no account, is skipped and its record cancelled.
    ///
    /// # Returns
    /// The number of orders replayed
    ///
    /// # Errors
    /// * `Store` - Any load failed
    /// * `Ledger` - A stored account is duplicated or negative, or a position has no account
    pub fn restore_from_store(&mut self, store: &dyn OrderStore) -> ExchangeResult<usize> {
        for market in store.load_markets()? {
            self.settlement.register_market(market);
        }
        let accounts = store.load_accounts()?;
        let account_count = accounts.len();
        for account in accounts {
            self.ledger.restore_account(account)?;
        }
        for position in store.load_positions()? {
            self.ledger.restore_position(position)?;
        }

        let mut records: Vec<OrderRecord> = store
            .load_open_orders()?
            .into_iter()
            .filter(|r| {
                r.status.is_active()
                    && r.order.price.is_some()
                    && r.remaining_quantity() > 0
                    && self
                        .settlement
                        .market(r.order.market_id)
                        .is_some_and(Market::is_open)
            })
            .collect();
        records.sort_by_key(|r| r.created_at);

        let mut replayed = 0;
        for mut record in records {
            let mut replay = record.order.clone();
            replay.order_type = OrderType::Limit;
            replay.quantity = record.remaining_quantity();

            match self.execute(&replay) {
                Ok(result) => {
                    record.record_fill(result.filled_quantity);
                    replayed += 1;
                }
                Err(e) => {
                    warn!(order_id = %replay.id, error = %e, "stored order not replayed, cancelled");
                    record.status = OrderStatus::Cancelled;
                }
            }
            self.insert_record(record);
        }

        info!(
            replayed,
            accounts = account_count,
            markets = self.settlement.markets().count(),
            "exchange state restored"
        );
        Ok(replayed)
    }
}

//--------------------------------------------------------------------------------------------------
// TESTS
//--------------------------------------------------------------------------------------------------
// | Name                                  | Description                                         |
// |---------------------------------------|-----------------------------------------------------|
// | test_create_market_seeds_quotes       | New market gets MM bid/ask on both contracts        |
// | test_buy_requires_uncommitted_funds   | Resting buys reserve balance                        |
// | test_sell_requires_uncommitted_shares | Resting sells reserve shares                        |
// | test_market_order_statuses            | Cancelled when nothing fills                        |
// | test_self_trade_marks_record          | Removed resting order record becomes Cancelled      |
// | test_restore_replays_in_order         | Replay order, remaining quantity, skipped records   |
// | test_restore_store_error              | Store failure surfaces                              |
// | test_restored_order_trades            | A replayed bid fills against a later sell           |
// | test_unsettleable_resting_order_pulled| Unfunded resting bid is cancelled, sell rests       |
// | test_execute_rejects_before_matching  | Incoming account failure leaves the book intact     |
// | test_recent_trades_newest_first       | Trade history per market, limit applied             |
// | test_markets_listing                  | Status filter, newest first, best bids              |
// | test_delete_market                    | Cancels, refunds cost basis, drops the books        |
// | test_active_index_follows_status      | Index empties on fill, cancel and close             |
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::services::exchange::{MockOrderStore, StoreError};
    use crate::domain::services::ledger::AccountBalance;
    use crate::domain::services::settlement::SettlementError;

    fn quiet_config() -> Config {
        let mut config = Config::default();
        config.market_maker.base_size = 0;
        config
    }

    fn funded(exchange: &mut Exchange) -> Uuid {
        let user = Uuid::new_v4();
        exchange.open_account(user).unwrap();
        user
    }

    #[test]
    fn test_create_market_seeds_quotes() {
        let mut exchange = Exchange::new(Config::default());
        let market = exchange.create_market("Will it ship?").unwrap();
        let snap = exchange.book_snapshot(market.id);
        for book in [&snap.yes, &snap.no] {
            assert_eq!(book.best_bid, Some(dec!(0.47)));
            assert_eq!(book.best_ask, Some(dec!(0.53)));
            assert_eq!(book.spread, Some(dec!(0.06)));
        }
        // spread 0.06 is inside the refresh threshold
        assert_eq!(exchange.refresh_quotes(market.id).unwrap(), 0);
    }

    #[test]
    fn test_buy_requires_uncommitted_funds() {
        let mut exchange = Exchange::new(quiet_config());
        let market = exchange.create_market("Q").unwrap();
        let user = funded(&mut exchange);

        // 1000 x 0.60 = 600 committed
        exchange
            .submit_order(Order::limit(user, market.id, OutcomeSide::Yes, OrderAction::Buy, dec!(0.60), 1000))
            .unwrap();
        let err = exchange
            .submit_order(Order::limit(user, market.id, OutcomeSide::No, OrderAction::Buy, dec!(0.50), 1000))
            .unwrap_err();
        assert_eq!(
            err,
            ExchangeError::InsufficientBalance {
                required: dec!(500),
                available: dec!(400)
            }
        );

        let market_buy = Order::market(user, market.id, OutcomeSide::No, OrderAction::Buy, 500);
        assert!(matches!(
            exchange.submit_order(market_buy),
            Err(ExchangeError::InsufficientBalance { .. })
        ));
    }

    #[test]
    fn test_sell_requires_uncommitted_shares() {
        let mut exchange = Exchange::new(quiet_config());
        let market = exchange.create_market("Q").unwrap();
        let (buyer, seller) = (funded(&mut exchange), funded(&mut exchange));

        exchange
            .submit_order(Order::limit(seller, market.id, OutcomeSide::Yes, OrderAction::Buy, dec!(0.40), 10))
            .unwrap();
        // nobody sells to the seller yet: no shares
        let err = exchange
            .submit_order(Order::limit(seller, market.id, OutcomeSide::Yes, OrderAction::Sell, dec!(0.70), 1))
            .unwrap_err();
        assert_eq!(
            err,
            ExchangeError::InsufficientShares {
                side: OutcomeSide::Yes,
                requested: 1,
                available: 0
            }
        );

        exchange.ledger.position_mut(seller, market.id).apply_buy(OutcomeSide::Yes, 10, dec!(0.40));
        exchange
            .submit_order(Order::limit(seller, market.id, OutcomeSide::Yes, OrderAction::Sell, dec!(0.70), 8))
            .unwrap();
        let err = exchange
            .submit_order(Order::limit(seller, market.id, OutcomeSide::Yes, OrderAction::Sell, dec!(0.75), 3))
            .unwrap_err();
        assert!(matches!(err, ExchangeError::InsufficientShares { available: 2, .. }));

        let outcome = exchange
            .submit_order(Order::limit(buyer, market.id, OutcomeSide::Yes, OrderAction::Buy, dec!(0.70), 8))
            .unwrap();
        assert_eq!(outcome.status, OrderStatus::Filled);
        assert_eq!(exchange.position(buyer, market.id).map(|p| p.yes_shares), Some(8));
    }

    #[test]
    fn test_market_order_statuses() {
        let mut exchange = Exchange::new(quiet_config());
        let market = exchange.create_market("Q").unwrap();
        let user = funded(&mut exchange);

        let outcome = exchange
            .submit_order(Order::market(user, market.id, OutcomeSide::Yes, OrderAction::Buy, 10))
            .unwrap();
        assert_eq!(outcome.status, OrderStatus::Cancelled);
        assert_eq!(outcome.average_price, None);
        assert_eq!(exchange.order(outcome.order_id).map(|r| r.status), Some(OrderStatus::Cancelled));
    }

    #[test]
    fn test_self_trade_marks_record() {
        let mut exchange = Exchange::new(quiet_config());
        let market = exchange.create_market("Q").unwrap();
        let user = funded(&mut exchange);
        exchange.ledger.position_mut(user, market.id).apply_buy(OutcomeSide::No, 10, dec!(0.30));

        let sell = Order::limit(user, market.id, OutcomeSide::No, OrderAction::Sell, dec!(0.45), 10);
        let sell_id = sell.id;
        exchange.submit_order(sell).unwrap();
        let outcome = exchange
            .submit_order(Order::limit(user, market.id, OutcomeSide::No, OrderAction::Buy, dec!(0.50), 10))
            .unwrap();

        assert!(outcome.trades.is_empty());
        assert_eq!(outcome.status, OrderStatus::Open);
        assert_eq!(exchange.order(sell_id).map(|r| r.status), Some(OrderStatus::Cancelled));
        assert!(matches!(
            exchange.cancel_order(user, sell_id),
            Err(ExchangeError::OrderNotCancellable { .. })
        ));
    }

    #[test]
    fn test_restore_replays_in_order() {
        let market = Market::new("Restored");
        let closed = Market {
            status: crate::domain::models::types::MarketStatus::Closed,
            ..Market::new("Closed")
        };
        let user = Uuid::new_v4();
        let now = Utc::now();

        let mut partial = OrderRecord::new(Order::limit(user, market.id, OutcomeSide::Yes, OrderAction::Buy, dec!(0.40), 10));
        partial.record_fill(4);
        partial.created_at = now;

        let mut earlier = OrderRecord::new(Order::limit(user, market.id, OutcomeSide::Yes, OrderAction::Buy, dec!(0.40), 5));
        earlier.created_at = now - chrono::Duration::seconds(5);

        let mut filled = OrderRecord::new(Order::limit(user, market.id, OutcomeSide::Yes, OrderAction::Buy, dec!(0.45), 5));
        filled.record_fill(5);

        let market_order = OrderRecord::new(Order::market(user, market.id, OutcomeSide::No, OrderAction::Buy, 5));
        let in_closed = OrderRecord::new(Order::limit(user, closed.id, OutcomeSide::Yes, OrderAction::Buy, dec!(0.40), 5));

        let markets = vec![market.clone(), closed.clone()];
        let records = vec![partial.clone(), earlier.clone(), filled, market_order, in_closed];

        let mut store = MockOrderStore::new();
        store
            .expect_load_markets()
            .times(1)
            .returning(move || Ok(markets.clone()));
        store
            .expect_load_accounts()
            .times(1)
            .returning(move || Ok(vec![AccountBalance { user_id: user, balance: dec!(100) }]));
        store.expect_load_positions().times(1).returning(|| Ok(Vec::new()));
        store
            .expect_load_open_orders()
            .times(1)
            .returning(move || Ok(records.clone()));

        let mut exchange = Exchange::new(quiet_config());
        let replayed = exchange.restore_from_store(&store).unwrap();
        assert_eq!(replayed, 2);

        let book = exchange.engine.book(market.id, OutcomeSide::Yes).unwrap();
        let level = book.bids.best_level().unwrap();
        assert_eq!(level.price, dec!(0.40));
        assert_eq!(level.total_quantity(), 11);
        assert_eq!(level.front().map(|o| o.order_id), Some(earlier.order.id));
        assert_eq!(exchange.book_snapshot(closed.id).yes.best_bid, None);

        let record = exchange.order(partial.order.id).unwrap();
        assert_eq!(record.filled_quantity, 4);
        assert_eq!(record.status, OrderStatus::Partial);

        assert!(exchange.market(market.id).is_some());
        assert!(matches!(
            exchange.refresh_quotes(closed.id),
            Err(ExchangeError::Settlement(SettlementError::MarketNotOpen(_)))
        ));
    }

    #[test]
    fn test_restore_store_error() {
        let mut store = MockOrderStore::new();
        store
            .expect_load_markets()
            .returning(|| Err(StoreError::Unavailable("connection refused".to_string())));
        store.expect_load_accounts().never();
        store.expect_load_positions().never();
        store.expect_load_open_orders().never();

        let mut exchange = Exchange::new(quiet_config());
        assert_eq!(
            exchange.restore_from_store(&store),
            Err(ExchangeError::Store(StoreError::Unavailable("connection refused".to_string())))
        );
    }

    /// A store holding one open market, funded accounts and a seller long 10 YES.
    fn stored_state(
        market: &Market,
        accounts: Vec<AccountBalance>,
        seller: Uuid,
        orders: Vec<OrderRecord>,
    ) -> MockOrderStore {
        let markets = vec![market.clone()];
        let mut position = Position::new(seller, market.id);
        position.apply_buy(OutcomeSide::Yes, 10, dec!(0.30));

        let mut store = MockOrderStore::new();
        store.expect_load_markets().returning(move || Ok(markets.clone()));
        store.expect_load_accounts().returning(move || Ok(accounts.clone()));
        store
            .expect_load_positions()
            .returning(move || Ok(vec![position.clone()]));
        store.expect_load_open_orders().returning(move || Ok(orders.clone()));
        store
    }

    #[test]
    fn test_restored_order_trades() {
        let market = Market::new("Restored");
        let (buyer, seller) = (Uuid::new_v4(), Uuid::new_v4());
        let bid = OrderRecord::new(Order::limit(buyer, market.id, OutcomeSide::Yes, OrderAction::Buy, dec!(0.40), 10));
        let accounts = vec![
            AccountBalance { user_id: buyer, balance: dec!(100) },
            AccountBalance { user_id: seller, balance: dec!(100) },
        ];
        let store = stored_state(&market, accounts, seller, vec![bid.clone()]);

        let mut exchange = Exchange::new(quiet_config());
        assert_eq!(exchange.restore_from_store(&store), Ok(1));
        assert_eq!(exchange.position(seller, market.id).map(|p| p.yes_shares), Some(10));

        let outcome = exchange
            .submit_order(Order::limit(seller, market.id, OutcomeSide::Yes, OrderAction::Sell, dec!(0.40), 10))
            .unwrap();
        assert_eq!(outcome.status, OrderStatus::Filled);
        assert_eq!(outcome.trades.len(), 1);
        assert_eq!(exchange.order(bid.order.id).map(|r| (r.status, r.filled_quantity)), Some((OrderStatus::Filled, 10)));
        assert_eq!(exchange.balance(buyer), Some(dec!(96.00)));
        assert_eq!(exchange.balance(seller), Some(dec!(104.00)));
        assert_eq!(exchange.position(buyer, market.id).map(|p| p.yes_shares), Some(10));
        assert_eq!(exchange.position(seller, market.id).map(|p| p.yes_shares), Some(0));
        assert_eq!(exchange.book_snapshot(market.id).yes.best_bid, None);
    }

    #[test]
    fn test_unsettleable_resting_order_pulled() {
        let market = Market::new("Restored");
        let (broke, seller, stranger) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let bid = OrderRecord::new(Order::limit(broke, market.id, OutcomeSide::Yes, OrderAction::Buy, dec!(0.40), 10));
        let orphan = OrderRecord::new(Order::limit(stranger, market.id, OutcomeSide::Yes, OrderAction::Buy, dec!(0.35), 10));
        let accounts = vec![
            AccountBalance { user_id: broke, balance: Decimal::ZERO },
            AccountBalance { user_id: seller, balance: dec!(100) },
        ];
        let store = stored_state(&market, accounts, seller, vec![bid.clone(), orphan.clone()]);

        let mut exchange = Exchange::new(quiet_config());
        // the orphan's owner has no account
        assert_eq!(exchange.restore_from_store(&store), Ok(1));
        assert_eq!(exchange.order(orphan.order.id).map(|r| r.status), Some(OrderStatus::Cancelled));
        assert_eq!(exchange.book_snapshot(market.id).yes.best_bid, Some(dec!(0.40)));

        let outcome = exchange
            .submit_order(Order::limit(seller, market.id, OutcomeSide::Yes, OrderAction::Sell, dec!(0.40), 10))
            .unwrap();
        assert!(outcome.trades.is_empty());
        assert_eq!(outcome.status, OrderStatus::Open);
        assert_eq!(exchange.order(bid.order.id).map(|r| (r.status, r.filled_quantity)), Some((OrderStatus::Cancelled, 0)));

        let snap = exchange.book_snapshot(market.id);
        assert_eq!(snap.yes.best_bid, None);
        assert_eq!(snap.yes.best_ask, Some(dec!(0.40)));
        assert_eq!(exchange.balance(seller), Some(dec!(100)));
        assert_eq!(exchange.position(seller, market.id).map(|p| p.yes_shares), Some(10));
        assert!(exchange.recent_trades(market.id, 20).is_empty());
    }

    #[test]
    fn test_execute_rejects_before_matching() {
        let mut exchange = Exchange::new(quiet_config());
        let market = exchange.create_market("Q").unwrap();
        let seller = funded(&mut exchange);
        exchange.ledger.position_mut(seller, market.id).apply_buy(OutcomeSide::No, 10, dec!(0.30));
        let ask = Order::limit(seller, market.id, OutcomeSide::No, OrderAction::Sell, dec!(0.45), 10);
        exchange.submit_order(ask.clone()).unwrap();

        let stranger = Uuid::new_v4();
        let buy = Order::limit(stranger, market.id, OutcomeSide::No, OrderAction::Buy, dec!(0.45), 4);
        assert_eq!(
            exchange.execute(&buy),
            Err(ExchangeError::Ledger(LedgerError::AccountNotFound(stranger)))
        );
        assert!(exchange
            .engine
            .contains_order(market.id, OutcomeSide::No, OrderAction::Sell, dec!(0.45), ask.id));
        assert_eq!(exchange.order(ask.id).map(|r| (r.status, r.filled_quantity)), Some((OrderStatus::Open, 0)));
        assert_eq!(exchange.position(seller, market.id).map(|p| p.no_shares), Some(10));
    }

    #[test]
    fn test_recent_trades_newest_first() {
        let mut exchange = Exchange::new(quiet_config());
        let market = exchange.create_market("Q").unwrap();
        let (buyer, seller) = (funded(&mut exchange), funded(&mut exchange));
        exchange.ledger.position_mut(seller, market.id).apply_buy(OutcomeSide::Yes, 10, dec!(0.30));
        exchange
            .submit_order(Order::limit(seller, market.id, OutcomeSide::Yes, OrderAction::Sell, dec!(0.50), 5))
            .unwrap();

        for quantity in [2, 3] {
            exchange
                .submit_order(Order::limit(buyer, market.id, OutcomeSide::Yes, OrderAction::Buy, dec!(0.50), quantity))
                .unwrap();
        }

        let trades = exchange.recent_trades(market.id, 20);
        let quantities: Vec<_> = trades.iter().map(|t| t.quantity).collect();
        assert_eq!(quantities, vec![3, 2]);
        assert!(trades.iter().all(|t| t.seller_user_id == seller && t.price == dec!(0.50)));
        assert_eq!(exchange.recent_trades(market.id, 1).len(), 1);
        assert!(exchange.recent_trades(Uuid::new_v4(), 20).is_empty());
    }

    #[test]
    fn test_markets_listing() {
        let mut exchange = Exchange::new(Config::default());
        let older = Market {
            status: MarketStatus::Closed,
            created_at: Utc::now() - chrono::Duration::hours(1),
            ..Market::new("Older")
        };
        exchange.settlement.register_market(older.clone());
        let newer = exchange.create_market("Newer").unwrap();

        let listed = exchange.markets(None, 50);
        let ids: Vec<_> = listed.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![newer.id, older.id]);
        assert_eq!(listed[0].yes_price, Some(dec!(0.47)));
        assert_eq!(listed[0].no_price, Some(dec!(0.47)));
        assert_eq!(listed[1].yes_price, None);
        assert_eq!(listed[1].status, MarketStatus::Closed);

        let closed = exchange.markets(Some(MarketStatus::Closed), 50);
        assert_eq!(closed.iter().map(|m| m.id).collect::<Vec<_>>(), vec![older.id]);
        assert_eq!(exchange.markets(None, 1).len(), 1);

        exchange.resolve_market(newer.id, false).unwrap();
        let resolved = exchange.markets(Some(MarketStatus::Resolved), 50);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].resolved_outcome, Some(false));
    }

    #[test]
    fn test_delete_market() {
        let mut exchange = Exchange::new(Config::default());
        let market = exchange.create_market("Deleted").unwrap();
        let alice = funded(&mut exchange);

        // lifts 10 of the market maker's YES offer at 0.53
        exchange
            .submit_order(Order::limit(alice, market.id, OutcomeSide::Yes, OrderAction::Buy, dec!(0.53), 10))
            .unwrap();
        let bid = exchange
            .submit_order(Order::limit(alice, market.id, OutcomeSide::No, OrderAction::Buy, dec!(0.30), 5))
            .unwrap();
        assert_eq!(exchange.balance(alice), Some(dec!(994.70)));

        let deletion = exchange.delete_market(market.id, true).unwrap();
        assert_eq!(deletion.orders_cancelled, 5);
        assert_eq!(deletion.users_refunded, 1);
        assert_eq!(deletion.total_refunded, dec!(5.30));

        assert_eq!(exchange.balance(alice), Some(dec!(1000.00)));
        assert!(exchange.position(alice, market.id).is_some_and(Position::is_flat));
        assert_eq!(exchange.order(bid.order_id).map(|r| r.status), Some(OrderStatus::Cancelled));
        assert_eq!(exchange.market(market.id).map(|m| m.status), Some(MarketStatus::Closed));
        assert!(exchange.engine.book(market.id, OutcomeSide::Yes).is_none());
        assert_eq!(exchange.recent_trades(market.id, 20).len(), 1);
        assert!(matches!(
            exchange.submit_order(Order::limit(alice, market.id, OutcomeSide::Yes, OrderAction::Buy, dec!(0.50), 1)),
            Err(ExchangeError::Settlement(SettlementError::MarketNotOpen(_)))
        ));

        let kept = exchange.create_market("Kept positions").unwrap();
        exchange
            .submit_order(Order::limit(alice, kept.id, OutcomeSide::No, OrderAction::Buy, dec!(0.53), 10))
            .unwrap();
        let deletion = exchange.delete_market(kept.id, false).unwrap();
        assert_eq!((deletion.users_refunded, deletion.total_refunded), (0, Decimal::ZERO));
        assert_eq!(exchange.position(alice, kept.id).map(|p| p.no_shares), Some(10));

        let resolved = exchange.create_market("Resolved").unwrap();
        exchange.resolve_market(resolved.id, true).unwrap();
        assert_eq!(
            exchange.delete_market(resolved.id, true),
            Err(ExchangeError::Settlement(SettlementError::AlreadyResolved(resolved.id)))
        );
    }

    #[test]
    fn test_active_index_follows_status() {
        let mut exchange = Exchange::new(quiet_config());
        let market = exchange.create_market("Q").unwrap();
        let (alice, seller) = (funded(&mut exchange), funded(&mut exchange));
        exchange.ledger.position_mut(seller, market.id).apply_buy(OutcomeSide::Yes, 10, dec!(0.30));

        let filled = exchange
            .submit_order(Order::limit(alice, market.id, OutcomeSide::Yes, OrderAction::Buy, dec!(0.40), 5))
            .unwrap();
        assert_eq!(exchange.active.for_user(alice).count(), 1);
        exchange
            .submit_order(Order::limit(seller, market.id, OutcomeSide::Yes, OrderAction::Sell, dec!(0.40), 5))
            .unwrap();
        assert_eq!(exchange.order(filled.order_id).map(|r| r.status), Some(OrderStatus::Filled));
        assert_eq!(exchange.active.for_user(alice).count(), 0);
        assert_eq!(exchange.active.for_user(seller).count(), 0);

        let cancelled = exchange
            .submit_order(Order::limit(alice, market.id, OutcomeSide::Yes, OrderAction::Buy, dec!(0.30), 3))
            .unwrap();
        exchange.cancel_order(alice, cancelled.order_id).unwrap();
        assert_eq!(exchange.active.for_user(alice).count(), 0);

        exchange
            .submit_order(Order::limit(alice, market.id, OutcomeSide::No, OrderAction::Buy, dec!(0.20), 2))
            .unwrap();
        assert_eq!(exchange.active.for_market(market.id).len(), 1);
        // 998 left after paying 2.00; the resting 0.40 of NO is committed
        assert!(matches!(
            exchange.submit_order(Order::limit(alice, market.id, OutcomeSide::Yes, OrderAction::Buy, dec!(0.50), 1996)),
            Err(ExchangeError::InsufficientBalance { .. })
        ));
        exchange.close_market(market.id).unwrap();
        assert!(exchange.active.for_market(market.id).is_empty());
        assert_eq!(exchange.active.for_user(alice).count(), 0);
        assert!(exchange.active.by_user.is_empty());
    }
}
