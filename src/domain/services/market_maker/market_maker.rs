//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// Inventory-aware liquidity provider. Quotes a two-sided market around a fair price per
// (market, contract), skewing both prices against its inventory and capping sizes at the
// configured inventory limit.
//
// | Component          | Description                                                       |
// |--------------------|-------------------------------------------------------------------|
// | MarketMakerConfig  | Spread, sizes, inventory limit, skew factor, price band           |
// | MarketMaker        | Per (market, side) state plus quoting logic                       |
// | Quote              | Bid/ask prices and sizes, one side may be absent                  |
// | MarketMakerStatus  | Inventory, fair prices and current quotes of a market             |
//--------------------------------------------------------------------------------------------------

use std::collections::HashMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use super::{MarketMakerError, MarketMakerResult};
use crate::domain::models::types::{is_valid_price, Order, OrderAction, OutcomeSide};

/// Fixed identity the market maker trades under.
pub const MARKET_MAKER_ACCOUNT: Uuid = Uuid::from_u128(0x6d61726b_6574_4d61_6b65_72426f740001);

/// Configuration for the market maker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketMakerConfig {
    /// Account ID used on generated orders
    pub account_id: Uuid,

    /// Full width between bid and ask before skew
    pub spread: Decimal,

    /// Quantity quoted on each side before inventory caps
    pub base_size: u64,

    /// Fair YES price of a market nobody has priced yet; NO defaults to its complement
    pub default_fair_price: Decimal,

    /// Largest long or short inventory per contract
    pub max_inventory: i64,

    /// Price shift per share of inventory
    pub inventory_skew_factor: Decimal,

    pub min_price: Decimal,
    pub max_price: Decimal,
}

impl Default for MarketMakerConfig {
    fn default() -> Self {
        Self {
            account_id: MARKET_MAKER_ACCOUNT,
            spread: dec!(0.04),
            base_size: 100,
            default_fair_price: dec!(0.50),
            max_inventory: 500,
            inventory_skew_factor: dec!(0.01),
            min_price: dec!(0.01),
            max_price: dec!(0.99),
        }
    }
}

/// A two-sided quote. A side with zero size carries no price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub bid_price: Option<Decimal>,
    pub bid_size: u64,
    pub ask_price: Option<Decimal>,
    pub ask_size: u64,
}

/// Inventory and fair price of one contract.
#[derive(Debug, Clone, Copy, PartialEq)]
struct InventoryState {
    inventory: i64,
    fair_price: Decimal,
}

/// Introspection of one contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SideStatus {
    pub inventory: i64,
    pub fair_price: Decimal,
    pub quote: Quote,
}

/// Introspection of a market: inventory, fair prices and current quotes per contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketMakerStatus {
    pub market_id: Uuid,
    pub yes: SideStatus,
    pub no: SideStatus,
}

/// Market-making strategy state.
#[derive(Debug, Clone)]
pub struct MarketMaker {
    config: MarketMakerConfig,
    state: HashMap<(Uuid, OutcomeSide), InventoryState>,
}

impl MarketMaker {
    pub fn new(config: MarketMakerConfig) -> Self {
        Self {
            config,
            state: HashMap::new(),
        }
    }

    pub fn config(&self) -> &MarketMakerConfig {
        &self.config
    }

    pub fn account_id(&self) -> Uuid {
        self.config.account_id
    }

    /// State a contract starts with before any trade or explicit pricing.
    fn initial_state(&self, side: OutcomeSide) -> InventoryState {
        let fair_price = match side {
            OutcomeSide::Yes => self.config.default_fair_price,
            OutcomeSide::No => Decimal::ONE - self.config.default_fair_price,
        };
        InventoryState {
            inventory: 0,
            fair_price,
        }
    }

    fn state(&self, market_id: Uuid, side: OutcomeSide) -> InventoryState {
        self.state
            .get(&(market_id, side))
            .copied()
            .unwrap_or_else(|| self.initial_state(side))
    }

    fn state_mut(&mut self, market_id: Uuid, side: OutcomeSide) -> &mut InventoryState {
        let initial = self.initial_state(side);
        self.state.entry((market_id, side)).or_insert(initial)
    }

    pub fn inventory(&self, market_id: Uuid, side: OutcomeSide) -> i64 {
        self.state(market_id, side).inventory
    }

    pub fn fair_price(&self, market_id: Uuid, side: OutcomeSide) -> Decimal {
        self.state(market_id, side).fair_price
    }

    /// Sets the YES fair price of a market; NO becomes its complement.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFairPrice` when `yes_price` lies outside `[0.01, 0.99]`
    pub fn set_fair_price(&mut self, market_id: Uuid, yes_price: Decimal) -> MarketMakerResult<()> {
        if !is_valid_price(yes_price) {
            return Err(MarketMakerError::InvalidFairPrice(yes_price));
        }
        self.state_mut(market_id, OutcomeSide::Yes).fair_price = yes_price;
        self.state_mut(market_id, OutcomeSide::No).fair_price = (Decimal::ONE - yes_price).round_dp(2);
        info!(%market_id, %yes_price, "fair price updated");
        Ok(())
    }

    #[inline]
    fn clamp(&self, price: Decimal) -> Decimal {
        price.max(self.config.min_price).min(self.config.max_price)
    }

    /// Computes the current quote for one contract.
    ///
    /// Both prices are shifted down by `inventory × skew_factor`, clamped into the price band
    /// and rounded to cents. A collapsed quote is re-centered one cent either side of its
    /// midpoint. Sizes are capped by the room left to the inventory limit on each side.
    pub fn calculate_quote(&self, market_id: Uuid, side: OutcomeSide) -> Quote {
        let InventoryState {
            inventory,
            fair_price,
        } = self.state(market_id, side);
        let half_spread = self.config.spread / Decimal::TWO;
        let skew = Decimal::from(inventory) * self.config.inventory_skew_factor;

        let mut bid = self.clamp(fair_price - half_spread - skew).round_dp(2);
        let mut ask = self.clamp(fair_price + half_spread - skew).round_dp(2);

        if bid >= ask {
            let mid = (bid + ask) / Decimal::TWO;
            bid = self.clamp(mid - dec!(0.01)).round_dp(2);
            ask = self.clamp(mid + dec!(0.01)).round_dp(2);
        }

        let bid_size = Self::capped_size(self.config.base_size, self.config.max_inventory - inventory);
        let ask_size = Self::capped_size(self.config.base_size, self.config.max_inventory + inventory);

        Quote {
            bid_price: (bid_size > 0).then_some(bid),
            bid_size,
            ask_price: (ask_size > 0).then_some(ask),
            ask_size,
        }
    }

    fn capped_size(base_size: u64, capacity: i64) -> u64 {
        if capacity <= 0 {
            0
        } else {
            base_size.min(capacity.unsigned_abs())
        }
    }

    /// Limit orders realizing the current quote: a BUY at the bid and a SELL at the ask,
    /// each only when its size is positive.
    pub fn generate_orders(&self, market_id: Uuid, side: OutcomeSide) -> Vec<Order> {
        let quote = self.calculate_quote(market_id, side);
        let legs = [
            (OrderAction::Buy, quote.bid_price, quote.bid_size),
            (OrderAction::Sell, quote.ask_price, quote.ask_size),
        ];

        let orders: Vec<Order> = legs
            .into_iter()
            .filter_map(|(action, price, size)| {
                let price = price.filter(|_| size > 0)?;
                let mut order =
                    Order::limit(self.config.account_id, market_id, side, action, price, size);
                order.is_market_maker = true;
                Some(order)
            })
            .collect();

        debug!(%market_id, %side, count = orders.len(), ?quote, "quotes generated");
        orders
    }

    /// Records a fill in which the market maker was a counterparty.
    pub fn on_trade(&mut self, market_id: Uuid, side: OutcomeSide, action: OrderAction, quantity: u64) {
        let delta = i64::try_from(quantity).unwrap_or(i64::MAX);
        let state = self.state_mut(market_id, side);
        match action {
            OrderAction::Buy => state.inventory = state.inventory.saturating_add(delta),
            OrderAction::Sell => state.inventory = state.inventory.saturating_sub(delta),
        }
        debug!(%market_id, %side, %action, quantity, inventory = state.inventory, "inventory updated");
    }

    pub fn status(&self, market_id: Uuid) -> MarketMakerStatus {
        let side_status = |side: OutcomeSide| {
            let state = self.state(market_id, side);
            SideStatus {
                inventory: state.inventory,
                fair_price: state.fair_price,
                quote: self.calculate_quote(market_id, side),
            }
        };
        MarketMakerStatus {
            market_id,
            yes: side_status(OutcomeSide::Yes),
            no: side_status(OutcomeSide::No),
        }
    }

    /// Forgets the state of a market once it no longer trades.
    pub fn remove_market(&mut self, market_id: Uuid) {
        self.state.retain(|(market, _), _| *market != market_id);
    }
}

impl Default for MarketMaker {
    fn default() -> Self {
        Self::new(MarketMakerConfig::default())
    }
}
