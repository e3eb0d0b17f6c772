//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// Per-account, per-market share holdings with weighted-average cost accounting.
//
// | Component        | Description                                                    |
// |------------------|----------------------------------------------------------------|
// | Position         | Share counts, average prices, cost bases and realized P&L      |
// | PositionSummary  | Position valued at reference prices                            |
// | PositionError    | Sell overdraft                                                 |
//--------------------------------------------------------------------------------------------------

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::types::OutcomeSide;

/// Errors raised by position accounting.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PositionError {
    #[error("Insufficient {side} shares: requested {requested}, available {available}")]
    InsufficientShares {
        side: OutcomeSide,
        requested: u64,
        available: u64,
    },
}

pub type PositionResult<T> = Result<T, PositionError>;

/// Holdings of one account in one market. Never deleted, zeroed on settlement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub user_id: Uuid,
    pub market_id: Uuid,
    pub yes_shares: u64,
    pub no_shares: u64,
    pub yes_avg_price: Decimal,
    pub no_avg_price: Decimal,
    pub yes_cost_basis: Decimal,
    pub no_cost_basis: Decimal,
    pub realized_pnl: Decimal,
}

impl Position {
    pub fn new(user_id: Uuid, market_id: Uuid) -> Self {
        Self {
            user_id,
            market_id,
            yes_shares: 0,
            no_shares: 0,
            yes_avg_price: Decimal::ZERO,
            no_avg_price: Decimal::ZERO,
            yes_cost_basis: Decimal::ZERO,
            no_cost_basis: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
        }
    }

    pub fn shares(&self, side: OutcomeSide) -> u64 {
        match side {
            OutcomeSide::Yes => self.yes_shares,
            OutcomeSide::No => self.no_shares,
        }
    }

    pub fn avg_price(&self, side: OutcomeSide) -> Decimal {
        match side {
            OutcomeSide::Yes => self.yes_avg_price,
            OutcomeSide::No => self.no_avg_price,
        }
    }

    pub fn cost_basis(&self, side: OutcomeSide) -> Decimal {
        match side {
            OutcomeSide::Yes => self.yes_cost_basis,
            OutcomeSide::No => self.no_cost_basis,
        }
    }

    fn legs_mut(&mut self, side: OutcomeSide) -> (&mut u64, &mut Decimal, &mut Decimal) {
        match side {
            OutcomeSide::Yes => (
                &mut self.yes_shares,
                &mut self.yes_avg_price,
                &mut self.yes_cost_basis,
            ),
            OutcomeSide::No => (
                &mut self.no_shares,
                &mut self.no_avg_price,
                &mut self.no_cost_basis,
            ),
        }
    }

    /// Adds `quantity` shares bought at `price`, re-weighting the average price.
    pub fn apply_buy(&mut self, side: OutcomeSide, quantity: u64, price: Decimal) {
        if quantity == 0 {
            return;
        }
        let (shares, avg, cost) = self.legs_mut(side);
        let old_total = Decimal::from(*shares) * *avg;
        let new_shares = *shares + quantity;
        let added = Decimal::from(quantity) * price;

        *avg = (old_total + added) / Decimal::from(new_shares);
        *shares = new_shares;
        *cost += added;
    }

    /// Removes `quantity` shares sold at `price` and realizes the difference to the average.
    ///
    /// # Errors
    ///
    /// Returns `InsufficientShares` when the position holds fewer than `quantity` shares;
    /// the position is left untouched in that case.
    pub fn apply_sell(&mut self, side: OutcomeSide, quantity: u64, price: Decimal) -> PositionResult<()> {
        let available = self.shares(side);
        if quantity > available {
            return Err(PositionError::InsufficientShares {
                side,
                requested: quantity,
                available,
            });
        }
        if quantity == 0 {
            return Ok(());
        }

        let qty = Decimal::from(quantity);
        let (shares, avg, cost) = self.legs_mut(side);
        let realized = (price - *avg) * qty;

        *shares -= quantity;
        *cost = (*cost - *avg * qty).max(Decimal::ZERO);
        if *shares == 0 {
            *avg = Decimal::ZERO;
            *cost = Decimal::ZERO;
        }
        self.realized_pnl += realized;
        Ok(())
    }

    /// Market value of open shares minus their cost basis.
    pub fn unrealized_pnl(&self, yes_price: Decimal, no_price: Decimal) -> Decimal {
        let yes_value = Decimal::from(self.yes_shares) * yes_price;
        let no_value = Decimal::from(self.no_shares) * no_price;
        (yes_value - self.yes_cost_basis) + (no_value - self.no_cost_basis)
    }

    pub fn is_flat(&self) -> bool {
        self.yes_shares == 0 && self.no_shares == 0
    }

    /// Empties both legs, keeping realized P&L.
    pub fn clear_holdings(&mut self) {
        self.yes_shares = 0;
        self.no_shares = 0;
        self.yes_avg_price = Decimal::ZERO;
        self.no_avg_price = Decimal::ZERO;
        self.yes_cost_basis = Decimal::ZERO;
        self.no_cost_basis = Decimal::ZERO;
    }
}

/// A position valued at the given reference prices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSummary {
    pub position: Position,
    pub yes_price: Decimal,
    pub no_price: Decimal,
    pub yes_value: Decimal,
    pub no_value: Decimal,
    pub unrealized_pnl: Decimal,
}

impl PositionSummary {
    pub fn new(position: Position, yes_price: Decimal, no_price: Decimal) -> Self {
        let yes_value = Decimal::from(position.yes_shares) * yes_price;
        let no_value = Decimal::from(position.no_shares) * no_price;
        let unrealized_pnl = position.unrealized_pnl(yes_price, no_price);
        Self {
            position,
            yes_price,
            no_price,
            yes_value,
            no_value,
            unrealized_pnl,
        }
    }
}
