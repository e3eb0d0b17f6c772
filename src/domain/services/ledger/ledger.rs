//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// Account balances, per-market positions and the audit journal. Every trade moves cash from the
// buyer to the seller and shares from the seller to the buyer; the market maker's account is
// exempt and never gets a position or a balance.
//
// | Component     | Description                                                           |
// |---------------|-----------------------------------------------------------------------|
// | Ledger        | Balances, positions keyed by (user, market), journal                  |
// | LedgerEntry   | One signed balance movement with the balance it left behind           |
// | EntryKind     | Deposit, trade legs, settlement payout, refund                        |
// | AccountBalance| Persisted balance an account is restored from                         |
//--------------------------------------------------------------------------------------------------

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use super::{LedgerError, LedgerResult};
use crate::domain::models::position::{Position, PositionError, PositionSummary};
use crate::domain::models::types::{OutcomeSide, Trade};

/// What caused a balance movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryKind {
    Deposit,
    TradeBuy,
    TradeSell,
    MarketPayout,
    Refund,
}

/// A stored account balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountBalance {
    pub user_id: Uuid,
    pub balance: Decimal,
}

/// A journaled balance movement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: EntryKind,
    /// Negative for debits.
    pub amount: Decimal,
    pub balance_after: Decimal,
    /// Trade id for trade legs, market id for payouts.
    pub reference_id: Option<Uuid>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Balances, positions and journal of every account.
#[derive(Debug, Clone)]
pub struct Ledger {
    exempt_account: Uuid,
    balances: HashMap<Uuid, Decimal>,
    positions: HashMap<(Uuid, Uuid), Position>,
    journal: Vec<LedgerEntry>,
}

impl Ledger {
    /// Creates an empty ledger. `exempt_account` never gets a balance or a position.
    pub fn new(exempt_account: Uuid) -> Self {
        Self {
            exempt_account,
            balances: HashMap::new(),
            positions: HashMap::new(),
            journal: Vec::new(),
        }
    }

    #[inline]
    pub fn is_exempt(&self, user_id: Uuid) -> bool {
        user_id == self.exempt_account
    }

    /// Opens an account with a starting balance.
    ///
    /// # Errors
    ///
    /// Returns `AccountExists` when the account is already open
    pub fn open_account(&mut self, user_id: Uuid, initial_balance: Decimal) -> LedgerResult<()> {
        if self.balances.contains_key(&user_id) {
            return Err(LedgerError::AccountExists(user_id));
        }
        self.balances.insert(user_id, Decimal::ZERO);
        if initial_balance > Decimal::ZERO {
            self.credit(user_id, initial_balance, EntryKind::Deposit, None, "Starting balance".to_string())?;
        }
        info!(%user_id, %initial_balance, "account opened");
        Ok(())
    }

    /// Re-creates an account from storage. No journal entry is written and the exempt account
    /// is ignored.
    ///
    /// # Errors
    ///
    /// * `AccountExists` - The account is already open
    /// * `InvalidAmount` - The stored balance is negative
    pub fn restore_account(&mut self, account: AccountBalance) -> LedgerResult<()> {
        if self.is_exempt(account.user_id) {
            return Ok(());
        }
        if self.balances.contains_key(&account.user_id) {
            return Err(LedgerError::AccountExists(account.user_id));
        }
        if account.balance < Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(account.balance));
        }
        debug!(user_id = %account.user_id, balance = %account.balance, "account restored");
        self.balances.insert(account.user_id, account.balance);
        Ok(())
    }

    /// Re-creates a position from storage, replacing any position for the same (user, market).
    /// Positions of the exempt account are ignored.
    ///
    /// # Errors
    ///
    /// Returns `AccountNotFound` when the owner has no account
    pub fn restore_position(&mut self, position: Position) -> LedgerResult<()> {
        if self.is_exempt(position.user_id) {
            return Ok(());
        }
        if !self.has_account(position.user_id) {
            return Err(LedgerError::AccountNotFound(position.user_id));
        }
        self.positions
            .insert((position.user_id, position.market_id), position);
        Ok(())
    }

    /// Adds funds to an open account and returns the new balance.
    pub fn deposit(&mut self, user_id: Uuid, amount: Decimal) -> LedgerResult<Decimal> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(amount));
        }
        self.credit(user_id, amount, EntryKind::Deposit, None, "Deposit".to_string())
    }

    pub fn balance(&self, user_id: Uuid) -> Option<Decimal> {
        self.balances.get(&user_id).copied()
    }

    pub fn has_account(&self, user_id: Uuid) -> bool {
        self.balances.contains_key(&user_id)
    }

    /// Fails unless `user_id` can pay `amount`. The exempt account always can.
    pub fn ensure_balance(&self, user_id: Uuid, amount: Decimal) -> LedgerResult<()> {
        if self.is_exempt(user_id) {
            return Ok(());
        }
        let available = self.balance(user_id).ok_or(LedgerError::AccountNotFound(user_id))?;
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                user_id,
                required: amount,
                available,
            });
        }
        Ok(())
    }

    /// Fails unless `user_id` holds at least `quantity` shares of `side`.
    pub fn ensure_shares(
        &self,
        user_id: Uuid,
        market_id: Uuid,
        side: OutcomeSide,
        quantity: u64,
    ) -> LedgerResult<()> {
        if self.is_exempt(user_id) {
            return Ok(());
        }
        let available = self.shares(user_id, market_id, side);
        if available < quantity {
            return Err(PositionError::InsufficientShares {
                side,
                requested: quantity,
                available,
            }
            .into());
        }
        Ok(())
    }

    /// Fails unless `user_id` has an account and can deliver `quantity` shares of `side`. The
    /// exempt account always can.
    pub fn ensure_can_sell(
        &self,
        user_id: Uuid,
        market_id: Uuid,
        side: OutcomeSide,
        quantity: u64,
    ) -> LedgerResult<()> {
        if self.is_exempt(user_id) {
            return Ok(());
        }
        if !self.has_account(user_id) {
            return Err(LedgerError::AccountNotFound(user_id));
        }
        self.ensure_shares(user_id, market_id, side, quantity)
    }

    pub fn shares(&self, user_id: Uuid, market_id: Uuid, side: OutcomeSide) -> u64 {
        self.position(user_id, market_id).map_or(0, |p| p.shares(side))
    }

    /// Applies both legs of a trade.
    ///
    /// Every precondition is checked before anything changes, so a rejected trade leaves the
    /// ledger untouched.
    ///
    /// # Errors
    ///
    /// * `AccountNotFound` - A non-exempt counterparty has no account
    /// * `InsufficientBalance` - The buyer cannot pay `trade.total`
    /// * `Position(InsufficientShares)` - The seller does not hold `trade.quantity` shares
    pub fn apply_trade(&mut self, trade: &Trade) -> LedgerResult<()> {
        let buyer = trade.buyer_user_id;
        let seller = trade.seller_user_id;

        self.ensure_balance(buyer, trade.total)?;
        self.ensure_can_sell(seller, trade.market_id, trade.side, trade.quantity)?;

        if !self.is_exempt(buyer) {
            self.position_mut(buyer, trade.market_id)
                .apply_buy(trade.side, trade.quantity, trade.price);
            self.debit(
                buyer,
                trade.total,
                EntryKind::TradeBuy,
                Some(trade.id),
                format!("Bought {} {} @ {}", trade.quantity, trade.side, trade.price),
            )?;
        }

        if !self.is_exempt(seller) {
            self.position_mut(seller, trade.market_id)
                .apply_sell(trade.side, trade.quantity, trade.price)?;
            self.credit(
                seller,
                trade.total,
                EntryKind::TradeSell,
                Some(trade.id),
                format!("Sold {} {} @ {}", trade.quantity, trade.side, trade.price),
            )?;
        }

        debug!(trade_id = %trade.id, %buyer, %seller, total = %trade.total, "trade booked");
        Ok(())
    }

    /// Credits a settlement payout and returns the new balance.
    pub fn credit_payout(&mut self, user_id: Uuid, market_id: Uuid, amount: Decimal) -> LedgerResult<Decimal> {
        if self.is_exempt(user_id) {
            return Ok(Decimal::ZERO);
        }
        if amount == Decimal::ZERO {
            return self.balance(user_id).ok_or(LedgerError::AccountNotFound(user_id));
        }
        self.credit(
            user_id,
            amount,
            EntryKind::MarketPayout,
            Some(market_id),
            format!("Market payout {}", amount),
        )
    }

    /// Returns the cost basis of a position to its owner and empties it. Realized P&L is kept.
    ///
    /// # Returns
    /// The amount refunded, zero when there is no position or it cost nothing
    ///
    /// # Errors
    /// Returns `AccountNotFound` when the owner has no account; the position is left as it was
    pub fn refund_position(&mut self, user_id: Uuid, market_id: Uuid) -> LedgerResult<Decimal> {
        if self.is_exempt(user_id) {
            return Ok(Decimal::ZERO);
        }
        let Some(position) = self.position(user_id, market_id) else {
            return Ok(Decimal::ZERO);
        };
        let amount = position.yes_cost_basis + position.no_cost_basis;
        if amount > Decimal::ZERO {
            self.credit(
                user_id,
                amount,
                EntryKind::Refund,
                Some(market_id),
                format!("Refund for deleted market {}", market_id),
            )?;
        }
        self.position_mut(user_id, market_id).clear_holdings();
        Ok(amount)
    }

    fn credit(
        &mut self,
        user_id: Uuid,
        amount: Decimal,
        kind: EntryKind,
        reference_id: Option<Uuid>,
        description: String,
    ) -> LedgerResult<Decimal> {
        self.post(user_id, amount, kind, reference_id, description)
    }

    fn debit(
        &mut self,
        user_id: Uuid,
        amount: Decimal,
        kind: EntryKind,
        reference_id: Option<Uuid>,
        description: String,
    ) -> LedgerResult<Decimal> {
        self.post(user_id, -amount, kind, reference_id, description)
    }

    fn post(
        &mut self,
        user_id: Uuid,
        amount: Decimal,
        kind: EntryKind,
        reference_id: Option<Uuid>,
        description: String,
    ) -> LedgerResult<Decimal> {
        let balance = self
            .balances
            .get_mut(&user_id)
            .ok_or(LedgerError::AccountNotFound(user_id))?;
        *balance += amount;
        let balance_after = *balance;

        self.journal.push(LedgerEntry {
            id: Uuid::new_v4(),
            user_id,
            kind,
            amount,
            balance_after,
            reference_id,
            description,
            created_at: Utc::now(),
        });
        Ok(balance_after)
    }

    pub fn position(&self, user_id: Uuid, market_id: Uuid) -> Option<&Position> {
        self.positions.get(&(user_id, market_id))
    }

    pub(crate) fn position_mut(&mut self, user_id: Uuid, market_id: Uuid) -> &mut Position {
        self.positions
            .entry((user_id, market_id))
            .or_insert_with(|| Position::new(user_id, market_id))
    }

    pub fn positions_in_market(&self, market_id: Uuid) -> Vec<&Position> {
        self.positions
            .values()
            .filter(|p| p.market_id == market_id)
            .collect()
    }

    pub fn positions_for_user(&self, user_id: Uuid) -> Vec<&Position> {
        self.positions
            .values()
            .filter(|p| p.user_id == user_id)
            .collect()
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    /// The position valued at the given prices, `None` if the user never traded the market.
    pub fn position_summary(
        &self,
        user_id: Uuid,
        market_id: Uuid,
        yes_price: Decimal,
        no_price: Decimal,
    ) -> Option<PositionSummary> {
        self.position(user_id, market_id)
            .map(|p| PositionSummary::new(p.clone(), yes_price, no_price))
    }

    /// Journal entries of one account, newest first.
    pub fn journal(&self, user_id: Uuid) -> Vec<&LedgerEntry> {
        self.journal
            .iter()
            .rev()
            .filter(|e| e.user_id == user_id)
            .collect()
    }
}
