//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// Market registry and lifecycle: creation, closing, resolution with payout of every position, and
// the read models built on settled positions (leaderboard, per-user history).
//
// | Component                | Description                                                  |
// |--------------------------|--------------------------------------------------------------|
// | SettlementService        | Owns the markets, resolves them against the ledger           |
// | MarketSettlementSummary  | Totals and per-position detail of a resolution               |
// | PositionSettlement       | Payout and P&L of one position                               |
// | LeaderboardEntry         | Realized P&L summed over a user's positions                  |
// | MarketHistoryEntry       | A resolved market a user held a position in                  |
//--------------------------------------------------------------------------------------------------

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::{SettlementError, SettlementResult};
use crate::domain::models::types::{Market, MarketStatus, OutcomeSide, PAYOUT_PER_SHARE};
use crate::domain::services::ledger::{Ledger, LedgerError};
use crate::domain::services::matching_engine::MatchingEngine;

/// Payout and P&L of one settled position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSettlement {
    pub user_id: Uuid,
    pub market_id: Uuid,
    pub winning_shares: u64,
    pub losing_shares: u64,
    pub payout: Decimal,
    pub winning_cost_basis: Decimal,
    pub losing_cost_basis: Decimal,
    pub profit_loss: Decimal,
    pub new_balance: Decimal,
}

/// Result of resolving a market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSettlementSummary {
    pub market_id: Uuid,
    /// Winning contract.
    pub outcome: OutcomeSide,
    pub total_payout: Decimal,
    pub positions_settled: usize,
    /// Resting orders removed from the books.
    pub orders_cancelled: usize,
    pub results: Vec<PositionSettlement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub user_id: Uuid,
    pub total_pnl: Decimal,
    pub balance: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketHistoryEntry {
    pub market_id: Uuid,
    pub question: String,
    pub outcome: OutcomeSide,
    pub resolved_at: Option<DateTime<Utc>>,
    pub realized_pnl: Decimal,
}

/// Registry of markets and their settlement.
#[derive(Debug, Default)]
pub struct SettlementService {
    markets: HashMap<Uuid, Market>,
}

impl SettlementService {
    pub fn new() -> Self {
        Self {
            markets: HashMap::new(),
        }
    }

    /// Registers a new open market.
    pub fn create_market(&mut self, question: impl Into<String>) -> Market {
        let market = Market::new(question);
        info!(market_id = %market.id, question = %market.question, "market created");
        self.markets.insert(market.id, market.clone());
        market
    }

    /// Registers an existing market record, replacing any previous record with the same id.
    pub fn register_market(&mut self, market: Market) {
        self.markets.insert(market.id, market);
    }

    pub fn market(&self, market_id: Uuid) -> Option<&Market> {
        self.markets.get(&market_id)
    }

    pub fn markets(&self) -> impl Iterator<Item = &Market> {
        self.markets.values()
    }

    fn market_mut(&mut self, market_id: Uuid) -> SettlementResult<&mut Market> {
        self.markets
            .get_mut(&market_id)
            .ok_or(SettlementError::MarketNotFound(market_id))
    }

    /// Fails unless the market exists and accepts orders.
    pub fn ensure_open(&self, market_id: Uuid) -> SettlementResult<&Market> {
        let market = self
            .markets
            .get(&market_id)
            .ok_or(SettlementError::MarketNotFound(market_id))?;
        if !market.is_open() {
            return Err(SettlementError::MarketNotOpen(market_id));
        }
        Ok(market)
    }

    /// Halts trading: removes every resting order and marks the market closed.
    ///
    /// # Returns
    /// The number of resting orders removed
    ///
    /// # Errors
    /// * `MarketNotFound` - Unknown market
    /// * `MarketNotOpen` - The market is already closed or resolved
    pub fn close_market(&mut self, engine: &mut MatchingEngine, market_id: Uuid) -> SettlementResult<usize> {
        self.ensure_open(market_id)?;
        let cancelled = engine.cancel_market_orders(market_id).len();
        self.market_mut(market_id)?.status = MarketStatus::Closed;
        info!(%market_id, cancelled, "market closed");
        Ok(cancelled)
    }

    /// Takes a market out of service ahead of deletion. Open and closed markets end up closed;
    /// a resolved market is left untouched.
    ///
    /// # Errors
    /// * `MarketNotFound` - Unknown market
    /// * `AlreadyResolved` - Resolved markets keep their settlement record
    pub fn retire_market(&mut self, market_id: Uuid) -> SettlementResult<()> {
        let market = self.market_mut(market_id)?;
        if market.status == MarketStatus::Resolved {
            return Err(SettlementError::AlreadyResolved(market_id));
        }
        market.status = MarketStatus::Closed;
        info!(%market_id, "market retired");
        Ok(())
    }

    /// Resolves a market and settles every position in it.
    ///
    /// Resting orders are removed from the books first. Each position with shares receives
    /// `winning shares × 1` and realizes `(payout - winning cost) - losing cost`; both legs are
    /// then emptied while realized P&L is kept.
    ///
    /// # Errors
    /// * `MarketNotFound` - Unknown market
    /// * `AlreadyResolved` - Resolution is one-shot
    /// * `Ledger(AccountNotFound)` - A position belongs to a user without an account; nothing is
    ///   cancelled or paid
    pub fn resolve_market(
        &mut self,
        engine: &mut MatchingEngine,
        ledger: &mut Ledger,
        market_id: Uuid,
        outcome: bool,
    ) -> SettlementResult<MarketSettlementSummary> {
        let market = self.market_mut(market_id)?;
        if market.status == MarketStatus::Resolved {
            return Err(SettlementError::AlreadyResolved(market_id));
        }

        let winning = OutcomeSide::winning(outcome);
        let mut holders: Vec<Uuid> = ledger
            .positions_in_market(market_id)
            .into_iter()
            .filter(|p| !p.is_flat())
            .map(|p| p.user_id)
            .collect();
        holders.sort();
        if let Some(orphan) = holders
            .iter()
            .find(|u| !ledger.is_exempt(**u) && !ledger.has_account(**u))
        {
            return Err(LedgerError::AccountNotFound(*orphan).into());
        }

        let orders_cancelled = engine.cancel_market_orders(market_id).len();

        let mut results = Vec::with_capacity(holders.len());
        let mut total_payout = Decimal::ZERO;

        for user_id in holders {
            let Some(position) = ledger.position(user_id, market_id) else {
                continue;
            };
            let losing = winning.opposite();
            let winning_shares = position.shares(winning);
            let losing_shares = position.shares(losing);
            let winning_cost_basis = position.cost_basis(winning);
            let losing_cost_basis = position.cost_basis(losing);

            let payout = Decimal::from(winning_shares) * PAYOUT_PER_SHARE;
            let profit_loss = (payout - winning_cost_basis) + (Decimal::ZERO - losing_cost_basis);

            // holdings are only cleared once the payout has been credited
            let new_balance = ledger.credit_payout(user_id, market_id, payout)?;
            let position = ledger.position_mut(user_id, market_id);
            position.realized_pnl += profit_loss;
            position.clear_holdings();
            total_payout += payout;

            results.push(PositionSettlement {
                user_id,
                market_id,
                winning_shares,
                losing_shares,
                payout,
                winning_cost_basis,
                losing_cost_basis,
                profit_loss,
                new_balance,
            });
        }

        let market = self.market_mut(market_id)?;
        market.status = MarketStatus::Resolved;
        market.resolved_outcome = Some(outcome);
        market.resolved_at = Some(Utc::now());

        info!(
            %market_id,
            outcome = %winning,
            %total_payout,
            positions = results.len(),
            orders_cancelled,
            "market resolved"
        );

        Ok(MarketSettlementSummary {
            market_id,
            outcome: winning,
            total_payout,
            positions_settled: results.len(),
            orders_cancelled,
            results,
        })
    }

    /// Users ranked by realized P&L summed over all their positions, best first.
    pub fn leaderboard(&self, ledger: &Ledger, limit: usize) -> Vec<LeaderboardEntry> {
        let mut totals: HashMap<Uuid, Decimal> = HashMap::new();
        for position in ledger.positions() {
            *totals.entry(position.user_id).or_default() += position.realized_pnl;
        }

        let mut entries: Vec<LeaderboardEntry> = totals
            .into_iter()
            .filter_map(|(user_id, total_pnl)| {
                ledger.balance(user_id).map(|balance| LeaderboardEntry {
                    user_id,
                    total_pnl,
                    balance,
                })
            })
            .collect();
        entries.sort_by(|a, b| b.total_pnl.cmp(&a.total_pnl).then(a.user_id.cmp(&b.user_id)));
        entries.truncate(limit);
        entries
    }

    /// Resolved markets the user held a position in, most recently resolved first.
    pub fn user_history(&self, ledger: &Ledger, user_id: Uuid) -> Vec<MarketHistoryEntry> {
        let mut history: Vec<MarketHistoryEntry> = ledger
            .positions_for_user(user_id)
            .into_iter()
            .filter_map(|position| {
                let market = self.markets.get(&position.market_id)?;
                let outcome = market.resolved_outcome.filter(|_| market.status == MarketStatus::Resolved)?;
                Some(MarketHistoryEntry {
                    market_id: market.id,
                    question: market.question.clone(),
                    outcome: OutcomeSide::winning(outcome),
                    resolved_at: market.resolved_at,
                    realized_pnl: position.realized_pnl,
                })
            })
            .collect();
        history.sort_by(|a, b| b.resolved_at.cmp(&a.resolved_at));
        history
    }
}

//--------------------------------------------------------------------------------------------------
// TESTS
//--------------------------------------------------------------------------------------------------
// | Name                                | Description                                          |
// |-------------------------------------|------------------------------------------------------|
// | test_resolve_pays_winning_shares    | Payout, P&L and zeroing for a mixed position         |
// | test_resolve_errors                 | Unknown and double resolution                        |
// | test_resolve_cancels_resting_orders | Books emptied on resolution                          |
// | test_close_market                   | Open -> Closed, second close rejected                |
// | test_resolve_without_account        | Orphaned position aborts before anything is paid     |
// | test_retire_market                  | Closed on retire, resolved markets rejected          |
// | test_leaderboard_and_history        | Ranking and history after resolution                 |
// | prop_settlement_conserves_payout    | Total payout equals winning shares                   |
//--------------------------------------------------------------------------------------------------
