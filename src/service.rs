//! Service layer API for trade workflow operations
use std::cmp::Reverse;

use sled::transaction::ConflictableTransactionError;
use tracing::{debug, info, warn};

use crate::error::{MarketError, MarketResult};
use crate::identity::Principal;
use crate::registry::BookRegistry;
use crate::store::Store;
use crate::trade::Trade;
use crate::types::{BookId, Decision, Direction, Party, TradeId, TradeStatus, UserId};

/// Per-user trade counts. `total` covers the four counted states;
/// cancelled trades are left out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TradeStats {
    pub pending: usize,
    pub accepted: usize,
    pub completed: usize,
    pub rejected: usize,
    pub total: usize,
}

#[derive(Debug, Clone)]
pub struct TradeService {
    store: Store,
    books: BookRegistry,
}

impl TradeService {
    pub fn new(store: Store, books: BookRegistry) -> Self {
        Self { store, books }
    }

    /// Propose swapping `offered` (owned by the requester) for `requested`.
    pub fn propose(
        &self,
        requester: &UserId,
        offered: &BookId,
        requested: &BookId,
        message: impl Into<String>,
    ) -> MarketResult<Trade> {
        let offered_book = self
            .books
            .find(offered)?
            .ok_or_else(|| MarketError::NotFound("book offered".into()))?;
        let requested_book = self
            .books
            .find(requested)?
            .ok_or_else(|| MarketError::NotFound("book requested".into()))?;

        let trade = Trade::propose(
            TradeId::generate()?,
            requester.clone(),
            &offered_book,
            &requested_book,
            message,
        )
        .inspect_err(|e| warn!(user = %requester, error = %e, "trade proposal refused"))?;

        // Duplicate check and availability re-check commit atomically with the insert.
        self.store.insert_pending_trade(&trade)?;

        info!(
            trade = %trade.id(),
            requester = %trade.requester(),
            receiver = %trade.receiver(),
            "trade proposed"
        );
        Ok(trade)
    }

    /// The receiver accepts or rejects a pending trade. Accepting locks both
    /// books in the same transaction.
    pub fn decide(&self, id: &TradeId, user: &UserId, decision: Decision) -> MarketResult<Trade> {
        let trade = self
            .store
            .update_trade(id, |trade, tx| {
                trade
                    .decide(user, decision)
                    .map_err(ConflictableTransactionError::Abort)?;
                if trade.status() == TradeStatus::Accepted {
                    tx.lock_book(trade.book_offered(), "offered")?;
                    tx.lock_book(trade.book_requested(), "requested")?;
                }
                trade.settle();
                Ok(())
            })
            .inspect_err(|e| warn!(trade = %id, user = %user, error = %e, "decision refused"))?;

        info!(trade = %id, status = %trade.status(), "trade decided");
        Ok(trade)
    }

    pub fn accept(&self, id: &TradeId, user: &UserId) -> MarketResult<Trade> {
        self.decide(id, user, Decision::Accept)
    }

    pub fn reject(&self, id: &TradeId, user: &UserId) -> MarketResult<Trade> {
        self.decide(id, user, Decision::Reject)
    }

    /// Either participant withdraws a pending trade.
    pub fn cancel(&self, id: &TradeId, user: &UserId) -> MarketResult<Trade> {
        let trade = self
            .store
            .update_trade(id, |trade, _| {
                trade.cancel(user).map_err(ConflictableTransactionError::Abort)
            })
            .inspect_err(|e| warn!(trade = %id, user = %user, error = %e, "cancel refused"))?;

        info!(trade = %id, by = %user, "trade cancelled");
        Ok(trade)
    }

    /// A participant confirms receipt. The second confirmation, in either
    /// order, completes the trade.
    pub fn confirm(&self, id: &TradeId, user: &UserId, party: Party) -> MarketResult<Trade> {
        let trade = self
            .store
            .update_trade(id, |trade, _| {
                trade
                    .confirm(user, party)
                    .map_err(ConflictableTransactionError::Abort)?;
                trade.settle();
                Ok(())
            })
            .inspect_err(|e| warn!(trade = %id, user = %user, error = %e, "confirm refused"))?;

        info!(trade = %id, party = ?party, "receipt confirmed");
        if trade.status() == TradeStatus::Completed {
            info!(trade = %id, "trade completed");
        }
        Ok(trade)
    }

    /// Participants and admins may read a trade.
    pub fn get(&self, id: &TradeId, principal: &Principal) -> MarketResult<Trade> {
        let trade = self
            .store
            .get_trade(id)?
            .ok_or_else(|| MarketError::NotFound("trade".into()))?;

        if !trade.can_view(principal) {
            warn!(trade = %id, user = %principal.id, "trade read refused");
            return Err(MarketError::Forbidden(
                "only participants may view this trade".into(),
            ));
        }
        Ok(trade)
    }

    /// Trades of `user` in the given direction, most recently updated first.
    pub fn list_for_user(
        &self,
        user: &UserId,
        direction: Direction,
        status: Option<TradeStatus>,
    ) -> MarketResult<Vec<Trade>> {
        let mut trades: Vec<Trade> = self
            .store
            .trades_for_user(user)?
            .into_iter()
            .filter(|t| match direction {
                Direction::Incoming => t.receiver() == user,
                Direction::Outgoing => t.requester() == user,
                Direction::Both => true,
            })
            .filter(|t| status.is_none_or(|s| t.status() == s))
            .collect();
        trades.sort_by_key(|t| Reverse(t.updated_at().clone()));

        debug!(user = %user, count = trades.len(), "listed trades");
        Ok(trades)
    }

    pub fn stats_for_user(&self, user: &UserId) -> MarketResult<TradeStats> {
        let mut stats = TradeStats::default();
        for trade in self.store.trades_for_user(user)? {
            match trade.status() {
                TradeStatus::Pending => stats.pending += 1,
                TradeStatus::Accepted => stats.accepted += 1,
                TradeStatus::Completed => stats.completed += 1,
                TradeStatus::Rejected => stats.rejected += 1,
                TradeStatus::Cancelled => continue,
            }
            stats.total += 1;
        }
        Ok(stats)
    }
}
