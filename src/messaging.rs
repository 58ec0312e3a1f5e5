//! Service layer API for per-trade message threads
use tracing::{debug, info, warn};

use crate::error::{MarketError, MarketResult};
use crate::identity::Principal;
use crate::message::Message;
use crate::store::Store;
use crate::trade::Trade;
use crate::types::{MessageId, TradeId, UserId};

#[derive(Debug, Clone)]
pub struct MessageLog {
    store: Store,
}

impl MessageLog {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    fn load_trade(&self, id: &TradeId) -> MarketResult<Trade> {
        self.store
            .get_trade(id)?
            .ok_or_else(|| MarketError::NotFound("trade".into()))
    }

    /// Append a message to a trade's thread. Only participants may send.
    pub fn send(
        &self,
        trade_id: &TradeId,
        sender: &UserId,
        content: impl Into<String>,
    ) -> MarketResult<Message> {
        let trade = self.load_trade(trade_id)?;
        if !trade.is_participant(sender) {
            warn!(trade = %trade_id, user = %sender, "send refused: not a participant");
            return Err(MarketError::Forbidden(
                "only participants may message in this trade".into(),
            ));
        }

        let message = Message::new(
            MessageId::generate()?,
            trade_id.clone(),
            sender.clone(),
            content,
        )?;
        self.store.append_message(&message)?;

        info!(trade = %trade_id, message = %message.id, sender = %sender, "message sent");
        Ok(message)
    }

    /// The thread of a trade, oldest first, as it stood before this read.
    ///
    /// When a participant reads, every unread message from the other
    /// participant is marked read in one batch. An admin reading a trade they
    /// are not part of changes nothing.
    pub fn list_for_trade(
        &self,
        trade_id: &TradeId,
        principal: &Principal,
    ) -> MarketResult<Vec<Message>> {
        let trade = self.load_trade(trade_id)?;
        if !trade.can_view(principal) {
            warn!(trade = %trade_id, user = %principal.id, "thread read refused");
            return Err(MarketError::Forbidden(
                "only participants may view these messages".into(),
            ));
        }

        let messages = self.store.messages_for_trade(trade_id)?;

        if let Some(counterpart) = trade.counterpart_of(&principal.id) {
            let incoming: Vec<Message> = messages
                .iter()
                .filter(|m| &m.sender == counterpart && !m.is_read)
                .cloned()
                .collect();
            let marked = self.store.mark_read(&incoming)?;
            debug!(trade = %trade_id, reader = %principal.id, marked, "marked messages read");
        }

        Ok(messages)
    }

    /// Unread messages addressed to `user` across all of their trades.
    pub fn unread_count_for_user(&self, user: &UserId) -> MarketResult<usize> {
        let mut count = 0;
        for trade in self.store.trades_for_user(user)? {
            count += self
                .store
                .messages_for_trade(trade.id())?
                .iter()
                .filter(|m| &m.sender != user && !m.is_read)
                .count();
        }
        Ok(count)
    }
}
