use chrono::Utc;

use crate::config::MAX_MESSAGE_CONTENT_LEN;
use crate::error::{MarketError, MarketResult};
use crate::types::{MessageId, TimeStamp, TradeId, UserId};

// Messages are append-only; only `is_read` ever changes after creation.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Message {
    #[n(0)]
    pub id: MessageId,
    #[n(1)]
    pub trade: TradeId,
    #[n(2)]
    pub sender: UserId,
    #[n(3)]
    pub content: String,
    #[n(4)]
    pub is_read: bool,
    #[n(5)]
    pub created_at: TimeStamp<Utc>,
}

impl Message {
    pub fn new(
        id: MessageId,
        trade: TradeId,
        sender: UserId,
        content: impl Into<String>,
    ) -> MarketResult<Self> {
        let content = content.into().trim().to_owned();
        if content.is_empty() {
            return Err(MarketError::Validation("message content is required".into()));
        }
        if content.chars().count() > MAX_MESSAGE_CONTENT_LEN {
            return Err(MarketError::Validation(format!(
                "message cannot exceed {MAX_MESSAGE_CONTENT_LEN} characters"
            )));
        }

        Ok(Self {
            id,
            trade,
            sender,
            content,
            is_read: false,
            created_at: TimeStamp::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> (MessageId, TradeId, UserId) {
        (
            MessageId::generate().unwrap(),
            TradeId::generate().unwrap(),
            UserId::generate().unwrap(),
        )
    }

    #[test]
    fn new_message_is_unread() {
        let (id, trade, sender) = ids();
        let msg = Message::new(id, trade, sender, " meet at the library? ").unwrap();

        assert!(!msg.is_read);
        assert_eq!(msg.content, "meet at the library?");
    }

    #[test]
    fn blank_and_oversized_content_is_rejected() {
        let (id, trade, sender) = ids();
        assert!(Message::new(id.clone(), trade.clone(), sender.clone(), "   ").is_err());

        let long = "a".repeat(MAX_MESSAGE_CONTENT_LEN + 1);
        assert!(Message::new(id, trade, sender, long).is_err());
    }
}
