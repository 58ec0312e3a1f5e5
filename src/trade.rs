//! The trade record and its state machine.
//!
//! ```text
//! pending ──accept──▶ accepted ──(both confirmed)──▶ completed
//!    │ └──reject──▶ rejected
//!    └────cancel──▶ cancelled
//! ```
//!
//! Methods here only check and mutate the record. Persisting it, and locking
//! the two books on acceptance, is the job of [`crate::service::TradeService`].
use chrono::Utc;

use crate::book::Book;
use crate::config::MAX_TRADE_MESSAGE_LEN;
use crate::error::{MarketError, MarketResult};
use crate::identity::Principal;
use crate::types::{BookId, Decision, Party, TimeStamp, TradeId, TradeStatus, UserId};

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Trade {
    #[n(0)]
    id: TradeId,
    #[n(1)]
    requester: UserId,
    #[n(2)]
    receiver: UserId,
    #[n(3)]
    book_offered: BookId,
    #[n(4)]
    book_requested: BookId,
    #[n(5)]
    status: TradeStatus,
    #[n(6)]
    message: String,
    #[n(7)]
    requester_confirmed: bool,
    #[n(8)]
    receiver_confirmed: bool,
    #[n(9)]
    completed_at: Option<TimeStamp<Utc>>,
    #[n(10)]
    created_at: TimeStamp<Utc>,
    #[n(11)]
    updated_at: TimeStamp<Utc>,
}

impl Trade {
    /// Build a pending trade of `offered` for `requested`.
    ///
    /// Checks, in order: the requester owns the offered book, does not own the
    /// requested one, and both books are available. Existence of the books and
    /// uniqueness of the pending pair are checked against storage by the caller.
    pub fn propose(
        id: TradeId,
        requester: UserId,
        offered: &Book,
        requested: &Book,
        message: impl Into<String>,
    ) -> MarketResult<Self> {
        if !offered.is_owned_by(&requester) {
            return Err(MarketError::Forbidden("can only offer own books".into()));
        }
        if requested.is_owned_by(&requester) {
            return Err(MarketError::InvalidOperation(
                "cannot request own book".into(),
            ));
        }
        if !offered.is_available {
            return Err(MarketError::InvalidOperation(
                "offered book not available".into(),
            ));
        }
        if !requested.is_available {
            return Err(MarketError::InvalidOperation(
                "requested book not available".into(),
            ));
        }
        let message = message.into();
        if message.chars().count() > MAX_TRADE_MESSAGE_LEN {
            return Err(MarketError::Validation(format!(
                "trade message cannot exceed {MAX_TRADE_MESSAGE_LEN} characters"
            )));
        }

        let now = TimeStamp::new();
        Ok(Self {
            id,
            requester,
            receiver: requested.owner.clone(),
            book_offered: offered.id.clone(),
            book_requested: requested.id.clone(),
            status: TradeStatus::Pending,
            message,
            requester_confirmed: false,
            receiver_confirmed: false,
            completed_at: None,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    pub fn id(&self) -> &TradeId {
        &self.id
    }
    pub fn requester(&self) -> &UserId {
        &self.requester
    }
    pub fn receiver(&self) -> &UserId {
        &self.receiver
    }
    pub fn book_offered(&self) -> &BookId {
        &self.book_offered
    }
    pub fn book_requested(&self) -> &BookId {
        &self.book_requested
    }
    pub fn status(&self) -> TradeStatus {
        self.status
    }
    pub fn message(&self) -> &str {
        &self.message
    }
    pub fn requester_confirmed(&self) -> bool {
        self.requester_confirmed
    }
    pub fn receiver_confirmed(&self) -> bool {
        self.receiver_confirmed
    }
    pub fn completed_at(&self) -> Option<&TimeStamp<Utc>> {
        self.completed_at.as_ref()
    }
    pub fn created_at(&self) -> &TimeStamp<Utc> {
        &self.created_at
    }
    pub fn updated_at(&self) -> &TimeStamp<Utc> {
        &self.updated_at
    }

    pub fn party_of(&self, user: &UserId) -> Option<Party> {
        if &self.requester == user {
            Some(Party::Requester)
        } else if &self.receiver == user {
            Some(Party::Receiver)
        } else {
            None
        }
    }

    pub fn is_participant(&self, user: &UserId) -> bool {
        self.party_of(user).is_some()
    }

    /// Participants and admins may read a trade and its messages.
    pub fn can_view(&self, principal: &Principal) -> bool {
        principal.is_admin() || self.is_participant(&principal.id)
    }

    /// The participant who is not `user`.
    pub fn counterpart_of(&self, user: &UserId) -> Option<&UserId> {
        match self.party_of(user)? {
            Party::Requester => Some(&self.receiver),
            Party::Receiver => Some(&self.requester),
        }
    }

    pub fn decide(&mut self, user: &UserId, decision: Decision) -> MarketResult<()> {
        if user != &self.receiver {
            return Err(MarketError::Forbidden(
                "only receiver may accept or reject".into(),
            ));
        }
        self.expect_status(TradeStatus::Pending)?;

        self.status = match decision {
            Decision::Accept => TradeStatus::Accepted,
            Decision::Reject => TradeStatus::Rejected,
        };
        self.updated_at = TimeStamp::new();
        Ok(())
    }

    pub fn cancel(&mut self, user: &UserId) -> MarketResult<()> {
        if !self.is_participant(user) {
            return Err(MarketError::Forbidden(
                "only participants may cancel a trade".into(),
            ));
        }
        self.expect_status(TradeStatus::Pending)?;

        self.status = TradeStatus::Cancelled;
        self.updated_at = TimeStamp::new();
        Ok(())
    }

    /// Record receipt on behalf of `party`. `user` must be that party.
    pub fn confirm(&mut self, user: &UserId, party: Party) -> MarketResult<()> {
        match party {
            Party::Requester if user != &self.requester => {
                return Err(MarketError::Forbidden(
                    "only the requester may confirm as requester".into(),
                ));
            }
            Party::Receiver if user != &self.receiver => {
                return Err(MarketError::Forbidden(
                    "only the receiver may confirm as receiver".into(),
                ));
            }
            _ => {}
        }
        self.expect_status(TradeStatus::Accepted)?;

        match party {
            Party::Requester => self.requester_confirmed = true,
            Party::Receiver => self.receiver_confirmed = true,
        }
        self.updated_at = TimeStamp::new();
        Ok(())
    }

    /// Complete an accepted trade once both sides have confirmed. Must run
    /// after every mutation that can leave the trade `accepted`; returns
    /// whether this call completed it.
    pub fn settle(&mut self) -> bool {
        if self.status == TradeStatus::Accepted
            && self.requester_confirmed
            && self.receiver_confirmed
        {
            let now = TimeStamp::new();
            self.status = TradeStatus::Completed;
            self.completed_at = Some(now.clone());
            self.updated_at = now;
            return true;
        }
        false
    }

    fn expect_status(&self, expected: TradeStatus) -> MarketResult<()> {
        if self.status != expected {
            return Err(MarketError::InvalidOperation(format!(
                "trade is {}, not {}",
                self.status, expected
            )));
        }
        Ok(())
    }
}
