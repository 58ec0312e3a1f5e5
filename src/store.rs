//! sled persistence for books, trades and messages.
//!
//! Every record is CBOR-encoded and stored in its own tree under its id.
//! Index trees map `head ‖ 0x00 ‖ …` keys back to record ids so that prefix
//! scans answer "books of an owner", "trades of a user", "messages of a
//! trade" and "pending trade for (requester, book)". Writes touching more
//! than one record or tree run in a single sled transaction.
use std::sync::Arc;

use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionResult,
    TransactionalTree,
};
use sled::{Batch, Transactional, Tree};

use crate::book::Book;
use crate::error::{MarketError, MarketResult};
use crate::message::Message;
use crate::trade::Trade;
use crate::types::{BookId, TimeStamp, TradeId, TradeStatus, UserId};
use crate::utils::{index_key, index_prefix};

const BOOKS_TREE: &str = "books";
const TRADES_TREE: &str = "trades";
const MESSAGES_TREE: &str = "messages";
const BOOKS_BY_OWNER_TREE: &str = "books_by_owner";
const TRADES_BY_USER_TREE: &str = "trades_by_user";
const PENDING_TRADES_TREE: &str = "pending_trades";
const MESSAGES_BY_TRADE_TREE: &str = "messages_by_trade";

pub type TxResult<T> = ConflictableTransactionResult<T, MarketError>;

#[derive(Debug, Clone)]
pub struct Store {
    db: Arc<sled::Db>,
    books: Tree,
    trades: Tree,
    messages: Tree,
    books_by_owner: Tree,
    trades_by_user: Tree,
    pending_trades: Tree,
    messages_by_trade: Tree,
}

/// Book access handed to a trade mutation running inside a transaction.
pub struct TradeTx<'a> {
    books: &'a TransactionalTree,
}

impl TradeTx<'_> {
    /// Mark a book unavailable, aborting if it already is. `label` names the
    /// book's role in the trade for the error message.
    pub fn lock_book(&self, id: &BookId, label: &str) -> TxResult<()> {
        let Some(bytes) = self.books.get(id.as_bytes())? else {
            return abort(MarketError::NotFound(format!("book {label}")));
        };
        let mut book: Book = tx_decode(&bytes)?;
        if !book.is_available {
            return abort(MarketError::InvalidOperation(format!(
                "{label} book not available"
            )));
        }
        book.is_available = false;
        book.updated_at = TimeStamp::new();
        self.books.insert(id.as_bytes(), tx_encode(&book)?)?;
        Ok(())
    }
}

impl Store {
    pub fn new(db: Arc<sled::Db>) -> MarketResult<Self> {
        Ok(Self {
            books: db.open_tree(BOOKS_TREE)?,
            trades: db.open_tree(TRADES_TREE)?,
            messages: db.open_tree(MESSAGES_TREE)?,
            books_by_owner: db.open_tree(BOOKS_BY_OWNER_TREE)?,
            trades_by_user: db.open_tree(TRADES_BY_USER_TREE)?,
            pending_trades: db.open_tree(PENDING_TRADES_TREE)?,
            messages_by_trade: db.open_tree(MESSAGES_BY_TRADE_TREE)?,
            db,
        })
    }

    pub fn flush(&self) -> MarketResult<()> {
        self.db.flush()?;
        Ok(())
    }

    // ---- books ----

    pub fn get_book(&self, id: &BookId) -> MarketResult<Option<Book>> {
        self.books
            .get(id.as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    pub fn insert_book(&self, book: &Book) -> MarketResult<()> {
        let encoded = encode(book)?;
        let owner_key = index_key(&[book.owner.as_bytes(), book.id.as_bytes()]);

        let res: TransactionResult<(), MarketError> = (&self.books, &self.books_by_owner)
            .transaction(|(books, by_owner)| {
                books.insert(book.id.as_bytes(), encoded.clone())?;
                by_owner.insert(owner_key.clone(), book.id.as_bytes())?;
                Ok(())
            });
        Ok(res?)
    }

    pub fn remove_book(&self, book: &Book) -> MarketResult<()> {
        let owner_key = index_key(&[book.owner.as_bytes(), book.id.as_bytes()]);

        let res: TransactionResult<(), MarketError> = (&self.books, &self.books_by_owner)
            .transaction(|(books, by_owner)| {
                books.remove(book.id.as_bytes())?;
                by_owner.remove(owner_key.clone())?;
                Ok(())
            });
        Ok(res?)
    }

    /// Read-modify-write a single book atomically. Returns `None` when the
    /// book does not exist. An error from `f` aborts without writing; `f` may
    /// run more than once when the transaction retries.
    pub fn update_book<F>(&self, id: &BookId, f: F) -> MarketResult<Option<Book>>
    where
        F: Fn(&mut Book) -> MarketResult<()>,
    {
        let res: TransactionResult<Option<Book>, MarketError> = self.books.transaction(|books| {
            let Some(bytes) = books.get(id.as_bytes())? else {
                return Ok(None);
            };
            let mut book: Book = tx_decode(&bytes)?;
            f(&mut book).map_err(ConflictableTransactionError::Abort)?;
            books.insert(id.as_bytes(), tx_encode(&book)?)?;
            Ok(Some(book))
        });
        Ok(res?)
    }

    pub fn books_by_owner(&self, owner: &UserId) -> MarketResult<Vec<Book>> {
        let mut books = Vec::new();
        for entry in self.books_by_owner.scan_prefix(index_prefix(owner.as_bytes())) {
            let (_, book_id) = entry?;
            if let Some(bytes) = self.books.get(&book_id)? {
                books.push(decode(&bytes)?);
            }
        }
        Ok(books)
    }

    pub fn all_books(&self) -> MarketResult<Vec<Book>> {
        self.books
            .iter()
            .values()
            .map(|bytes| decode(&bytes?))
            .collect()
    }

    // ---- trades ----

    pub fn get_trade(&self, id: &TradeId) -> MarketResult<Option<Trade>> {
        self.trades
            .get(id.as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    /// Store a freshly proposed trade. Fails with `Conflict` if the requester
    /// already has a pending trade for the same book, and re-checks that both
    /// books are still available as of the commit.
    pub fn insert_pending_trade(&self, trade: &Trade) -> MarketResult<()> {
        let encoded = encode(trade)?;
        let pair_key = pending_key(trade.requester(), trade.book_requested());
        let requester_key = index_key(&[trade.requester().as_bytes(), trade.id().as_bytes()]);
        let receiver_key = index_key(&[trade.receiver().as_bytes(), trade.id().as_bytes()]);

        let res: TransactionResult<(), MarketError> = (
            &self.books,
            &self.trades,
            &self.trades_by_user,
            &self.pending_trades,
        )
            .transaction(|(books, trades, by_user, pending)| {
                if pending.get(&pair_key)?.is_some() {
                    return abort(MarketError::Conflict(
                        "a pending trade for this book already exists".into(),
                    ));
                }
                for (id, label) in [
                    (trade.book_offered(), "offered"),
                    (trade.book_requested(), "requested"),
                ] {
                    let Some(bytes) = books.get(id.as_bytes())? else {
                        return abort(MarketError::NotFound(format!("book {label}")));
                    };
                    let book: Book = tx_decode(&bytes)?;
                    if !book.is_available {
                        return abort(MarketError::InvalidOperation(format!(
                            "{label} book not available"
                        )));
                    }
                }

                trades.insert(trade.id().as_bytes(), encoded.clone())?;
                by_user.insert(requester_key.clone(), trade.id().as_bytes())?;
                by_user.insert(receiver_key.clone(), trade.id().as_bytes())?;
                pending.insert(pair_key.clone(), trade.id().as_bytes())?;
                Ok(())
            });
        Ok(res?)
    }

    /// Apply `f` to the stored trade inside one transaction with the books
    /// tree. The trade is re-read on every attempt, so concurrent mutations
    /// of the same trade serialize instead of overwriting each other. Leaving
    /// `pending` releases the (requester, book) slot.
    pub fn update_trade<F>(&self, id: &TradeId, f: F) -> MarketResult<Trade>
    where
        F: Fn(&mut Trade, &TradeTx<'_>) -> TxResult<()>,
    {
        let res: TransactionResult<Trade, MarketError> =
            (&self.books, &self.trades, &self.pending_trades).transaction(
                |(books, trades, pending)| {
                    let Some(bytes) = trades.get(id.as_bytes())? else {
                        return abort(MarketError::NotFound("trade".into()));
                    };
                    let mut trade: Trade = tx_decode(&bytes)?;
                    let was_pending = trade.status() == TradeStatus::Pending;

                    f(&mut trade, &TradeTx { books })?;

                    if was_pending && trade.status() != TradeStatus::Pending {
                        pending.remove(pending_key(trade.requester(), trade.book_requested()))?;
                    }
                    trades.insert(id.as_bytes(), tx_encode(&trade)?)?;
                    Ok(trade)
                },
            );
        Ok(res?)
    }

    /// Every trade in which `user` is requester or receiver.
    pub fn trades_for_user(&self, user: &UserId) -> MarketResult<Vec<Trade>> {
        let mut trades = Vec::new();
        for entry in self.trades_by_user.scan_prefix(index_prefix(user.as_bytes())) {
            let (_, trade_id) = entry?;
            if let Some(bytes) = self.trades.get(&trade_id)? {
                trades.push(decode(&bytes)?);
            }
        }
        Ok(trades)
    }

    #[cfg(test)]
    fn pending_trade_for(
        &self,
        requester: &UserId,
        book_requested: &BookId,
    ) -> MarketResult<Option<TradeId>> {
        Ok(self
            .pending_trades
            .get(pending_key(requester, book_requested))?
            .map(|id| TradeId::from(String::from_utf8_lossy(&id).into_owned())))
    }

    // ---- messages ----

    pub fn append_message(&self, message: &Message) -> MarketResult<()> {
        let encoded = encode(message)?;
        let thread_key = index_key(&[
            message.trade.as_bytes(),
            message.created_at.sort_key().as_slice(),
            message.id.as_bytes(),
        ]);

        let res: TransactionResult<(), MarketError> = (&self.messages, &self.messages_by_trade)
            .transaction(|(messages, by_trade)| {
                messages.insert(message.id.as_bytes(), encoded.clone())?;
                by_trade.insert(thread_key.clone(), message.id.as_bytes())?;
                Ok(())
            });
        Ok(res?)
    }

    /// Messages of a trade, oldest first.
    pub fn messages_for_trade(&self, trade: &TradeId) -> MarketResult<Vec<Message>> {
        let mut messages = Vec::new();
        for entry in self.messages_by_trade.scan_prefix(index_prefix(trade.as_bytes())) {
            let (_, message_id) = entry?;
            if let Some(bytes) = self.messages.get(&message_id)? {
                messages.push(decode(&bytes)?);
            }
        }
        Ok(messages)
    }

    /// Set `is_read` on all given messages in one batch.
    pub fn mark_read(&self, messages: &[Message]) -> MarketResult<usize> {
        let mut batch = Batch::default();
        let mut count = 0;
        for message in messages.iter().filter(|m| !m.is_read) {
            let read = Message {
                is_read: true,
                ..message.clone()
            };
            batch.insert(message.id.as_bytes(), encode(&read)?);
            count += 1;
        }
        self.messages.apply_batch(batch)?;
        Ok(count)
    }
}

fn pending_key(requester: &UserId, book_requested: &BookId) -> Vec<u8> {
    index_key(&[requester.as_bytes(), book_requested.as_bytes()])
}

fn encode<T: minicbor::Encode<()>>(value: &T) -> MarketResult<Vec<u8>> {
    Ok(minicbor::to_vec(value)?)
}

fn decode<T: for<'b> minicbor::Decode<'b, ()>>(bytes: &[u8]) -> MarketResult<T> {
    Ok(minicbor::decode(bytes)?)
}

fn tx_encode<T: minicbor::Encode<()>>(value: &T) -> TxResult<Vec<u8>> {
    encode(value).map_err(ConflictableTransactionError::Abort)
}

fn tx_decode<T: for<'b> minicbor::Decode<'b, ()>>(bytes: &[u8]) -> TxResult<T> {
    decode(bytes).map_err(ConflictableTransactionError::Abort)
}

fn abort<T>(err: MarketError) -> TxResult<T> {
    Err(ConflictableTransactionError::Abort(err))
}
