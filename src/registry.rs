//! Service layer API for book listings
use std::cmp::Reverse;

use tracing::{debug, info, warn};

use crate::book::{Book, BookDraft, BookPage, BookQuery, BookUpdate};
use crate::config::MarketConfig;
use crate::error::{MarketError, MarketResult};
use crate::identity::Principal;
use crate::store::Store;
use crate::types::{BookId, TimeStamp, UserId};

#[derive(Debug, Clone)]
pub struct BookRegistry {
    store: Store,
    config: MarketConfig,
}

impl BookRegistry {
    pub fn new(store: Store, config: MarketConfig) -> Self {
        Self { store, config }
    }

    /// List a new book for `owner`.
    pub fn create(&self, owner: &UserId, draft: BookDraft) -> MarketResult<Book> {
        let book = draft.validate_and_finalise(BookId::generate()?, owner.clone())?;
        self.store.insert_book(&book)?;

        info!(book = %book.id, owner = %owner, title = %book.title, "book listed");
        Ok(book)
    }

    /// Fetch a book without side effects.
    pub fn get(&self, id: &BookId) -> MarketResult<Book> {
        self.find(id)?
            .ok_or_else(|| MarketError::NotFound(format!("book {id}")))
    }

    pub fn find(&self, id: &BookId) -> MarketResult<Option<Book>> {
        self.store.get_book(id)
    }

    /// Count one view of a book and return it as it stands after the count.
    /// Every call counts; there is no per-viewer dedup.
    pub fn record_view(&self, id: &BookId) -> MarketResult<Book> {
        let book = self
            .store
            .update_book(id, |book| {
                book.views += 1;
                Ok(())
            })?
            .ok_or_else(|| MarketError::NotFound(format!("book {id}")))?;

        debug!(book = %id, views = book.views, "book viewed");
        Ok(book)
    }

    /// The read path used when a client opens a listing: records the view.
    pub fn view(&self, id: &BookId) -> MarketResult<Book> {
        self.record_view(id)
    }

    pub fn owner_of(&self, id: &BookId) -> MarketResult<UserId> {
        Ok(self.get(id)?.owner)
    }

    /// Apply an owner's edit. Only the owner may edit, including the manual
    /// availability toggle. The edit lands on the stored record as of the
    /// commit, so a trade lock or a view counted meanwhile is kept.
    pub fn update(&self, id: &BookId, editor: &UserId, update: BookUpdate) -> MarketResult<Book> {
        let book = self
            .store
            .update_book(id, |book| {
                ensure_owner(book, editor, "only the owner may update this book")?;
                update.clone().apply(book)
            })
            .inspect_err(|e| refused(id, editor, e, "edit refused"))?
            .ok_or_else(|| MarketError::NotFound(format!("book {id}")))?;

        info!(book = %id, available = book.is_available, "book updated");
        Ok(book)
    }

    /// Owner-initiated availability change. The trade engine locks books
    /// through its own transaction rather than through this call.
    pub fn set_availability(&self, id: &BookId, owner: &UserId, value: bool) -> MarketResult<()> {
        self.store
            .update_book(id, |book| {
                ensure_owner(book, owner, "only the owner may change availability")?;
                book.is_available = value;
                book.updated_at = TimeStamp::new();
                Ok(())
            })
            .inspect_err(|e| refused(id, owner, e, "availability change refused"))?
            .ok_or_else(|| MarketError::NotFound(format!("book {id}")))?;

        info!(book = %id, available = value, "availability set");
        Ok(())
    }

    /// Remove a listing. Owners may delete their own books, admins any book.
    pub fn delete(&self, id: &BookId, principal: &Principal) -> MarketResult<()> {
        let book = self.get(id)?;
        if !book.is_owned_by(&principal.id) && !principal.is_admin() {
            warn!(book = %id, user = %principal.id, "delete refused");
            return Err(MarketError::Forbidden(
                "only the owner or an admin may delete this book".into(),
            ));
        }

        self.store.remove_book(&book)?;

        info!(book = %id, by = %principal.id, "book removed");
        Ok(())
    }

    /// All books of `owner`, newest first.
    pub fn list_by_owner(&self, owner: &UserId) -> MarketResult<Vec<Book>> {
        let mut books = self.store.books_by_owner(owner)?;
        books.sort_by_key(|b| Reverse(b.created_at.clone()));
        Ok(books)
    }

    /// One page of available books matching the query, newest first.
    pub fn browse(&self, query: &BookQuery) -> MarketResult<BookPage> {
        let limit = self.config.page_size(query.limit);
        let page = query.page.max(1);

        let mut books: Vec<Book> = self
            .store
            .all_books()?
            .into_iter()
            .filter(|b| b.matches(query))
            .collect();
        books.sort_by_key(|b| Reverse(b.created_at.clone()));

        let total = books.len();
        let books = books
            .into_iter()
            .skip((page - 1).saturating_mul(limit))
            .take(limit)
            .collect();

        debug!(total, page, limit, "browsed books");
        Ok(BookPage {
            books,
            page,
            pages: total.div_ceil(limit),
            total,
        })
    }
}

fn ensure_owner(book: &Book, user: &UserId, reason: &str) -> MarketResult<()> {
    if book.is_owned_by(user) {
        Ok(())
    } else {
        Err(MarketError::Forbidden(reason.into()))
    }
}

fn refused(id: &BookId, user: &UserId, err: &MarketError, what: &str) {
    if let MarketError::Forbidden(_) = err {
        warn!(book = %id, user = %user, "{what}: not the owner");
    }
}
