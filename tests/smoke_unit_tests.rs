//! Smoke Screen tests for the listing and messaging services
//!
//! These exercise the book registry, the message log and the marketplace
//! facade against a real sled database. They mostly cover the happy path
//! plus the authorization edges of each operation.

use std::sync::Arc;

use book_trade::{
    Marketplace,
    book::{BookDraft, BookQuery, BookUpdate},
    config::MarketConfig,
    error::{ErrorKind, MarketError},
    identity::Principal,
    types::{BookId, Condition, Genre, TradeId, UserId},
};
use tempfile::{TempDir, tempdir};

fn marketplace() -> (TempDir, Marketplace) {
    let temp_dir = tempdir().unwrap();
    let db = sled::open(temp_dir.path().join("smoke.db")).unwrap();
    let market = Marketplace::with_db(Arc::new(db), MarketConfig::default()).unwrap();
    (temp_dir, market)
}

fn draft(title: &str, genre: Genre, condition: Condition) -> BookDraft {
    BookDraft::new()
        .set_title(title)
        .set_author("Somebody")
        .set_genre(genre)
        .set_condition(condition)
}

// BOOK REGISTRY TESTS
#[cfg(test)]
mod registry_tests {
    use super::*;

    #[test]
    fn created_book_belongs_to_owner() {
        let (_dir, market) = marketplace();
        let owner = UserId::generate().unwrap();

        let book = market
            .books
            .create(&owner, draft("Beloved", Genre::Fiction, Condition::LikeNew))
            .unwrap();

        assert_eq!(market.books.owner_of(&book.id).unwrap(), owner);
        assert_eq!(market.books.list_by_owner(&owner).unwrap(), vec![book]);
    }

    #[test]
    fn get_does_not_count_views_but_view_does() {
        let (_dir, market) = marketplace();
        let owner = UserId::generate().unwrap();
        let book = market
            .books
            .create(&owner, draft("Beloved", Genre::Fiction, Condition::Good))
            .unwrap();

        market.books.get(&book.id).unwrap();
        assert_eq!(market.books.get(&book.id).unwrap().views, 0);

        market.books.view(&book.id).unwrap();
        let viewed = market.books.record_view(&book.id).unwrap();
        assert_eq!(viewed.views, 2);
    }

    #[test]
    fn view_of_missing_book_is_not_found() {
        let (_dir, market) = marketplace();
        let err = market.books.view(&BookId::generate().unwrap()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn only_owner_updates() {
        let (_dir, market) = marketplace();
        let owner = UserId::generate().unwrap();
        let other = UserId::generate().unwrap();
        let book = market
            .books
            .create(&owner, draft("Beloved", Genre::Fiction, Condition::Good))
            .unwrap();

        let err = market
            .books
            .update(&book.id, &other, BookUpdate::new().title("Mine now"))
            .unwrap_err();
        assert!(matches!(err, MarketError::Forbidden(_)));

        let updated = market
            .books
            .update(&book.id, &owner, BookUpdate::new().available(false))
            .unwrap();
        assert!(!updated.is_available);
        assert_eq!(updated.title, "Beloved");
    }

    #[test]
    fn only_owner_sets_availability() {
        let (_dir, market) = marketplace();
        let owner = UserId::generate().unwrap();
        let book = market
            .books
            .create(&owner, draft("Beloved", Genre::Fiction, Condition::Good))
            .unwrap();

        let other = UserId::generate().unwrap();
        assert!(market.books.set_availability(&book.id, &other, false).is_err());

        market.books.set_availability(&book.id, &owner, false).unwrap();
        assert!(!market.books.get(&book.id).unwrap().is_available);
    }

    #[test]
    fn changes_to_a_deleted_book_are_not_found() {
        let (_dir, market) = marketplace();
        let owner = UserId::generate().unwrap();
        let book = market
            .books
            .create(&owner, draft("Gone", Genre::Fiction, Condition::Good))
            .unwrap();
        market
            .books
            .delete(&book.id, &Principal::user(owner.clone()))
            .unwrap();

        let err = market.books.set_availability(&book.id, &owner, true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = market
            .books
            .update(&book.id, &owner, BookUpdate::new().title("Back"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn edits_keep_concurrent_views() {
        let (_dir, market) = marketplace();
        let owner = UserId::generate().unwrap();
        let book = market
            .books
            .create(&owner, draft("Popular", Genre::Fiction, Condition::Good))
            .unwrap();

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..50 {
                        market.books.view(&book.id).unwrap();
                    }
                });
            }
            s.spawn(|| {
                for i in 0..50 {
                    let edit = BookUpdate::new().description(format!("edit {i}"));
                    market.books.update(&book.id, &owner, edit).unwrap();
                }
            });
        });

        assert_eq!(market.books.get(&book.id).unwrap().views, 200);
    }

    #[test]
    fn owner_or_admin_deletes() {
        let (_dir, market) = marketplace();
        let owner = UserId::generate().unwrap();
        let a = market
            .books
            .create(&owner, draft("A", Genre::Poetry, Condition::Good))
            .unwrap();
        let b = market
            .books
            .create(&owner, draft("B", Genre::Poetry, Condition::Good))
            .unwrap();

        let stranger = Principal::user(UserId::generate().unwrap());
        assert!(matches!(
            market.books.delete(&a.id, &stranger),
            Err(MarketError::Forbidden(_))
        ));

        market.books.delete(&a.id, &Principal::user(owner.clone())).unwrap();
        market
            .books
            .delete(&b.id, &Principal::admin(UserId::generate().unwrap()))
            .unwrap();

        assert!(market.books.list_by_owner(&owner).unwrap().is_empty());
        assert_eq!(market.books.get(&a.id).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn browse_filters_and_paginates_available_books() {
        let (_dir, market) = marketplace();
        let owner = UserId::generate().unwrap();
        for i in 0..5 {
            market
                .books
                .create(&owner, draft(&format!("Fantasy {i}"), Genre::Fantasy, Condition::Good))
                .unwrap();
        }
        let hidden = market
            .books
            .create(&owner, draft("Hidden", Genre::Fantasy, Condition::Good))
            .unwrap();
        market.books.set_availability(&hidden.id, &owner, false).unwrap();
        market
            .books
            .create(&owner, draft("Other", Genre::History, Condition::Poor))
            .unwrap();

        let query = BookQuery::new().genre(Genre::Fantasy).limit(2);
        let first = market.books.browse(&query).unwrap();
        assert_eq!(first.total, 5);
        assert_eq!(first.pages, 3);
        assert_eq!(first.books.len(), 2);
        // newest first
        assert_eq!(first.books[0].title, "Fantasy 4");

        let last = market.books.browse(&query.clone().page(3)).unwrap();
        assert_eq!(last.books.len(), 1);
        assert_eq!(last.books[0].title, "Fantasy 0");

        let poor = market
            .books
            .browse(&BookQuery::new().condition(Condition::Poor))
            .unwrap();
        assert_eq!(poor.total, 1);
    }
}

// MESSAGE LOG TESTS
#[cfg(test)]
mod messaging_tests {
    use super::*;

    struct Thread {
        _dir: TempDir,
        market: Marketplace,
        alice: UserId,
        bob: UserId,
        trade: TradeId,
    }

    fn thread() -> Thread {
        let (dir, market) = marketplace();
        let alice = UserId::generate().unwrap();
        let bob = UserId::generate().unwrap();
        let x = market
            .books
            .create(&alice, draft("X", Genre::Mystery, Condition::Good))
            .unwrap();
        let y = market
            .books
            .create(&bob, draft("Y", Genre::Mystery, Condition::Good))
            .unwrap();
        let trade = market.trades.propose(&alice, &x.id, &y.id, "").unwrap();

        Thread {
            _dir: dir,
            market,
            alice,
            bob,
            trade: trade.id().clone(),
        }
    }

    #[test]
    fn participants_send_and_read_in_order() {
        let t = thread();
        t.market.messages.send(&t.trade, &t.alice, "hi").unwrap();
        t.market.messages.send(&t.trade, &t.bob, "hello").unwrap();
        t.market.messages.send(&t.trade, &t.alice, "deal?").unwrap();

        let messages = t
            .market
            .messages
            .list_for_trade(&t.trade, &Principal::user(t.alice.clone()))
            .unwrap();
        let contents: Vec<_> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["hi", "hello", "deal?"]);
    }

    #[test]
    fn outsiders_cannot_send_or_read() {
        let t = thread();
        let stranger = UserId::generate().unwrap();

        let err = t.market.messages.send(&t.trade, &stranger, "psst").unwrap_err();
        assert!(matches!(err, MarketError::Forbidden(_)));

        let err = t
            .market
            .messages
            .list_for_trade(&t.trade, &Principal::user(stranger))
            .unwrap_err();
        assert!(matches!(err, MarketError::Forbidden(_)));
    }

    #[test]
    fn sending_to_missing_trade_is_not_found() {
        let t = thread();
        let err = t
            .market
            .messages
            .send(&TradeId::generate().unwrap(), &t.alice, "hello?")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn reading_marks_only_the_counterparts_messages() {
        let t = thread();
        t.market.messages.send(&t.trade, &t.alice, "from alice").unwrap();
        t.market.messages.send(&t.trade, &t.bob, "from bob").unwrap();

        assert_eq!(t.market.messages.unread_count_for_user(&t.alice).unwrap(), 1);
        assert_eq!(t.market.messages.unread_count_for_user(&t.bob).unwrap(), 1);

        // bob reads: alice's message becomes read, bob's own stays unread
        t.market
            .messages
            .list_for_trade(&t.trade, &Principal::user(t.bob.clone()))
            .unwrap();

        assert_eq!(t.market.messages.unread_count_for_user(&t.bob).unwrap(), 0);
        assert_eq!(t.market.messages.unread_count_for_user(&t.alice).unwrap(), 1);

        let after = t
            .market
            .messages
            .list_for_trade(&t.trade, &Principal::user(t.alice.clone()))
            .unwrap();
        assert!(after[0].is_read);
        assert!(!after[1].is_read);
    }

    #[test]
    fn admin_reads_without_marking() {
        let t = thread();
        t.market.messages.send(&t.trade, &t.alice, "from alice").unwrap();

        let admin = Principal::admin(UserId::generate().unwrap());
        let messages = t.market.messages.list_for_trade(&t.trade, &admin).unwrap();

        assert_eq!(messages.len(), 1);
        assert_eq!(t.market.messages.unread_count_for_user(&t.bob).unwrap(), 1);
    }
}

// MARKETPLACE FACADE TESTS
#[cfg(test)]
mod marketplace_tests {
    use super::*;

    #[test]
    fn anonymous_callers_are_rejected() {
        let (_dir, market) = marketplace();
        let anonymous: Option<Principal> = None;

        let err = market.authenticate(&anonymous).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthenticated);
    }

    #[test]
    fn opens_from_config() {
        let temp_dir = tempdir().unwrap();
        let config = MarketConfig::with_path(temp_dir.path().join("configured.db"));

        let market = Marketplace::open(&config).unwrap();
        let owner = UserId::generate().unwrap();
        market
            .books
            .create(&owner, draft("Persisted", Genre::Other, Condition::Acceptable))
            .unwrap();
        market.flush().unwrap();

        assert_eq!(market.books.list_by_owner(&owner).unwrap().len(), 1);
    }
}
