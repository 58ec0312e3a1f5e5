//! Walks one swap from listing to completion against a throwaway database.
//!
//! Run with `RUST_LOG=debug` to see every state change the services log.

use anyhow::Context;
use book_trade::{
    Marketplace,
    book::{BookDraft, BookQuery},
    config::MarketConfig,
    identity::Principal,
    types::{Condition, Direction, Genre, Party, UserId},
};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = MarketConfig::from_env()?;
    config.temporary = true;
    let market = Marketplace::open(&config).context("failed to open marketplace")?;

    let alice = Principal::user(UserId::generate()?);
    let bob = Principal::user(UserId::generate()?);

    let dune = market.books.create(
        &alice.id,
        BookDraft::new()
            .set_title("Dune")
            .set_author("Frank Herbert")
            .set_genre(Genre::ScienceFiction)
            .set_condition(Condition::Good)
            .add_looking_for("Hyperion"),
    )?;
    let hyperion = market.books.create(
        &bob.id,
        BookDraft::new()
            .set_title("Hyperion")
            .set_author("Dan Simmons")
            .set_genre(Genre::ScienceFiction)
            .set_condition(Condition::LikeNew),
    )?;

    let page = market
        .books
        .browse(&BookQuery::new().genre(Genre::ScienceFiction))?;
    println!("{} science fiction books listed", page.total);

    // alice opens bob's listing, then proposes
    market.books.view(&hyperion.id)?;
    let trade = market
        .trades
        .propose(&alice.id, &dune.id, &hyperion.id, "Dune for Hyperion?")?;
    market
        .messages
        .send(trade.id(), &alice.id, "Happy to post it tomorrow")?;

    let incoming = market
        .trades
        .list_for_user(&bob.id, Direction::Incoming, None)?;
    println!("bob has {} incoming trade(s)", incoming.len());
    println!(
        "bob has {} unread message(s)",
        market.messages.unread_count_for_user(&bob.id)?
    );
    for message in market.messages.list_for_trade(trade.id(), &bob)? {
        println!("  {}: {}", message.sender, message.content);
    }

    market.trades.accept(trade.id(), &bob.id)?;
    market.trades.confirm(trade.id(), &bob.id, Party::Receiver)?;
    let trade = market
        .trades
        .confirm(trade.id(), &alice.id, Party::Requester)?;

    println!("trade {} is {}", trade.id(), trade.status());
    println!("stats for alice: {:?}", market.trades.stats_for_user(&alice.id)?);

    Ok(())
}
