//! Core of a peer-to-peer book trading marketplace.
//!
//! Users list books ([`registry::BookRegistry`]), propose book-for-book swaps
//! and drive them through acceptance and dual confirmation
//! ([`service::TradeService`]), and talk to each other per trade
//! ([`messaging::MessageLog`]). Everything persists in one sled database.
use std::sync::Arc;

pub mod book;
pub mod config;
pub mod error;
pub mod identity;
pub mod message;
pub mod messaging;
pub mod registry;
pub mod service;
pub mod store;
pub mod trade;
pub mod types;
pub mod utils;

use config::MarketConfig;
use error::MarketResult;
use identity::{IdentityProvider, Principal};
use messaging::MessageLog;
use registry::BookRegistry;
use service::TradeService;
use store::Store;

/// The three services wired over one store.
#[derive(Debug, Clone)]
pub struct Marketplace {
    pub books: BookRegistry,
    pub trades: TradeService,
    pub messages: MessageLog,
    store: Store,
}

impl Marketplace {
    pub fn open(config: &MarketConfig) -> MarketResult<Self> {
        let db = config.open_db()?;
        Self::with_db(Arc::new(db), config.clone())
    }

    pub fn with_db(db: Arc<sled::Db>, config: MarketConfig) -> MarketResult<Self> {
        let store = Store::new(db)?;
        let books = BookRegistry::new(store.clone(), config);
        Ok(Self {
            trades: TradeService::new(store.clone(), books.clone()),
            messages: MessageLog::new(store.clone()),
            books,
            store,
        })
    }

    /// Resolve the caller, failing with `Unauthenticated` if there is none.
    pub fn authenticate(&self, provider: &dyn IdentityProvider) -> MarketResult<Principal> {
        identity::authenticate(provider)
    }

    pub fn flush(&self) -> MarketResult<()> {
        self.store.flush()
    }
}
