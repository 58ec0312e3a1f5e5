//! Runtime configuration and the fixed limits applied to user-supplied text.
use std::path::PathBuf;

use anyhow::Context;

pub const MAX_TITLE_LEN: usize = 200;
pub const MAX_AUTHOR_LEN: usize = 100;
pub const MAX_BOOK_DESCRIPTION_LEN: usize = 1000;
pub const MAX_TRADE_MESSAGE_LEN: usize = 500;
pub const MAX_MESSAGE_CONTENT_LEN: usize = 1000;

pub const DB_PATH_ENV: &str = "BOOK_TRADE_DB_PATH";
pub const TEMPORARY_ENV: &str = "BOOK_TRADE_TEMPORARY";
pub const PAGE_SIZE_ENV: &str = "BOOK_TRADE_PAGE_SIZE";

#[derive(Debug, Clone)]
pub struct MarketConfig {
    pub db_path: PathBuf,
    /// Delete the database when it is dropped.
    pub temporary: bool,
    pub flush_every_ms: Option<u64>,
    pub default_page_size: usize,
    pub max_page_size: usize,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("book-trade.db"),
            temporary: false,
            flush_every_ms: Some(500),
            default_page_size: 12,
            max_page_size: 100,
        }
    }
}

impl MarketConfig {
    pub fn with_path(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            ..Self::default()
        }
    }

    /// Defaults, overridden by any `BOOK_TRADE_*` variables that are set.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Some(path) = lookup(DB_PATH_ENV) {
            config.db_path = PathBuf::from(path);
        }
        if let Some(flag) = lookup(TEMPORARY_ENV) {
            config.temporary = flag
                .parse()
                .with_context(|| format!("{TEMPORARY_ENV} must be true or false, got '{flag}'"))?;
        }
        if let Some(size) = lookup(PAGE_SIZE_ENV) {
            let size: usize = size
                .parse()
                .with_context(|| format!("{PAGE_SIZE_ENV} must be a number, got '{size}'"))?;
            anyhow::ensure!(
                (1..=config.max_page_size).contains(&size),
                "{PAGE_SIZE_ENV} must be between 1 and {}",
                config.max_page_size
            );
            config.default_page_size = size;
        }

        Ok(config)
    }

    pub fn open_db(&self) -> sled::Result<sled::Db> {
        sled::Config::new()
            .path(&self.db_path)
            .temporary(self.temporary)
            .flush_every_ms(self.flush_every_ms)
            .open()
    }

    /// Clamp a requested page size into `[1, max_page_size]`.
    pub fn page_size(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size.max(1))
    }
}
