//! Configuration loading and representation.
//!
//! Values come from the process environment:
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `CUSTOMERHUB_DATABASE_URL` | unset | Postgres URL; unset selects the in-memory store |
//! | `CUSTOMERHUB_DB_MAX_CONNECTIONS` | `5` | Pool size for the Postgres store |

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

use customerhub_core::{DomainError, DomainResult};

use crate::store::{InMemoryCustomerStore, PageRequest, PostgresCustomerStore, Sort};

pub const DATABASE_URL_VAR: &str = "CUSTOMERHUB_DATABASE_URL";
pub const MAX_CONNECTIONS_VAR: &str = "CUSTOMERHUB_DB_MAX_CONNECTIONS";

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Where customers are stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub database_url: Option<String>,
    pub max_connections: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

impl StoreConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let database_url = lookup(DATABASE_URL_VAR).filter(|url| !url.trim().is_empty());
        let max_connections = match lookup(MAX_CONNECTIONS_VAR) {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .with_context(|| format!("{MAX_CONNECTIONS_VAR} must be a positive integer, got '{raw}'"))?,
            None => DEFAULT_MAX_CONNECTIONS,
        };
        anyhow::ensure!(max_connections > 0, "{MAX_CONNECTIONS_VAR} must be at least 1");

        Ok(Self {
            database_url,
            max_connections,
        })
    }
}

/// A store selected by [`StoreConfig`].
#[derive(Debug, Clone)]
pub enum ConfiguredStore {
    InMemory(InMemoryCustomerStore),
    Postgres(PostgresCustomerStore),
}

/// Open the configured store, connecting the Postgres pool if a URL is set.
pub async fn open_store(config: &StoreConfig) -> anyhow::Result<ConfiguredStore> {
    let Some(url) = config.database_url.as_deref() else {
        warn!(
            "{DATABASE_URL_VAR} is not set; customers are kept in memory and lost on exit"
        );
        return Ok(ConfiguredStore::InMemory(InMemoryCustomerStore::new()));
    };

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(url)
        .await
        .context("failed to connect to the customer database")?;

    info!(max_connections = config.max_connections, "connected customer database");
    Ok(ConfiguredStore::Postgres(PostgresCustomerStore::new(pool)))
}

/// Paging policy applied to raw list query parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagingPolicy {
    pub default_page_size: u32,
    pub max_page_size: u32,
    pub default_sort: Sort,
}

impl Default for PagingPolicy {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            max_page_size: 50,
            default_sort: Sort::default(),
        }
    }
}

impl PagingPolicy {
    /// Turn raw optional query values into a page request.
    ///
    /// A missing size takes the default, an oversized one is capped at the
    /// maximum. A zero size or an unknown sort is rejected.
    pub fn page_request(
        &self,
        page_number: Option<u32>,
        page_size: Option<u32>,
        sort: Option<&str>,
    ) -> DomainResult<PageRequest> {
        let page_size = match page_size {
            None => self.default_page_size,
            Some(0) => return Err(DomainError::validation("page size must be at least 1")),
            Some(size) => size.min(self.max_page_size),
        };
        let sort = match sort.map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => Sort::parse(raw)?,
            None => self.default_sort,
        };
        PageRequest::new(page_number.unwrap_or(0), page_size, sort)
    }
}
