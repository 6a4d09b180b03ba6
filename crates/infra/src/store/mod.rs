//! Durable record store boundary.
//!
//! `LedgerStore` is the storage contract the engine depends on: two record
//! collections (products, movements) with atomic insert, cascading delete and
//! compare-and-append. Backends: in-memory (tests/dev) and Postgres.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

use chrono::{DateTime, Utc};

use stockledger_catalog::{Product, ProductDraft, ProductFilter, ProductPatch};
use stockledger_core::ProductId;
use stockledger_ledger::{Movement, MovementDraft};

pub use in_memory::InMemoryLedgerStore;
pub use postgres::PostgresLedgerStore;
pub use r#trait::{LedgerStore, StoreError};

use crate::config::{Backend, LedgerConfig};

/// Backend chosen at startup from [`LedgerConfig`].
#[derive(Debug)]
pub enum ConfiguredStore {
    InMemory(InMemoryLedgerStore),
    Postgres(PostgresLedgerStore),
}

impl ConfiguredStore {
    /// Open the configured backend. Postgres connections are migrated before use.
    pub async fn open(config: &LedgerConfig) -> Result<Self, StoreError> {
        match config.backend {
            Backend::InMemory => Ok(Self::InMemory(InMemoryLedgerStore::with_balance_cache(
                config.cache_balances,
            ))),
            Backend::Postgres => {
                let database = config.database.as_ref().ok_or_else(|| {
                    StoreError::Unavailable("postgres backend selected without database settings".to_string())
                })?;
                let store = PostgresLedgerStore::connect(database).await?;
                store.migrate().await?;
                Ok(Self::Postgres(store))
            }
        }
    }

    fn inner(&self) -> &dyn LedgerStore {
        match self {
            ConfiguredStore::InMemory(s) => s,
            ConfiguredStore::Postgres(s) => s,
        }
    }
}

impl LedgerStore for ConfiguredStore {
    fn insert_product(&self, draft: &ProductDraft, at: DateTime<Utc>) -> Result<Product, StoreError> {
        self.inner().insert_product(draft, at)
    }

    fn update_product(
        &self,
        id: ProductId,
        patch: &ProductPatch,
        at: DateTime<Utc>,
    ) -> Result<Product, StoreError> {
        self.inner().update_product(id, patch, at)
    }

    fn delete_product(&self, id: ProductId) -> Result<(), StoreError> {
        self.inner().delete_product(id)
    }

    fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        self.inner().get_product(id)
    }

    fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        self.inner().list_products()
    }

    fn find_products(&self, filter: &ProductFilter) -> Result<Vec<Product>, StoreError> {
        self.inner().find_products(filter)
    }

    fn load_movements(&self, product_id: ProductId) -> Result<Vec<Movement>, StoreError> {
        self.inner().load_movements(product_id)
    }

    fn append_movement(&self, draft: &MovementDraft, at: DateTime<Utc>) -> Result<Movement, StoreError> {
        self.inner().append_movement(draft, at)
    }

    fn cached_balance(&self, product_id: ProductId) -> Result<Option<i64>, StoreError> {
        self.inner().cached_balance(product_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_opens_in_memory_store() {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .build()
            .unwrap();
        let store = rt.block_on(ConfiguredStore::open(&LedgerConfig::default())).unwrap();
        assert!(matches!(store, ConfiguredStore::InMemory(_)));
        assert_eq!(store.list_products(), Ok(vec![]));
    }

    #[test]
    fn postgres_without_settings_is_unavailable() {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .build()
            .unwrap();
        let config = LedgerConfig {
            backend: Backend::Postgres,
            database: None,
            cache_balances: false,
        };
        let err = rt.block_on(ConfiguredStore::open(&config)).unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }
}
