use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use stockledger_catalog::{Product, ProductDraft, ProductPatch};
use stockledger_core::{LedgerError, MovementId, ProductId};
use stockledger_ledger::{Movement, MovementDraft, balance_after, derive_balance};

use super::r#trait::{LedgerStore, StoreError};

#[derive(Debug, Default)]
struct Tables {
    products: HashMap<ProductId, Product>,
    /// Unique index over live SKUs.
    skus: HashMap<String, ProductId>,
    /// Per-product logs in insertion order.
    movements: HashMap<ProductId, Vec<Movement>>,
    /// Running totals, maintained in the same critical section as each append.
    balances: HashMap<ProductId, i64>,
    last_product_id: u64,
    last_movement_id: u64,
}

impl Tables {
    fn log(&self, product_id: ProductId) -> &[Movement] {
        self.movements
            .get(&product_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// In-memory ledger store.
///
/// Intended for tests/dev. Every operation runs under one table lock, which
/// makes delete-with-cascade and compare-and-append trivially atomic.
#[derive(Debug)]
pub struct InMemoryLedgerStore {
    tables: RwLock<Tables>,
    cache_balances: bool,
}

impl Default for InMemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedgerStore {
    /// Store that also keeps cached running totals.
    pub fn new() -> Self {
        Self::with_balance_cache(true)
    }

    pub fn with_balance_cache(cache_balances: bool) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            cache_balances,
        }
    }

    /// Recompute every cached running total from the movement log.
    ///
    /// Returns how many cached totals disagreed with the log before the rebuild.
    pub fn rebuild_balance_cache(&self) -> Result<usize, StoreError> {
        let mut tables = self.write()?;
        if !self.cache_balances {
            return Ok(0);
        }

        let mut rebuilt = HashMap::with_capacity(tables.products.len());
        for id in tables.products.keys() {
            let derived = derive_balance(tables.log(*id)).map_err(ledger_fault)?;
            rebuilt.insert(*id, derived);
        }

        let drifted = rebuilt
            .iter()
            .filter(|&(id, derived)| tables.balances.get(id) != Some(derived))
            .count();
        tables.balances = rebuilt;
        Ok(drifted)
    }

    /// Overwrite a cached total. Only for exercising the audit path in tests.
    #[cfg(test)]
    pub(crate) fn corrupt_cached_balance(&self, product_id: ProductId, value: i64) {
        if let Ok(mut tables) = self.tables.write() {
            tables.balances.insert(product_id, value);
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::Internal("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::Internal("lock poisoned".to_string()))
    }
}

/// A ledger rule failing inside the store is a store fault. Keeps the original
/// message instead of re-wrapping its display form.
fn ledger_fault(err: LedgerError) -> StoreError {
    match err {
        LedgerError::Internal(msg) => StoreError::Internal(msg),
        other => StoreError::Internal(other.to_string()),
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn insert_product(&self, draft: &ProductDraft, at: DateTime<Utc>) -> Result<Product, StoreError> {
        let mut tables = self.write()?;

        if tables.skus.contains_key(draft.sku()) {
            return Err(StoreError::DuplicateSku(draft.sku().to_string()));
        }

        tables.last_product_id += 1;
        let id = ProductId::new(tables.last_product_id);
        let product = Product::from_draft(id, draft, at);

        tables.skus.insert(product.sku.clone(), id);
        tables.products.insert(id, product.clone());
        if self.cache_balances {
            tables.balances.insert(id, 0);
        }

        Ok(product)
    }

    fn update_product(
        &self,
        id: ProductId,
        patch: &ProductPatch,
        at: DateTime<Utc>,
    ) -> Result<Product, StoreError> {
        let mut tables = self.write()?;
        let product = tables.products.get_mut(&id).ok_or(StoreError::NotFound)?;
        patch.apply_to(product, at);
        Ok(product.clone())
    }

    fn delete_product(&self, id: ProductId) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        let product = tables.products.remove(&id).ok_or(StoreError::NotFound)?;

        // Cascade: the ledger is owned by the product.
        tables.skus.remove(&product.sku);
        tables.movements.remove(&id);
        tables.balances.remove(&id);
        Ok(())
    }

    fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        Ok(self.read()?.products.get(&id).cloned())
    }

    fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        Ok(self.read()?.products.values().cloned().collect())
    }

    fn load_movements(&self, product_id: ProductId) -> Result<Vec<Movement>, StoreError> {
        let tables = self.read()?;
        if !tables.products.contains_key(&product_id) {
            return Err(StoreError::NotFound);
        }
        Ok(tables.log(product_id).to_vec())
    }

    fn append_movement(&self, draft: &MovementDraft, at: DateTime<Utc>) -> Result<Movement, StoreError> {
        let mut tables = self.write()?;
        let product_id = draft.product_id();
        if !tables.products.contains_key(&product_id) {
            return Err(StoreError::NotFound);
        }

        // Compare against the log, not the cache.
        let current = derive_balance(tables.log(product_id)).map_err(ledger_fault)?;
        let next = balance_after(current, draft).map_err(|e| match e {
            LedgerError::InsufficientStock {
                requested,
                available,
            } => StoreError::InsufficientStock {
                requested,
                available,
            },
            other => ledger_fault(other),
        })?;

        tables.last_movement_id += 1;
        let movement = Movement::from_draft(MovementId::new(tables.last_movement_id), draft, at);
        tables
            .movements
            .entry(product_id)
            .or_default()
            .push(movement.clone());
        if self.cache_balances {
            tables.balances.insert(product_id, next);
        }

        Ok(movement)
    }

    fn cached_balance(&self, product_id: ProductId) -> Result<Option<i64>, StoreError> {
        if !self.cache_balances {
            return Ok(None);
        }
        Ok(self.read()?.balances.get(&product_id).copied())
    }
}
