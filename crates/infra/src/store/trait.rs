use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use stockledger_catalog::{Product, ProductDraft, ProductFilter, ProductPatch};
use stockledger_core::{LedgerError, ProductId};
use stockledger_ledger::{Movement, MovementDraft};

/// Ledger store operation error.
///
/// `DuplicateSku`, `NotFound` and `InsufficientStock` are the store arbitrating
/// a client conflict (unique index, foreign key, compare-and-append). The other
/// variants are infrastructure faults; an operation that reports one has left
/// no trace.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("sku already exists: {0}")]
    DuplicateSku(String),

    #[error("append rejected: requested {requested}, available {available}")]
    InsufficientStock { requested: i64, available: i64 },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store fault: {0}")]
    Internal(String),
}

impl From<StoreError> for LedgerError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound => LedgerError::NotFound,
            StoreError::DuplicateSku(sku) => LedgerError::DuplicateSku(sku),
            StoreError::InsufficientStock {
                requested,
                available,
            } => LedgerError::InsufficientStock {
                requested,
                available,
            },
            StoreError::Unavailable(msg) => LedgerError::Unavailable(msg),
            StoreError::Internal(msg) => LedgerError::Internal(msg),
        }
    }
}

/// Durable home of the catalog and the movement log.
///
/// Two record collections: products, and movements referencing products with
/// cascading delete.
///
/// ## Implementation Requirements
///
/// Implementations must:
/// - assign product and movement ids monotonically (no reuse)
/// - reject a second live product with the same SKU (`DuplicateSku`)
/// - delete a product and all of its movements as one atomic step
/// - make `append_movement` an atomic compare-and-append: verify the product
///   is live, re-check an OUT against the balance folded from the log, and
///   insert, all without any other append on that product interleaving
/// - leave no partial record when an operation fails
pub trait LedgerStore: Send + Sync {
    fn insert_product(&self, draft: &ProductDraft, at: DateTime<Utc>) -> Result<Product, StoreError>;

    /// Apply a validated patch; `NotFound` if the product is absent.
    fn update_product(
        &self,
        id: ProductId,
        patch: &ProductPatch,
        at: DateTime<Utc>,
    ) -> Result<Product, StoreError>;

    /// Remove the product and its whole ledger; `NotFound` if absent.
    fn delete_product(&self, id: ProductId) -> Result<(), StoreError>;

    fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError>;

    /// Every live product, in no particular order.
    fn list_products(&self) -> Result<Vec<Product>, StoreError>;

    /// Live products kept by `filter`, in no particular order.
    ///
    /// Backends with a query engine push the match down.
    fn find_products(&self, filter: &ProductFilter) -> Result<Vec<Product>, StoreError> {
        let mut products = self.list_products()?;
        products.retain(|p| filter.matches(p));
        Ok(products)
    }

    /// Full movement log of a product in insertion order; `NotFound` if the
    /// product is absent.
    fn load_movements(&self, product_id: ProductId) -> Result<Vec<Movement>, StoreError>;

    /// Compare-and-append a validated movement.
    fn append_movement(&self, draft: &MovementDraft, at: DateTime<Utc>) -> Result<Movement, StoreError>;

    /// Running total kept alongside the log, if this backend keeps one.
    ///
    /// Never authoritative; only compared against the fold.
    fn cached_balance(&self, _product_id: ProductId) -> Result<Option<i64>, StoreError> {
        Ok(None)
    }
}

impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    fn insert_product(&self, draft: &ProductDraft, at: DateTime<Utc>) -> Result<Product, StoreError> {
        (**self).insert_product(draft, at)
    }

    fn update_product(
        &self,
        id: ProductId,
        patch: &ProductPatch,
        at: DateTime<Utc>,
    ) -> Result<Product, StoreError> {
        (**self).update_product(id, patch, at)
    }

    fn delete_product(&self, id: ProductId) -> Result<(), StoreError> {
        (**self).delete_product(id)
    }

    fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        (**self).get_product(id)
    }

    fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        (**self).list_products()
    }

    fn find_products(&self, filter: &ProductFilter) -> Result<Vec<Product>, StoreError> {
        (**self).find_products(filter)
    }

    fn load_movements(&self, product_id: ProductId) -> Result<Vec<Movement>, StoreError> {
        (**self).load_movements(product_id)
    }

    fn append_movement(&self, draft: &MovementDraft, at: DateTime<Utc>) -> Result<Movement, StoreError> {
        (**self).append_movement(draft, at)
    }

    fn cached_balance(&self, product_id: ProductId) -> Result<Option<i64>, StoreError> {
        (**self).cached_balance(product_id)
    }
}
