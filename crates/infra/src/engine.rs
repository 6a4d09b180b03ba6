//! Stock engine: the catalog and ledger operations exposed to callers.
//!
//! ## Append Flow
//!
//! ```text
//! AppendMovement
//!   ↓
//! 1. Validate magnitude (> 0), before any storage access
//!   ↓
//! 2. Enter the product's exclusion scope
//!   ↓
//! 3. Load the product's log (NotFound if the product is gone) and fold the balance
//!   ↓
//! 4. Guard OUT against the balance (InsufficientStock)
//!   ↓
//! 5. Compare-and-append in the store (fresh id + server timestamp)
//!   ↓
//! 6. Leave the scope (guard drop, on every path)
//! ```
//!
//! The store re-checks the withdrawal atomically, so the guard in step 4 never
//! becomes the only line of defense against a negative balance.
//!
//! The engine never retries and never swallows a store error; every failure is
//! returned to the caller as a [`LedgerError`].

use tracing::{debug, instrument};

use stockledger_catalog::{CreateProduct, Product, ProductFilter, UpdateProduct, sort_newest_first};
use stockledger_core::{Clock, LedgerError, LedgerResult, ProductId, SystemClock};
use stockledger_ledger::{
    AppendMovement, BalanceAudit, Movement, SnapshotFilter, StockSnapshot, check_withdrawal,
    derive_balance, newest_first, sort_snapshots,
};

use crate::locks::ProductLocks;
use crate::store::LedgerStore;

/// Catalog + ledger engine over an explicit storage handle.
///
/// - `S`: ledger store implementation (`InMemoryLedgerStore`, `PostgresLedgerStore`, …)
/// - `C`: time source for server-assigned timestamps
///
/// Every operation is synchronous. From async code on a multi-thread tokio
/// runtime it may be called in place (waits and store IO go through
/// `block_in_place`); on a current-thread runtime use `spawn_blocking`.
#[derive(Debug)]
pub struct StockEngine<S, C = SystemClock> {
    store: S,
    locks: ProductLocks,
    clock: C,
}

impl<S> StockEngine<S, SystemClock> {
    pub fn new(store: S) -> Self {
        Self::with_clock(store, SystemClock)
    }
}

impl<S, C> StockEngine<S, C> {
    pub fn with_clock(store: S, clock: C) -> Self {
        Self {
            store,
            locks: ProductLocks::new(),
            clock,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }
}

impl<S, C> StockEngine<S, C>
where
    S: LedgerStore,
    C: Clock,
{
    // ---------------------------------------------------------------------
    // Catalog
    // ---------------------------------------------------------------------

    /// Create a product. `DuplicateSku` if another live product uses the SKU.
    #[instrument(skip(self, command), fields(sku = %command.sku.trim()))]
    pub fn create_product(&self, command: CreateProduct) -> LedgerResult<Product> {
        let draft = command.validate()?;
        let product = self.store.insert_product(&draft, self.clock.now())?;
        debug!(product_id = %product.id, "product created");
        Ok(product)
    }

    /// Apply the supplied fields; `sku` is never touched.
    #[instrument(skip(self, command), fields(product_id = %id))]
    pub fn update_product(&self, id: ProductId, command: UpdateProduct) -> LedgerResult<Product> {
        let patch = command.validate()?;
        let product = self.store.update_product(id, &patch, self.clock.now())?;
        debug!("product updated");
        Ok(product)
    }

    /// Delete a product together with its whole movement history.
    ///
    /// Runs inside the product's scope so no append can interleave with the
    /// cascade.
    #[instrument(skip(self), fields(product_id = %id))]
    pub fn delete_product(&self, id: ProductId) -> LedgerResult<()> {
        let _scope = self.locks.acquire(id)?;
        self.store.delete_product(id)?;
        debug!("product deleted with its ledger");
        Ok(())
    }

    pub fn get_product(&self, id: ProductId) -> LedgerResult<Product> {
        self.store.get_product(id)?.ok_or(LedgerError::NotFound)
    }

    /// Products whose name or SKU contains `filter`'s query (case-insensitive),
    /// newest first.
    pub fn list_products(&self, filter: &ProductFilter) -> LedgerResult<Vec<Product>> {
        let mut products = self.store.find_products(filter)?;
        sort_newest_first(&mut products);
        Ok(products)
    }

    // ---------------------------------------------------------------------
    // Ledger
    // ---------------------------------------------------------------------

    /// Validated, serialized append (see module docs).
    #[instrument(
        skip(self, command),
        fields(
            product_id = %command.product_id,
            kind = %command.kind,
            magnitude = command.magnitude
        )
    )]
    pub fn append_movement(&self, command: AppendMovement) -> LedgerResult<Movement> {
        let draft = command.validate()?;

        let _scope = self.locks.acquire(draft.product_id())?;

        let history = self.store.load_movements(draft.product_id())?;
        let balance = derive_balance(&history)?;
        check_withdrawal(balance, &draft)?;

        let movement = self.store.append_movement(&draft, self.clock.now())?;
        debug!(movement_id = %movement.id, balance_before = balance, "movement appended");
        Ok(movement)
    }

    /// Movement history, newest first (ties by descending id).
    pub fn list_movements(&self, product_id: ProductId) -> LedgerResult<Vec<Movement>> {
        let mut movements = self.store.load_movements(product_id)?;
        newest_first(&mut movements);
        Ok(movements)
    }

    /// Current balance, folded from the full log.
    pub fn balance(&self, product_id: ProductId) -> LedgerResult<i64> {
        let history = self.store.load_movements(product_id)?;
        derive_balance(&history)
    }

    pub fn stock_snapshot(&self, product_id: ProductId) -> LedgerResult<StockSnapshot> {
        let product = self.get_product(product_id)?;
        let balance = self.balance(product_id)?;
        Ok(StockSnapshot::new(product, balance))
    }

    /// Snapshots for every product kept by `filter`, at-risk first then by name.
    ///
    /// A product deleted while the listing runs is skipped.
    pub fn list_stock_snapshots(&self, filter: &SnapshotFilter) -> LedgerResult<Vec<StockSnapshot>> {
        let products = self.store.find_products(&filter.products)?;

        let mut snapshots = Vec::with_capacity(products.len());
        for product in products {
            let balance = match self.balance(product.id) {
                Ok(balance) => balance,
                Err(LedgerError::NotFound) => continue,
                Err(e) => return Err(e),
            };
            let snapshot = StockSnapshot::new(product, balance);
            if filter.keeps(&snapshot) {
                snapshots.push(snapshot);
            }
        }

        sort_snapshots(&mut snapshots);
        Ok(snapshots)
    }

    /// Compare the store's cached running total (if any) against the log.
    ///
    /// Runs inside the product's scope so no append lands between the two reads.
    pub fn audit_balance(&self, product_id: ProductId) -> LedgerResult<BalanceAudit> {
        let _scope = self.locks.acquire(product_id)?;
        let derived = self.balance(product_id)?;
        let cached = self.store.cached_balance(product_id)?;
        Ok(BalanceAudit::new(product_id, derived, cached))
    }
}
