//! Per-product exclusion scopes.
//!
//! The engine holds a product's scope across read-balance / validate / append
//! (and across delete), so two movements on the same product are strictly
//! ordered. Scopes for different products are independent; the registry mutex
//! is only held while marking or unmarking a product, never while the caller
//! works.
//!
//! ## Waiting inside a tokio runtime
//!
//! A scope holder backed by `PostgresLedgerStore` drives sqlx futures through
//! `block_in_place`. If waiters for the same product parked their worker
//! threads directly, a runtime with every worker parked could no longer make
//! progress on the holder's IO. So when the caller runs on a multi-thread
//! runtime, the wait itself goes through `block_in_place` and the worker's
//! other tasks move to a fresh thread. A current-thread runtime cannot do this;
//! call the engine from `spawn_blocking` there.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use tokio::runtime::{Handle, RuntimeFlavor};

use stockledger_core::{LedgerError, LedgerResult, ProductId};

type Registry = HashMap<ProductId, Arc<Condvar>>;

/// Registry of products currently inside an exclusion scope.
///
/// Each held product owns its own condvar, so a release only wakes waiters
/// for that product. Only held products are tracked, so the registry never
/// grows with the catalog.
#[derive(Debug, Default)]
pub struct ProductLocks {
    held: Mutex<Registry>,
}

impl ProductLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until `product_id` is free, then enter its scope.
    ///
    /// The scope is released when the returned guard drops, on every path.
    pub fn acquire(&self, product_id: ProductId) -> LedgerResult<ProductScope<'_>> {
        let mut held = self.registry()?;
        while let Some(released) = held.get(&product_id).cloned() {
            held = wait_for_release(&released, held)?;
        }
        held.insert(product_id, Arc::new(Condvar::new()));

        Ok(ProductScope {
            locks: self,
            product_id,
        })
    }

    /// Number of products currently inside a scope.
    pub fn held_count(&self) -> LedgerResult<usize> {
        Ok(self.registry()?.len())
    }

    fn registry(&self) -> LedgerResult<MutexGuard<'_, Registry>> {
        self.held
            .lock()
            .map_err(|_| LedgerError::internal("product lock registry poisoned"))
    }

    fn release(&self, product_id: ProductId) {
        // Must release even after a panic elsewhere poisoned the registry.
        let mut held = match self.held.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let released = held.remove(&product_id);
        drop(held);
        if let Some(released) = released {
            released.notify_all();
        }
    }
}

/// Park until `released` is signalled. Wakeups are only a hint; the caller
/// re-checks the registry.
fn wait_for_release<'a>(
    released: &Condvar,
    held: MutexGuard<'a, Registry>,
) -> LedgerResult<MutexGuard<'a, Registry>> {
    let wait = || {
        released
            .wait(held)
            .map_err(|_| LedgerError::internal("product lock registry poisoned"))
    };

    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(wait)
        }
        _ => wait(),
    }
}

/// RAII guard for one product's exclusion scope.
#[derive(Debug)]
#[must_use = "the scope is released as soon as the guard is dropped"]
pub struct ProductScope<'a> {
    locks: &'a ProductLocks,
    product_id: ProductId,
}

impl ProductScope<'_> {
    pub fn product_id(&self) -> ProductId {
        self.product_id
    }
}

impl Drop for ProductScope<'_> {
    fn drop(&mut self) {
        self.locks.release(self.product_id);
    }
}
