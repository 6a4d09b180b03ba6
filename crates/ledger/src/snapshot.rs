//! Stock snapshots: a product joined with its derived balance.

use serde::{Deserialize, Serialize};

use stockledger_catalog::{Product, ProductFilter};
use stockledger_core::ProductId;

/// Point-in-time stock view of one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockSnapshot {
    pub product: Product,
    pub min_stock: i64,
    pub current_balance: i64,
    pub below_minimum: bool,
}

impl StockSnapshot {
    pub fn new(product: Product, current_balance: i64) -> Self {
        let min_stock = product.min_stock;
        Self {
            product,
            min_stock,
            current_balance,
            below_minimum: current_balance < min_stock,
        }
    }

    pub fn product_id(&self) -> ProductId {
        self.product.id
    }
}

/// Filter for snapshot listings: the catalog name/SKU filter plus an at-risk
/// toggle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotFilter {
    #[serde(flatten)]
    pub products: ProductFilter,
    /// Keep only products whose balance is under their threshold.
    #[serde(default)]
    pub only_below_minimum: bool,
}

impl SnapshotFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn below_minimum() -> Self {
        Self {
            products: ProductFilter::all(),
            only_below_minimum: true,
        }
    }

    pub fn matching(query: impl Into<String>) -> Self {
        Self {
            products: ProductFilter::matching(query),
            only_below_minimum: false,
        }
    }

    pub fn keeps(&self, snapshot: &StockSnapshot) -> bool {
        self.products.matches(&snapshot.product)
            && (!self.only_below_minimum || snapshot.below_minimum)
    }
}

/// At-risk first: below-minimum entries, then name ascending (case-insensitive).
/// Equal names fall back to id so the order is total.
pub fn sort_snapshots(snapshots: &mut [StockSnapshot]) {
    snapshots.sort_by_cached_key(|s| {
        (
            !s.below_minimum,
            s.product.name.to_lowercase(),
            s.product.id,
        )
    });
}
