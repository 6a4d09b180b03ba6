//! Catalog listing: text filter and order.

use std::cmp::Reverse;

use serde::{Deserialize, Serialize};
use stockledger_core::Entity;

use crate::product::Product;

/// Case-insensitive substring match on `name` or `sku`.
///
/// An absent or empty query matches every product.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductFilter {
    #[serde(default)]
    pub query: Option<String>,
}

impl ProductFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn matching(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
        }
    }

    /// The effective query, `None` when it would match everything.
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref().filter(|q| !q.is_empty())
    }

    pub fn matches(&self, product: &Product) -> bool {
        let Some(query) = self.query() else {
            return true;
        };
        let needle = query.to_lowercase();
        product.name.to_lowercase().contains(&needle) || product.sku.to_lowercase().contains(&needle)
    }
}

/// Newest product (highest id) first.
pub fn sort_newest_first(products: &mut [Product]) {
    products.sort_by_key(|p| Reverse(p.id()));
}
