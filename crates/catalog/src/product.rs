use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{Entity, LedgerError, LedgerResult, ProductId};

pub const MAX_SKU_LEN: usize = 64;
pub const MAX_NAME_LEN: usize = 255;
pub const MAX_UNIT_LEN: usize = 16;
pub const DEFAULT_UNIT: &str = "un";

/// A trackable catalog item.
///
/// `id`, `sku` and `created_at` never change after creation. The descriptive
/// fields change only through [`ProductPatch::apply_to`], which also bumps
/// `updated_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub sku: String,
    pub name: String,
    pub unit: String,
    pub min_stock: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Materialize a validated draft once the store has assigned an id.
    pub fn from_draft(id: ProductId, draft: &ProductDraft, at: DateTime<Utc>) -> Self {
        Self {
            id,
            sku: draft.sku.clone(),
            name: draft.name.clone(),
            unit: draft.unit.clone(),
            min_stock: draft.min_stock,
            created_at: at,
            updated_at: at,
        }
    }
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

/// Command: CreateProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProduct {
    pub sku: String,
    pub name: String,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub min_stock: i64,
}

impl CreateProduct {
    pub fn new(sku: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            sku: sku.into(),
            name: name.into(),
            unit: None,
            min_stock: 0,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_min_stock(mut self, min_stock: i64) -> Self {
        self.min_stock = min_stock;
        self
    }

    /// Trim and validate every field, producing a draft the store can persist.
    pub fn validate(&self) -> LedgerResult<ProductDraft> {
        let sku = bounded("sku", &self.sku, MAX_SKU_LEN)?;
        let name = bounded("name", &self.name, MAX_NAME_LEN)?;
        let unit = match &self.unit {
            Some(unit) => bounded("unit", unit, MAX_UNIT_LEN)?,
            None => DEFAULT_UNIT.to_string(),
        };
        ensure_min_stock(self.min_stock)?;

        Ok(ProductDraft {
            sku,
            name,
            unit,
            min_stock: self.min_stock,
        })
    }
}

/// A validated, not-yet-persisted product.
///
/// Only obtainable through [`CreateProduct::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductDraft {
    sku: String,
    name: String,
    unit: String,
    min_stock: i64,
}

impl ProductDraft {
    pub fn sku(&self) -> &str {
        &self.sku
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn min_stock(&self) -> i64 {
        self.min_stock
    }
}

/// Command: UpdateProduct. Absent fields are left untouched; `sku` is not updatable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProduct {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub min_stock: Option<i64>,
}

impl UpdateProduct {
    pub fn validate(&self) -> LedgerResult<ProductPatch> {
        let name = self
            .name
            .as_deref()
            .map(|n| bounded("name", n, MAX_NAME_LEN))
            .transpose()?;
        let unit = self
            .unit
            .as_deref()
            .map(|u| bounded("unit", u, MAX_UNIT_LEN))
            .transpose()?;
        if let Some(min_stock) = self.min_stock {
            ensure_min_stock(min_stock)?;
        }

        Ok(ProductPatch {
            name,
            unit,
            min_stock: self.min_stock,
        })
    }
}

/// A validated partial update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductPatch {
    name: Option<String>,
    unit: Option<String>,
    min_stock: Option<i64>,
}

impl ProductPatch {
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    pub fn min_stock(&self) -> Option<i64> {
        self.min_stock
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.unit.is_none() && self.min_stock.is_none()
    }

    /// Apply the supplied fields and bump `updated_at`.
    pub fn apply_to(&self, product: &mut Product, at: DateTime<Utc>) {
        if let Some(name) = &self.name {
            product.name = name.clone();
        }
        if let Some(unit) = &self.unit {
            product.unit = unit.clone();
        }
        if let Some(min_stock) = self.min_stock {
            product.min_stock = min_stock;
        }
        product.updated_at = at;
    }
}

fn bounded(field: &str, value: &str, max: usize) -> LedgerResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(LedgerError::validation(format!("{field} cannot be empty")));
    }
    if trimmed.chars().count() > max {
        return Err(LedgerError::validation(format!(
            "{field} cannot exceed {max} characters"
        )));
    }
    Ok(trimmed.to_string())
}

fn ensure_min_stock(min_stock: i64) -> LedgerResult<()> {
    if min_stock < 0 {
        return Err(LedgerError::validation("min_stock cannot be negative"));
    }
    Ok(())
}
