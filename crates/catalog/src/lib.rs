//! Product catalog module.
//!
//! This crate contains the catalog's business rules: field validation,
//! partial updates, the name/SKU listing filter and listing order. Uniqueness of SKUs is arbitrated by the
//! store (no IO, no storage here).

pub mod listing;
pub mod product;

pub use listing::{ProductFilter, sort_newest_first};
pub use product::{
    CreateProduct, DEFAULT_UNIT, MAX_NAME_LEN, MAX_SKU_LEN, MAX_UNIT_LEN, Product, ProductDraft,
    ProductPatch, UpdateProduct,
};
