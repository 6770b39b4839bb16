//! Product catalog domain module.
//!
//! The catalog is a static, immutable table of purchasable offers. It is
//! validated once at startup and safe for concurrent reads from any number
//! of callers.
//!
//! # Module Structure
//!
//! - `product` - Product entity, activator kinds, recurrence
//! - `catalog` - validated lookup table keyed by code and provider price id

mod catalog;
mod product;

pub use catalog::{Catalog, CatalogError};
pub use product::{ActivatorKind, Product, ProductCode, Recurrence};
