//! Product catalog: products, units of measure, packagings and barcode
//! lookup.

pub mod catalog;
pub mod product;

pub use catalog::{BarcodeMatch, ProductCatalog};
pub use product::{NewProduct, Packaging, Product, ProductStatus, UnitOfMeasure};
