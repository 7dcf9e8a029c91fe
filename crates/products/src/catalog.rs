use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use optimapos_core::{DomainError, DomainResult, InMemoryRepository, ProductId, Repository};

use crate::product::{NewProduct, Product};

/// Result of resolving a scanned barcode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BarcodeMatch {
    pub product_id: ProductId,
    /// Base units represented by one scan (1 for the product's own barcode).
    pub quantity: Decimal,
    /// Packaging name when the barcode belongs to a package.
    pub packaging: Option<String>,
}

/// Product registry with code and barcode lookups.
pub struct ProductCatalog {
    products: Arc<dyn Repository<Product>>,
}

impl Default for ProductCatalog {
    fn default() -> Self {
        Self::new(Arc::new(InMemoryRepository::<Product>::new()))
    }
}

impl ProductCatalog {
    pub fn new(products: Arc<dyn Repository<Product>>) -> Self {
        Self { products }
    }

    /// Register a product; codes and barcodes must be unique catalog-wide.
    pub fn register(&self, input: NewProduct) -> DomainResult<Product> {
        let product = Product::create(ProductId::new(), input)?;

        if self.find_by_code(product.code())?.is_some() {
            return Err(DomainError::conflict(format!(
                "product code {} already exists",
                product.code()
            )));
        }
        for code in product.all_barcodes() {
            if self.lookup_barcode(code)?.is_some() {
                return Err(DomainError::conflict(format!("barcode {code} already assigned")));
            }
        }

        self.products.insert(product.clone())?;
        info!(product_id = %product.id_typed(), code = product.code(), "product registered");
        Ok(product)
    }

    pub fn get(&self, id: ProductId) -> DomainResult<Product> {
        self.products
            .get(&id)?
            .ok_or_else(|| DomainError::not_found(format!("product {id}")))
    }

    /// Like [`get`](Self::get) but archived products are rejected.
    pub fn require_active(&self, id: ProductId) -> DomainResult<Product> {
        let product = self.get(id)?;
        if !product.is_active() {
            return Err(DomainError::validation(format!(
                "product {} is archived",
                product.code()
            )));
        }
        Ok(product)
    }

    pub fn find_by_code(&self, code: &str) -> DomainResult<Option<Product>> {
        let code = code.trim();
        Ok(self
            .products
            .find(&|p: &Product| p.code().eq_ignore_ascii_case(code))?
            .into_iter()
            .next())
    }

    pub fn lookup_barcode(&self, barcode: &str) -> DomainResult<Option<BarcodeMatch>> {
        let barcode = barcode.trim();
        let hits = self
            .products
            .find(&|p: &Product| p.all_barcodes().any(|b| b == barcode))?;

        Ok(hits.into_iter().next().map(|p| {
            match p
                .packagings()
                .iter()
                .find(|pk| pk.barcode.as_deref() == Some(barcode))
            {
                Some(pk) => BarcodeMatch {
                    product_id: p.id_typed(),
                    quantity: pk.units_per_package,
                    packaging: Some(pk.name.clone()),
                },
                None => BarcodeMatch {
                    product_id: p.id_typed(),
                    quantity: Decimal::ONE,
                    packaging: None,
                },
            }
        }))
    }

    pub fn archive(&self, id: ProductId) -> DomainResult<Product> {
        self.products.update(&id, &mut |p| {
            p.archive();
            Ok(())
        })
    }

    pub fn set_base_price(&self, id: ProductId, price: Decimal) -> DomainResult<Product> {
        self.products.update(&id, &mut |p| p.set_base_price(price))
    }

    pub fn list(&self) -> DomainResult<Vec<Product>> {
        self.products.list()
    }
}
