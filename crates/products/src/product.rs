use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use optimapos_core::decimal::{round_currency, round_quantity};
use optimapos_core::{DomainError, DomainResult, Entity, ProductId};

/// Product status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    Active,
    Archived,
}

/// Unit the product is stocked and sold in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitOfMeasure {
    Piece,
    Kilogram,
    Liter,
    Meter,
}

impl UnitOfMeasure {
    /// Whether fractional quantities make sense for this unit.
    pub fn is_divisible(self) -> bool {
        !matches!(self, UnitOfMeasure::Piece)
    }
}

/// A sellable/receivable package of the product (crate, box, pallet).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packaging {
    pub name: String,
    /// Base units contained in one package.
    pub units_per_package: Decimal,
    pub barcode: Option<String>,
}

/// Input for registering a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub code: String,
    pub name: String,
    pub unit: UnitOfMeasure,
    pub base_price: Decimal,
    pub barcodes: Vec<String>,
    pub packagings: Vec<Packaging>,
}

impl NewProduct {
    pub fn new(code: impl Into<String>, name: impl Into<String>, unit: UnitOfMeasure) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            unit,
            base_price: Decimal::ZERO,
            barcodes: Vec::new(),
            packagings: Vec::new(),
        }
    }

    pub fn with_base_price(mut self, price: Decimal) -> Self {
        self.base_price = price;
        self
    }

    pub fn with_barcode(mut self, barcode: impl Into<String>) -> Self {
        self.barcodes.push(barcode.into());
        self
    }

    pub fn with_packaging(mut self, packaging: Packaging) -> Self {
        self.packagings.push(packaging);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    id: ProductId,
    code: String,
    name: String,
    unit: UnitOfMeasure,
    base_price: Decimal,
    status: ProductStatus,
    barcodes: Vec<String>,
    packagings: Vec<Packaging>,
}

impl Product {
    /// Validate and build an active product.
    pub fn create(id: ProductId, input: NewProduct) -> DomainResult<Self> {
        let code = input.code.trim();
        if code.is_empty() {
            return Err(DomainError::validation("product code cannot be empty"));
        }
        if input.name.trim().is_empty() {
            return Err(DomainError::validation("product name cannot be empty"));
        }
        if input.base_price < Decimal::ZERO {
            return Err(DomainError::validation("base_price cannot be negative"));
        }
        for p in &input.packagings {
            if p.units_per_package <= Decimal::ZERO {
                return Err(DomainError::validation(format!(
                    "packaging '{}' must contain a positive quantity",
                    p.name
                )));
            }
        }

        Ok(Self {
            id,
            code: code.to_string(),
            name: input.name,
            unit: input.unit,
            base_price: round_currency(input.base_price),
            status: ProductStatus::Active,
            barcodes: input.barcodes,
            packagings: input
                .packagings
                .into_iter()
                .map(|p| Packaging {
                    units_per_package: round_quantity(p.units_per_package),
                    ..p
                })
                .collect(),
        })
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unit(&self) -> UnitOfMeasure {
        self.unit
    }

    pub fn base_price(&self) -> Decimal {
        self.base_price
    }

    pub fn status(&self) -> ProductStatus {
        self.status
    }

    pub fn barcodes(&self) -> &[String] {
        &self.barcodes
    }

    pub fn packagings(&self) -> &[Packaging] {
        &self.packagings
    }

    pub fn is_active(&self) -> bool {
        self.status == ProductStatus::Active
    }

    pub fn archive(&mut self) {
        self.status = ProductStatus::Archived;
    }

    pub fn set_base_price(&mut self, price: Decimal) -> DomainResult<()> {
        if price < Decimal::ZERO {
            return Err(DomainError::validation("base_price cannot be negative"));
        }
        self.base_price = round_currency(price);
        Ok(())
    }

    /// Every barcode that resolves to this product, own and packaging ones.
    pub fn all_barcodes(&self) -> impl Iterator<Item = &str> {
        self.barcodes
            .iter()
            .map(String::as_str)
            .chain(self.packagings.iter().filter_map(|p| p.barcode.as_deref()))
    }

    /// Check a stock quantity against the unit: positive, 3dp, and whole for
    /// piece goods. Returns the rounded quantity.
    pub fn validate_quantity(&self, quantity: Decimal) -> DomainResult<Decimal> {
        let qty = round_quantity(quantity);
        if qty <= Decimal::ZERO {
            return Err(DomainError::validation("quantity must be positive"));
        }
        if !self.unit.is_divisible() && qty.fract() != Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "product {} is sold by the piece; fractional quantity {qty} not allowed",
                self.code
            )));
        }
        Ok(qty)
    }
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> &ProductId {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn crate_of(n: Decimal) -> Packaging {
        Packaging {
            name: "crate".to_string(),
            units_per_package: n,
            barcode: Some("3800000000019".to_string()),
        }
    }

    #[test]
    fn create_trims_code_and_rounds_price() {
        let p = Product::create(
            ProductId::new(),
            NewProduct::new("  COLA-05 ", "Cola 0.5l", UnitOfMeasure::Piece)
                .with_base_price(dec!(1.255)),
        )
        .unwrap();

        assert_eq!(p.code(), "COLA-05");
        assert_eq!(p.base_price(), dec!(1.26));
        assert!(p.is_active());
    }

    #[test]
    fn empty_name_is_rejected() {
        let err = Product::create(
            ProductId::new(),
            NewProduct::new("X", " ", UnitOfMeasure::Piece),
        )
        .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn zero_sized_packaging_is_rejected() {
        let err = Product::create(
            ProductId::new(),
            NewProduct::new("X", "X", UnitOfMeasure::Piece).with_packaging(crate_of(dec!(0))),
        )
        .unwrap_err();
        assert!(err.to_string().contains("crate"));
    }

    #[test]
    fn piece_goods_reject_fractions() {
        let p = Product::create(
            ProductId::new(),
            NewProduct::new("X", "X", UnitOfMeasure::Piece),
        )
        .unwrap();
        assert_eq!(p.validate_quantity(dec!(3)).unwrap(), dec!(3));
        assert!(p.validate_quantity(dec!(2.5)).is_err());
        assert!(p.validate_quantity(dec!(0)).is_err());
    }

    #[test]
    fn weighed_goods_round_to_three_places() {
        let p = Product::create(
            ProductId::new(),
            NewProduct::new("CHEESE", "Cheese", UnitOfMeasure::Kilogram),
        )
        .unwrap();
        assert_eq!(p.validate_quantity(dec!(1.23456)).unwrap(), dec!(1.235));
    }

    #[test]
    fn all_barcodes_include_packagings() {
        let p = Product::create(
            ProductId::new(),
            NewProduct::new("X", "X", UnitOfMeasure::Piece)
                .with_barcode("111")
                .with_packaging(crate_of(dec!(24))),
        )
        .unwrap();
        let codes: Vec<&str> = p.all_barcodes().collect();
        assert_eq!(codes, vec!["111", "3800000000019"]);
    }
}
