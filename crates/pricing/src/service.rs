use std::sync::{Arc, RwLock};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use optimapos_core::decimal::{checked_product, checked_sum, round_currency};
use optimapos_core::{CustomerId, DomainError, DomainResult, LocationId, ProductId};
use optimapos_inventory::{InventoryStore, MovementService};
use optimapos_partners::PartnerService;
use optimapos_products::ProductCatalog;

use crate::rules::{CustomerPrice, LocationPriceRule, PriceBook, QuantityBreak};

/// Where the final unit price came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    ProductBase,
    LocationFixed,
    LocationMarkup,
    QuantityBreak,
    CustomerPrice,
    CustomerDiscount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingResult {
    pub product_id: ProductId,
    pub quantity: Decimal,
    /// Location or product price before breaks and customer terms.
    pub base_price: Decimal,
    pub unit_price: Decimal,
    pub discount_percent: Decimal,
    pub line_total: Decimal,
    pub source: PriceSource,
}

/// Average cost per location, used by markup prices.
pub trait AverageCostLookup: Send + Sync {
    fn average_cost(&self, location_id: LocationId, product_id: ProductId) -> DomainResult<Decimal>;
}

impl<S: InventoryStore> AverageCostLookup for MovementService<S> {
    fn average_cost(&self, location_id: LocationId, product_id: ProductId) -> DomainResult<Decimal> {
        MovementService::average_cost(self, location_id, product_id)
    }
}

pub struct PricingService {
    catalog: Arc<ProductCatalog>,
    partners: Arc<PartnerService>,
    costs: Arc<dyn AverageCostLookup>,
    book: RwLock<PriceBook>,
}

fn poisoned() -> DomainError {
    DomainError::storage("price book lock poisoned")
}

impl PricingService {
    pub fn new(
        catalog: Arc<ProductCatalog>,
        partners: Arc<PartnerService>,
        costs: Arc<dyn AverageCostLookup>,
    ) -> Self {
        Self {
            catalog,
            partners,
            costs,
            book: RwLock::new(PriceBook::default()),
        }
    }

    pub fn set_customer_price(&self, price: CustomerPrice) -> DomainResult<()> {
        self.partners.get_customer(price.customer_id)?;
        self.catalog.get(price.product_id)?;
        self.book.write().map_err(|_| poisoned())?.set_customer_price(price)
    }

    pub fn add_quantity_break(&self, rule: QuantityBreak) -> DomainResult<()> {
        self.catalog.get(rule.product_id)?;
        self.book.write().map_err(|_| poisoned())?.add_quantity_break(rule)
    }

    pub fn set_location_price(
        &self,
        location_id: LocationId,
        product_id: ProductId,
        rule: LocationPriceRule,
    ) -> DomainResult<()> {
        self.catalog.get(product_id)?;
        self.book
            .write()
            .map_err(|_| poisoned())?
            .set_location_price(location_id, product_id, rule)
    }

    /// Resolve the selling price of `quantity` units.
    ///
    /// Location price (fixed, or markup over a positive average cost) else
    /// product base price; then the best quantity break if it is cheaper;
    /// then a valid customer price replaces everything, otherwise the
    /// customer's default discount is taken off.
    pub fn get_product_pricing(
        &self,
        location_id: LocationId,
        product_id: ProductId,
        customer_id: Option<CustomerId>,
        quantity: Decimal,
        on: NaiveDate,
    ) -> DomainResult<PricingResult> {
        let product = self.catalog.require_active(product_id)?;
        let quantity = product.validate_quantity(quantity)?;
        let book = self.book.read().map_err(|_| poisoned())?;

        let (base_price, mut source) = match book.location_rule(location_id, product_id) {
            Some(LocationPriceRule::Fixed(price)) => (price, PriceSource::LocationFixed),
            Some(LocationPriceRule::Markup(percent)) => {
                let cost = self.costs.average_cost(location_id, product_id)?;
                if cost > Decimal::ZERO {
                    let price = round_currency(
                        checked_product(cost, checked_sum([Decimal::ONE_HUNDRED, percent])?)? / Decimal::ONE_HUNDRED,
                    );
                    (price, PriceSource::LocationMarkup)
                } else {
                    (product.base_price(), PriceSource::ProductBase)
                }
            }
            None => (product.base_price(), PriceSource::ProductBase),
        };

        let mut unit_price = base_price;
        if let Some(rule) = book.quantity_break(product_id, quantity) {
            if rule.price < unit_price {
                unit_price = rule.price;
                source = PriceSource::QuantityBreak;
            }
        }

        let mut discount_percent = Decimal::ZERO;
        if let Some(customer_id) = customer_id {
            let customer = self.partners.get_customer(customer_id)?;
            if let Some(special) = book.customer_price(customer_id, product_id, on) {
                unit_price = special.price;
                source = PriceSource::CustomerPrice;
            } else if customer.default_discount_percent() > Decimal::ZERO {
                discount_percent = customer.default_discount_percent();
                unit_price = round_currency(
                    checked_product(unit_price, Decimal::ONE_HUNDRED - discount_percent)?
                        / Decimal::ONE_HUNDRED,
                );
                source = PriceSource::CustomerDiscount;
            }
        }

        let line_total = round_currency(checked_product(unit_price, quantity)?);
        let result = PricingResult {
            product_id,
            quantity,
            base_price,
            unit_price,
            discount_percent,
            line_total,
            source,
        };
        debug!(%product_id, %quantity, unit_price = %result.unit_price, source = ?result.source, "price resolved");
        Ok(result)
    }
}
