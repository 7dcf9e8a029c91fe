use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use optimapos_core::decimal::{round_currency, round_quantity};
use optimapos_core::{CustomerId, DomainError, DomainResult, LocationId, ProductId};

/// Negotiated price for one customer, optionally bounded in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerPrice {
    pub customer_id: CustomerId,
    pub product_id: ProductId,
    pub price: Decimal,
    pub valid_from: Option<NaiveDate>,
    pub valid_to: Option<NaiveDate>,
}

impl CustomerPrice {
    /// Both bounds are inclusive; a missing bound is open.
    pub fn is_valid_on(&self, day: NaiveDate) -> bool {
        self.valid_from.is_none_or(|from| from <= day) && self.valid_to.is_none_or(|to| day <= to)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantityBreak {
    pub product_id: ProductId,
    pub min_quantity: Decimal,
    pub price: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum LocationPriceRule {
    Fixed(Decimal),
    /// Percent on top of the location's average cost.
    Markup(Decimal),
}

/// All pricing rules, indexed for lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PriceBook {
    customer_prices: HashMap<(CustomerId, ProductId), Vec<CustomerPrice>>,
    quantity_breaks: HashMap<ProductId, Vec<QuantityBreak>>,
    location_prices: HashMap<(LocationId, ProductId), LocationPriceRule>,
}

impl PriceBook {
    pub fn set_customer_price(&mut self, price: CustomerPrice) -> DomainResult<()> {
        non_negative(price.price, "customer price")?;
        if let (Some(from), Some(to)) = (price.valid_from, price.valid_to) {
            if from > to {
                return Err(DomainError::validation(
                    "customer price validity ends before it starts",
                ));
            }
        }
        let price = CustomerPrice {
            price: round_currency(price.price),
            ..price
        };
        let entries = self
            .customer_prices
            .entry((price.customer_id, price.product_id))
            .or_default();
        entries.retain(|p| p.valid_from != price.valid_from);
        entries.push(price);
        Ok(())
    }

    /// Replaces an existing break with the same threshold.
    pub fn add_quantity_break(&mut self, rule: QuantityBreak) -> DomainResult<()> {
        if rule.min_quantity <= Decimal::ZERO {
            return Err(DomainError::validation("quantity break threshold must be positive"));
        }
        non_negative(rule.price, "quantity break price")?;
        let rule = QuantityBreak {
            min_quantity: round_quantity(rule.min_quantity),
            price: round_currency(rule.price),
            ..rule
        };
        let breaks = self.quantity_breaks.entry(rule.product_id).or_default();
        breaks.retain(|b| b.min_quantity != rule.min_quantity);
        breaks.push(rule);
        breaks.sort_by(|a, b| a.min_quantity.cmp(&b.min_quantity));
        Ok(())
    }

    pub fn set_location_price(
        &mut self,
        location_id: LocationId,
        product_id: ProductId,
        rule: LocationPriceRule,
    ) -> DomainResult<()> {
        let rule = match rule {
            LocationPriceRule::Fixed(p) => {
                non_negative(p, "location price")?;
                LocationPriceRule::Fixed(round_currency(p))
            }
            LocationPriceRule::Markup(pct) => {
                non_negative(pct, "markup percent")?;
                LocationPriceRule::Markup(pct)
            }
        };
        self.location_prices.insert((location_id, product_id), rule);
        Ok(())
    }

    pub fn clear_location_price(&mut self, location_id: LocationId, product_id: ProductId) {
        self.location_prices.remove(&(location_id, product_id));
    }

    /// Valid price on `day`; among overlapping entries the latest start wins.
    pub fn customer_price(
        &self,
        customer_id: CustomerId,
        product_id: ProductId,
        day: NaiveDate,
    ) -> Option<&CustomerPrice> {
        self.customer_prices
            .get(&(customer_id, product_id))?
            .iter()
            .filter(|p| p.is_valid_on(day))
            .max_by_key(|p| p.valid_from)
    }

    /// Break with the highest threshold not above `quantity`.
    pub fn quantity_break(&self, product_id: ProductId, quantity: Decimal) -> Option<&QuantityBreak> {
        self.quantity_breaks
            .get(&product_id)?
            .iter()
            .rev()
            .find(|b| b.min_quantity <= quantity)
    }

    pub fn location_rule(&self, location_id: LocationId, product_id: ProductId) -> Option<LocationPriceRule> {
        self.location_prices.get(&(location_id, product_id)).copied()
    }
}

fn non_negative(value: Decimal, what: &str) -> DomainResult<()> {
    if value < Decimal::ZERO {
        return Err(DomainError::validation(format!("{what} cannot be negative")));
    }
    Ok(())
}
