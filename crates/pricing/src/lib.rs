//! Price lookup chain: location price, quantity breaks, customer prices and
//! customer discounts.

pub mod rules;
pub mod service;

pub use rules::{CustomerPrice, LocationPriceRule, PriceBook, QuantityBreak};
pub use service::{AverageCostLookup, PriceSource, PricingResult, PricingService};
