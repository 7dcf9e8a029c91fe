use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use optimapos_core::decimal::{checked_sum, round_currency};
use optimapos_core::{CustomerId, CustomerSiteId, DomainError, DomainResult, Entity};

use crate::schedule::WeeklySchedule;

/// Delivery address of a customer with its own receiving days.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerSite {
    pub id: CustomerSiteId,
    pub name: String,
    pub address: String,
    pub is_primary: bool,
    pub delivery_days: WeeklySchedule,
}

/// Input for registering a customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCustomer {
    pub code: String,
    pub name: String,
    /// `None` disables the credit check for this customer.
    pub credit_limit: Option<Decimal>,
    pub payment_terms_days: u32,
    pub default_discount_percent: Decimal,
}

impl NewCustomer {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            credit_limit: None,
            payment_terms_days: 0,
            default_discount_percent: Decimal::ZERO,
        }
    }

    pub fn with_credit_limit(mut self, limit: Decimal) -> Self {
        self.credit_limit = Some(limit);
        self
    }

    pub fn with_discount(mut self, percent: Decimal) -> Self {
        self.default_discount_percent = percent;
        self
    }

    pub fn with_payment_terms(mut self, days: u32) -> Self {
        self.payment_terms_days = days;
        self
    }
}

/// Outcome of a passed credit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditCheck {
    pub amount: Decimal,
    /// Remaining credit before the amount; `None` when no limit applies.
    pub available: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    id: CustomerId,
    code: String,
    name: String,
    credit_limit: Option<Decimal>,
    used_credit: Decimal,
    payment_terms_days: u32,
    default_discount_percent: Decimal,
    is_active: bool,
    is_blocked: bool,
    sites: Vec<CustomerSite>,
}

impl Customer {
    pub fn create(id: CustomerId, input: NewCustomer) -> DomainResult<Self> {
        if input.code.trim().is_empty() {
            return Err(DomainError::validation("customer code cannot be empty"));
        }
        if input.name.trim().is_empty() {
            return Err(DomainError::validation("customer name cannot be empty"));
        }
        validate_limit(input.credit_limit)?;
        validate_discount(input.default_discount_percent)?;

        Ok(Self {
            id,
            code: input.code.trim().to_string(),
            name: input.name,
            credit_limit: input.credit_limit.map(round_currency),
            used_credit: Decimal::ZERO,
            payment_terms_days: input.payment_terms_days,
            default_discount_percent: input.default_discount_percent,
            is_active: true,
            is_blocked: false,
            sites: Vec::new(),
        })
    }

    pub fn id_typed(&self) -> CustomerId {
        self.id
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn credit_limit(&self) -> Option<Decimal> {
        self.credit_limit
    }

    pub fn used_credit(&self) -> Decimal {
        self.used_credit
    }

    pub fn payment_terms_days(&self) -> u32 {
        self.payment_terms_days
    }

    pub fn default_discount_percent(&self) -> Decimal {
        self.default_discount_percent
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn is_blocked(&self) -> bool {
        self.is_blocked
    }

    pub fn sites(&self) -> &[CustomerSite] {
        &self.sites
    }

    pub fn primary_site(&self) -> Option<&CustomerSite> {
        self.sites.iter().find(|s| s.is_primary)
    }

    /// Remaining credit (`L - U`), `None` when unlimited.
    pub fn available_credit(&self) -> Option<Decimal> {
        self.credit_limit.map(|l| round_currency(l - self.used_credit))
    }

    /// Whether the customer may transact at all.
    pub fn ensure_can_transact(&self) -> DomainResult<()> {
        if !self.is_active {
            return Err(DomainError::PartnerInactive(format!(
                "customer {} is inactive",
                self.code
            )));
        }
        if self.is_blocked {
            return Err(DomainError::PartnerInactive(format!(
                "customer {} is blocked",
                self.code
            )));
        }
        Ok(())
    }

    /// An order of `amount` passes iff `amount <= limit - used`.
    pub fn check_credit(&self, amount: Decimal) -> DomainResult<CreditCheck> {
        self.ensure_can_transact()?;
        if amount < Decimal::ZERO {
            return Err(DomainError::validation("credit amount cannot be negative"));
        }
        let available = self.available_credit();
        if let Some(available) = available {
            if amount > available {
                return Err(DomainError::CreditExceeded { amount, available });
            }
        }
        Ok(CreditCheck {
            amount: round_currency(amount),
            available,
        })
    }

    pub fn charge_credit(&mut self, amount: Decimal) -> DomainResult<CreditCheck> {
        let check = self.check_credit(amount)?;
        self.used_credit = round_currency(checked_sum([self.used_credit, check.amount])?);
        Ok(check)
    }

    /// Give credit back; used credit never drops below zero.
    pub fn release_credit(&mut self, amount: Decimal) -> DomainResult<()> {
        if amount < Decimal::ZERO {
            return Err(DomainError::validation("credit amount cannot be negative"));
        }
        self.used_credit = round_currency((self.used_credit - amount).max(Decimal::ZERO));
        Ok(())
    }

    /// Release then charge as one step; on failure nothing changes.
    pub fn rebook_credit(
        &mut self,
        release: Decimal,
        charge: Decimal,
    ) -> DomainResult<Option<CreditCheck>> {
        let mut next = self.clone();
        next.release_credit(release)?;
        let check = if charge > Decimal::ZERO {
            Some(next.charge_credit(charge)?)
        } else {
            None
        };
        *self = next;
        Ok(check)
    }

    pub fn set_credit_limit(&mut self, limit: Option<Decimal>) -> DomainResult<()> {
        validate_limit(limit)?;
        self.credit_limit = limit.map(round_currency);
        Ok(())
    }

    pub fn set_blocked(&mut self, blocked: bool) {
        self.is_blocked = blocked;
    }

    pub fn deactivate(&mut self) {
        self.is_active = false;
    }

    pub fn add_site(&mut self, site: CustomerSite) -> DomainResult<()> {
        if site.name.trim().is_empty() {
            return Err(DomainError::validation("site name cannot be empty"));
        }
        if self.sites.iter().any(|s| s.id == site.id) {
            return Err(DomainError::conflict("site already exists"));
        }
        if site.is_primary {
            for s in &mut self.sites {
                s.is_primary = false;
            }
        }
        self.sites.push(site);
        Ok(())
    }
}

impl Entity for Customer {
    type Id = CustomerId;

    fn id(&self) -> &CustomerId {
        &self.id
    }
}

fn validate_limit(limit: Option<Decimal>) -> DomainResult<()> {
    match limit {
        Some(l) if l < Decimal::ZERO => Err(DomainError::validation(
            "credit limit cannot be negative",
        )),
        _ => Ok(()),
    }
}

fn validate_discount(percent: Decimal) -> DomainResult<()> {
    if percent < Decimal::ZERO || percent > Decimal::ONE_HUNDRED {
        return Err(DomainError::validation(
            "discount percent must be between 0 and 100",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn customer(limit: Option<Decimal>) -> Customer {
        let mut input = NewCustomer::new("C001", "Corner Shop");
        input.credit_limit = limit;
        Customer::create(CustomerId::new(), input).unwrap()
    }

    #[test]
    fn order_within_remaining_credit_passes() {
        let mut c = customer(Some(dec!(1000)));
        c.charge_credit(dec!(600)).unwrap();

        let check = c.check_credit(dec!(400)).unwrap();
        assert_eq!(check.available, Some(dec!(400)));
    }

    #[test]
    fn order_over_remaining_credit_is_rejected() {
        let mut c = customer(Some(dec!(1000)));
        c.charge_credit(dec!(600)).unwrap();

        let err = c.check_credit(dec!(400.01)).unwrap_err();
        assert_eq!(err.code(), "CREDIT_EXCEEDED");
        assert_eq!(c.used_credit(), dec!(600));
    }

    #[test]
    fn sub_cent_excess_is_not_rounded_away() {
        let c = customer(Some(dec!(100)));
        let err = c.check_credit(dec!(100.004)).unwrap_err();
        assert_eq!(err.code(), "CREDIT_EXCEEDED");
        assert!(c.check_credit(dec!(100.00)).is_ok());
    }

    #[test]
    fn no_limit_means_no_check() {
        let c = customer(None);
        let check = c.check_credit(dec!(1_000_000)).unwrap();
        assert_eq!(check.available, None);
    }

    #[test]
    fn blocked_customer_cannot_transact() {
        let mut c = customer(Some(dec!(1000)));
        c.set_blocked(true);
        assert_eq!(c.check_credit(dec!(1)).unwrap_err().code(), "PARTNER_INACTIVE");
    }

    #[test]
    fn release_never_goes_below_zero() {
        let mut c = customer(Some(dec!(100)));
        c.charge_credit(dec!(30)).unwrap();
        c.release_credit(dec!(50)).unwrap();
        assert_eq!(c.used_credit(), dec!(0));
    }

    #[test]
    fn failed_rebook_keeps_previous_usage() {
        let mut c = customer(Some(dec!(100)));
        c.charge_credit(dec!(60)).unwrap();

        // Releasing 60 frees room for 100 but not for 101.
        assert_eq!(c.rebook_credit(dec!(60), dec!(101)).unwrap_err().code(), "CREDIT_EXCEEDED");
        assert_eq!(c.used_credit(), dec!(60));

        c.rebook_credit(dec!(60), dec!(100)).unwrap();
        assert_eq!(c.used_credit(), dec!(100));
    }

    #[test]
    fn new_primary_site_demotes_previous() {
        let mut c = customer(None);
        for name in ["Main", "Branch"] {
            c.add_site(CustomerSite {
                id: CustomerSiteId::new(),
                name: name.to_string(),
                address: String::new(),
                is_primary: true,
                delivery_days: WeeklySchedule::any_day(),
            })
            .unwrap();
        }
        assert_eq!(c.primary_site().unwrap().name, "Branch");
        assert_eq!(c.sites().iter().filter(|s| s.is_primary).count(), 1);
    }

    #[test]
    fn out_of_range_discount_is_rejected() {
        let err = Customer::create(
            CustomerId::new(),
            NewCustomer::new("C", "C").with_discount(dec!(101)),
        )
        .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: with limit L and used U, amount A passes iff A <= L - U.
        #[test]
        fn credit_rule_holds(
            limit in 0i64..10_000_000,
            used in 0i64..10_000_000,
            amount in 0i64..10_000_000,
        ) {
            let l = Decimal::new(limit, 2);
            let u = Decimal::new(used.min(limit), 2);
            let a = Decimal::new(amount, 2);

            let mut c = customer(Some(l));
            c.charge_credit(u).unwrap();

            let result = c.check_credit(a);
            if a <= l - u {
                prop_assert!(result.is_ok());
            } else {
                prop_assert_eq!(result.unwrap_err().code(), "CREDIT_EXCEEDED");
            }
        }
    }
}
