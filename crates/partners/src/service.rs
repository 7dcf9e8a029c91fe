use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{info, warn};

use optimapos_core::{
    CustomerId, CustomerSiteId, DomainError, DomainResult, InMemoryRepository, Repository,
    SupplierDivisionId, SupplierId,
};

use crate::customer::{CreditCheck, Customer, CustomerSite, NewCustomer};
use crate::partner_ref::PartnerRef;
use crate::schedule::WeeklySchedule;
use crate::supplier::{NewSupplier, Supplier, SupplierDivision};

/// Customer and supplier registry plus credit bookkeeping.
pub struct PartnerService {
    customers: Arc<dyn Repository<Customer>>,
    suppliers: Arc<dyn Repository<Supplier>>,
}

impl Default for PartnerService {
    fn default() -> Self {
        Self::new(
            Arc::new(InMemoryRepository::<Customer>::new()),
            Arc::new(InMemoryRepository::<Supplier>::new()),
        )
    }
}

impl PartnerService {
    pub fn new(
        customers: Arc<dyn Repository<Customer>>,
        suppliers: Arc<dyn Repository<Supplier>>,
    ) -> Self {
        Self {
            customers,
            suppliers,
        }
    }

    pub fn register_customer(&self, input: NewCustomer) -> DomainResult<Customer> {
        let customer = Customer::create(CustomerId::new(), input)?;
        let code = customer.code().to_string();
        if !self
            .customers
            .find(&|c: &Customer| c.code().eq_ignore_ascii_case(&code))?
            .is_empty()
        {
            return Err(DomainError::conflict(format!("customer code {code} already exists")));
        }
        self.customers.insert(customer.clone())?;
        info!(customer_id = %customer.id_typed(), code = %code, "customer registered");
        Ok(customer)
    }

    pub fn get_customer(&self, id: CustomerId) -> DomainResult<Customer> {
        self.customers
            .get(&id)?
            .ok_or_else(|| DomainError::not_found(format!("customer {id}")))
    }

    pub fn add_customer_site(
        &self,
        id: CustomerId,
        name: impl Into<String>,
        address: impl Into<String>,
        is_primary: bool,
        delivery_days: WeeklySchedule,
    ) -> DomainResult<CustomerSiteId> {
        let site = CustomerSite {
            id: CustomerSiteId::new(),
            name: name.into(),
            address: address.into(),
            is_primary,
            delivery_days,
        };
        let site_id = site.id;
        let mut pending = Some(site);
        self.customers.update(&id, &mut |c| match pending.take() {
            Some(site) => c.add_site(site),
            None => Err(DomainError::invariant("site already consumed")),
        })?;
        Ok(site_id)
    }

    pub fn set_credit_limit(&self, id: CustomerId, limit: Option<Decimal>) -> DomainResult<Customer> {
        self.customers.update(&id, &mut |c| c.set_credit_limit(limit))
    }

    pub fn block_customer(&self, id: CustomerId) -> DomainResult<Customer> {
        self.customers.update(&id, &mut |c| {
            c.set_blocked(true);
            Ok(())
        })
    }

    pub fn unblock_customer(&self, id: CustomerId) -> DomainResult<Customer> {
        self.customers.update(&id, &mut |c| {
            c.set_blocked(false);
            Ok(())
        })
    }

    /// Check whether `amount` fits the customer's remaining credit.
    pub fn validate_credit(&self, id: CustomerId, amount: Decimal) -> DomainResult<CreditCheck> {
        let customer = self.get_customer(id)?;
        customer.check_credit(amount).inspect_err(|e| {
            warn!(customer_id = %id, %amount, code = e.code(), "credit check failed");
        })
    }

    /// Validate and book `amount` against the customer's credit in one step.
    pub fn charge_credit(&self, id: CustomerId, amount: Decimal) -> DomainResult<CreditCheck> {
        let mut check = None;
        let updated = self.customers.update(&id, &mut |c| {
            check = Some(c.charge_credit(amount)?);
            Ok(())
        });
        match updated {
            Ok(c) => {
                info!(customer_id = %id, %amount, used = %c.used_credit(), "credit charged");
                check.ok_or_else(|| DomainError::invariant("credit charge produced no check"))
            }
            Err(e) => {
                warn!(customer_id = %id, %amount, code = e.code(), "credit charge rejected");
                Err(e)
            }
        }
    }

    pub fn release_credit(&self, id: CustomerId, amount: Decimal) -> DomainResult<Customer> {
        let c = self.customers.update(&id, &mut |c| c.release_credit(amount))?;
        info!(customer_id = %id, %amount, used = %c.used_credit(), "credit released");
        Ok(c)
    }

    /// Swap one booked amount for another atomically (document re-sync).
    pub fn rebook_credit(
        &self,
        id: CustomerId,
        release: Decimal,
        charge: Decimal,
    ) -> DomainResult<Customer> {
        let updated = self
            .customers
            .update(&id, &mut |c| c.rebook_credit(release, charge).map(|_| ()));
        match updated {
            Ok(c) => {
                info!(customer_id = %id, %release, %charge, used = %c.used_credit(), "credit rebooked");
                Ok(c)
            }
            Err(e) => {
                warn!(customer_id = %id, %release, %charge, code = e.code(), "credit rebook rejected");
                Err(e)
            }
        }
    }

    pub fn register_supplier(&self, input: NewSupplier) -> DomainResult<Supplier> {
        let supplier = Supplier::create(SupplierId::new(), input)?;
        let code = supplier.code().to_string();
        if !self
            .suppliers
            .find(&|s: &Supplier| s.code().eq_ignore_ascii_case(&code))?
            .is_empty()
        {
            return Err(DomainError::conflict(format!("supplier code {code} already exists")));
        }
        self.suppliers.insert(supplier.clone())?;
        info!(supplier_id = %supplier.id_typed(), code = %code, "supplier registered");
        Ok(supplier)
    }

    pub fn get_supplier(&self, id: SupplierId) -> DomainResult<Supplier> {
        self.suppliers
            .get(&id)?
            .ok_or_else(|| DomainError::not_found(format!("supplier {id}")))
    }

    pub fn add_supplier_division(
        &self,
        id: SupplierId,
        name: impl Into<String>,
        payment_terms_days: u32,
    ) -> DomainResult<SupplierDivisionId> {
        let division = SupplierDivision {
            id: SupplierDivisionId::new(),
            name: name.into(),
            payment_terms_days,
            contact_email: None,
            contact_phone: None,
        };
        let division_id = division.id;
        let mut pending = Some(division);
        self.suppliers.update(&id, &mut |s| match pending.take() {
            Some(d) => s.add_division(d),
            None => Err(DomainError::invariant("division already consumed")),
        })?;
        Ok(division_id)
    }

    pub fn set_supplier_schedules(
        &self,
        id: SupplierId,
        order_days: WeeklySchedule,
        delivery_days: WeeklySchedule,
    ) -> DomainResult<Supplier> {
        self.suppliers.update(&id, &mut |s| {
            s.set_schedules(order_days.clone(), delivery_days.clone());
            Ok(())
        })
    }

    pub fn ensure_can_transact(&self, partner: PartnerRef) -> DomainResult<()> {
        match partner {
            PartnerRef::Customer(id) => self.get_customer(id)?.ensure_can_transact(),
            PartnerRef::Supplier(id) => self.get_supplier(id)?.ensure_can_transact(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;
    use rust_decimal_macros::dec;

    #[test]
    fn charge_then_validate_uses_remaining_credit() {
        let svc = PartnerService::default();
        let c = svc
            .register_customer(NewCustomer::new("C1", "Cafe").with_credit_limit(dec!(500)))
            .unwrap();

        svc.charge_credit(c.id_typed(), dec!(450)).unwrap();
        let err = svc.validate_credit(c.id_typed(), dec!(60)).unwrap_err();
        assert_eq!(err.code(), "CREDIT_EXCEEDED");

        svc.release_credit(c.id_typed(), dec!(100)).unwrap();
        let check = svc.validate_credit(c.id_typed(), dec!(60)).unwrap();
        assert_eq!(check.available, Some(dec!(150)));
    }

    #[test]
    fn rejected_charge_does_not_book_anything() {
        let svc = PartnerService::default();
        let c = svc
            .register_customer(NewCustomer::new("C1", "Cafe").with_credit_limit(dec!(100)))
            .unwrap();

        assert!(svc.charge_credit(c.id_typed(), dec!(101)).is_err());
        assert_eq!(svc.get_customer(c.id_typed()).unwrap().used_credit(), dec!(0));
    }

    #[test]
    fn duplicate_codes_conflict() {
        let svc = PartnerService::default();
        svc.register_customer(NewCustomer::new("C1", "Cafe")).unwrap();
        assert_eq!(
            svc.register_customer(NewCustomer::new("c1", "Other"))
                .unwrap_err()
                .code(),
            "CONFLICT"
        );
        svc.register_supplier(NewSupplier::new("S1", "Farm")).unwrap();
        assert_eq!(
            svc.register_supplier(NewSupplier::new("S1", "Farm 2"))
                .unwrap_err()
                .code(),
            "CONFLICT"
        );
    }

    #[test]
    fn sites_and_divisions_are_persisted() {
        let svc = PartnerService::default();
        let c = svc.register_customer(NewCustomer::new("C1", "Cafe")).unwrap();
        svc.add_customer_site(
            c.id_typed(),
            "Kitchen door",
            "1 Main St",
            true,
            WeeklySchedule::on([Weekday::Mon, Weekday::Thu]),
        )
        .unwrap();
        let c = svc.get_customer(c.id_typed()).unwrap();
        assert_eq!(c.primary_site().unwrap().name, "Kitchen door");

        let s = svc.register_supplier(NewSupplier::new("S1", "Farm")).unwrap();
        svc.add_supplier_division(s.id_typed(), "Dairy", 14).unwrap();
        assert_eq!(svc.get_supplier(s.id_typed()).unwrap().divisions().len(), 1);
    }

    #[test]
    fn blocked_customer_fails_transact_gate() {
        let svc = PartnerService::default();
        let c = svc.register_customer(NewCustomer::new("C1", "Cafe")).unwrap();
        svc.block_customer(c.id_typed()).unwrap();
        let err = svc
            .ensure_can_transact(PartnerRef::Customer(c.id_typed()))
            .unwrap_err();
        assert_eq!(err.code(), "PARTNER_INACTIVE");
    }
}
