use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use optimapos_core::{DomainError, DomainResult, Entity, SupplierDivisionId, SupplierId};

use crate::schedule::WeeklySchedule;

/// Organisational unit of a supplier with its own terms and contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierDivision {
    pub id: SupplierDivisionId,
    pub name: String,
    pub payment_terms_days: u32,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSupplier {
    pub code: String,
    pub name: String,
    pub order_days: WeeklySchedule,
    pub delivery_days: WeeklySchedule,
}

impl NewSupplier {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            order_days: WeeklySchedule::any_day(),
            delivery_days: WeeklySchedule::any_day(),
        }
    }

    pub fn ordering_on(mut self, days: impl IntoIterator<Item = Weekday>) -> Self {
        self.order_days = WeeklySchedule::on(days);
        self
    }

    pub fn delivering_on(mut self, days: impl IntoIterator<Item = Weekday>) -> Self {
        self.delivery_days = WeeklySchedule::on(days);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Supplier {
    id: SupplierId,
    code: String,
    name: String,
    is_active: bool,
    order_days: WeeklySchedule,
    delivery_days: WeeklySchedule,
    divisions: Vec<SupplierDivision>,
}

impl Supplier {
    pub fn create(id: SupplierId, input: NewSupplier) -> DomainResult<Self> {
        if input.code.trim().is_empty() {
            return Err(DomainError::validation("supplier code cannot be empty"));
        }
        if input.name.trim().is_empty() {
            return Err(DomainError::validation("supplier name cannot be empty"));
        }
        Ok(Self {
            id,
            code: input.code.trim().to_string(),
            name: input.name,
            is_active: true,
            order_days: input.order_days,
            delivery_days: input.delivery_days,
            divisions: Vec::new(),
        })
    }

    pub fn id_typed(&self) -> SupplierId {
        self.id
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn divisions(&self) -> &[SupplierDivision] {
        &self.divisions
    }

    pub fn ensure_can_transact(&self) -> DomainResult<()> {
        if !self.is_active {
            return Err(DomainError::PartnerInactive(format!(
                "supplier {} is inactive",
                self.code
            )));
        }
        Ok(())
    }

    pub fn accepts_orders_on(&self, day: Weekday) -> bool {
        self.order_days.includes(day)
    }

    pub fn delivers_on(&self, day: Weekday) -> bool {
        self.delivery_days.includes(day)
    }

    pub fn next_delivery_date(&self, from: NaiveDate) -> NaiveDate {
        self.delivery_days.next_on_or_after(from)
    }

    pub fn set_schedules(&mut self, order_days: WeeklySchedule, delivery_days: WeeklySchedule) {
        self.order_days = order_days;
        self.delivery_days = delivery_days;
    }

    pub fn deactivate(&mut self) {
        self.is_active = false;
    }

    pub fn add_division(&mut self, division: SupplierDivision) -> DomainResult<()> {
        if division.name.trim().is_empty() {
            return Err(DomainError::validation("division name cannot be empty"));
        }
        if self
            .divisions
            .iter()
            .any(|d| d.name.eq_ignore_ascii_case(division.name.trim()))
        {
            return Err(DomainError::conflict(format!(
                "division {} already exists",
                division.name
            )));
        }
        self.divisions.push(division);
        Ok(())
    }
}

impl Entity for Supplier {
    type Id = SupplierId;

    fn id(&self) -> &SupplierId {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn division(name: &str) -> SupplierDivision {
        SupplierDivision {
            id: SupplierDivisionId::new(),
            name: name.to_string(),
            payment_terms_days: 30,
            contact_email: None,
            contact_phone: None,
        }
    }

    #[test]
    fn schedules_gate_ordering_and_delivery() {
        let s = Supplier::create(
            SupplierId::new(),
            NewSupplier::new("S1", "Dairy Co")
                .ordering_on([Weekday::Mon])
                .delivering_on([Weekday::Tue, Weekday::Thu]),
        )
        .unwrap();

        assert!(s.accepts_orders_on(Weekday::Mon));
        assert!(!s.accepts_orders_on(Weekday::Tue));
        assert!(s.delivers_on(Weekday::Thu));
        let monday = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        assert_eq!(
            s.next_delivery_date(monday),
            NaiveDate::from_ymd_opt(2026, 10, 20).unwrap()
        );
    }

    #[test]
    fn division_names_are_unique() {
        let mut s = Supplier::create(SupplierId::new(), NewSupplier::new("S1", "Dairy Co")).unwrap();
        s.add_division(division("North")).unwrap();
        let err = s.add_division(division("north")).unwrap_err();
        assert_eq!(err.code(), "CONFLICT");
    }

    #[test]
    fn inactive_supplier_cannot_transact() {
        let mut s = Supplier::create(SupplierId::new(), NewSupplier::new("S1", "Dairy Co")).unwrap();
        s.deactivate();
        assert_eq!(s.ensure_can_transact().unwrap_err().code(), "PARTNER_INACTIVE");
    }
}
