//! Partners: customers and suppliers.
//!
//! Plain relational records (sites, divisions, schedules) plus the only
//! partner rule with real teeth: credit validation.

pub mod customer;
pub mod partner_ref;
pub mod schedule;
pub mod service;
pub mod supplier;

pub use customer::{CreditCheck, Customer, CustomerSite, NewCustomer};
pub use partner_ref::{PartnerKind, PartnerRef};
pub use schedule::WeeklySchedule;
pub use service::PartnerService;
pub use supplier::{NewSupplier, Supplier, SupplierDivision};
