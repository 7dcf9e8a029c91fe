//! `optimapos-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives shared by every module:
//! identifiers, the business error model, decimal precision rules and the
//! entity/repository seam.

pub mod decimal;
pub mod entity;
pub mod error;
pub mod id;
pub mod repository;

pub use entity::Entity;
pub use error::{DomainError, DomainResult, ErrorReport};
pub use id::{
    ApprovalRuleId, BatchId, CustomerId, CustomerSiteId, DocumentId, LocationId, MovementId,
    ProductId, SupplierDivisionId, SupplierId, UserId,
};
pub use repository::{InMemoryRepository, Repository};
