//! Domain error model.
//!
//! Expected business failures are values, not panics: every service returns
//! `DomainResult<T>` and callers either continue or bubble the error up
//! unchanged. Each variant carries a stable string code so that callers
//! outside the process can branch on it.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, stock, credit, workflow). `Storage` is the single escape hatch
/// for unexpected infrastructure faults.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A conflict occurred (duplicate code, already reversed, ...).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Not enough stock at the location to cover an outbound movement.
    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock {
        requested: Decimal,
        available: Decimal,
    },

    /// A specific batch no longer holds the quantity being removed from it.
    #[error("insufficient batch stock: requested {requested}, remaining {remaining}")]
    InsufficientBatchStock {
        requested: Decimal,
        remaining: Decimal,
    },

    /// Order amount exceeds the customer's remaining credit.
    #[error("credit exceeded: amount {amount}, available {available}")]
    CreditExceeded { amount: Decimal, available: Decimal },

    /// Partner is inactive or blocked.
    #[error("partner cannot transact: {0}")]
    PartnerInactive(String),

    /// Status is not configured for the document type.
    #[error("invalid status: {0}")]
    InvalidStatus(String),

    /// Status exists but the move into it is not permitted.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("editing not allowed: {0}")]
    EditNotAllowed(String),

    #[error("deletion not allowed: {0}")]
    DeleteNotAllowed(String),

    /// Transition is guarded by approval rules that are not yet satisfied.
    #[error("approval required: {0}")]
    ApprovalRequired(String),

    /// Actor lacks the role required for the operation.
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    /// Unexpected storage failure (poisoned lock, backend error).
    #[error("storage error: {0}")]
    Storage(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn invalid_status(msg: impl Into<String>) -> Self {
        Self::InvalidStatus(msg.into())
    }

    pub fn invalid_transition(msg: impl Into<String>) -> Self {
        Self::InvalidTransition(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::Validation(_) => "VALIDATION_ERROR",
            DomainError::InvariantViolation(_) => "INVARIANT_VIOLATION",
            DomainError::InvalidId(_) => "INVALID_ID",
            DomainError::NotFound(_) => "NOT_FOUND",
            DomainError::Conflict(_) => "CONFLICT",
            DomainError::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            DomainError::InsufficientBatchStock { .. } => "INSUFFICIENT_BATCH_STOCK",
            DomainError::CreditExceeded { .. } => "CREDIT_EXCEEDED",
            DomainError::PartnerInactive(_) => "PARTNER_INACTIVE",
            DomainError::InvalidStatus(_) => "INVALID_STATUS",
            DomainError::InvalidTransition(_) => "INVALID_TRANSITION",
            DomainError::EditNotAllowed(_) => "EDIT_NOT_ALLOWED",
            DomainError::DeleteNotAllowed(_) => "DELETE_NOT_ALLOWED",
            DomainError::ApprovalRequired(_) => "APPROVAL_REQUIRED",
            DomainError::NotAuthorized(_) => "NOT_AUTHORIZED",
            DomainError::Storage(_) => "STORAGE_ERROR",
        }
    }

    /// True for failures caused by the environment rather than business rules.
    pub fn is_system(&self) -> bool {
        matches!(self, DomainError::Storage(_))
    }

    pub fn to_report(&self) -> ErrorReport {
        ErrorReport {
            code: self.code().to_string(),
            message: self.to_string(),
        }
    }
}

/// Serializable failure shape handed to callers outside the domain layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub code: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn codes_are_stable() {
        assert_eq!(
            DomainError::InsufficientStock {
                requested: dec!(5),
                available: dec!(2),
            }
            .code(),
            "INSUFFICIENT_STOCK"
        );
        assert_eq!(
            DomainError::CreditExceeded {
                amount: dec!(10),
                available: dec!(1),
            }
            .code(),
            "CREDIT_EXCEEDED"
        );
        assert_eq!(DomainError::invalid_status("x").code(), "INVALID_STATUS");
    }

    #[test]
    fn report_carries_code_and_message() {
        let report = DomainError::conflict("already reversed").to_report();
        assert_eq!(report.code, "CONFLICT");
        assert_eq!(report.message, "conflict: already reversed");
    }

    #[test]
    fn only_storage_is_a_system_error() {
        assert!(DomainError::storage("poisoned").is_system());
        assert!(!DomainError::validation("bad").is_system());
    }
}
