use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use optimapos_core::{DomainError, DomainResult};

use crate::document_type::{DocumentType, DocumentTypeStatus, StatusSemantic};

#[derive(Debug, Default)]
struct WorkflowConfig {
    types: HashMap<String, DocumentType>,
    /// Status rows per type code, kept sorted by `sort_order`.
    statuses: HashMap<String, Vec<DocumentTypeStatus>>,
}

/// Read side of the workflow configuration: which statuses exist for a
/// document type and what entering each of them means.
#[derive(Debug, Default)]
pub struct StatusResolver {
    config: RwLock<WorkflowConfig>,
}

fn poisoned() -> DomainError {
    DomainError::storage("workflow config lock poisoned")
}

impl StatusResolver {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> DomainResult<RwLockReadGuard<'_, WorkflowConfig>> {
        self.config.read().map_err(|_| poisoned())
    }

    fn write(&self) -> DomainResult<RwLockWriteGuard<'_, WorkflowConfig>> {
        self.config.write().map_err(|_| poisoned())
    }

    pub fn register_type(&self, document_type: DocumentType) -> DomainResult<()> {
        document_type.validate()?;
        let mut config = self.write()?;
        if config.types.contains_key(&document_type.code) {
            return Err(DomainError::conflict(format!(
                "document type {} already exists",
                document_type.code
            )));
        }
        config
            .statuses
            .insert(document_type.code.clone(), Vec::new());
        config.types.insert(document_type.code.clone(), document_type);
        Ok(())
    }

    pub fn register_status(&self, row: DocumentTypeStatus) -> DomainResult<()> {
        row.validate()?;
        let mut config = self.write()?;
        let rows = config
            .statuses
            .get_mut(&row.document_type)
            .ok_or_else(|| DomainError::not_found(format!("document type {}", row.document_type)))?;
        if rows.iter().any(|r| r.status == row.status) {
            return Err(DomainError::conflict(format!(
                "status {} already configured for {}",
                row.status, row.document_type
            )));
        }
        if row.is_initial && rows.iter().any(|r| r.is_initial) {
            return Err(DomainError::conflict(format!(
                "{} already has an initial status",
                row.document_type
            )));
        }
        rows.push(row);
        rows.sort_by_key(|r| r.sort_order);
        Ok(())
    }

    pub fn set_type_active(&self, code: &str, active: bool) -> DomainResult<()> {
        let mut config = self.write()?;
        let document_type = config
            .types
            .get_mut(code)
            .ok_or_else(|| DomainError::not_found(format!("document type {code}")))?;
        document_type.is_active = active;
        Ok(())
    }

    /// Every whitelisted next status must exist and exactly one row must be
    /// initial.
    pub fn validate_workflow(&self, code: &str) -> DomainResult<()> {
        let rows = self.statuses(code)?;
        if rows.iter().filter(|r| r.is_initial).count() != 1 {
            return Err(DomainError::validation(format!(
                "{code} needs exactly one initial status"
            )));
        }
        for row in &rows {
            if let Some(missing) = row
                .next_statuses
                .iter()
                .find(|next| !rows.iter().any(|r| &r.status == *next))
            {
                return Err(DomainError::validation(format!(
                    "{code}: {} lists unknown next status {missing}",
                    row.status
                )));
            }
        }
        Ok(())
    }

    pub fn document_type(&self, code: &str) -> DomainResult<DocumentType> {
        self.read()?
            .types
            .get(code)
            .cloned()
            .ok_or_else(|| DomainError::not_found(format!("document type {code}")))
    }

    pub fn document_types(&self) -> DomainResult<Vec<DocumentType>> {
        let mut types: Vec<DocumentType> = self.read()?.types.values().cloned().collect();
        types.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(types)
    }

    /// All rows of a type in `sort_order`, inactive ones included.
    pub fn statuses(&self, code: &str) -> DomainResult<Vec<DocumentTypeStatus>> {
        self.read()?
            .statuses
            .get(code)
            .cloned()
            .ok_or_else(|| DomainError::not_found(format!("document type {code}")))
    }

    /// The active row for `status`, or `INVALID_STATUS`.
    pub fn require_status(&self, code: &str, status: &str) -> DomainResult<DocumentTypeStatus> {
        self.statuses(code)?
            .into_iter()
            .find(|r| r.status == status && r.is_active)
            .ok_or_else(|| {
                DomainError::invalid_status(format!("{status} is not an active status of {code}"))
            })
    }

    pub fn initial_status(&self, code: &str) -> DomainResult<DocumentTypeStatus> {
        self.statuses(code)?
            .into_iter()
            .find(|r| r.is_initial && r.is_active)
            .ok_or_else(|| DomainError::invalid_status(format!("{code} has no initial status")))
    }

    /// First active status (by `sort_order`) carrying `semantic`.
    pub fn status_by_semantic(
        &self,
        code: &str,
        semantic: StatusSemantic,
    ) -> DomainResult<DocumentTypeStatus> {
        self.statuses(code)?
            .into_iter()
            .find(|r| r.semantic == Some(semantic) && r.is_active)
            .ok_or_else(|| {
                DomainError::invalid_status(format!("{code} has no {semantic:?} status"))
            })
    }

    /// Statuses a document in `current` may move to.
    pub fn next_statuses(&self, code: &str, current: &str) -> DomainResult<Vec<DocumentTypeStatus>> {
        let current = self.require_status(code, current)?;
        if current.is_final {
            return Ok(Vec::new());
        }
        Ok(self
            .statuses(code)?
            .into_iter()
            .filter(|r| r.is_active && r.status != current.status && current.allows_target(&r.status))
            .collect())
    }

    pub fn is_final(&self, code: &str, status: &str) -> DomainResult<bool> {
        Ok(self.require_status(code, status)?.is_final)
    }

    pub fn allows_editing(&self, code: &str, status: &str) -> DomainResult<bool> {
        Ok(self.require_status(code, status)?.allows_editing)
    }

    pub fn allows_deletion(&self, code: &str, status: &str) -> DomainResult<bool> {
        Ok(self.require_status(code, status)?.allows_deletion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document_type::InventoryDirection;

    fn resolver() -> StatusResolver {
        let r = StatusResolver::new();
        r.register_type(DocumentType::new("SO", "Sales order", "SO", InventoryDirection::Outgoing))
            .unwrap();
        for row in [
            DocumentTypeStatus::new("SO", "draft", "Draft", 10)
                .initial()
                .semantic(StatusSemantic::Draft)
                .next(["confirmed", "cancelled"]),
            DocumentTypeStatus::new("SO", "confirmed", "Confirmed", 20)
                .creating_movements()
                .locked()
                .next(["delivered", "cancelled"]),
            DocumentTypeStatus::new("SO", "delivered", "Delivered", 30)
                .final_status()
                .locked()
                .semantic(StatusSemantic::Completion),
            DocumentTypeStatus::new("SO", "cancelled", "Cancelled", 40)
                .reversing_movements()
                .semantic(StatusSemantic::Cancellation)
                .next(["draft"]),
        ] {
            r.register_status(row).unwrap();
        }
        r
    }

    #[test]
    fn resolves_statuses_by_code_and_meaning() {
        let r = resolver();
        assert_eq!(r.initial_status("SO").unwrap().status, "draft");
        assert_eq!(
            r.status_by_semantic("SO", StatusSemantic::Cancellation).unwrap().status,
            "cancelled"
        );
        assert!(r.is_final("SO", "delivered").unwrap());
        assert!(!r.allows_editing("SO", "confirmed").unwrap());
        r.validate_workflow("SO").unwrap();
    }

    #[test]
    fn unknown_status_is_invalid_status() {
        let r = resolver();
        assert_eq!(r.require_status("SO", "shipped").unwrap_err().code(), "INVALID_STATUS");
        assert_eq!(
            r.status_by_semantic("SO", StatusSemantic::Approval).unwrap_err().code(),
            "INVALID_STATUS"
        );
    }

    #[test]
    fn next_statuses_follow_whitelist_and_finality() {
        let r = resolver();
        let next: Vec<String> = r
            .next_statuses("SO", "draft")
            .unwrap()
            .into_iter()
            .map(|s| s.status)
            .collect();
        assert_eq!(next, vec!["confirmed", "cancelled"]);
        assert!(r.next_statuses("SO", "delivered").unwrap().is_empty());
    }

    #[test]
    fn second_initial_status_conflicts() {
        let r = resolver();
        let err = r
            .register_status(DocumentTypeStatus::new("SO", "new", "New", 5).initial())
            .unwrap_err();
        assert_eq!(err.code(), "CONFLICT");
    }

    #[test]
    fn dangling_next_status_fails_validation() {
        let r = resolver();
        r.register_type(DocumentType::new("X", "X", "X", InventoryDirection::None))
            .unwrap();
        r.register_status(DocumentTypeStatus::new("X", "a", "A", 1).initial().next(["b"]))
            .unwrap();
        assert_eq!(r.validate_workflow("X").unwrap_err().code(), "VALIDATION_ERROR");
    }
}
