use serde::{Deserialize, Serialize};

use optimapos_core::{DomainError, DomainResult};
use optimapos_partners::PartnerKind;

/// Stock effect of a document type's lines once a movement-creating status
/// is entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InventoryDirection {
    /// No stock effect (requests, quotes).
    None,
    Incoming,
    Outgoing,
    Transfer,
    Count,
}

/// Role a status plays in the workflow, so callers look statuses up by
/// meaning rather than by code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusSemantic {
    Draft,
    Approval,
    Completion,
    Cancellation,
    Rejection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentType {
    pub code: String,
    pub name: String,
    pub number_prefix: String,
    pub direction: InventoryDirection,
    /// Partner every document of this type must reference, if any.
    pub partner_kind: Option<PartnerKind>,
    pub requires_approval: bool,
    pub requires_credit_check: bool,
    pub is_active: bool,
}

impl DocumentType {
    pub fn new(
        code: impl Into<String>,
        name: impl Into<String>,
        number_prefix: impl Into<String>,
        direction: InventoryDirection,
    ) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            number_prefix: number_prefix.into(),
            direction,
            partner_kind: None,
            requires_approval: false,
            requires_credit_check: false,
            is_active: true,
        }
    }

    pub fn with_partner(mut self, kind: PartnerKind) -> Self {
        self.partner_kind = Some(kind);
        self
    }

    pub fn with_approval(mut self) -> Self {
        self.requires_approval = true;
        self
    }

    pub fn with_credit_check(mut self) -> Self {
        self.requires_credit_check = true;
        self
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.code.trim().is_empty() {
            return Err(DomainError::validation("document type code cannot be empty"));
        }
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("document type name cannot be empty"));
        }
        if self.requires_credit_check
            && (self.direction != InventoryDirection::Outgoing
                || self.partner_kind != Some(PartnerKind::Customer))
        {
            return Err(DomainError::validation(format!(
                "credit check on {} needs an outgoing customer document",
                self.code
            )));
        }
        Ok(())
    }
}

/// Per (document type, status) workflow configuration row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentTypeStatus {
    pub document_type: String,
    pub status: String,
    pub name: String,
    pub sort_order: u32,
    pub is_initial: bool,
    pub is_final: bool,
    pub is_active: bool,
    pub creates_inventory_movements: bool,
    pub reverses_inventory_movements: bool,
    pub allows_editing: bool,
    pub allows_deletion: bool,
    pub semantic: Option<StatusSemantic>,
    /// Allowed targets; empty means any configured status.
    pub next_statuses: Vec<String>,
}

impl DocumentTypeStatus {
    /// Editable, deletable, effect-free status row.
    pub fn new(
        document_type: impl Into<String>,
        status: impl Into<String>,
        name: impl Into<String>,
        sort_order: u32,
    ) -> Self {
        Self {
            document_type: document_type.into(),
            status: status.into(),
            name: name.into(),
            sort_order,
            is_initial: false,
            is_final: false,
            is_active: true,
            creates_inventory_movements: false,
            reverses_inventory_movements: false,
            allows_editing: true,
            allows_deletion: true,
            semantic: None,
            next_statuses: Vec::new(),
        }
    }

    pub fn initial(mut self) -> Self {
        self.is_initial = true;
        self
    }

    pub fn final_status(mut self) -> Self {
        self.is_final = true;
        self
    }

    pub fn creating_movements(mut self) -> Self {
        self.creates_inventory_movements = true;
        self
    }

    pub fn reversing_movements(mut self) -> Self {
        self.reverses_inventory_movements = true;
        self
    }

    pub fn locked(mut self) -> Self {
        self.allows_editing = false;
        self.allows_deletion = false;
        self
    }

    pub fn semantic(mut self, semantic: StatusSemantic) -> Self {
        self.semantic = Some(semantic);
        self
    }

    pub fn next<I, T>(mut self, statuses: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.next_statuses = statuses.into_iter().map(Into::into).collect();
        self
    }

    pub fn allows_target(&self, target: &str) -> bool {
        self.next_statuses.is_empty() || self.next_statuses.iter().any(|s| s == target)
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.status.trim().is_empty() {
            return Err(DomainError::validation("status code cannot be empty"));
        }
        if self.is_initial && self.is_final {
            return Err(DomainError::validation(format!(
                "status {} cannot be both initial and final",
                self.status
            )));
        }
        if self.next_statuses.iter().any(|s| s == &self.status) {
            return Err(DomainError::validation(format!(
                "status {} cannot list itself as a next status",
                self.status
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_whitelist_allows_anything() {
        let open = DocumentTypeStatus::new("SO", "draft", "Draft", 10);
        assert!(open.allows_target("confirmed"));

        let strict = open.next(["confirmed"]);
        assert!(strict.allows_target("confirmed"));
        assert!(!strict.allows_target("delivered"));
    }

    #[test]
    fn credit_check_only_on_outgoing_customer_types() {
        let incoming = DocumentType::new("PO", "Purchase order", "PO", InventoryDirection::Incoming)
            .with_partner(PartnerKind::Supplier)
            .with_credit_check();
        assert!(incoming.validate().is_err());

        let outgoing = DocumentType::new("SO", "Sales order", "SO", InventoryDirection::Outgoing)
            .with_partner(PartnerKind::Customer)
            .with_credit_check();
        assert!(outgoing.validate().is_ok());
    }

    #[test]
    fn self_loop_is_rejected() {
        let row = DocumentTypeStatus::new("SO", "draft", "Draft", 10).next(["draft"]);
        assert_eq!(row.validate().unwrap_err().code(), "VALIDATION_ERROR");
    }
}
