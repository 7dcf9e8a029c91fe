//! Standard document types shipped with a fresh installation.

use rust_decimal::Decimal;
use tracing::info;

use optimapos_core::DomainResult;
use optimapos_nomenclatures::{
    ApprovalRule, ApprovalService, DocumentType, DocumentTypeStatus, InventoryDirection,
    StatusResolver, StatusSemantic,
};
use optimapos_partners::PartnerKind;

pub mod codes {
    pub const PURCHASE_REQUEST: &str = "PR";
    pub const PURCHASE_ORDER: &str = "PO";
    pub const DELIVERY_RECEIPT: &str = "DR";
    pub const SALES_ORDER: &str = "SO";
    pub const SALES_DELIVERY: &str = "SD";
    pub const STOCK_TRANSFER: &str = "TR";
    pub const INVENTORY_COUNT: &str = "IC";
}

/// Purchase orders at or above this total need a second sign-off.
const PO_SECOND_LEVEL_FROM: i64 = 5_000;

/// draft -> pending -> approved, with rejected going back to draft.
fn approval_statuses(code: &str, completion: Option<&str>) -> Vec<DocumentTypeStatus> {
    let mut approved = DocumentTypeStatus::new(code, "approved", "Approved", 30).locked();
    approved = match completion {
        Some(next) => approved.next([next, "cancelled"]),
        None => approved.final_status().semantic(StatusSemantic::Completion),
    };

    let mut rows = vec![
        DocumentTypeStatus::new(code, "draft", "Draft", 10)
            .initial()
            .semantic(StatusSemantic::Draft)
            .next(["pending", "cancelled"]),
        DocumentTypeStatus::new(code, "pending", "Pending approval", 20)
            .locked()
            .semantic(StatusSemantic::Approval)
            .next(["approved", "rejected"]),
        approved,
        DocumentTypeStatus::new(code, "rejected", "Rejected", 40)
            .semantic(StatusSemantic::Rejection)
            .next(["draft", "cancelled"]),
        DocumentTypeStatus::new(code, "cancelled", "Cancelled", 50)
            .final_status()
            .semantic(StatusSemantic::Cancellation),
    ];
    if let Some(next) = completion {
        rows.push(
            DocumentTypeStatus::new(code, next, "Ordered", 60)
                .final_status()
                .locked()
                .semantic(StatusSemantic::Completion),
        );
    }
    rows
}

/// draft -> booked -> closed; cancelling reverses stock and reopens as draft.
fn stock_statuses(code: &str, booked: &str, booked_name: &str) -> Vec<DocumentTypeStatus> {
    vec![
        DocumentTypeStatus::new(code, "draft", "Draft", 10)
            .initial()
            .semantic(StatusSemantic::Draft)
            .next([booked, "cancelled"]),
        DocumentTypeStatus::new(code, booked, booked_name, 20)
            .creating_movements()
            .locked()
            .next(["closed", "cancelled"]),
        DocumentTypeStatus::new(code, "closed", "Closed", 30)
            .final_status()
            .locked()
            .semantic(StatusSemantic::Completion),
        DocumentTypeStatus::new(code, "cancelled", "Cancelled", 40)
            .reversing_movements()
            .semantic(StatusSemantic::Cancellation)
            .next(["draft"]),
    ]
}

fn install(
    resolver: &StatusResolver,
    document_type: DocumentType,
    rows: Vec<DocumentTypeStatus>,
) -> DomainResult<bool> {
    if resolver.document_type(&document_type.code).is_ok() {
        return Ok(false);
    }
    let code = document_type.code.clone();
    resolver.register_type(document_type)?;
    for row in rows {
        resolver.register_status(row)?;
    }
    resolver.validate_workflow(&code)?;
    Ok(true)
}

/// Register the standard document types, their status rows and approval
/// rules. Types that already exist are left alone.
pub fn seed_default_workflows(
    resolver: &StatusResolver,
    approvals: &ApprovalService,
) -> DomainResult<()> {
    use codes::*;

    let mut installed: Vec<String> = Vec::new();

    if install(
        resolver,
        DocumentType::new(PURCHASE_REQUEST, "Purchase request", "PR", InventoryDirection::None)
            .with_approval(),
        approval_statuses(PURCHASE_REQUEST, None),
    )? {
        approvals.add_rule(ApprovalRule::new(
            PURCHASE_REQUEST,
            "pending",
            "approved",
            1,
            "department_head",
        ))?;
        installed.push(PURCHASE_REQUEST.to_string());
    }

    if install(
        resolver,
        DocumentType::new(PURCHASE_ORDER, "Purchase order", "PO", InventoryDirection::None)
            .with_partner(PartnerKind::Supplier)
            .with_approval(),
        approval_statuses(PURCHASE_ORDER, Some("ordered")),
    )? {
        approvals.add_rule(ApprovalRule::new(PURCHASE_ORDER, "pending", "approved", 1, "buyer"))?;
        approvals.add_rule(
            ApprovalRule::new(PURCHASE_ORDER, "pending", "approved", 2, "finance_manager")
                .for_amounts(Some(Decimal::from(PO_SECOND_LEVEL_FROM)), None),
        )?;
        installed.push(PURCHASE_ORDER.to_string());
    }

    let stock_types = [
        (
            DocumentType::new(DELIVERY_RECEIPT, "Delivery receipt", "DR", InventoryDirection::Incoming)
                .with_partner(PartnerKind::Supplier),
            "received",
            "Received",
        ),
        (
            DocumentType::new(SALES_ORDER, "Sales order", "SO", InventoryDirection::Outgoing)
                .with_partner(PartnerKind::Customer)
                .with_credit_check(),
            "confirmed",
            "Confirmed",
        ),
        (
            DocumentType::new(SALES_DELIVERY, "Sales delivery", "SD", InventoryDirection::Outgoing)
                .with_partner(PartnerKind::Customer),
            "shipped",
            "Shipped",
        ),
        (
            DocumentType::new(STOCK_TRANSFER, "Stock transfer", "TR", InventoryDirection::Transfer),
            "sent",
            "Sent",
        ),
        (
            DocumentType::new(INVENTORY_COUNT, "Inventory count", "IC", InventoryDirection::Count),
            "counted",
            "Counted",
        ),
    ];
    for (document_type, booked, booked_name) in stock_types {
        let code = document_type.code.clone();
        let rows = stock_statuses(&code, booked, booked_name);
        if install(resolver, document_type, rows)? {
            installed.push(code);
        }
    }

    info!(installed = ?installed, "default workflows seeded");
    Ok(())
}
