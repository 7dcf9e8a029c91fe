//! Document workflow engine.
//!
//! Document types and their status rows are configuration. What a document
//! does to stock is decided by the status it enters: some statuses book one
//! movement set per line, some reverse the document's active movements.
//! Approval rules can guard individual transitions.

pub mod approval;
pub mod document;
pub mod document_type;
pub mod events;
pub mod resolver;
pub mod service;
pub mod status_manager;

pub use approval::{
    ApprovalContext, ApprovalDecision, ApprovalOutcome, ApprovalRule, ApprovalService,
    ApprovalVerdict, Approver,
};
pub use document::{Document, DocumentLine, LineInput, NewDocument};
pub use document_type::{DocumentType, DocumentTypeStatus, InventoryDirection, StatusSemantic};
pub use events::{DOCUMENT_AGGREGATE, DocumentEvent};
pub use resolver::StatusResolver;
pub use service::{ApprovalResult, DocumentService};
pub use status_manager::{StatusManager, TransitionOutcome, TransitionPlan, movement_requests};
