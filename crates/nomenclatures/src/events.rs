use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use optimapos_core::{DocumentId, UserId};
use optimapos_events::Event;

pub const DOCUMENT_AGGREGATE: &str = "documents.document";

/// Facts about a document, published after the change is committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DocumentEvent {
    Created {
        document_id: DocumentId,
        number: String,
        document_type: String,
        status: String,
        created_by: UserId,
        occurred_at: DateTime<Utc>,
    },
    LineAdded {
        document_id: DocumentId,
        line_no: u32,
        occurred_at: DateTime<Utc>,
    },
    LinesUpdated {
        document_id: DocumentId,
        line_count: usize,
        resynced: bool,
        occurred_at: DateTime<Utc>,
    },
    LineRemoved {
        document_id: DocumentId,
        line_no: u32,
        occurred_at: DateTime<Utc>,
    },
    StatusChanged {
        document_id: DocumentId,
        from_status: String,
        to_status: String,
        movements_created: usize,
        movements_reversed: usize,
        occurred_at: DateTime<Utc>,
    },
    Approved {
        document_id: DocumentId,
        level: u32,
        user_id: UserId,
        completed: bool,
        occurred_at: DateTime<Utc>,
    },
    Rejected {
        document_id: DocumentId,
        level: u32,
        user_id: UserId,
        comment: Option<String>,
        occurred_at: DateTime<Utc>,
    },
    Deleted {
        document_id: DocumentId,
        total: Decimal,
        occurred_at: DateTime<Utc>,
    },
}

impl DocumentEvent {
    pub fn document_id(&self) -> DocumentId {
        match self {
            DocumentEvent::Created { document_id, .. }
            | DocumentEvent::LineAdded { document_id, .. }
            | DocumentEvent::LinesUpdated { document_id, .. }
            | DocumentEvent::LineRemoved { document_id, .. }
            | DocumentEvent::StatusChanged { document_id, .. }
            | DocumentEvent::Approved { document_id, .. }
            | DocumentEvent::Rejected { document_id, .. }
            | DocumentEvent::Deleted { document_id, .. } => *document_id,
        }
    }
}

impl Event for DocumentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            DocumentEvent::Created { .. } => "documents.document.created",
            DocumentEvent::LineAdded { .. } => "documents.document.line_added",
            DocumentEvent::LinesUpdated { .. } => "documents.document.lines_updated",
            DocumentEvent::LineRemoved { .. } => "documents.document.line_removed",
            DocumentEvent::StatusChanged { .. } => "documents.document.status_changed",
            DocumentEvent::Approved { .. } => "documents.document.approved",
            DocumentEvent::Rejected { .. } => "documents.document.rejected",
            DocumentEvent::Deleted { .. } => "documents.document.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            DocumentEvent::Created { occurred_at, .. }
            | DocumentEvent::LineAdded { occurred_at, .. }
            | DocumentEvent::LinesUpdated { occurred_at, .. }
            | DocumentEvent::LineRemoved { occurred_at, .. }
            | DocumentEvent::StatusChanged { occurred_at, .. }
            | DocumentEvent::Approved { occurred_at, .. }
            | DocumentEvent::Rejected { occurred_at, .. }
            | DocumentEvent::Deleted { occurred_at, .. } => *occurred_at,
        }
    }
}
