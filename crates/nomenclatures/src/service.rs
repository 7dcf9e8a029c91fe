use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use tracing::{info, warn};

use optimapos_core::{
    CustomerId, DocumentId, DomainError, DomainResult, InMemoryRepository, Repository,
};
use optimapos_events::{Event, EventBus, EventEnvelope};
use optimapos_inventory::{DocumentMovementPlan, InventoryStore, MovementService};
use optimapos_partners::{PartnerRef, PartnerService};
use optimapos_products::ProductCatalog;

use crate::approval::{
    ApprovalContext, ApprovalDecision, ApprovalOutcome, ApprovalRule, ApprovalService, Approver,
};
use crate::document::{check_totals, Document, DocumentLine, LineInput, NewDocument};
use crate::document_type::{DocumentType, DocumentTypeStatus, InventoryDirection, StatusSemantic};
use crate::events::{DOCUMENT_AGGREGATE, DocumentEvent};
use crate::resolver::StatusResolver;
use crate::status_manager::StatusManager;

/// Document after an approval decision, with where the approval stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalResult {
    pub document: Document,
    pub outcome: ApprovalOutcome,
}

/// Facade over documents: lifecycle, lines, approvals and the stock and
/// credit effects of status changes.
///
/// Writes are serialized per service instance; reads go straight to the
/// repository.
pub struct DocumentService<S, B> {
    documents: Arc<dyn Repository<Document>>,
    approvals: Arc<ApprovalService>,
    status: StatusManager<S>,
    catalog: Arc<ProductCatalog>,
    partners: Arc<PartnerService>,
    bus: B,
    counters: Mutex<HashMap<String, u64>>,
    writes: Mutex<()>,
    number_padding: usize,
}

fn poisoned() -> DomainError {
    DomainError::storage("document service lock poisoned")
}

fn approval_context(
    document: &Document,
    document_type: &DocumentType,
    target: &str,
) -> DomainResult<ApprovalContext> {
    Ok(ApprovalContext {
        document_id: document.id,
        document_type: document.document_type.clone(),
        from_status: document.status.clone(),
        to_status: target.to_string(),
        amount: document.total(document_type.direction)?,
    })
}

/// Customer whose credit a document of this type books, if any.
fn credit_customer(document_type: &DocumentType, document: &Document) -> Option<CustomerId> {
    if !document_type.requires_credit_check {
        return None;
    }
    document.partner.and_then(|p| p.customer_id())
}

impl<S, B> DocumentService<S, B>
where
    S: InventoryStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(
        resolver: Arc<StatusResolver>,
        approvals: Arc<ApprovalService>,
        inventory: Arc<MovementService<S>>,
        catalog: Arc<ProductCatalog>,
        partners: Arc<PartnerService>,
        bus: B,
    ) -> Self {
        Self {
            documents: Arc::new(InMemoryRepository::<Document>::new()),
            approvals,
            status: StatusManager::new(resolver, inventory),
            catalog,
            partners,
            bus,
            counters: Mutex::new(HashMap::new()),
            writes: Mutex::new(()),
            number_padding: 6,
        }
    }

    pub fn with_repository(mut self, documents: Arc<dyn Repository<Document>>) -> Self {
        self.documents = documents;
        self
    }

    /// Digits of the running counter in document numbers (`SO000042`).
    pub fn with_number_padding(mut self, width: usize) -> Self {
        self.number_padding = width;
        self
    }

    fn resolver(&self) -> &StatusResolver {
        self.status.resolver()
    }

    fn write_guard(&self) -> DomainResult<MutexGuard<'_, ()>> {
        self.writes.lock().map_err(|_| poisoned())
    }

    // ---- documents and lines ----------------------------------------------

    pub fn create_document(&self, input: NewDocument, at: DateTime<Utc>) -> DomainResult<Document> {
        let document_type = self.resolver().document_type(&input.document_type)?;
        if !document_type.is_active {
            return Err(DomainError::validation(format!(
                "document type {} is inactive",
                document_type.code
            )));
        }
        self.check_partner(&document_type, input.partner)?;
        self.status.inventory().get_location(input.location_id)?;
        if document_type.direction == InventoryDirection::Transfer {
            let target = input.target_location_id.ok_or_else(|| {
                DomainError::validation(format!("{} documents need a target location", document_type.code))
            })?;
            if target == input.location_id {
                return Err(DomainError::validation("transfer source and target must differ"));
            }
            self.status.inventory().get_location(target)?;
        }
        let initial = self.resolver().initial_status(&document_type.code)?;
        let lines = self.build_lines(input.lines, 1)?;
        check_totals(&lines)?;

        let _guard = self.write_guard()?;
        let document = Document {
            id: DocumentId::new(),
            number: self.next_number(&document_type)?,
            document_type: document_type.code.clone(),
            status: initial.status,
            partner: input.partner,
            location_id: input.location_id,
            target_location_id: input.target_location_id,
            lines,
            created_by: input.created_by,
            notes: input.notes,
            credit_charged: Decimal::ZERO,
            version: 1,
            created_at: at,
            updated_at: at,
        };
        self.documents.insert(document.clone())?;
        info!(
            document_id = %document.id,
            number = %document.number,
            lines = document.lines.len(),
            "document created"
        );
        self.publish(
            &document,
            document.version,
            DocumentEvent::Created {
                document_id: document.id,
                number: document.number.clone(),
                document_type: document.document_type.clone(),
                status: document.status.clone(),
                created_by: document.created_by,
                occurred_at: at,
            },
        );
        Ok(document)
    }

    pub fn add_line(&self, id: DocumentId, line: LineInput, at: DateTime<Utc>) -> DomainResult<Document> {
        let (document, _, line_no) = self.edit_lines(id, at, |lines| {
            let line_no = lines.iter().map(|l| l.line_no).max().unwrap_or(0) + 1;
            lines.extend(self.build_lines(vec![line], line_no)?);
            Ok(line_no)
        })?;
        self.publish(
            &document,
            document.version,
            DocumentEvent::LineAdded {
                document_id: id,
                line_no,
                occurred_at: at,
            },
        );
        Ok(document)
    }

    /// Replace every line; lines are renumbered from 1.
    pub fn update_lines(
        &self,
        id: DocumentId,
        lines: Vec<LineInput>,
        at: DateTime<Utc>,
    ) -> DomainResult<Document> {
        let (document, resynced, ()) = self.edit_lines(id, at, |current| {
            *current = self.build_lines(lines, 1)?;
            Ok(())
        })?;
        self.publish(
            &document,
            document.version,
            DocumentEvent::LinesUpdated {
                document_id: id,
                line_count: document.lines.len(),
                resynced,
                occurred_at: at,
            },
        );
        Ok(document)
    }

    pub fn remove_line(&self, id: DocumentId, line_no: u32, at: DateTime<Utc>) -> DomainResult<Document> {
        let (document, _, ()) = self.edit_lines(id, at, |lines| {
            let before = lines.len();
            lines.retain(|l| l.line_no != line_no);
            if lines.len() == before {
                return Err(DomainError::not_found(format!("line {line_no}")));
            }
            Ok(())
        })?;
        self.publish(
            &document,
            document.version,
            DocumentEvent::LineRemoved {
                document_id: id,
                line_no,
                occurred_at: at,
            },
        );
        Ok(document)
    }

    // ---- lifecycle ---------------------------------------------------------

    /// Move a document to `target`, applying the target's stock effects.
    ///
    /// Transitions guarded by approval rules fail with `APPROVAL_REQUIRED`
    /// until every level is signed off.
    pub fn transition(&self, id: DocumentId, target: &str, at: DateTime<Utc>) -> DomainResult<Document> {
        let _guard = self.write_guard()?;
        let document = self.get_document(id)?;
        let document_type = self.resolver().document_type(&document.document_type)?;
        let ctx = approval_context(&document, &document_type, target)?;
        let guarded = self.approvals.is_guarded(&ctx)?;
        if !guarded {
            self.ensure_approval_path(&document_type, &ctx)?;
        }
        if guarded && !self.approvals.is_approved(&ctx)? {
            warn!(
                number = %document.number,
                from = %document.status,
                to = %target,
                "transition awaits approval"
            );
            return Err(DomainError::ApprovalRequired(format!(
                "{} -> {target} on {} needs approval",
                document.status, document.number
            )));
        }
        let saved = self.apply_transition(document, target, at)?;
        if guarded {
            self.approvals.close_round(id)?;
        }
        Ok(saved)
    }

    pub fn submit_for_approval(&self, id: DocumentId, at: DateTime<Utc>) -> DomainResult<Document> {
        self.transition_by_semantic(id, StatusSemantic::Approval, at)
    }

    pub fn complete(&self, id: DocumentId, at: DateTime<Utc>) -> DomainResult<Document> {
        self.transition_by_semantic(id, StatusSemantic::Completion, at)
    }

    pub fn cancel(&self, id: DocumentId, at: DateTime<Utc>) -> DomainResult<Document> {
        self.transition_by_semantic(id, StatusSemantic::Cancellation, at)
    }

    /// Sign off the pending level; the last level moves the document on.
    pub fn approve(
        &self,
        id: DocumentId,
        approver: &Approver,
        comment: Option<String>,
        at: DateTime<Utc>,
    ) -> DomainResult<ApprovalResult> {
        let _guard = self.write_guard()?;
        let document = self.get_document(id)?;
        let document_type = self.resolver().document_type(&document.document_type)?;
        let (ctx, rule) = self.pending_approval(&document, &document_type)?;

        let outcome = self.approvals.approve(&ctx, approver, comment, at)?;
        self.publish(
            &document,
            document.version,
            DocumentEvent::Approved {
                document_id: id,
                level: rule.level,
                user_id: approver.user_id,
                completed: outcome == ApprovalOutcome::Completed,
                occurred_at: at,
            },
        );

        let document = match outcome {
            ApprovalOutcome::Completed => {
                let saved = self.apply_transition(document, &ctx.to_status, at)?;
                self.approvals.close_round(id)?;
                saved
            }
            ApprovalOutcome::Pending { .. } => document,
        };
        Ok(ApprovalResult { document, outcome })
    }

    /// Reject at the pending level; moves to the type's rejection status
    /// when the current status allows it.
    pub fn reject(
        &self,
        id: DocumentId,
        approver: &Approver,
        comment: Option<String>,
        at: DateTime<Utc>,
    ) -> DomainResult<Document> {
        let _guard = self.write_guard()?;
        let document = self.get_document(id)?;
        let document_type = self.resolver().document_type(&document.document_type)?;
        let (ctx, _) = self.pending_approval(&document, &document_type)?;

        let decision: ApprovalDecision = self.approvals.reject(&ctx, approver, comment, at)?;
        self.publish(
            &document,
            document.version,
            DocumentEvent::Rejected {
                document_id: id,
                level: decision.level,
                user_id: decision.user_id,
                comment: decision.comment.clone(),
                occurred_at: at,
            },
        );

        let rejection = match self
            .resolver()
            .status_by_semantic(&document_type.code, StatusSemantic::Rejection)
        {
            Ok(row) => row,
            Err(DomainError::InvalidStatus(_)) => return Ok(document),
            Err(e) => return Err(e),
        };
        let reachable = self
            .resolver()
            .next_statuses(&document_type.code, &document.status)?
            .iter()
            .any(|r| r.status == rejection.status);
        if reachable {
            self.apply_transition(document, &rejection.status, at)
        } else {
            Ok(document)
        }
    }

    /// Remove a document whose status allows it, reversing its stock first.
    pub fn delete_document(&self, id: DocumentId, at: DateTime<Utc>) -> DomainResult<()> {
        let _guard = self.write_guard()?;
        let document = self.get_document(id)?;
        let document_type = self.resolver().document_type(&document.document_type)?;
        if !self
            .resolver()
            .allows_deletion(&document_type.code, &document.status)?
        {
            warn!(number = %document.number, status = %document.status, "delete rejected");
            return Err(DomainError::DeleteNotAllowed(format!(
                "{} is in status {}",
                document.number, document.status
            )));
        }
        let total = document.total(document_type.direction)?;

        let plan = DocumentMovementPlan {
            document_id: id,
            reverse_existing: true,
            lines: Vec::new(),
            occurred_at: at,
        };
        let (outcome, ()) = self.status.inventory().apply_document_plan_with(plan, |_| {
            self.documents.remove(&id)?;
            if let Some(customer_id) = credit_customer(&document_type, &document) {
                if document.credit_charged > Decimal::ZERO {
                    if let Err(e) =
                        self.partners
                            .rebook_credit(customer_id, document.credit_charged, Decimal::ZERO)
                    {
                        self.documents.save(document.clone())?;
                        return Err(e);
                    }
                }
            }
            Ok(())
        })?;

        info!(
            number = %document.number,
            reversed = outcome.reversed.len(),
            "document deleted"
        );
        self.publish(
            &document,
            document.version + 1,
            DocumentEvent::Deleted {
                document_id: id,
                total,
                occurred_at: at,
            },
        );
        Ok(())
    }

    // ---- queries -----------------------------------------------------------

    pub fn get_document(&self, id: DocumentId) -> DomainResult<Document> {
        self.documents
            .get(&id)?
            .ok_or_else(|| DomainError::not_found(format!("document {id}")))
    }

    pub fn documents_in_status(&self, document_type: &str, status: &str) -> DomainResult<Vec<Document>> {
        self.documents
            .find(&|d: &Document| d.document_type == document_type && d.status == status)
    }

    pub fn can_edit(&self, id: DocumentId) -> DomainResult<bool> {
        let document = self.get_document(id)?;
        self.resolver()
            .allows_editing(&document.document_type, &document.status)
    }

    pub fn can_delete(&self, id: DocumentId) -> DomainResult<bool> {
        let document = self.get_document(id)?;
        self.resolver()
            .allows_deletion(&document.document_type, &document.status)
    }

    /// Price total for outgoing types, cost total otherwise.
    pub fn document_total(&self, id: DocumentId) -> DomainResult<Decimal> {
        let document = self.get_document(id)?;
        let document_type = self.resolver().document_type(&document.document_type)?;
        document.total(document_type.direction)
    }

    pub fn available_transitions(&self, id: DocumentId) -> DomainResult<Vec<DocumentTypeStatus>> {
        let document = self.get_document(id)?;
        self.resolver()
            .next_statuses(&document.document_type, &document.status)
    }

    /// Approval rules guarding `document`'s move to `target`.
    pub fn approval_requirements(&self, id: DocumentId, target: &str) -> DomainResult<Vec<ApprovalRule>> {
        let document = self.get_document(id)?;
        let document_type = self.resolver().document_type(&document.document_type)?;
        self.approvals
            .requirements(&approval_context(&document, &document_type, target)?)
    }

    pub fn approval_history(&self, id: DocumentId) -> DomainResult<Vec<ApprovalDecision>> {
        self.approvals.history(id)
    }

    // ---- internals ---------------------------------------------------------

    fn transition_by_semantic(
        &self,
        id: DocumentId,
        semantic: StatusSemantic,
        at: DateTime<Utc>,
    ) -> DomainResult<Document> {
        let document = self.get_document(id)?;
        let row = self
            .resolver()
            .status_by_semantic(&document.document_type, semantic)?;
        self.transition(id, &row.status, at)
    }

    /// For types that require approval: an approval status can only be
    /// entered when rules leave it, and only left forward through a guarded
    /// transition. Rejection, cancellation and draft targets stay open.
    fn ensure_approval_path(&self, document_type: &DocumentType, ctx: &ApprovalContext) -> DomainResult<()> {
        if !document_type.requires_approval {
            return Ok(());
        }
        let rows = self.resolver().statuses(&document_type.code)?;
        let semantic_of = |status: &str| {
            rows.iter()
                .find(|r| r.status == status)
                .and_then(|r| r.semantic)
        };

        match semantic_of(&ctx.to_status) {
            Some(StatusSemantic::Approval) => {
                let has_rules = self
                    .approvals
                    .rules_for(&document_type.code)?
                    .iter()
                    .any(|r| r.is_active && r.from_status == ctx.to_status);
                if has_rules {
                    return Ok(());
                }
            }
            Some(StatusSemantic::Rejection | StatusSemantic::Cancellation | StatusSemantic::Draft) => {
                return Ok(());
            }
            _ if semantic_of(&ctx.from_status) != Some(StatusSemantic::Approval) => return Ok(()),
            _ => {}
        }
        warn!(
            document_type = %document_type.code,
            from = %ctx.from_status,
            to = %ctx.to_status,
            "no approval rule covers the transition"
        );
        Err(DomainError::ApprovalRequired(format!(
            "{} requires approval but no active rule covers {} -> {}",
            document_type.code, ctx.from_status, ctx.to_status
        )))
    }

    /// Plan, execute and persist a transition; caller holds the write guard.
    fn apply_transition(&self, document: Document, target: &str, at: DateTime<Utc>) -> DomainResult<Document> {
        let plan = self.status.plan_transition(&document, target)?;
        if plan.create_movements {
            if let Some(partner) = document.partner {
                self.partners.ensure_can_transact(partner)?;
            }
        }
        let mut updated = document.clone();
        updated.status = plan.to.status.clone();
        updated.touch(at);

        let (outcome, saved) = self.status.execute(&document, plan, at, |plan, movements| {
            self.settle(updated, &plan.document_type, plan.movements_active_after(movements))
        })?;
        self.publish(
            &saved,
            saved.version,
            DocumentEvent::StatusChanged {
                document_id: saved.id,
                from_status: outcome.from_status,
                to_status: outcome.to_status,
                movements_created: outcome.movements.created.len(),
                movements_reversed: outcome.movements.reversed.len(),
                occurred_at: at,
            },
        );
        Ok(saved)
    }

    /// Check editability, apply `mutate` to the lines and re-sync stock.
    fn edit_lines<R>(
        &self,
        id: DocumentId,
        at: DateTime<Utc>,
        mutate: impl FnOnce(&mut Vec<DocumentLine>) -> DomainResult<R>,
    ) -> DomainResult<(Document, bool, R)> {
        let _guard = self.write_guard()?;
        let document = self.get_document(id)?;
        let document_type = self.resolver().document_type(&document.document_type)?;
        if !self
            .resolver()
            .allows_editing(&document_type.code, &document.status)?
        {
            warn!(number = %document.number, status = %document.status, "edit rejected");
            return Err(DomainError::EditNotAllowed(format!(
                "{} is in status {}",
                document.number, document.status
            )));
        }

        let mut updated = document;
        let extra = mutate(&mut updated.lines)?;
        check_totals(&updated.lines)?;
        updated.touch(at);

        if self.status.inventory().has_active_movements(id)? {
            if let Some(partner) = updated.partner {
                self.partners.ensure_can_transact(partner)?;
            }
            let candidate = updated.clone();
            let (_, saved) = self.status.resync(&updated, at, |movements| {
                self.settle(candidate, &document_type, !movements.created.is_empty())
            })?;
            Ok((saved, true, extra))
        } else {
            Ok((self.settle(updated, &document_type, false)?, false, extra))
        }
    }

    /// Book credit for the document's new state and save it.
    ///
    /// Runs inside the inventory transaction: an error here rolls the stock
    /// back, and a failed save gives the credit back.
    fn settle(
        &self,
        mut document: Document,
        document_type: &DocumentType,
        has_movements: bool,
    ) -> DomainResult<Document> {
        let customer = credit_customer(document_type, &document);
        let previous = document.credit_charged;
        let target = match customer {
            Some(_) if has_movements => document.total(document_type.direction)?,
            _ => Decimal::ZERO,
        };

        let rebooked = match customer {
            Some(customer_id) if target != previous => {
                self.partners.rebook_credit(customer_id, previous, target)?;
                Some(customer_id)
            }
            _ => None,
        };
        document.credit_charged = target;

        if let Err(e) = self.documents.save(document.clone()) {
            if let Some(customer_id) = rebooked {
                if let Err(undo) = self.partners.rebook_credit(customer_id, target, previous) {
                    warn!(%customer_id, code = undo.code(), "credit compensation failed");
                }
            }
            return Err(e);
        }
        Ok(document)
    }

    /// First guarded target from the current status with a level still open.
    fn pending_approval(
        &self,
        document: &Document,
        document_type: &DocumentType,
    ) -> DomainResult<(ApprovalContext, ApprovalRule)> {
        let amount = document.total(document_type.direction)?;
        for target in self
            .approvals
            .guarded_targets(&document.document_type, &document.status, amount)?
        {
            let ctx = approval_context(document, document_type, &target)?;
            if let Some(rule) = self.approvals.pending_rule(&ctx)? {
                return Ok((ctx, rule));
            }
        }
        Err(DomainError::conflict(format!(
            "{} has no pending approval in status {}",
            document.number, document.status
        )))
    }

    fn check_partner(&self, document_type: &DocumentType, partner: Option<PartnerRef>) -> DomainResult<()> {
        match (document_type.partner_kind, partner) {
            (Some(kind), None) => Err(DomainError::validation(format!(
                "{} documents need a {kind:?} partner",
                document_type.code
            ))),
            (Some(kind), Some(p)) if p.kind() != kind => Err(DomainError::validation(format!(
                "{} documents need a {kind:?} partner, got {p}",
                document_type.code
            ))),
            (_, Some(PartnerRef::Customer(id))) => self.partners.get_customer(id).map(|_| ()),
            (_, Some(PartnerRef::Supplier(id))) => self.partners.get_supplier(id).map(|_| ()),
            (None, None) => Ok(()),
        }
    }

    fn build_lines(&self, inputs: Vec<LineInput>, first_line_no: u32) -> DomainResult<Vec<DocumentLine>> {
        inputs
            .into_iter()
            .zip(first_line_no..)
            .map(|(input, line_no)| {
                let product = self.catalog.require_active(input.product_id)?;
                let quantity = product.validate_quantity(input.quantity)?;
                input.into_line(line_no, quantity)
            })
            .collect()
    }

    fn next_number(&self, document_type: &DocumentType) -> DomainResult<String> {
        let mut counters = self.counters.lock().map_err(|_| poisoned())?;
        let counter = counters.entry(document_type.code.clone()).or_insert(0);
        *counter += 1;
        Ok(format!(
            "{}{:0width$}",
            document_type.number_prefix,
            *counter,
            width = self.number_padding
        ))
    }

    fn publish(&self, document: &Document, sequence: u64, event: DocumentEvent) {
        let envelope =
            match EventEnvelope::from_typed(*document.id.as_uuid(), DOCUMENT_AGGREGATE, sequence, &event) {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!(number = %document.number, error = %e, "document event not serializable");
                    return;
                }
            };
        if let Err(e) = self.bus.publish(envelope) {
            warn!(
                number = %document.number,
                event_type = event.event_type(),
                error = ?e,
                "document event publish failed"
            );
        }
    }
}
