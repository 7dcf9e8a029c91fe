//! Status transitions and the stock effects they trigger.
//!
//! Entering a status that creates movements books one movement set per
//! document line; entering a status that reverses movements undoes the
//! document's active ones. Both happen inside one inventory transaction
//! together with whatever the caller persists in `then`, so a failure
//! anywhere leaves status, stock and ledger untouched.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{info, warn};

use optimapos_core::{DomainError, DomainResult};
use optimapos_inventory::{
    CycleCount, DocumentMovementOutcome, DocumentMovementPlan, IncomingStock, InventoryStore,
    MovementRequest, MovementService, OutgoingStock, StockTransfer,
};

use crate::document::Document;
use crate::document_type::{DocumentType, DocumentTypeStatus, InventoryDirection};
use crate::resolver::StatusResolver;

/// What a transition will do, decided before anything is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionPlan {
    pub document_type: DocumentType,
    pub from: DocumentTypeStatus,
    pub to: DocumentTypeStatus,
    pub had_active_movements: bool,
    pub reverse_existing: bool,
    pub create_movements: bool,
}

impl TransitionPlan {
    /// Whether the document holds active movements once `outcome` is applied.
    pub fn movements_active_after(&self, outcome: &DocumentMovementOutcome) -> bool {
        !outcome.created.is_empty() || (self.had_active_movements && !self.reverse_existing)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionOutcome {
    pub from_status: String,
    pub to_status: String,
    pub movements: DocumentMovementOutcome,
}

pub struct StatusManager<S> {
    resolver: Arc<StatusResolver>,
    inventory: Arc<MovementService<S>>,
}

impl<S: InventoryStore> StatusManager<S> {
    pub fn new(resolver: Arc<StatusResolver>, inventory: Arc<MovementService<S>>) -> Self {
        Self {
            resolver,
            inventory,
        }
    }

    pub fn resolver(&self) -> &StatusResolver {
        &self.resolver
    }

    pub fn inventory(&self) -> &MovementService<S> {
        &self.inventory
    }

    pub fn plan_transition(&self, document: &Document, target: &str) -> DomainResult<TransitionPlan> {
        let document_type = self.resolver.document_type(&document.document_type)?;
        // The current row may have been deactivated since; leaving it is fine.
        let from = self
            .resolver
            .statuses(&document_type.code)?
            .into_iter()
            .find(|r| r.status == document.status)
            .ok_or_else(|| {
                DomainError::invalid_status(format!(
                    "{} is not a status of {}",
                    document.status, document_type.code
                ))
            })?;
        let to = self.resolver.require_status(&document_type.code, target)?;

        if from.status == to.status {
            return Err(DomainError::invalid_transition(format!(
                "{} is already in {}",
                document.number, to.status
            )));
        }
        if from.is_final {
            return Err(DomainError::invalid_transition(format!(
                "{} is final for {}",
                from.status, document.number
            )));
        }
        if !from.allows_target(&to.status) {
            return Err(DomainError::invalid_transition(format!(
                "{} -> {} is not allowed",
                from.status, to.status
            )));
        }

        let had_active_movements = self.inventory.has_active_movements(document.id)?;
        let reverse_existing = to.reverses_inventory_movements && had_active_movements;
        let create_movements = to.creates_inventory_movements
            && (!had_active_movements || reverse_existing)
            && document_type.direction != InventoryDirection::None
            && !document.lines.is_empty();

        Ok(TransitionPlan {
            document_type,
            from,
            to,
            had_active_movements,
            reverse_existing,
            create_movements,
        })
    }

    /// Plan and execute a transition.
    pub fn transition<T>(
        &self,
        document: &Document,
        target: &str,
        at: DateTime<Utc>,
        then: impl FnOnce(&TransitionPlan, &DocumentMovementOutcome) -> DomainResult<T>,
    ) -> DomainResult<(TransitionOutcome, T)> {
        let plan = self.plan_transition(document, target)?;
        self.execute(document, plan, at, then)
    }

    /// Apply a plan's stock effects and run `then` in the same transaction.
    pub fn execute<T>(
        &self,
        document: &Document,
        plan: TransitionPlan,
        at: DateTime<Utc>,
        then: impl FnOnce(&TransitionPlan, &DocumentMovementOutcome) -> DomainResult<T>,
    ) -> DomainResult<(TransitionOutcome, T)> {
        let lines = if plan.create_movements {
            movement_requests(document, plan.document_type.direction, at)?
        } else {
            Vec::new()
        };
        let movement_plan = DocumentMovementPlan {
            document_id: document.id,
            reverse_existing: plan.reverse_existing,
            lines,
            occurred_at: at,
        };

        let result = self
            .inventory
            .apply_document_plan_with(movement_plan, |outcome| then(&plan, outcome));
        let (movements, extra) = match result {
            Ok(ok) => ok,
            Err(e) => {
                warn!(
                    document = %document.number,
                    from = %plan.from.status,
                    to = %plan.to.status,
                    code = e.code(),
                    "transition rejected"
                );
                return Err(e);
            }
        };

        info!(
            document = %document.number,
            from = %plan.from.status,
            to = %plan.to.status,
            created = movements.created.len(),
            reversed = movements.reversed.len(),
            "document transitioned"
        );
        Ok((
            TransitionOutcome {
                from_status: plan.from.status,
                to_status: plan.to.status,
                movements,
            },
            extra,
        ))
    }

    /// Reverse and recreate a document's movements after its lines changed.
    pub fn resync<T>(
        &self,
        document: &Document,
        at: DateTime<Utc>,
        then: impl FnOnce(&DocumentMovementOutcome) -> DomainResult<T>,
    ) -> DomainResult<(DocumentMovementOutcome, T)> {
        let document_type = self.resolver.document_type(&document.document_type)?;
        let plan = DocumentMovementPlan {
            document_id: document.id,
            reverse_existing: true,
            lines: movement_requests(document, document_type.direction, at)?,
            occurred_at: at,
        };
        let result = self.inventory.apply_document_plan_with(plan, then)?;
        info!(
            document = %document.number,
            created = result.0.created.len(),
            reversed = result.0.reversed.len(),
            "document movements resynced"
        );
        Ok(result)
    }
}

/// One movement request per line, shaped by the type's direction.
pub fn movement_requests(
    document: &Document,
    direction: InventoryDirection,
    at: DateTime<Utc>,
) -> DomainResult<Vec<(u32, MovementRequest)>> {
    let reference = Some(document.number.clone());
    let target = match direction {
        InventoryDirection::Transfer => {
            let target = document.target_location_id.ok_or_else(|| {
                DomainError::validation(format!("{} has no target location", document.number))
            })?;
            Some(target)
        }
        _ => None,
    };

    Ok(document
        .lines
        .iter()
        .filter_map(|line| {
            let request = match direction {
                InventoryDirection::None => return None,
                InventoryDirection::Incoming => {
                    let mut r = IncomingStock::new(
                        document.location_id,
                        line.product_id,
                        line.quantity,
                        line.unit_cost,
                        at,
                    );
                    r.reference = reference.clone();
                    MovementRequest::Incoming(r)
                }
                InventoryDirection::Outgoing => {
                    let mut r =
                        OutgoingStock::new(document.location_id, line.product_id, line.quantity, at);
                    if line.unit_price > Decimal::ZERO {
                        r = r.with_sale_price(line.unit_price);
                    }
                    r.reference = reference.clone();
                    MovementRequest::Outgoing(r)
                }
                InventoryDirection::Transfer => MovementRequest::Transfer(StockTransfer {
                    from_location_id: document.location_id,
                    to_location_id: target?,
                    product_id: line.product_id,
                    quantity: line.quantity,
                    source: None,
                    reference: reference.clone(),
                    occurred_at: at,
                }),
                InventoryDirection::Count => MovementRequest::CycleCount(CycleCount {
                    location_id: document.location_id,
                    product_id: line.product_id,
                    counted_qty: line.quantity,
                    source: None,
                    occurred_at: at,
                }),
            };
            Some((line.line_no, request))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use optimapos_core::{DocumentId, LocationId, ProductId, UserId};
    use optimapos_inventory::{InMemoryInventoryStore, LocationKind, NewLocation};
    use optimapos_products::{NewProduct, ProductCatalog, UnitOfMeasure};
    use rust_decimal_macros::dec;

    use crate::document::DocumentLine;
    use crate::document_type::StatusSemantic;

    struct Fixture {
        manager: StatusManager<InMemoryInventoryStore>,
        inventory: Arc<MovementService<InMemoryInventoryStore>>,
        store: LocationId,
        milk: ProductId,
    }

    fn fixture() -> Fixture {
        let resolver = Arc::new(StatusResolver::new());
        resolver
            .register_type(DocumentType::new("GRN", "Goods receipt", "GRN", InventoryDirection::Incoming))
            .unwrap();
        for row in [
            DocumentTypeStatus::new("GRN", "draft", "Draft", 10)
                .initial()
                .semantic(StatusSemantic::Draft)
                .next(["received", "cancelled"]),
            DocumentTypeStatus::new("GRN", "received", "Received", 20)
                .creating_movements()
                .locked()
                .next(["closed", "cancelled"]),
            DocumentTypeStatus::new("GRN", "closed", "Closed", 30)
                .final_status()
                .locked()
                .semantic(StatusSemantic::Completion),
            DocumentTypeStatus::new("GRN", "cancelled", "Cancelled", 40)
                .reversing_movements()
                .semantic(StatusSemantic::Cancellation)
                .next(["draft"]),
        ] {
            resolver.register_status(row).unwrap();
        }

        let catalog = Arc::new(ProductCatalog::default());
        let milk = catalog
            .register(NewProduct::new("MILK", "Milk", UnitOfMeasure::Liter))
            .unwrap()
            .id_typed();
        let inventory = Arc::new(MovementService::new(
            InMemoryInventoryStore::default(),
            catalog,
        ));
        let store = inventory
            .register_location(NewLocation::new("WH", "Warehouse", LocationKind::Warehouse))
            .unwrap()
            .id;
        Fixture {
            manager: StatusManager::new(resolver, Arc::clone(&inventory)),
            inventory,
            store,
            milk,
        }
    }

    fn receipt(fx: &Fixture, status: &str) -> Document {
        let now = Utc::now();
        Document {
            id: DocumentId::new(),
            number: "GRN000001".to_string(),
            document_type: "GRN".to_string(),
            status: status.to_string(),
            partner: None,
            location_id: fx.store,
            target_location_id: None,
            lines: vec![
                DocumentLine {
                    line_no: 1,
                    product_id: fx.milk,
                    quantity: dec!(10),
                    unit_cost: dec!(1.10),
                    unit_price: dec!(0),
                },
                DocumentLine {
                    line_no: 2,
                    product_id: fx.milk,
                    quantity: dec!(5),
                    unit_cost: dec!(1.20),
                    unit_price: dec!(0),
                },
            ],
            created_by: UserId::new(),
            notes: None,
            credit_charged: dec!(0),
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    fn move_to(fx: &Fixture, doc: &mut Document, target: &str) -> TransitionOutcome {
        let (outcome, ()) = fx
            .manager
            .transition(doc, target, Utc::now(), |_, _| Ok(()))
            .unwrap();
        doc.status = outcome.to_status.clone();
        outcome
    }

    #[test]
    fn entering_creating_status_books_one_movement_per_line() {
        let fx = fixture();
        let mut doc = receipt(&fx, "draft");
        let outcome = move_to(&fx, &mut doc, "received");

        assert_eq!(outcome.movements.created.len(), 2);
        assert_eq!(fx.inventory.available_quantity(fx.store, fx.milk).unwrap(), dec!(15));
        assert!(fx.inventory.has_active_movements(doc.id).unwrap());
    }

    #[test]
    fn cancel_then_reenter_recreates_equivalent_movements() {
        let fx = fixture();
        let mut doc = receipt(&fx, "draft");
        let first = move_to(&fx, &mut doc, "received");
        let cancelled = move_to(&fx, &mut doc, "cancelled");
        assert_eq!(cancelled.movements.reversed.len(), 2);
        assert_eq!(fx.inventory.available_quantity(fx.store, fx.milk).unwrap(), dec!(0));

        move_to(&fx, &mut doc, "draft");
        let second = move_to(&fx, &mut doc, "received");
        let qty = |o: &TransitionOutcome| {
            o.movements
                .created
                .iter()
                .map(|m| (m.quantity, m.cost_price))
                .collect::<Vec<_>>()
        };
        assert_eq!(qty(&first), qty(&second));
        assert_eq!(fx.inventory.available_quantity(fx.store, fx.milk).unwrap(), dec!(15));
    }

    #[test]
    fn invalid_transitions_are_rejected() {
        let fx = fixture();
        let mut doc = receipt(&fx, "draft");

        let same = fx.manager.plan_transition(&doc, "draft").unwrap_err();
        assert_eq!(same.code(), "INVALID_TRANSITION");
        let skip = fx.manager.plan_transition(&doc, "closed").unwrap_err();
        assert_eq!(skip.code(), "INVALID_TRANSITION");
        let unknown = fx.manager.plan_transition(&doc, "shipped").unwrap_err();
        assert_eq!(unknown.code(), "INVALID_STATUS");

        move_to(&fx, &mut doc, "received");
        move_to(&fx, &mut doc, "closed");
        let out_of_final = fx.manager.plan_transition(&doc, "cancelled").unwrap_err();
        assert_eq!(out_of_final.code(), "INVALID_TRANSITION");
    }

    #[test]
    fn failing_follow_up_rolls_back_stock() {
        let fx = fixture();
        let doc = receipt(&fx, "draft");
        let err = fx
            .manager
            .transition(&doc, "received", Utc::now(), |_, _| -> DomainResult<()> {
                Err(DomainError::storage("save failed"))
            })
            .unwrap_err();

        assert_eq!(err.code(), "STORAGE_ERROR");
        assert!(!fx.inventory.has_active_movements(doc.id).unwrap());
        assert_eq!(fx.inventory.available_quantity(fx.store, fx.milk).unwrap(), dec!(0));
    }

    #[test]
    fn resync_replaces_movements_with_current_lines() {
        let fx = fixture();
        let mut doc = receipt(&fx, "draft");
        move_to(&fx, &mut doc, "received");

        doc.lines.truncate(1);
        let (outcome, ()) = fx.manager.resync(&doc, Utc::now(), |_| Ok(())).unwrap();
        assert_eq!(outcome.reversed.len(), 2);
        assert_eq!(outcome.created.len(), 1);
        assert_eq!(fx.inventory.available_quantity(fx.store, fx.milk).unwrap(), dec!(10));
    }

    #[test]
    fn transfer_lines_need_a_target() {
        let fx = fixture();
        let doc = receipt(&fx, "draft");
        let err = movement_requests(&doc, InventoryDirection::Transfer, Utc::now()).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert!(movement_requests(&doc, InventoryDirection::None, Utc::now())
            .unwrap()
            .is_empty());
    }
}
