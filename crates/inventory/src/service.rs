use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use optimapos_core::decimal::{
    checked_product, checked_quotient, checked_sum, round_cost, round_currency, round_quantity,
};
use optimapos_core::{DocumentId, DomainError, DomainResult, LocationId, MovementId, ProductId};
use optimapos_products::ProductCatalog;

use crate::batch::InventoryBatch;
use crate::item::InventoryItem;
use crate::ledger::{InventoryLedger, Issue, Receipt};
use crate::location::{InventoryLocation, NewLocation};
use crate::movement::{BatchAllocation, InventoryMovement, MovementType, SourceLine};
use crate::store::InventoryStore;

/// Purchase-style receipt into one location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingStock {
    pub location_id: LocationId,
    pub product_id: ProductId,
    pub quantity: Decimal,
    pub cost_price: Decimal,
    pub batch_number: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub source: Option<SourceLine>,
    pub reference: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl IncomingStock {
    pub fn new(
        location_id: LocationId,
        product_id: ProductId,
        quantity: Decimal,
        cost_price: Decimal,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            location_id,
            product_id,
            quantity,
            cost_price,
            batch_number: None,
            expiry_date: None,
            source: None,
            reference: None,
            occurred_at,
        }
    }

    pub fn with_batch(mut self, number: impl Into<String>, expiry_date: Option<NaiveDate>) -> Self {
        self.batch_number = Some(number.into());
        self.expiry_date = expiry_date;
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }
}

/// Sale-style issue from one location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingStock {
    pub location_id: LocationId,
    pub product_id: ProductId,
    pub quantity: Decimal,
    pub sale_price: Option<Decimal>,
    pub source: Option<SourceLine>,
    pub reference: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl OutgoingStock {
    pub fn new(
        location_id: LocationId,
        product_id: ProductId,
        quantity: Decimal,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            location_id,
            product_id,
            quantity,
            sale_price: None,
            source: None,
            reference: None,
            occurred_at,
        }
    }

    pub fn with_sale_price(mut self, price: Decimal) -> Self {
        self.sale_price = Some(price);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockTransfer {
    pub from_location_id: LocationId,
    pub to_location_id: LocationId,
    pub product_id: ProductId,
    pub quantity: Decimal,
    pub source: Option<SourceLine>,
    pub reference: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Signed correction: positive adds stock, negative removes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjustment {
    pub location_id: LocationId,
    pub product_id: ProductId,
    pub delta: Decimal,
    /// Cost of added stock; defaults to the current average.
    pub unit_cost: Option<Decimal>,
    pub reason: String,
    pub source: Option<SourceLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Physical count; the difference to the book quantity is booked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleCount {
    pub location_id: LocationId,
    pub product_id: ProductId,
    pub counted_qty: Decimal,
    pub source: Option<SourceLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Assemble `quantity` of `product_id` from components at one location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionRun {
    pub location_id: LocationId,
    pub product_id: ProductId,
    pub quantity: Decimal,
    pub components: Vec<(ProductId, Decimal)>,
    /// Overrides the rolled-up component cost.
    pub unit_cost: Option<Decimal>,
    pub source: Option<SourceLine>,
    pub occurred_at: DateTime<Utc>,
}

/// One line's worth of stock effect, as produced by a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MovementRequest {
    Incoming(IncomingStock),
    Outgoing(OutgoingStock),
    Transfer(StockTransfer),
    Adjustment(StockAdjustment),
    CycleCount(CycleCount),
}

impl MovementRequest {
    fn stamp(&mut self, source: SourceLine, at: DateTime<Utc>) {
        let (slot, occurred_at) = match self {
            MovementRequest::Incoming(r) => (&mut r.source, &mut r.occurred_at),
            MovementRequest::Outgoing(r) => (&mut r.source, &mut r.occurred_at),
            MovementRequest::Transfer(r) => (&mut r.source, &mut r.occurred_at),
            MovementRequest::Adjustment(r) => (&mut r.source, &mut r.occurred_at),
            MovementRequest::CycleCount(r) => (&mut r.source, &mut r.occurred_at),
        };
        *slot = Some(source);
        *occurred_at = at;
    }
}

/// Stock effect of a document status change, applied atomically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentMovementPlan {
    pub document_id: DocumentId,
    /// Reverse the document's active movements first.
    pub reverse_existing: bool,
    /// Requests keyed by document line number.
    pub lines: Vec<(u32, MovementRequest)>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentMovementOutcome {
    pub reversed: Vec<InventoryMovement>,
    pub created: Vec<InventoryMovement>,
}

/// Entry point for every stock change.
///
/// Each public operation runs in one store transaction, so a multi-movement
/// operation (transfer, production, a document's lines) either lands
/// completely or not at all.
pub struct MovementService<S> {
    store: S,
    catalog: Arc<ProductCatalog>,
    allow_negative_default: bool,
}

impl<S: InventoryStore> MovementService<S> {
    pub fn new(store: S, catalog: Arc<ProductCatalog>) -> Self {
        Self {
            store,
            catalog,
            allow_negative_default: false,
        }
    }

    /// Default for locations registered without an explicit setting.
    pub fn with_negative_stock_default(mut self, allow: bool) -> Self {
        self.allow_negative_default = allow;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // ---- locations -------------------------------------------------------

    pub fn register_location(&self, input: NewLocation) -> DomainResult<InventoryLocation> {
        let location = InventoryLocation::create(LocationId::new(), input, self.allow_negative_default)?;
        let registered = location.clone();
        self.store.transaction(|l| l.register_location(location))?;
        info!(location_id = %registered.id, code = %registered.code, "location registered");
        Ok(registered)
    }

    pub fn get_location(&self, id: LocationId) -> DomainResult<InventoryLocation> {
        self.store.read(|l| l.location(id).cloned())?
    }

    pub fn set_location_active(&self, id: LocationId, active: bool) -> DomainResult<()> {
        self.store.transaction(|l| l.set_location_active(id, active))
    }

    pub fn set_min_stock_level(
        &self,
        location_id: LocationId,
        product_id: ProductId,
        level: Option<Decimal>,
    ) -> DomainResult<()> {
        self.catalog.get(product_id)?;
        self.store
            .transaction(|l| l.set_min_stock_level(location_id, product_id, level))
    }

    // ---- stock operations ------------------------------------------------

    pub fn create_incoming_stock(&self, request: IncomingStock) -> DomainResult<InventoryMovement> {
        let movement = self.store.transaction(|l| self.incoming(l, request))?;
        info!(
            movement_id = %movement.id,
            quantity = %movement.quantity,
            cost = %movement.cost_price,
            "incoming stock booked"
        );
        Ok(movement)
    }

    pub fn create_outgoing_stock(&self, request: OutgoingStock) -> DomainResult<InventoryMovement> {
        let movement = self.store.transaction(|l| self.outgoing(l, request))?;
        info!(
            movement_id = %movement.id,
            quantity = %movement.quantity,
            cost = %movement.total_cost,
            "outgoing stock booked"
        );
        Ok(movement)
    }

    /// Move stock between locations; the destination receives one batch per
    /// consumed cost layer so FIFO cost carries over.
    ///
    /// Returns the outbound movement followed by the inbound ones.
    pub fn create_transfer(&self, request: StockTransfer) -> DomainResult<Vec<InventoryMovement>> {
        let moved = self.store.transaction(|l| self.transfer(l, request))?;
        info!(movements = moved.len(), "transfer booked");
        Ok(moved)
    }

    pub fn create_adjustment(&self, request: StockAdjustment) -> DomainResult<InventoryMovement> {
        let movement = self.store.transaction(|l| self.adjustment(l, request))?;
        info!(movement_id = %movement.id, "adjustment booked");
        Ok(movement)
    }

    /// Book the count difference; `None` when the count matches the books.
    pub fn create_cycle_count(&self, request: CycleCount) -> DomainResult<Option<InventoryMovement>> {
        let movement = self.store.transaction(|l| self.cycle_count(l, request))?;
        match &movement {
            Some(m) => info!(movement_id = %m.id, delta = %m.signed_quantity(), "cycle count booked"),
            None => info!("cycle count matched book quantity"),
        }
        Ok(movement)
    }

    /// Issue components FIFO and receive the output at their rolled-up cost.
    ///
    /// Returns component movements followed by the output movement.
    pub fn record_production(&self, request: ProductionRun) -> DomainResult<Vec<InventoryMovement>> {
        let moved = self.store.transaction(|l| self.production(l, request))?;
        info!(movements = moved.len(), "production recorded");
        Ok(moved)
    }

    pub fn reverse_movement(
        &self,
        movement_id: MovementId,
        occurred_at: DateTime<Utc>,
    ) -> DomainResult<InventoryMovement> {
        let reversal = self
            .store
            .transaction(|l| l.reverse(movement_id, occurred_at))?;
        info!(%movement_id, reversal_id = %reversal.id, "movement reversed");
        Ok(reversal)
    }

    // ---- documents -------------------------------------------------------

    pub fn create_document_movements(
        &self,
        document_id: DocumentId,
        lines: Vec<(u32, MovementRequest)>,
        occurred_at: DateTime<Utc>,
    ) -> DomainResult<Vec<InventoryMovement>> {
        let outcome = self.apply_document_plan(DocumentMovementPlan {
            document_id,
            reverse_existing: false,
            lines,
            occurred_at,
        })?;
        Ok(outcome.created)
    }

    pub fn reverse_document_movements(
        &self,
        document_id: DocumentId,
        occurred_at: DateTime<Utc>,
    ) -> DomainResult<Vec<InventoryMovement>> {
        let outcome = self.apply_document_plan(DocumentMovementPlan {
            document_id,
            reverse_existing: true,
            lines: Vec::new(),
            occurred_at,
        })?;
        Ok(outcome.reversed)
    }

    pub fn apply_document_plan(&self, plan: DocumentMovementPlan) -> DomainResult<DocumentMovementOutcome> {
        self.apply_document_plan_with(plan, |_| Ok(()))
            .map(|(outcome, ())| outcome)
    }

    /// Apply a plan and run `then` inside the same transaction; an error from
    /// `then` undoes the stock changes too.
    pub fn apply_document_plan_with<T>(
        &self,
        plan: DocumentMovementPlan,
        then: impl FnOnce(&DocumentMovementOutcome) -> DomainResult<T>,
    ) -> DomainResult<(DocumentMovementOutcome, T)> {
        let document_id = plan.document_id;
        let result = self.store.transaction(|l| {
            let mut outcome = DocumentMovementOutcome::default();
            if plan.reverse_existing {
                outcome.reversed = l.reverse_document(document_id, plan.occurred_at)?;
            }
            if !plan.lines.is_empty() && l.has_active_movements(document_id) {
                return Err(DomainError::conflict(format!(
                    "document {document_id} already has active movements"
                )));
            }
            for (line_no, mut request) in plan.lines {
                request.stamp(
                    SourceLine {
                        document_id,
                        line_no,
                    },
                    plan.occurred_at,
                );
                outcome.created.extend(self.apply_request(l, request)?);
            }
            let extra = then(&outcome)?;
            Ok((outcome, extra))
        })?;
        info!(
            %document_id,
            reversed = result.0.reversed.len(),
            created = result.0.created.len(),
            "document movements applied"
        );
        Ok(result)
    }

    pub fn has_active_movements(&self, document_id: DocumentId) -> DomainResult<bool> {
        self.store.read(|l| l.has_active_movements(document_id))
    }

    pub fn movements_for_document(&self, document_id: DocumentId) -> DomainResult<Vec<InventoryMovement>> {
        self.store.read(|l| {
            l.movements_for_document(document_id)
                .into_iter()
                .cloned()
                .collect()
        })
    }

    // ---- queries ---------------------------------------------------------

    pub fn get_movement(&self, id: MovementId) -> DomainResult<InventoryMovement> {
        self.store
            .read(|l| l.movement(id).cloned())?
            .ok_or_else(|| DomainError::not_found(format!("movement {id}")))
    }

    pub fn get_item(&self, location_id: LocationId, product_id: ProductId) -> DomainResult<Option<InventoryItem>> {
        self.store.read(|l| l.item(location_id, product_id).cloned())
    }

    pub fn available_quantity(&self, location_id: LocationId, product_id: ProductId) -> DomainResult<Decimal> {
        Ok(self
            .get_item(location_id, product_id)?
            .map_or(Decimal::ZERO, |i| i.current_qty))
    }

    pub fn average_cost(&self, location_id: LocationId, product_id: ProductId) -> DomainResult<Decimal> {
        Ok(self
            .get_item(location_id, product_id)?
            .map_or(Decimal::ZERO, |i| i.avg_cost))
    }

    /// Cost layers in FIFO order.
    pub fn list_batches(
        &self,
        location_id: LocationId,
        product_id: ProductId,
        include_exhausted: bool,
    ) -> DomainResult<Vec<InventoryBatch>> {
        self.store.read(|l| {
            l.batches(location_id, product_id)
                .into_iter()
                .filter(|b| include_exhausted || !b.is_exhausted())
                .cloned()
                .collect()
        })
    }

    /// Book value of everything at a location (quantity times average cost).
    pub fn location_stock_value(&self, location_id: LocationId) -> DomainResult<Decimal> {
        self.store.read(|l| {
            l.location(location_id)?;
            let values = l
                .items_at(location_id)
                .map(|i| checked_product(i.current_qty, i.avg_cost))
                .collect::<DomainResult<Vec<_>>>()?;
            Ok(round_currency(checked_sum(values)?))
        })?
    }

    pub fn items_below_minimum(&self, location_id: LocationId) -> DomainResult<Vec<InventoryItem>> {
        self.store.read(|l| {
            l.items_at(location_id)
                .filter(|i| i.is_below_minimum())
                .cloned()
                .collect()
        })
    }

    /// Compare the cached item with a replay of its movements.
    pub fn verify_item_cache(&self, location_id: LocationId, product_id: ProductId) -> DomainResult<()> {
        self.store.read(|l| l.verify_item(location_id, product_id))?
    }

    // ---- ledger-level building blocks --------------------------------------

    fn checked_quantity(&self, product_id: ProductId, quantity: Decimal) -> DomainResult<Decimal> {
        self.catalog.require_active(product_id)?.validate_quantity(quantity)
    }

    fn apply_request(
        &self,
        ledger: &mut InventoryLedger,
        request: MovementRequest,
    ) -> DomainResult<Vec<InventoryMovement>> {
        Ok(match request {
            MovementRequest::Incoming(r) => vec![self.incoming(ledger, r)?],
            MovementRequest::Outgoing(r) => vec![self.outgoing(ledger, r)?],
            MovementRequest::Transfer(r) => self.transfer(ledger, r)?,
            MovementRequest::Adjustment(r) => vec![self.adjustment(ledger, r)?],
            MovementRequest::CycleCount(r) => self.cycle_count(ledger, r)?.into_iter().collect(),
        })
    }

    fn incoming(&self, ledger: &mut InventoryLedger, r: IncomingStock) -> DomainResult<InventoryMovement> {
        let quantity = self.checked_quantity(r.product_id, r.quantity)?;
        ledger.receive(Receipt {
            location_id: r.location_id,
            product_id: r.product_id,
            movement_type: MovementType::In,
            quantity,
            unit_cost: r.cost_price,
            batch_number: r.batch_number,
            expiry_date: r.expiry_date,
            source: r.source,
            reference: r.reference,
            occurred_at: r.occurred_at,
        })
    }

    fn outgoing(&self, ledger: &mut InventoryLedger, r: OutgoingStock) -> DomainResult<InventoryMovement> {
        let quantity = self.checked_quantity(r.product_id, r.quantity)?;
        ledger.issue(Issue {
            location_id: r.location_id,
            product_id: r.product_id,
            movement_type: MovementType::Out,
            quantity,
            sale_price: r.sale_price,
            source: r.source,
            reference: r.reference,
            occurred_at: r.occurred_at,
        })
    }

    fn transfer(&self, ledger: &mut InventoryLedger, r: StockTransfer) -> DomainResult<Vec<InventoryMovement>> {
        if r.from_location_id == r.to_location_id {
            return Err(DomainError::validation(
                "transfer source and destination must differ",
            ));
        }
        let quantity = self.checked_quantity(r.product_id, r.quantity)?;
        ledger.location(r.to_location_id)?.ensure_active()?;

        let out = ledger.issue(Issue {
            location_id: r.from_location_id,
            product_id: r.product_id,
            movement_type: MovementType::Transfer,
            quantity,
            sale_price: None,
            source: r.source,
            reference: r.reference.clone(),
            occurred_at: r.occurred_at,
        })?;

        let mut moved = Vec::with_capacity(out.allocations.len() + 1);
        for layer in &out.allocations {
            let (batch_number, expiry_date) = layer
                .batch_id
                .and_then(|id| ledger.batch(id))
                .map_or((None, None), |b| (Some(b.batch_number.clone()), b.expiry_date));
            moved.push(ledger.receive(Receipt {
                location_id: r.to_location_id,
                product_id: r.product_id,
                movement_type: MovementType::Transfer,
                quantity: layer.quantity,
                unit_cost: layer.unit_cost,
                batch_number,
                expiry_date,
                source: r.source,
                reference: r.reference.clone(),
                occurred_at: r.occurred_at,
            })?);
        }
        moved.insert(0, out);
        Ok(moved)
    }

    fn adjustment(&self, ledger: &mut InventoryLedger, r: StockAdjustment) -> DomainResult<InventoryMovement> {
        let delta = round_quantity(r.delta);
        if delta == Decimal::ZERO {
            return Err(DomainError::validation("adjustment delta cannot be zero"));
        }
        if r.reason.trim().is_empty() {
            return Err(DomainError::validation("adjustment reason is required"));
        }
        self.book_delta(
            ledger,
            MovementType::Adjustment,
            r.location_id,
            r.product_id,
            delta,
            r.unit_cost,
            r.source,
            Some(r.reason),
            r.occurred_at,
        )
    }

    fn cycle_count(&self, ledger: &mut InventoryLedger, r: CycleCount) -> DomainResult<Option<InventoryMovement>> {
        let counted = round_quantity(r.counted_qty);
        if counted < Decimal::ZERO {
            return Err(DomainError::validation("counted quantity cannot be negative"));
        }
        self.catalog.require_active(r.product_id)?;
        ledger.location(r.location_id)?;
        let on_hand = ledger
            .item(r.location_id, r.product_id)
            .map_or(Decimal::ZERO, |i| i.current_qty);
        let delta = round_quantity(checked_sum([counted, -on_hand])?);
        if delta == Decimal::ZERO {
            return Ok(None);
        }
        self.book_delta(
            ledger,
            MovementType::CycleCount,
            r.location_id,
            r.product_id,
            delta,
            None,
            r.source,
            Some(format!("counted {counted}, book {on_hand}")),
            r.occurred_at,
        )
        .map(Some)
    }

    #[allow(clippy::too_many_arguments)]
    fn book_delta(
        &self,
        ledger: &mut InventoryLedger,
        movement_type: MovementType,
        location_id: LocationId,
        product_id: ProductId,
        delta: Decimal,
        unit_cost: Option<Decimal>,
        source: Option<SourceLine>,
        reference: Option<String>,
        occurred_at: DateTime<Utc>,
    ) -> DomainResult<InventoryMovement> {
        let quantity = self.checked_quantity(product_id, delta.abs())?;
        if delta > Decimal::ZERO {
            let unit_cost = unit_cost.unwrap_or_else(|| {
                ledger
                    .item(location_id, product_id)
                    .map_or(Decimal::ZERO, |i| i.avg_cost)
            });
            ledger.receive(Receipt {
                location_id,
                product_id,
                movement_type,
                quantity,
                unit_cost,
                batch_number: None,
                expiry_date: None,
                source,
                reference,
                occurred_at,
            })
        } else {
            ledger.issue(Issue {
                location_id,
                product_id,
                movement_type,
                quantity,
                sale_price: None,
                source,
                reference,
                occurred_at,
            })
        }
    }

    fn production(&self, ledger: &mut InventoryLedger, r: ProductionRun) -> DomainResult<Vec<InventoryMovement>> {
        if r.components.is_empty() {
            return Err(DomainError::validation("production needs at least one component"));
        }
        if r.components.iter().any(|(p, _)| *p == r.product_id) {
            return Err(DomainError::validation(
                "a product cannot be a component of itself",
            ));
        }
        let quantity = self.checked_quantity(r.product_id, r.quantity)?;

        let mut moved = Vec::with_capacity(r.components.len() + 1);
        let mut consumed = Decimal::ZERO;
        for (component, component_qty) in &r.components {
            let component_qty = self.checked_quantity(*component, *component_qty)?;
            let issued = ledger.issue(Issue {
                location_id: r.location_id,
                product_id: *component,
                movement_type: MovementType::Production,
                quantity: component_qty,
                sale_price: None,
                source: r.source,
                reference: None,
                occurred_at: r.occurred_at,
            })?;
            let values = issued
                .allocations
                .iter()
                .map(BatchAllocation::value)
                .collect::<DomainResult<Vec<_>>>()?;
            consumed = checked_sum(values.into_iter().chain([consumed]))?;
            moved.push(issued);
        }

        let unit_cost = match r.unit_cost {
            Some(cost) => cost,
            None => round_cost(checked_quotient(consumed, quantity)?),
        };
        moved.push(ledger.receive(Receipt {
            location_id: r.location_id,
            product_id: r.product_id,
            movement_type: MovementType::Production,
            quantity,
            unit_cost,
            batch_number: None,
            expiry_date: None,
            source: r.source,
            reference: None,
            occurred_at: r.occurred_at,
        })?);
        Ok(moved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::LocationKind;
    use crate::store::InMemoryInventoryStore;
    use chrono::{Duration, TimeZone};
    use optimapos_products::{NewProduct, UnitOfMeasure};
    use rust_decimal_macros::dec;

    struct Fixture {
        svc: MovementService<InMemoryInventoryStore>,
        shop: LocationId,
        warehouse: LocationId,
        flour: ProductId,
        bread: ProductId,
        t0: DateTime<Utc>,
    }

    fn fixture() -> Fixture {
        let catalog = Arc::new(ProductCatalog::default());
        let flour = catalog
            .register(NewProduct::new("FLOUR", "Flour", UnitOfMeasure::Kilogram))
            .unwrap()
            .id_typed();
        let bread = catalog
            .register(NewProduct::new("BREAD", "Bread", UnitOfMeasure::Piece))
            .unwrap()
            .id_typed();
        let svc = MovementService::new(InMemoryInventoryStore::default(), catalog);
        let warehouse = svc
            .register_location(NewLocation::new("WH", "Warehouse", LocationKind::Warehouse))
            .unwrap()
            .id;
        let shop = svc
            .register_location(NewLocation::new("SHOP", "Shop", LocationKind::Shop))
            .unwrap()
            .id;
        Fixture {
            svc,
            shop,
            warehouse,
            flour,
            bread,
            t0: Utc.with_ymd_and_hms(2026, 5, 4, 7, 0, 0).unwrap(),
        }
    }

    impl Fixture {
        fn receive(&self, product: ProductId, qty: Decimal, cost: Decimal, minutes: i64) -> InventoryMovement {
            self.svc
                .create_incoming_stock(IncomingStock::new(
                    self.warehouse,
                    product,
                    qty,
                    cost,
                    self.t0 + Duration::minutes(minutes),
                ))
                .unwrap()
        }
    }

    #[test]
    fn transfer_carries_each_cost_layer() {
        let fx = fixture();
        fx.receive(fx.flour, dec!(60), dec!(10), 0);
        fx.receive(fx.flour, dec!(40), dec!(12), 1);

        let moved = fx
            .svc
            .create_transfer(StockTransfer {
                from_location_id: fx.warehouse,
                to_location_id: fx.shop,
                product_id: fx.flour,
                quantity: dec!(70),
                source: None,
                reference: None,
                occurred_at: fx.t0 + Duration::hours(1),
            })
            .unwrap();

        assert_eq!(moved.len(), 3);
        let shop_layers = fx.svc.list_batches(fx.shop, fx.flour, false).unwrap();
        assert_eq!(shop_layers.len(), 2);
        assert_eq!(shop_layers[0].cost_price, dec!(10));
        assert_eq!(shop_layers[0].remaining_qty, dec!(60));
        assert_eq!(shop_layers[1].cost_price, dec!(12));
        assert_eq!(shop_layers[1].remaining_qty, dec!(10));
        assert_eq!(fx.svc.available_quantity(fx.warehouse, fx.flour).unwrap(), dec!(30));
        assert_eq!(fx.svc.average_cost(fx.shop, fx.flour).unwrap(), dec!(10.2857));
    }

    #[test]
    fn transfer_to_same_location_is_rejected() {
        let fx = fixture();
        let err = fx
            .svc
            .create_transfer(StockTransfer {
                from_location_id: fx.shop,
                to_location_id: fx.shop,
                product_id: fx.flour,
                quantity: dec!(1),
                source: None,
                reference: None,
                occurred_at: fx.t0,
            })
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn matching_cycle_count_books_nothing() {
        let fx = fixture();
        fx.receive(fx.flour, dec!(5), dec!(2), 0);
        let count = |qty| CycleCount {
            location_id: fx.warehouse,
            product_id: fx.flour,
            counted_qty: qty,
            source: None,
            occurred_at: fx.t0 + Duration::hours(2),
        };

        assert!(fx.svc.create_cycle_count(count(dec!(5))).unwrap().is_none());

        let m = fx.svc.create_cycle_count(count(dec!(4.5))).unwrap().unwrap();
        assert_eq!(m.movement_type, MovementType::CycleCount);
        assert_eq!(m.signed_quantity(), dec!(-0.5));
        assert_eq!(fx.svc.available_quantity(fx.warehouse, fx.flour).unwrap(), dec!(4.5));
    }

    #[test]
    fn positive_adjustment_defaults_to_average_cost() {
        let fx = fixture();
        fx.receive(fx.flour, dec!(10), dec!(3), 0);
        let m = fx
            .svc
            .create_adjustment(StockAdjustment {
                location_id: fx.warehouse,
                product_id: fx.flour,
                delta: dec!(2),
                unit_cost: None,
                reason: "found behind shelf".to_string(),
                source: None,
                occurred_at: fx.t0 + Duration::hours(1),
            })
            .unwrap();
        assert_eq!(m.cost_price, dec!(3));
        assert_eq!(m.reference.as_deref(), Some("found behind shelf"));
    }

    #[test]
    fn piece_goods_reject_fractional_quantities() {
        let fx = fixture();
        let err = fx
            .svc
            .create_incoming_stock(IncomingStock::new(
                fx.warehouse,
                fx.bread,
                dec!(1.5),
                dec!(1),
                fx.t0,
            ))
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn production_rolls_up_component_cost() {
        let fx = fixture();
        fx.receive(fx.flour, dec!(10), dec!(1.2), 0);

        let moved = fx
            .svc
            .record_production(ProductionRun {
                location_id: fx.warehouse,
                product_id: fx.bread,
                quantity: dec!(8),
                components: vec![(fx.flour, dec!(4))],
                unit_cost: None,
                source: None,
                occurred_at: fx.t0 + Duration::hours(1),
            })
            .unwrap();

        let output = moved.last().unwrap();
        assert_eq!(output.product_id, fx.bread);
        assert_eq!(output.cost_price, dec!(0.6));
        assert_eq!(fx.svc.available_quantity(fx.warehouse, fx.flour).unwrap(), dec!(6));
    }

    #[test]
    fn failing_document_line_rolls_back_the_whole_plan() {
        let fx = fixture();
        let document_id = DocumentId::new();
        let at = fx.t0 + Duration::hours(1);
        let lines = vec![
            (
                1,
                MovementRequest::Incoming(IncomingStock::new(fx.warehouse, fx.flour, dec!(5), dec!(1), at)),
            ),
            (
                2,
                MovementRequest::Outgoing(OutgoingStock::new(fx.shop, fx.flour, dec!(1), at)),
            ),
        ];

        let err = fx
            .svc
            .create_document_movements(document_id, lines, at)
            .unwrap_err();
        assert_eq!(err.code(), "INSUFFICIENT_STOCK");
        assert!(!fx.svc.has_active_movements(document_id).unwrap());
        assert_eq!(fx.svc.available_quantity(fx.warehouse, fx.flour).unwrap(), dec!(0));
        assert!(fx.svc.movements_for_document(document_id).unwrap().is_empty());
    }

    #[test]
    fn resync_reverses_then_recreates() {
        let fx = fixture();
        let document_id = DocumentId::new();
        let at = fx.t0 + Duration::hours(1);
        let line = |qty| {
            vec![(
                1,
                MovementRequest::Incoming(IncomingStock::new(fx.warehouse, fx.flour, qty, dec!(2), at)),
            )]
        };
        fx.svc
            .create_document_movements(document_id, line(dec!(5)), at)
            .unwrap();
        // A second create without reversing first would double-book.
        assert_eq!(
            fx.svc
                .create_document_movements(document_id, line(dec!(5)), at)
                .unwrap_err()
                .code(),
            "CONFLICT"
        );

        let outcome = fx
            .svc
            .apply_document_plan(DocumentMovementPlan {
                document_id,
                reverse_existing: true,
                lines: line(dec!(7)),
                occurred_at: at,
            })
            .unwrap();
        assert_eq!(outcome.reversed.len(), 1);
        assert_eq!(outcome.created.len(), 1);
        assert_eq!(fx.svc.available_quantity(fx.warehouse, fx.flour).unwrap(), dec!(7));
        fx.svc.verify_item_cache(fx.warehouse, fx.flour).unwrap();
    }

    #[test]
    fn error_in_follow_up_undoes_stock() {
        let fx = fixture();
        let document_id = DocumentId::new();
        let at = fx.t0;
        let result = fx.svc.apply_document_plan_with(
            DocumentMovementPlan {
                document_id,
                reverse_existing: false,
                lines: vec![(
                    1,
                    MovementRequest::Incoming(IncomingStock::new(fx.warehouse, fx.flour, dec!(5), dec!(2), at)),
                )],
                occurred_at: at,
            },
            |_| Err::<(), _>(DomainError::validation("credit gone")),
        );
        assert!(result.is_err());
        assert_eq!(fx.svc.available_quantity(fx.warehouse, fx.flour).unwrap(), dec!(0));
    }

    #[test]
    fn stock_value_and_minimum_report() {
        let fx = fixture();
        fx.receive(fx.flour, dec!(3), dec!(1.5), 0);
        fx.receive(fx.bread, dec!(2), dec!(0.75), 1);
        fx.svc
            .set_min_stock_level(fx.warehouse, fx.flour, Some(dec!(5)))
            .unwrap();

        assert_eq!(fx.svc.location_stock_value(fx.warehouse).unwrap(), dec!(6));
        let low = fx.svc.items_below_minimum(fx.warehouse).unwrap();
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].product_id, fx.flour);
    }
}
