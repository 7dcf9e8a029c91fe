//! The movement ledger and everything derived from it.
//!
//! `InventoryLedger` is plain data plus the rules that keep it consistent:
//! movements are appended, never edited (only `reversed_by` is ever set after
//! the fact), batches are FIFO cost layers and items cache the running
//! quantity and weighted average cost.
//!
//! Transactions are provided by an undo journal. Between `begin` and
//! `commit`, every record about to change is snapshotted once; `rollback`
//! puts those snapshots back and truncates anything appended since.

use std::collections::HashMap;
use std::hash::Hash;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::debug;

use optimapos_core::decimal::{
    checked_product, checked_sum, round_cost, round_currency, round_quantity,
};
use optimapos_core::{
    BatchId, DocumentId, DomainError, DomainResult, LocationId, MovementId, ProductId,
};

use crate::batch::InventoryBatch;
use crate::fifo::plan_consumption;
use crate::item::{InventoryItem, ItemKey};
use crate::location::InventoryLocation;
use crate::movement::{BatchAllocation, InventoryMovement, MovementType, SourceLine, StockDirection};

/// Stock coming into a location as a new cost layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub location_id: LocationId,
    pub product_id: ProductId,
    pub movement_type: MovementType,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    /// Generated from the configured prefix when absent.
    pub batch_number: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub source: Option<SourceLine>,
    pub reference: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Stock leaving a location, costed FIFO.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub location_id: LocationId,
    pub product_id: ProductId,
    pub movement_type: MovementType,
    pub quantity: Decimal,
    pub sale_price: Option<Decimal>,
    pub source: Option<SourceLine>,
    pub reference: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Journal {
    sequence: u64,
    movement_len: usize,
    batch_len: usize,
    /// Pre-transaction state; `None` means the record did not exist.
    locations: HashMap<LocationId, Option<InventoryLocation>>,
    items: HashMap<ItemKey, Option<InventoryItem>>,
    /// Originals of pre-existing rows that were modified.
    batches: HashMap<usize, InventoryBatch>,
    movements: HashMap<usize, InventoryMovement>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryLedger {
    batch_prefix: String,
    locations: HashMap<LocationId, InventoryLocation>,
    items: HashMap<ItemKey, InventoryItem>,
    batches: Vec<InventoryBatch>,
    batch_index: HashMap<BatchId, usize>,
    batches_by_item: HashMap<ItemKey, Vec<usize>>,
    movements: Vec<InventoryMovement>,
    movement_index: HashMap<MovementId, usize>,
    movements_by_item: HashMap<ItemKey, Vec<usize>>,
    movements_by_document: HashMap<DocumentId, Vec<usize>>,
    sequence: u64,
    journal: Option<Journal>,
}

impl Default for InventoryLedger {
    fn default() -> Self {
        Self::new("LOT")
    }
}

impl InventoryLedger {
    pub fn new(batch_prefix: impl Into<String>) -> Self {
        Self {
            batch_prefix: batch_prefix.into(),
            locations: HashMap::new(),
            items: HashMap::new(),
            batches: Vec::new(),
            batch_index: HashMap::new(),
            batches_by_item: HashMap::new(),
            movements: Vec::new(),
            movement_index: HashMap::new(),
            movements_by_item: HashMap::new(),
            movements_by_document: HashMap::new(),
            sequence: 0,
            journal: None,
        }
    }

    // ---- locations -------------------------------------------------------

    pub fn register_location(&mut self, location: InventoryLocation) -> DomainResult<()> {
        if self.locations.contains_key(&location.id) {
            return Err(DomainError::conflict(format!(
                "location {} already registered",
                location.id
            )));
        }
        if self
            .locations
            .values()
            .any(|l| l.code.eq_ignore_ascii_case(&location.code))
        {
            return Err(DomainError::conflict(format!(
                "location code {} already exists",
                location.code
            )));
        }
        self.touch_location(location.id);
        self.locations.insert(location.id, location);
        Ok(())
    }

    pub fn location(&self, id: LocationId) -> DomainResult<&InventoryLocation> {
        self.locations
            .get(&id)
            .ok_or_else(|| DomainError::not_found(format!("location {id}")))
    }

    pub fn locations(&self) -> impl Iterator<Item = &InventoryLocation> {
        self.locations.values()
    }

    pub fn set_location_active(&mut self, id: LocationId, active: bool) -> DomainResult<()> {
        self.location(id)?;
        self.touch_location(id);
        if let Some(location) = self.locations.get_mut(&id) {
            location.is_active = active;
        }
        Ok(())
    }

    // ---- items and batches -----------------------------------------------

    pub fn item(&self, location_id: LocationId, product_id: ProductId) -> Option<&InventoryItem> {
        self.items.get(&(location_id, product_id))
    }

    pub fn items_at(&self, location_id: LocationId) -> impl Iterator<Item = &InventoryItem> {
        self.items
            .values()
            .filter(move |i| i.location_id == location_id)
    }

    pub fn set_min_stock_level(
        &mut self,
        location_id: LocationId,
        product_id: ProductId,
        level: Option<Decimal>,
    ) -> DomainResult<()> {
        if level.is_some_and(|l| l < Decimal::ZERO) {
            return Err(DomainError::validation("minimum stock level cannot be negative"));
        }
        self.location(location_id)?;
        self.item_mut((location_id, product_id)).min_stock_level = level.map(round_quantity);
        Ok(())
    }

    /// All layers of an item in FIFO order, exhausted ones included.
    pub fn batches(&self, location_id: LocationId, product_id: ProductId) -> Vec<&InventoryBatch> {
        let mut batches: Vec<&InventoryBatch> = self.item_batches((location_id, product_id)).collect();
        batches.sort_by_key(|b| b.fifo_key());
        batches
    }

    pub fn batch(&self, id: BatchId) -> Option<&InventoryBatch> {
        self.batch_index.get(&id).map(|&i| &self.batches[i])
    }

    fn item_batches(&self, key: ItemKey) -> impl Iterator<Item = &InventoryBatch> {
        self.batches_by_item
            .get(&key)
            .into_iter()
            .flatten()
            .map(|&i| &self.batches[i])
    }

    // ---- movements -------------------------------------------------------

    pub fn movement(&self, id: MovementId) -> Option<&InventoryMovement> {
        self.movement_index.get(&id).map(|&i| &self.movements[i])
    }

    /// Full ledger in commit order.
    pub fn movements(&self) -> &[InventoryMovement] {
        &self.movements
    }

    pub fn movements_for_item(
        &self,
        location_id: LocationId,
        product_id: ProductId,
    ) -> Vec<&InventoryMovement> {
        self.indexed(self.movements_by_item.get(&(location_id, product_id)))
    }

    pub fn movements_for_document(&self, document_id: DocumentId) -> Vec<&InventoryMovement> {
        self.indexed(self.movements_by_document.get(&document_id))
    }

    pub fn has_active_movements(&self, document_id: DocumentId) -> bool {
        self.movements_for_document(document_id)
            .iter()
            .any(|m| m.is_active())
    }

    fn indexed(&self, indices: Option<&Vec<usize>>) -> Vec<&InventoryMovement> {
        indices
            .into_iter()
            .flatten()
            .map(|&i| &self.movements[i])
            .collect()
    }

    // ---- stock operations ------------------------------------------------

    /// Book an inbound movement and open a new batch for it.
    ///
    /// The batch always holds the full quantity, also when it only brings a
    /// negative balance back towards zero.
    pub fn receive(&mut self, receipt: Receipt) -> DomainResult<InventoryMovement> {
        if receipt.movement_type == MovementType::Out {
            return Err(DomainError::validation("OUT movements cannot receive stock"));
        }
        let quantity = positive_quantity(receipt.quantity)?;
        if receipt.unit_cost < Decimal::ZERO {
            return Err(DomainError::validation("cost price cannot be negative"));
        }
        let unit_cost = round_cost(receipt.unit_cost);
        self.location(receipt.location_id)?.ensure_active()?;

        let key = (receipt.location_id, receipt.product_id);
        let value = checked_product(quantity, unit_cost)?;
        self.ensure_position_fits(key, quantity, value)?;
        let sequence = self.next_sequence();
        let movement_id = MovementId::new();
        let batch_id = BatchId::new();
        let batch_number = receipt
            .batch_number
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("{}-{sequence:06}", self.batch_prefix));

        self.push_batch(InventoryBatch {
            id: batch_id,
            location_id: receipt.location_id,
            product_id: receipt.product_id,
            batch_number,
            received_qty: quantity,
            remaining_qty: quantity,
            cost_price: unit_cost,
            received_at: receipt.occurred_at,
            expiry_date: receipt.expiry_date,
            movement_id,
            sequence,
        });

        let movement = InventoryMovement {
            id: movement_id,
            sequence,
            movement_type: receipt.movement_type,
            direction: StockDirection::Inbound,
            location_id: receipt.location_id,
            product_id: receipt.product_id,
            quantity,
            cost_price: unit_cost,
            total_cost: round_currency(value),
            sale_price: None,
            profit: None,
            batch_id: Some(batch_id),
            allocations: vec![BatchAllocation {
                batch_id: Some(batch_id),
                quantity,
                unit_cost,
            }],
            source: receipt.source,
            reference: receipt.reference,
            reversal_of: None,
            reversed_by: None,
            occurred_at: receipt.occurred_at,
        };
        self.item_mut(key).apply_movement(&movement);
        self.push_movement(movement.clone());
        debug!(movement_id = %movement.id, %quantity, %unit_cost, "stock received");
        Ok(movement)
    }

    /// Book an outbound movement, consuming batches oldest first.
    ///
    /// When the batches cannot cover the quantity and the location allows
    /// negative stock, the remainder is booked without a batch at the current
    /// average cost. Otherwise nothing changes and the call fails.
    pub fn issue(&mut self, issue: Issue) -> DomainResult<InventoryMovement> {
        if issue.movement_type == MovementType::In {
            return Err(DomainError::validation("IN movements cannot issue stock"));
        }
        let quantity = positive_quantity(issue.quantity)?;
        if issue.sale_price.is_some_and(|p| p < Decimal::ZERO) {
            return Err(DomainError::validation("sale price cannot be negative"));
        }
        let location = self.location(issue.location_id)?;
        location.ensure_active()?;
        let allow_negative = location.allow_negative_stock;

        let key = (issue.location_id, issue.product_id);
        let (on_hand, avg_cost) = self
            .items
            .get(&key)
            .map(|i| (i.current_qty, i.avg_cost))
            .unwrap_or((Decimal::ZERO, Decimal::ZERO));

        let plan = plan_consumption(self.item_batches(key), quantity);
        let covered = plan.covered();
        let shortfall = plan.shortfall;
        let mut allocations = plan.allocations;
        if shortfall > Decimal::ZERO {
            if !allow_negative {
                return Err(if on_hand >= quantity {
                    DomainError::InsufficientBatchStock {
                        requested: quantity,
                        remaining: covered,
                    }
                } else {
                    DomainError::InsufficientStock {
                        requested: quantity,
                        available: on_hand.max(Decimal::ZERO),
                    }
                });
            }
            allocations.push(BatchAllocation {
                batch_id: None,
                quantity: shortfall,
                unit_cost: avg_cost,
            });
        }

        let values = allocations
            .iter()
            .map(BatchAllocation::value)
            .collect::<DomainResult<Vec<_>>>()?;
        let value = checked_sum(values)?;
        let total_cost = round_currency(value);
        let sale_price = issue.sale_price.map(round_currency);
        let revenue = sale_price
            .map(|p| checked_product(quantity, p).map(round_currency))
            .transpose()?;
        checked_sum([on_hand, -quantity])?;

        let layers = self.resolve_layers(&allocations)?;
        for (index, qty) in layers {
            self.touch_batch(index);
            let batch = &mut self.batches[index];
            batch.remaining_qty = round_quantity(batch.remaining_qty - qty);
        }

        let movement = InventoryMovement {
            id: MovementId::new(),
            sequence: self.next_sequence(),
            movement_type: issue.movement_type,
            direction: StockDirection::Outbound,
            location_id: issue.location_id,
            product_id: issue.product_id,
            quantity,
            cost_price: round_cost(value / quantity),
            total_cost,
            sale_price,
            profit: revenue.map(|r| r - total_cost),
            batch_id: allocations.first().and_then(|a| a.batch_id),
            allocations,
            source: issue.source,
            reference: issue.reference,
            reversal_of: None,
            reversed_by: None,
            occurred_at: issue.occurred_at,
        };
        self.item_mut(key).apply_movement(&movement);
        self.push_movement(movement.clone());
        debug!(
            movement_id = %movement.id,
            %quantity,
            cost = %movement.cost_price,
            layers = movement.allocations.len(),
            "stock issued"
        );
        Ok(movement)
    }

    /// Book the compensating movement for `movement_id`.
    ///
    /// Reversing a receipt requires its batch to still hold the received
    /// quantity; reversing an issue puts the quantities back into the
    /// batches they came from.
    pub fn reverse(
        &mut self,
        movement_id: MovementId,
        occurred_at: DateTime<Utc>,
    ) -> DomainResult<InventoryMovement> {
        let index = *self
            .movement_index
            .get(&movement_id)
            .ok_or_else(|| DomainError::not_found(format!("movement {movement_id}")))?;
        let original = self.movements[index].clone();
        if original.is_reversal() {
            return Err(DomainError::validation(format!(
                "movement {movement_id} is a reversal and cannot be reversed"
            )));
        }
        if let Some(by) = original.reversed_by {
            return Err(DomainError::conflict(format!(
                "movement {movement_id} already reversed by {by}"
            )));
        }

        let layers = self.resolve_layers(&original.allocations)?;
        for &(batch_index, qty) in &layers {
            let batch = &self.batches[batch_index];
            match original.direction {
                StockDirection::Inbound if batch.remaining_qty < qty => {
                    return Err(DomainError::InsufficientBatchStock {
                        requested: qty,
                        remaining: batch.remaining_qty,
                    });
                }
                StockDirection::Outbound if batch.remaining_qty + qty > batch.received_qty => {
                    return Err(DomainError::invariant(format!(
                        "returning {qty} would overfill batch {}",
                        batch.batch_number
                    )));
                }
                _ => {}
            }
        }
        for (batch_index, qty) in layers {
            self.touch_batch(batch_index);
            let batch = &mut self.batches[batch_index];
            batch.remaining_qty = match original.direction {
                StockDirection::Inbound => round_quantity(batch.remaining_qty - qty),
                StockDirection::Outbound => round_quantity(batch.remaining_qty + qty),
            };
        }

        let reversal = InventoryMovement {
            id: MovementId::new(),
            sequence: self.next_sequence(),
            direction: original.direction.opposite(),
            profit: original.profit.map(|p| -p),
            reversal_of: Some(original.id),
            reversed_by: None,
            occurred_at,
            ..original
        };
        self.item_mut((reversal.location_id, reversal.product_id))
            .apply_movement(&reversal);
        self.touch_movement(index);
        self.movements[index].reversed_by = Some(reversal.id);
        self.push_movement(reversal.clone());
        debug!(movement_id = %movement_id, reversal_id = %reversal.id, "movement reversed");
        Ok(reversal)
    }

    /// Reverse every active movement of a document, newest first.
    pub fn reverse_document(
        &mut self,
        document_id: DocumentId,
        occurred_at: DateTime<Utc>,
    ) -> DomainResult<Vec<InventoryMovement>> {
        let active: Vec<MovementId> = self
            .movements_for_document(document_id)
            .into_iter()
            .rev()
            .filter(|m| m.is_active())
            .map(|m| m.id)
            .collect();
        active
            .into_iter()
            .map(|id| self.reverse(id, occurred_at))
            .collect()
    }

    // ---- consistency -----------------------------------------------------

    /// Recompute an item from its movements alone.
    pub fn rebuild_item(&self, location_id: LocationId, product_id: ProductId) -> InventoryItem {
        let mut item = InventoryItem::new(location_id, product_id);
        item.min_stock_level = self
            .item(location_id, product_id)
            .and_then(|i| i.min_stock_level);
        for movement in self.movements_for_item(location_id, product_id) {
            item.apply_movement(movement);
        }
        item
    }

    /// Fail if the cached item differs from a rebuild.
    pub fn verify_item(&self, location_id: LocationId, product_id: ProductId) -> DomainResult<()> {
        let rebuilt = self.rebuild_item(location_id, product_id);
        let cached = self
            .item(location_id, product_id)
            .cloned()
            .unwrap_or_else(|| InventoryItem::new(location_id, product_id));
        if cached != rebuilt {
            return Err(DomainError::invariant(format!(
                "item cache drifted: cached {} @ {}, ledger {} @ {}",
                cached.current_qty, cached.avg_cost, rebuilt.current_qty, rebuilt.avg_cost
            )));
        }
        Ok(())
    }

    // ---- transactions ----------------------------------------------------

    pub(crate) fn begin(&mut self) -> DomainResult<()> {
        if self.journal.is_some() {
            return Err(DomainError::invariant("inventory transaction already open"));
        }
        self.journal = Some(Journal {
            sequence: self.sequence,
            movement_len: self.movements.len(),
            batch_len: self.batches.len(),
            ..Journal::default()
        });
        Ok(())
    }

    pub(crate) fn commit(&mut self) {
        self.journal = None;
    }

    pub(crate) fn rollback(&mut self) {
        let Some(journal) = self.journal.take() else {
            return;
        };

        for m in self.movements.drain(journal.movement_len..) {
            self.movement_index.remove(&m.id);
            prune(
                &mut self.movements_by_item,
                (m.location_id, m.product_id),
                journal.movement_len,
            );
            if let Some(document_id) = m.document_id() {
                prune(&mut self.movements_by_document, document_id, journal.movement_len);
            }
        }
        for (index, original) in journal.movements {
            self.movements[index] = original;
        }

        for b in self.batches.drain(journal.batch_len..) {
            self.batch_index.remove(&b.id);
            prune(
                &mut self.batches_by_item,
                (b.location_id, b.product_id),
                journal.batch_len,
            );
        }
        for (index, original) in journal.batches {
            self.batches[index] = original;
        }

        restore(&mut self.items, journal.items);
        restore(&mut self.locations, journal.locations);
        self.sequence = journal.sequence;
    }

    // ---- internals -------------------------------------------------------

    fn next_sequence(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    fn item_mut(&mut self, key: ItemKey) -> &mut InventoryItem {
        self.touch_item(key);
        self.items
            .entry(key)
            .or_insert_with(|| InventoryItem::new(key.0, key.1))
    }

    /// Batch positions for the allocations that name a batch.
    fn resolve_layers(&self, allocations: &[BatchAllocation]) -> DomainResult<Vec<(usize, Decimal)>> {
        allocations
            .iter()
            .filter_map(|a| a.batch_id.map(|id| (id, a.quantity)))
            .map(|(id, qty)| {
                self.batch_index
                    .get(&id)
                    .map(|&i| (i, qty))
                    .ok_or_else(|| DomainError::invariant(format!("unknown batch {id}")))
            })
            .collect()
    }

    /// Quantity and book value of the item must stay representable once
    /// `quantity` worth `value` is added.
    fn ensure_position_fits(&self, key: ItemKey, quantity: Decimal, value: Decimal) -> DomainResult<()> {
        let (on_hand, avg_cost) = self
            .items
            .get(&key)
            .map(|i| (i.current_qty, i.avg_cost))
            .unwrap_or((Decimal::ZERO, Decimal::ZERO));
        checked_sum([on_hand, quantity])?;
        checked_sum([checked_product(on_hand.abs(), avg_cost)?, value])?;
        Ok(())
    }

    fn push_batch(&mut self, batch: InventoryBatch) {
        let index = self.batches.len();
        self.batch_index.insert(batch.id, index);
        self.batches_by_item
            .entry((batch.location_id, batch.product_id))
            .or_default()
            .push(index);
        self.batches.push(batch);
    }

    fn push_movement(&mut self, movement: InventoryMovement) {
        let index = self.movements.len();
        self.movement_index.insert(movement.id, index);
        self.movements_by_item
            .entry((movement.location_id, movement.product_id))
            .or_default()
            .push(index);
        if let Some(document_id) = movement.document_id() {
            self.movements_by_document
                .entry(document_id)
                .or_default()
                .push(index);
        }
        self.movements.push(movement);
    }

    fn touch_item(&mut self, key: ItemKey) {
        if let Some(journal) = self.journal.as_mut() {
            let items = &self.items;
            journal
                .items
                .entry(key)
                .or_insert_with(|| items.get(&key).cloned());
        }
    }

    fn touch_location(&mut self, id: LocationId) {
        if let Some(journal) = self.journal.as_mut() {
            let locations = &self.locations;
            journal
                .locations
                .entry(id)
                .or_insert_with(|| locations.get(&id).cloned());
        }
    }

    fn touch_batch(&mut self, index: usize) {
        if let Some(journal) = self.journal.as_mut() {
            if index < journal.batch_len {
                let batches = &self.batches;
                journal
                    .batches
                    .entry(index)
                    .or_insert_with(|| batches[index].clone());
            }
        }
    }

    fn touch_movement(&mut self, index: usize) {
        if let Some(journal) = self.journal.as_mut() {
            if index < journal.movement_len {
                let movements = &self.movements;
                journal
                    .movements
                    .entry(index)
                    .or_insert_with(|| movements[index].clone());
            }
        }
    }
}

fn positive_quantity(quantity: Decimal) -> DomainResult<Decimal> {
    let quantity = round_quantity(quantity);
    if quantity <= Decimal::ZERO {
        return Err(DomainError::validation("quantity must be positive"));
    }
    Ok(quantity)
}

fn prune<K: Eq + Hash>(index: &mut HashMap<K, Vec<usize>>, key: K, len: usize) {
    if let Some(positions) = index.get_mut(&key) {
        positions.retain(|&i| i < len);
        if positions.is_empty() {
            index.remove(&key);
        }
    }
}

fn restore<K: Eq + Hash, V>(target: &mut HashMap<K, V>, snapshot: HashMap<K, Option<V>>) {
    for (key, original) in snapshot {
        match original {
            Some(value) => {
                target.insert(key, value);
            }
            None => {
                target.remove(&key);
            }
        }
    }
}
