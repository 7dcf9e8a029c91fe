use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use optimapos_core::decimal::checked_product;
use optimapos_core::{BatchId, DocumentId, DomainResult, Entity, LocationId, MovementId, ProductId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementType {
    In,
    Out,
    Transfer,
    Adjustment,
    Production,
    CycleCount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StockDirection {
    Inbound,
    Outbound,
}

impl StockDirection {
    pub fn opposite(self) -> Self {
        match self {
            StockDirection::Inbound => StockDirection::Outbound,
            StockDirection::Outbound => StockDirection::Inbound,
        }
    }
}

/// Document line a movement was produced for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLine {
    pub document_id: DocumentId,
    pub line_no: u32,
}

/// Portion of a movement drawn from (or added to) one cost layer.
///
/// `batch_id` is `None` for the uncovered part of an issue from a location
/// that allows negative stock; that part is costed at the average cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchAllocation {
    pub batch_id: Option<BatchId>,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
}

impl BatchAllocation {
    pub fn value(&self) -> DomainResult<Decimal> {
        checked_product(self.quantity, self.unit_cost)
    }
}

/// One immutable ledger entry.
///
/// Movements are never edited or deleted. A reversal is a second movement in
/// the opposite direction pointing back via `reversal_of`; the original gets
/// its `reversed_by` link set and nothing else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryMovement {
    pub id: MovementId,
    /// Ledger-wide commit order.
    pub sequence: u64,
    pub movement_type: MovementType,
    pub direction: StockDirection,
    pub location_id: LocationId,
    pub product_id: ProductId,
    pub quantity: Decimal,
    pub cost_price: Decimal,
    pub total_cost: Decimal,
    pub sale_price: Option<Decimal>,
    pub profit: Option<Decimal>,
    /// Receiving batch for inbound movements; first consumed batch otherwise.
    pub batch_id: Option<BatchId>,
    pub allocations: Vec<BatchAllocation>,
    pub source: Option<SourceLine>,
    pub reference: Option<String>,
    pub reversal_of: Option<MovementId>,
    pub reversed_by: Option<MovementId>,
    pub occurred_at: DateTime<Utc>,
}

impl InventoryMovement {
    /// Quantity with the sign of its effect on stock.
    pub fn signed_quantity(&self) -> Decimal {
        match self.direction {
            StockDirection::Inbound => self.quantity,
            StockDirection::Outbound => -self.quantity,
        }
    }

    pub fn is_reversal(&self) -> bool {
        self.reversal_of.is_some()
    }

    pub fn is_reversed(&self) -> bool {
        self.reversed_by.is_some()
    }

    /// Neither a reversal nor reversed: still counts for its document.
    pub fn is_active(&self) -> bool {
        !self.is_reversal() && !self.is_reversed()
    }

    pub fn document_id(&self) -> Option<DocumentId> {
        self.source.map(|s| s.document_id)
    }
}

impl Entity for InventoryMovement {
    type Id = MovementId;

    fn id(&self) -> &MovementId {
        &self.id
    }
}
