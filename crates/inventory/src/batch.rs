use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use optimapos_core::{BatchId, LocationId, MovementId, ProductId};

/// FIFO cost layer created by an inbound movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryBatch {
    pub id: BatchId,
    pub location_id: LocationId,
    pub product_id: ProductId,
    pub batch_number: String,
    pub received_qty: Decimal,
    /// Not netted against a negative on-hand balance: after a location
    /// recovers from negative stock the open layers can exceed the item's
    /// `current_qty` by the outstanding shortfall. Reversing the issue that
    /// booked the shortfall closes the gap.
    pub remaining_qty: Decimal,
    pub cost_price: Decimal,
    pub received_at: DateTime<Utc>,
    pub expiry_date: Option<NaiveDate>,
    /// Inbound movement that created the layer.
    pub movement_id: MovementId,
    /// Ledger sequence of that movement; breaks ties on `received_at`.
    pub sequence: u64,
}

impl InventoryBatch {
    pub fn is_exhausted(&self) -> bool {
        self.remaining_qty <= Decimal::ZERO
    }

    /// Consumption order: oldest receipt first, then commit order.
    pub fn fifo_key(&self) -> (DateTime<Utc>, u64) {
        (self.received_at, self.sequence)
    }

    pub fn consumed_qty(&self) -> Decimal {
        self.received_qty - self.remaining_qty
    }
}
