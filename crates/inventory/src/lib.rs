//! Inventory: locations, the append-only movement ledger, the per-item
//! quantity/average-cost cache and FIFO cost layers.
//!
//! `ledger` holds the pure bookkeeping (no IO, no locking); `store` runs it
//! inside all-or-nothing transactions; `service` is the API the rest of the
//! system calls.

pub mod batch;
pub mod fifo;
pub mod item;
pub mod ledger;
pub mod location;
pub mod movement;
pub mod service;
pub mod store;

pub use batch::InventoryBatch;
pub use fifo::{ConsumptionPlan, plan_consumption};
pub use item::{InventoryItem, ItemKey};
pub use ledger::{InventoryLedger, Issue, Receipt};
pub use location::{InventoryLocation, LocationKind, NewLocation};
pub use movement::{BatchAllocation, InventoryMovement, MovementType, SourceLine, StockDirection};
pub use service::{
    CycleCount, DocumentMovementOutcome, DocumentMovementPlan, IncomingStock, MovementRequest,
    MovementService, OutgoingStock, ProductionRun, StockAdjustment, StockTransfer,
};
pub use store::{InMemoryInventoryStore, InventoryStore};
