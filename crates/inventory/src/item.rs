use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use optimapos_core::decimal::{
    remove_from_average, round_currency, round_quantity, weighted_average_cost,
};
use optimapos_core::{LocationId, ProductId};

use crate::movement::{InventoryMovement, StockDirection};

pub type ItemKey = (LocationId, ProductId);

/// Cached stock position of one product at one location.
///
/// The cache is derived data: replaying the item's movements in sequence
/// order through [`InventoryItem::apply_movement`] must reproduce it exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub location_id: LocationId,
    pub product_id: ProductId,
    pub current_qty: Decimal,
    pub avg_cost: Decimal,
    pub min_stock_level: Option<Decimal>,
    pub last_movement_at: Option<DateTime<Utc>>,
}

impl InventoryItem {
    pub fn new(location_id: LocationId, product_id: ProductId) -> Self {
        Self {
            location_id,
            product_id,
            current_qty: Decimal::ZERO,
            avg_cost: Decimal::ZERO,
            min_stock_level: None,
            last_movement_at: None,
        }
    }

    pub fn key(&self) -> ItemKey {
        (self.location_id, self.product_id)
    }

    /// Fold one movement into the cache.
    ///
    /// Inbound movements (receipts and reversed issues) re-average the cost.
    /// Plain issues leave the average alone. A reversed receipt takes its own
    /// value back out of the average.
    pub fn apply_movement(&mut self, movement: &InventoryMovement) {
        match (movement.direction, movement.is_reversal()) {
            (StockDirection::Inbound, _) => {
                self.avg_cost = weighted_average_cost(
                    self.current_qty,
                    self.avg_cost,
                    movement.quantity,
                    movement.cost_price,
                );
            }
            (StockDirection::Outbound, true) => {
                self.avg_cost = remove_from_average(
                    self.current_qty,
                    self.avg_cost,
                    movement.quantity,
                    movement.cost_price,
                );
            }
            (StockDirection::Outbound, false) => {}
        }
        self.current_qty = round_quantity(self.current_qty + movement.signed_quantity());
        self.last_movement_at = Some(movement.occurred_at);
    }

    pub fn total_value(&self) -> Decimal {
        round_currency(self.current_qty * self.avg_cost)
    }

    pub fn is_below_minimum(&self) -> bool {
        self.min_stock_level
            .is_some_and(|min| self.current_qty < min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::movement::MovementType;
    use optimapos_core::MovementId;
    use rust_decimal_macros::dec;

    fn movement(direction: StockDirection, qty: Decimal, cost: Decimal) -> InventoryMovement {
        InventoryMovement {
            id: MovementId::new(),
            sequence: 0,
            movement_type: MovementType::In,
            direction,
            location_id: LocationId::new(),
            product_id: ProductId::new(),
            quantity: qty,
            cost_price: cost,
            total_cost: round_currency(qty * cost),
            sale_price: None,
            profit: None,
            batch_id: None,
            allocations: Vec::new(),
            source: None,
            reference: None,
            reversal_of: None,
            reversed_by: None,
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn receipts_average_to_four_places() {
        let mut item = InventoryItem::new(LocationId::new(), ProductId::new());
        item.apply_movement(&movement(StockDirection::Inbound, dec!(3), dec!(10)));
        item.apply_movement(&movement(StockDirection::Inbound, dec!(6), dec!(11)));
        // (30 + 66) / 9 = 10.6666..
        assert_eq!(item.avg_cost, dec!(10.6667));
        assert_eq!(item.current_qty, dec!(9));
    }

    #[test]
    fn issue_keeps_average() {
        let mut item = InventoryItem::new(LocationId::new(), ProductId::new());
        item.apply_movement(&movement(StockDirection::Inbound, dec!(10), dec!(5)));
        item.apply_movement(&movement(StockDirection::Outbound, dec!(4), dec!(9)));
        assert_eq!(item.avg_cost, dec!(5));
        assert_eq!(item.current_qty, dec!(6));
    }

    #[test]
    fn reversed_receipt_restores_previous_average() {
        let mut item = InventoryItem::new(LocationId::new(), ProductId::new());
        item.apply_movement(&movement(StockDirection::Inbound, dec!(10), dec!(10)));
        item.apply_movement(&movement(StockDirection::Inbound, dec!(10), dec!(20)));
        assert_eq!(item.avg_cost, dec!(15));

        let mut reversal = movement(StockDirection::Outbound, dec!(10), dec!(20));
        reversal.reversal_of = Some(MovementId::new());
        item.apply_movement(&reversal);
        assert_eq!(item.avg_cost, dec!(10));
        assert_eq!(item.current_qty, dec!(10));
    }

    #[test]
    fn minimum_level_flag() {
        let mut item = InventoryItem::new(LocationId::new(), ProductId::new());
        assert!(!item.is_below_minimum());
        item.min_stock_level = Some(dec!(5));
        assert!(item.is_below_minimum());
        item.apply_movement(&movement(StockDirection::Inbound, dec!(5), dec!(1)));
        assert!(!item.is_below_minimum());
    }
}
