//! FIFO layer selection, kept free of any storage concerns.

use rust_decimal::Decimal;

use crate::batch::InventoryBatch;
use crate::movement::BatchAllocation;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumptionPlan {
    /// Allocations against real batches, oldest first.
    pub allocations: Vec<BatchAllocation>,
    /// Quantity the open batches could not cover.
    pub shortfall: Decimal,
}

impl ConsumptionPlan {
    pub fn covered(&self) -> Decimal {
        self.allocations.iter().map(|a| a.quantity).sum()
    }

    pub fn is_covered(&self) -> bool {
        self.shortfall <= Decimal::ZERO
    }
}

/// Walk open batches oldest first and take `quantity` from them.
///
/// Order is `(received_at, sequence)` regardless of the input order. Nothing
/// is mutated; the caller applies the plan.
pub fn plan_consumption<'a>(
    batches: impl IntoIterator<Item = &'a InventoryBatch>,
    quantity: Decimal,
) -> ConsumptionPlan {
    let mut open: Vec<&InventoryBatch> = batches.into_iter().filter(|b| !b.is_exhausted()).collect();
    open.sort_by_key(|b| b.fifo_key());

    let mut needed = quantity;
    let mut allocations = Vec::new();
    for batch in open {
        if needed <= Decimal::ZERO {
            break;
        }
        let take = needed.min(batch.remaining_qty);
        allocations.push(BatchAllocation {
            batch_id: Some(batch.id),
            quantity: take,
            unit_cost: batch.cost_price,
        });
        needed -= take;
    }

    ConsumptionPlan {
        allocations,
        shortfall: needed.max(Decimal::ZERO),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use optimapos_core::{BatchId, LocationId, MovementId, ProductId};
    use rust_decimal_macros::dec;

    fn batch(qty: Decimal, cost: Decimal, day: i64, sequence: u64) -> InventoryBatch {
        let base = Utc.with_ymd_and_hms(2026, 1, 1, 8, 0, 0).unwrap();
        InventoryBatch {
            id: BatchId::new(),
            location_id: LocationId::new(),
            product_id: ProductId::new(),
            batch_number: format!("LOT-{sequence}"),
            received_qty: qty,
            remaining_qty: qty,
            cost_price: cost,
            received_at: base + Duration::days(day),
            expiry_date: None,
            movement_id: MovementId::new(),
            sequence,
        }
    }

    #[test]
    fn consumes_oldest_layer_first() {
        let older = batch(dec!(60), dec!(10), 0, 1);
        let newer = batch(dec!(40), dec!(12), 1, 2);

        // Input order must not matter.
        let plan = plan_consumption([&newer, &older], dec!(100));

        assert!(plan.is_covered());
        assert_eq!(plan.allocations.len(), 2);
        assert_eq!(plan.allocations[0].batch_id, Some(older.id));
        assert_eq!(plan.allocations[0].quantity, dec!(60));
        assert_eq!(plan.allocations[0].unit_cost, dec!(10));
        assert_eq!(plan.allocations[1].quantity, dec!(40));
        assert_eq!(plan.allocations[1].unit_cost, dec!(12));
    }

    #[test]
    fn same_timestamp_breaks_tie_on_sequence() {
        let first = batch(dec!(5), dec!(1), 0, 7);
        let second = batch(dec!(5), dec!(2), 0, 8);
        let plan = plan_consumption([&second, &first], dec!(3));
        assert_eq!(plan.allocations.len(), 1);
        assert_eq!(plan.allocations[0].batch_id, Some(first.id));
    }

    #[test]
    fn exhausted_batches_are_skipped() {
        let mut empty = batch(dec!(10), dec!(1), 0, 1);
        empty.remaining_qty = dec!(0);
        let open = batch(dec!(10), dec!(2), 1, 2);
        let plan = plan_consumption([&empty, &open], dec!(4));
        assert_eq!(plan.allocations[0].batch_id, Some(open.id));
    }

    #[test]
    fn reports_shortfall() {
        let only = batch(dec!(2.5), dec!(4), 0, 1);
        let plan = plan_consumption([&only], dec!(4));
        assert_eq!(plan.covered(), dec!(2.5));
        assert_eq!(plan.shortfall, dec!(1.5));
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: allocations follow FIFO order, every layer but the
            /// last is drained, and covered plus shortfall is the request.
            #[test]
            fn allocations_drain_oldest_layers_first(
                layers in proptest::collection::vec((1i64..500, 0i64..5, 0u64..1_000), 1..12),
                wanted in 1i64..4_000,
            ) {
                let batches: Vec<InventoryBatch> = layers
                    .iter()
                    .enumerate()
                    .map(|(i, &(q, day, seq))| batch(Decimal::new(q, 1), dec!(1), day, seq * 100 + i as u64))
                    .collect();
                let quantity = Decimal::new(wanted, 1);
                let plan = plan_consumption(&batches, quantity);

                prop_assert_eq!(plan.covered() + plan.shortfall, quantity);

                let used: Vec<&InventoryBatch> = plan
                    .allocations
                    .iter()
                    .filter_map(|a| batches.iter().find(|b| Some(b.id) == a.batch_id))
                    .collect();
                prop_assert_eq!(used.len(), plan.allocations.len());
                for pair in used.windows(2) {
                    prop_assert!(pair[0].fifo_key() <= pair[1].fifo_key());
                }
                let last = plan.allocations.len().saturating_sub(1);
                for (i, (alloc, b)) in plan.allocations.iter().zip(&used).enumerate() {
                    if i < last {
                        prop_assert_eq!(alloc.quantity, b.remaining_qty);
                    }
                }
                // Anything older than the last used layer must have been touched.
                if let Some(newest) = used.last() {
                    let older = batches.iter().filter(|b| b.fifo_key() < newest.fifo_key()).count();
                    prop_assert_eq!(older, last);
                }
            }
        }
    }
}
