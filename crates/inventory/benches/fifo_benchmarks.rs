use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::{Duration, TimeZone, Utc};
use optimapos_core::{LocationId, ProductId};
use optimapos_inventory::{
    InventoryLedger, InventoryLocation, Issue, LocationKind, MovementType, NewLocation, Receipt,
};
use rust_decimal::Decimal;

/// Ledger with one item spread over `layers` batches of 10 units each.
fn layered_ledger(layers: usize) -> (InventoryLedger, LocationId, ProductId) {
    let mut ledger = InventoryLedger::default();
    let location = InventoryLocation::create(
        LocationId::new(),
        NewLocation::new("WH", "Warehouse", LocationKind::Warehouse),
        false,
    )
    .unwrap();
    let location_id = location.id;
    ledger.register_location(location).unwrap();
    let product_id = ProductId::new();
    let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();

    for n in 0..layers {
        ledger
            .receive(Receipt {
                location_id,
                product_id,
                movement_type: MovementType::In,
                quantity: Decimal::TEN,
                unit_cost: Decimal::new(1000 + n as i64, 2),
                batch_number: None,
                expiry_date: None,
                source: None,
                reference: None,
                occurred_at: t0 + Duration::minutes(n as i64),
            })
            .unwrap();
    }
    (ledger, location_id, product_id)
}

fn bench_fifo_issue(c: &mut Criterion) {
    let mut group = c.benchmark_group("fifo_issue");

    for layers in [1usize, 10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*layers as u64));
        group.bench_with_input(BenchmarkId::from_parameter(layers), layers, |b, &layers| {
            let (ledger, location_id, product_id) = layered_ledger(layers);
            // Drain every layer in one issue.
            let quantity = Decimal::from(layers as i64 * 10);
            b.iter(|| {
                let mut ledger = ledger.clone();
                ledger
                    .issue(Issue {
                        location_id,
                        product_id,
                        movement_type: MovementType::Out,
                        quantity: black_box(quantity),
                        sale_price: None,
                        source: None,
                        reference: None,
                        occurred_at: Utc::now(),
                    })
                    .unwrap()
            });
        });
    }

    group.finish();
}

fn bench_item_rebuild(c: &mut Criterion) {
    let mut group = c.benchmark_group("item_rebuild");

    for layers in [10usize, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(layers), layers, |b, &layers| {
            let (ledger, location_id, product_id) = layered_ledger(layers);
            b.iter(|| black_box(ledger.rebuild_item(location_id, product_id)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_fifo_issue, bench_item_rebuild);
criterion_main!(benches);
