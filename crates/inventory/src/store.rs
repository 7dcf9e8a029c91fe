use std::sync::{Arc, Mutex, MutexGuard};

use tracing::warn;

use optimapos_core::DomainResult;

use crate::ledger::InventoryLedger;

/// Transactional access to the inventory ledger.
///
/// `transaction` is all-or-nothing: if the closure returns `Err`, every
/// change it made is rolled back before the error is handed back.
pub trait InventoryStore: Send + Sync {
    fn read<T>(&self, f: impl FnOnce(&InventoryLedger) -> T) -> DomainResult<T>;

    fn transaction<T>(
        &self,
        f: impl FnOnce(&mut InventoryLedger) -> DomainResult<T>,
    ) -> DomainResult<T>;
}

impl<S: InventoryStore> InventoryStore for Arc<S> {
    fn read<T>(&self, f: impl FnOnce(&InventoryLedger) -> T) -> DomainResult<T> {
        (**self).read(f)
    }

    fn transaction<T>(
        &self,
        f: impl FnOnce(&mut InventoryLedger) -> DomainResult<T>,
    ) -> DomainResult<T> {
        (**self).transaction(f)
    }
}

/// Process-local store: one ledger behind a mutex.
#[derive(Debug, Default)]
pub struct InMemoryInventoryStore {
    ledger: Mutex<InventoryLedger>,
}

impl InMemoryInventoryStore {
    pub fn new(ledger: InventoryLedger) -> Self {
        Self {
            ledger: Mutex::new(ledger),
        }
    }

    /// Lock, recovering from a panic inside an earlier transaction by
    /// undoing whatever it left half-done.
    fn lock(&self) -> MutexGuard<'_, InventoryLedger> {
        match self.ledger.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("inventory store lock poisoned; rolling back open transaction");
                let mut guard = poisoned.into_inner();
                guard.rollback();
                self.ledger.clear_poison();
                guard
            }
        }
    }
}

impl InventoryStore for InMemoryInventoryStore {
    fn read<T>(&self, f: impl FnOnce(&InventoryLedger) -> T) -> DomainResult<T> {
        let guard = self.lock();
        Ok(f(&guard))
    }

    fn transaction<T>(
        &self,
        f: impl FnOnce(&mut InventoryLedger) -> DomainResult<T>,
    ) -> DomainResult<T> {
        let mut guard = self.lock();
        guard.begin()?;
        match f(&mut guard) {
            Ok(value) => {
                guard.commit();
                Ok(value)
            }
            Err(e) => {
                guard.rollback();
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Receipt;
    use crate::location::{InventoryLocation, LocationKind, NewLocation};
    use crate::movement::MovementType;
    use chrono::Utc;
    use optimapos_core::{DomainError, LocationId, ProductId};
    use rust_decimal_macros::dec;

    #[test]
    fn failed_transaction_leaves_no_trace() {
        let store = InMemoryInventoryStore::default();
        let location = InventoryLocation::create(
            LocationId::new(),
            NewLocation::new("WH", "Warehouse", LocationKind::Warehouse),
            false,
        )
        .unwrap();
        let location_id = location.id;
        store
            .transaction(|l| l.register_location(location))
            .unwrap();
        let before = store.read(|l| l.clone()).unwrap();

        let err = store
            .transaction(|l| {
                l.receive(Receipt {
                    location_id,
                    product_id: ProductId::new(),
                    movement_type: MovementType::In,
                    quantity: dec!(3),
                    unit_cost: dec!(2),
                    batch_number: None,
                    expiry_date: None,
                    source: None,
                    reference: None,
                    occurred_at: Utc::now(),
                })?;
                Err::<(), _>(DomainError::validation("second line rejected"))
            })
            .unwrap_err();

        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert_eq!(store.read(|l| l.clone()).unwrap(), before);
    }

    #[test]
    fn panicking_transaction_is_rolled_back_on_next_lock() {
        let store = Arc::new(InMemoryInventoryStore::default());
        let location = InventoryLocation::create(
            LocationId::new(),
            NewLocation::new("WH", "Warehouse", LocationKind::Warehouse),
            false,
        )
        .unwrap();

        let s = Arc::clone(&store);
        let _ = std::thread::spawn(move || {
            s.transaction(|l: &mut InventoryLedger| -> DomainResult<()> {
                l.register_location(location)?;
                panic!("boom")
            })
        })
        .join();

        assert_eq!(store.read(|l| l.locations().count()).unwrap(), 0);
        store.transaction(|_| Ok(())).unwrap();
    }
}
