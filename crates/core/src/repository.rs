//! Entity repository abstraction plus an in-memory implementation for
//! tests/dev and single-process deployments.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::entity::Entity;
use crate::error::{DomainError, DomainResult};

/// Keyed storage for one entity type.
pub trait Repository<E: Entity>: Send + Sync {
    fn get(&self, id: &E::Id) -> DomainResult<Option<E>>;

    /// Insert a new entity; fails with `CONFLICT` if the id is taken.
    fn insert(&self, entity: E) -> DomainResult<()>;

    /// Insert or replace.
    fn save(&self, entity: E) -> DomainResult<()>;

    fn remove(&self, id: &E::Id) -> DomainResult<Option<E>>;

    /// All entities in insertion order.
    fn list(&self) -> DomainResult<Vec<E>>;

    /// Entities matching `predicate`, in insertion order.
    fn find(&self, predicate: &dyn Fn(&E) -> bool) -> DomainResult<Vec<E>>;

    /// Read-modify-write under the store's write lock.
    ///
    /// `mutate` works on a copy; the copy replaces the stored entity only if
    /// `mutate` succeeds.
    fn update(
        &self,
        id: &E::Id,
        mutate: &mut dyn FnMut(&mut E) -> DomainResult<()>,
    ) -> DomainResult<E>;
}

impl<E, R> Repository<E> for Arc<R>
where
    E: Entity,
    R: Repository<E> + ?Sized,
{
    fn get(&self, id: &E::Id) -> DomainResult<Option<E>> {
        (**self).get(id)
    }

    fn insert(&self, entity: E) -> DomainResult<()> {
        (**self).insert(entity)
    }

    fn save(&self, entity: E) -> DomainResult<()> {
        (**self).save(entity)
    }

    fn remove(&self, id: &E::Id) -> DomainResult<Option<E>> {
        (**self).remove(id)
    }

    fn list(&self) -> DomainResult<Vec<E>> {
        (**self).list()
    }

    fn find(&self, predicate: &dyn Fn(&E) -> bool) -> DomainResult<Vec<E>> {
        (**self).find(predicate)
    }

    fn update(
        &self,
        id: &E::Id,
        mutate: &mut dyn FnMut(&mut E) -> DomainResult<()>,
    ) -> DomainResult<E> {
        (**self).update(id, mutate)
    }
}

#[derive(Debug)]
struct Slots<E: Entity> {
    order: Vec<E::Id>,
    by_id: HashMap<E::Id, E>,
}

/// In-memory repository.
///
/// Not optimized for performance; lookups are by id, scans are linear.
#[derive(Debug)]
pub struct InMemoryRepository<E: Entity> {
    inner: RwLock<Slots<E>>,
}

impl<E: Entity> InMemoryRepository<E> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Slots {
                order: Vec::new(),
                by_id: HashMap::new(),
            }),
        }
    }
}

impl<E: Entity> Default for InMemoryRepository<E> {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> DomainError {
    DomainError::storage("repository lock poisoned")
}

impl<E> Repository<E> for InMemoryRepository<E>
where
    E: Entity + Clone + Send + Sync + 'static,
    E::Id: Send + Sync + 'static,
{
    fn get(&self, id: &E::Id) -> DomainResult<Option<E>> {
        let slots = self.inner.read().map_err(|_| poisoned())?;
        Ok(slots.by_id.get(id).cloned())
    }

    fn insert(&self, entity: E) -> DomainResult<()> {
        let mut slots = self.inner.write().map_err(|_| poisoned())?;
        let id = entity.id().clone();
        if slots.by_id.contains_key(&id) {
            return Err(DomainError::conflict(format!("{id:?} already exists")));
        }
        slots.order.push(id.clone());
        slots.by_id.insert(id, entity);
        Ok(())
    }

    fn save(&self, entity: E) -> DomainResult<()> {
        let mut slots = self.inner.write().map_err(|_| poisoned())?;
        let id = entity.id().clone();
        if slots.by_id.insert(id.clone(), entity).is_none() {
            slots.order.push(id);
        }
        Ok(())
    }

    fn remove(&self, id: &E::Id) -> DomainResult<Option<E>> {
        let mut slots = self.inner.write().map_err(|_| poisoned())?;
        let removed = slots.by_id.remove(id);
        if removed.is_some() {
            slots.order.retain(|k| k != id);
        }
        Ok(removed)
    }

    fn list(&self) -> DomainResult<Vec<E>> {
        self.find(&|_| true)
    }

    fn find(&self, predicate: &dyn Fn(&E) -> bool) -> DomainResult<Vec<E>> {
        let slots = self.inner.read().map_err(|_| poisoned())?;
        Ok(slots
            .order
            .iter()
            .filter_map(|id| slots.by_id.get(id))
            .filter(|e| predicate(e))
            .cloned()
            .collect())
    }

    fn update(
        &self,
        id: &E::Id,
        mutate: &mut dyn FnMut(&mut E) -> DomainResult<()>,
    ) -> DomainResult<E> {
        let mut slots = self.inner.write().map_err(|_| poisoned())?;
        let current = slots
            .by_id
            .get(id)
            .ok_or_else(|| DomainError::not_found(format!("{id:?}")))?;
        let mut next = current.clone();
        mutate(&mut next)?;
        slots.by_id.insert(id.clone(), next.clone());
        Ok(next)
    }
}
