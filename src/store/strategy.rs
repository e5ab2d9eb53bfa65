//! Strategy stores: decorators that wrap one or more nested stores, acting as a middle man
//! between callers and the stores doing the actual I/O.
//!
//! A strategy may wrap fundamental stores or other strategies, so chains such as compression
//! around encryption around a fan-out over two backends are built by plain composition.
//!
//! Strategy stores leave [`Store::delete_all`] unimplemented: they generally cannot prove that
//! their nested stores only hold entries the strategy wrote. [`Store::delete_all_unchecked`] is
//! the supported, dangerous alternative.

pub mod fan_out;
pub mod transform;

use crate::config::StoreDescriptor;
use crate::error::StoreError;
use crate::key::{Conditions, Parameters};
use crate::registry::Registry;
use crate::store::Store;

/// The ordered, exclusively owned stores a strategy delegates to.
///
/// Order is priority: earlier stores win ties for single-target operations. Cloning clones
/// every nested store, recursively through the composition tree.
#[derive(Clone, Debug)]
pub struct NestedStores {
    stores: Vec<Box<dyn Store>>,
}

impl NestedStores {
    /// # Errors
    ///
    /// [`StoreError::Misconfigured`] when `stores` is empty.
    pub fn new(stores: Vec<Box<dyn Store>>) -> Result<Self, StoreError> {
        if stores.is_empty() {
            return Err(StoreError::misconfigured(
                "a strategy store needs at least one nested store",
            ));
        }
        Ok(NestedStores { stores })
    }

    /// Builds the nested stores from descriptors: names are looked up in `registry`, inline
    /// configurations are instantiated fresh.
    ///
    /// # Errors
    ///
    /// [`StoreError::Misconfigured`] for unknown names, invalid inline configurations or an
    /// empty descriptor list.
    pub fn resolve(
        descriptors: &[StoreDescriptor],
        registry: &Registry,
    ) -> Result<Self, StoreError> {
        let stores = descriptors
            .iter()
            .map(|descriptor| match descriptor {
                StoreDescriptor::Named(name) => registry.resolve(name),
                StoreDescriptor::Inline(config) => config.build(registry),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(stores)
    }

    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Store> + '_ {
        self.stores.iter().map(|store| &**store)
    }

    /// First result produced by a nested store, in order.
    pub fn capture_first<T>(&self, attempt: impl FnMut(&dyn Store) -> Option<T>) -> Option<T> {
        self.iter().find_map(attempt)
    }

    /// Whether `attempt` succeeded on some nested store; stops at the first success.
    pub fn any_first(&self, mut attempt: impl FnMut(&dyn Store) -> bool) -> bool {
        self.iter().any(|store| attempt(store))
    }

    /// Runs `attempt` on every nested store and reports whether all succeeded.
    pub fn all(&self, attempt: impl FnMut(&dyn Store) -> bool) -> bool {
        self.iter().map(attempt).fold(true, |all, succeeded| all && succeeded)
    }

    /// Runs `attempt` on every nested store and reports whether any succeeded.
    pub fn any(&self, attempt: impl FnMut(&dyn Store) -> bool) -> bool {
        self.iter().map(attempt).fold(false, |any, succeeded| any || succeeded)
    }

    /// `write_all` on every nested store; true only if all succeeded.
    pub fn write_all(
        &self,
        key: &str,
        data: &[u8],
        parameters: &Parameters,
        conditions: &Conditions,
    ) -> bool {
        self.all(|store| store.write_all(key, data, parameters, conditions))
    }

    /// `delete` on every nested store; true if any removed the entry.
    pub fn delete(&self, key: &str, parameters: &Parameters) -> bool {
        self.any(|store| store.delete(key, parameters))
    }

    /// `delete_all_unchecked` on every nested store. Every store is attempted even after a
    /// failure; the first error, if any, is returned afterwards.
    ///
    /// # Errors
    ///
    /// The first error reported by a nested store.
    pub fn delete_all_unchecked(&self) -> Result<bool, StoreError> {
        let mut first_error = None;
        let mut all = true;

        for store in self.iter() {
            match store.delete_all_unchecked() {
                Ok(deleted) => all &= deleted,
                Err(error) => {
                    tracing::warn!(store = store.name(), %error, "nested delete_all failed");
                    first_error.get_or_insert(error);
                }
            }
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(all),
        }
    }
}

/// A store that composes nested stores instead of owning a backend.
pub trait StrategyStore: Store {
    fn nested(&self) -> &NestedStores;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::store::StoreExt;

    fn two_stores() -> NestedStores {
        NestedStores::new(vec![
            Box::new(MemoryStore::in_memory()) as Box<dyn Store>,
            Box::new(MemoryStore::in_memory()),
        ])
        .unwrap()
    }

    #[test]
    fn empty_nested_list_is_misconfigured() {
        assert!(matches!(NestedStores::new(Vec::new()), Err(StoreError::Misconfigured(_))));
    }

    #[test]
    fn all_and_any_visit_every_store() {
        let nested = two_stores();
        let mut visited = 0;

        assert!(!nested.all(|_| {
            visited += 1;
            visited == 2
        }));
        assert!(nested.any(|_| {
            visited += 1;
            visited == 3
        }));
        assert_eq!(visited, 4);
    }

    #[test]
    fn capture_first_stops_at_the_first_hit() {
        let nested = two_stores();
        let mut visited = 0;

        let hit = nested.capture_first(|_| {
            visited += 1;
            Some(visited)
        });

        assert_eq!(hit, Some(1));
        assert_eq!(visited, 1);
    }

    #[test]
    fn clones_copy_every_nested_handle() {
        let nested = two_stores();
        let twin = nested.clone();

        for store in nested.iter() {
            store.put("k", b"v");
        }

        // Memory handles share their map, so the clone sees the writes.
        assert!(twin.iter().all(|store| store.get("k") == Some(b"v".to_vec())));
        assert_eq!(twin.len(), 2);
        assert!(nested.delete_all_unchecked().unwrap());
        assert!(twin.iter().all(|store| store.get("k").is_none()));
    }
}
