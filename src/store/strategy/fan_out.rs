use crate::config::StoreDescriptor;
use crate::error::StoreError;
use crate::key::{Conditions, Parameters};
use crate::registry::Registry;
use crate::store::strategy::{NestedStores, StrategyStore};
use crate::store::{Producer, Store};

/// General purpose strategy aggregating several stores under one logical store.
///
/// Single-target operations (`writable`, `read`, `write`, `exists`) try the nested stores in
/// order and stop at the first success, so a fast local store listed first shadows a slower
/// remote one. `write` does not replicate; `write_all` does and only succeeds when every nested
/// store accepted the entry. `delete` reaches every store and succeeds if any removed the entry.
#[derive(Clone, Debug)]
pub struct FanOutStore {
    stores: NestedStores,
}

impl FanOutStore {
    pub fn new(stores: NestedStores) -> Self {
        FanOutStore { stores }
    }

    /// # Errors
    ///
    /// [`StoreError::Misconfigured`] when a descriptor cannot be resolved.
    pub fn from_descriptors(
        descriptors: &[StoreDescriptor],
        registry: &Registry,
    ) -> Result<Self, StoreError> {
        Ok(Self::new(NestedStores::resolve(descriptors, registry)?))
    }
}

impl StrategyStore for FanOutStore {
    fn nested(&self) -> &NestedStores {
        &self.stores
    }
}

impl Store for FanOutStore {
    fn name(&self) -> &'static str {
        "fan_out"
    }

    fn writable(&self, key: &str, parameters: &Parameters, conditions: &Conditions) -> bool {
        self.stores
            .any_first(|store| store.writable(key, parameters, conditions))
    }

    fn read(&self, key: &str, parameters: &Parameters) -> Option<Vec<u8>> {
        self.stores.capture_first(|store| store.read(key, parameters))
    }

    fn write(
        &self,
        key: &str,
        data: &[u8],
        parameters: &Parameters,
        conditions: &Conditions,
    ) -> bool {
        self.stores
            .any_first(|store| store.write(key, data, parameters, conditions))
    }

    fn write_all(
        &self,
        key: &str,
        data: &[u8],
        parameters: &Parameters,
        conditions: &Conditions,
    ) -> bool {
        self.stores.write_all(key, data, parameters, conditions)
    }

    /// Reads through every nested store first. On a miss the first nested store able to write
    /// the entry runs its own `fetch`; when none can, the producer's value is returned without
    /// being cached. The producer runs at most once.
    fn fetch(
        &self,
        key: &str,
        parameters: &Parameters,
        conditions: &Conditions,
        producer: &mut Producer<'_>,
    ) -> Result<Vec<u8>, StoreError> {
        if let Some(data) = self.read(key, parameters) {
            return Ok(data);
        }

        match self
            .stores
            .iter()
            .find(|store| store.writable(key, parameters, conditions))
        {
            Some(store) => store.fetch(key, parameters, conditions, producer),
            None => {
                tracing::debug!(key, "no nested store can cache the entry, producing uncached");
                producer().map_err(StoreError::Producer)
            }
        }
    }

    fn exists(&self, key: &str, parameters: &Parameters) -> bool {
        self.stores.any_first(|store| store.exists(key, parameters))
    }

    fn delete(&self, key: &str, parameters: &Parameters) -> bool {
        self.stores.delete(key, parameters)
    }

    fn delete_all_unchecked(&self) -> Result<bool, StoreError> {
        self.stores.delete_all_unchecked()
    }

    fn clone_box(&self) -> Box<dyn Store> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fundamental::FundamentalStore;
    use crate::store::memory::{MemoryBackend, MemoryStore};
    use crate::store::StoreExt;

    fn fan_out(stores: Vec<Box<dyn Store>>) -> FanOutStore {
        FanOutStore::new(NestedStores::new(stores).unwrap())
    }

    fn boxed(store: impl Store + 'static) -> Box<dyn Store> {
        Box::new(store)
    }

    fn empty() -> Parameters {
        Parameters::default()
    }

    /// Store that refuses every write, as a full or read-only backend would.
    #[derive(Clone, Debug)]
    struct ReadOnly(MemoryStore);

    impl Store for ReadOnly {
        fn name(&self) -> &'static str {
            "read_only"
        }

        fn writable(&self, _key: &str, _parameters: &Parameters, _conditions: &Conditions) -> bool {
            false
        }

        fn read(&self, key: &str, parameters: &Parameters) -> Option<Vec<u8>> {
            self.0.read(key, parameters)
        }

        fn write(
            &self,
            _key: &str,
            _data: &[u8],
            _parameters: &Parameters,
            _conditions: &Conditions,
        ) -> bool {
            false
        }

        fn exists(&self, key: &str, parameters: &Parameters) -> bool {
            self.0.exists(key, parameters)
        }

        fn delete(&self, key: &str, parameters: &Parameters) -> bool {
            self.0.delete(key, parameters)
        }

        fn clone_box(&self) -> Box<dyn Store> {
            Box::new(self.clone())
        }
    }

    #[test]
    fn write_lands_in_the_first_store_only() {
        let first = MemoryBackend::new();
        let second = MemoryBackend::new();
        let store = fan_out(vec![
            boxed(FundamentalStore::new(first.clone())),
            boxed(FundamentalStore::new(second.clone())),
        ]);

        assert!(store.put("user:1", b"alice"));

        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
    }

    #[test]
    fn read_prefers_the_earlier_store() {
        let fast = MemoryStore::in_memory();
        let slow = MemoryStore::in_memory();
        fast.put("user:1", b"fresh");
        slow.put("user:1", b"stale");
        slow.put("user:2", b"only-remote");
        let store = fan_out(vec![boxed(fast), boxed(slow)]);

        assert_eq!(store.get("user:1"), Some(b"fresh".to_vec()));
        assert_eq!(store.get("user:2"), Some(b"only-remote".to_vec()));
        assert!(store.exists("user:2", &empty()));
        assert_eq!(store.get("user:3"), None);
    }

    #[test]
    fn write_falls_through_to_a_store_that_accepts_it() {
        let writable = MemoryStore::in_memory();
        let store = fan_out(vec![
            boxed(ReadOnly(MemoryStore::in_memory())),
            boxed(writable.clone()),
        ]);

        assert!(store.writable("k", &empty(), &Conditions::default()));
        assert!(store.put("k", b"v"));
        assert_eq!(writable.get("k"), Some(b"v".to_vec()));
    }

    #[test]
    fn write_all_requires_every_store() {
        let kept = MemoryStore::in_memory();
        let store = fan_out(vec![
            boxed(kept.clone()),
            boxed(ReadOnly(MemoryStore::in_memory())),
        ]);

        assert!(!store.write_all("k", b"v", &empty(), &Conditions::default()));
        assert_eq!(kept.get("k"), Some(b"v".to_vec()));

        let replicated = fan_out(vec![
            boxed(MemoryStore::in_memory()),
            boxed(MemoryStore::in_memory()),
        ]);
        assert!(replicated.write_all("k", b"v", &empty(), &Conditions::default()));
        assert!(replicated.nested().iter().all(|nested| nested.get("k").is_some()));
    }

    #[test]
    fn delete_succeeds_if_any_store_deleted() {
        let first = MemoryStore::in_memory();
        let second = MemoryStore::in_memory();
        second.put("k", b"v");
        let store = fan_out(vec![boxed(first), boxed(second.clone())]);

        assert!(store.delete("k", &empty()));
        assert_eq!(second.get("k"), None);
        assert!(!store.delete("k", &empty()));
    }

    #[test]
    fn fetch_reads_through_before_producing() {
        let remote = MemoryStore::in_memory();
        remote.put("k", b"cached");
        let store = fan_out(vec![boxed(MemoryStore::in_memory()), boxed(remote)]);

        let value = store
            .fetch("k", &empty(), &Conditions::default(), &mut || panic!("must not produce"))
            .unwrap();

        assert_eq!(value, b"cached");
    }

    #[test]
    fn fetch_persists_through_the_first_writable_store() {
        let writable = MemoryStore::in_memory();
        let store = fan_out(vec![
            boxed(ReadOnly(MemoryStore::in_memory())),
            boxed(writable.clone()),
        ]);
        let mut calls = 0;

        let value = store
            .fetch("k", &empty(), &Conditions::default(), &mut || {
                calls += 1;
                Ok(b"produced".to_vec())
            })
            .unwrap();

        assert_eq!(value, b"produced");
        assert_eq!(calls, 1);
        assert_eq!(writable.get("k"), Some(b"produced".to_vec()));
    }

    #[test]
    fn fetch_without_a_writable_store_returns_uncached() {
        let store = fan_out(vec![boxed(ReadOnly(MemoryStore::in_memory()))]);
        let mut calls = 0;

        let value = store
            .fetch("k", &empty(), &Conditions::default(), &mut || {
                calls += 1;
                Ok(b"produced".to_vec())
            })
            .unwrap();

        assert_eq!(value, b"produced");
        assert_eq!(calls, 1);
        assert_eq!(store.get("k"), None);
    }

    #[test]
    fn delete_all_is_only_available_unchecked() {
        let first = MemoryStore::in_memory();
        first.put("k", b"v");
        let store = fan_out(vec![boxed(first.clone()), boxed(MemoryStore::in_memory())]);

        assert!(matches!(
            store.delete_all(),
            Err(StoreError::NotImplemented {
                store: "fan_out",
                operation: "delete_all"
            })
        ));
        assert!(store.delete_all_unchecked().unwrap());
        assert_eq!(first.get("k"), None);
    }

    #[test]
    fn nested_strategy_without_unchecked_delete_surfaces_the_error() {
        let inner = ReadOnly(MemoryStore::in_memory());
        let store = fan_out(vec![boxed(MemoryStore::in_memory()), boxed(inner)]);

        assert!(matches!(
            store.delete_all_unchecked(),
            Err(StoreError::NotImplemented { store: "read_only", .. })
        ));
    }
}
