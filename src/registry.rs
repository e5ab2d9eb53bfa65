use crate::config::CacheConfig;
use crate::error::StoreError;
use crate::store::Store;
use std::collections::HashMap;
use std::sync::Arc;

/// Named stores of an application.
///
/// The registry is handed to whoever builds strategy stores, so name resolution never depends
/// on process-wide state. Resolving a name yields a clone of the registered store; backends
/// decide what a clone shares (a memory or memcached handle keeps pointing at the same data).
#[derive(Debug, Default)]
pub struct Registry {
    stores: HashMap<String, Arc<dyn Store>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds every configured store in declaration order. A strategy may only refer to stores
    /// declared before it.
    ///
    /// # Errors
    ///
    /// The first construction error, see [`crate::config::StoreConfig::build`], or
    /// [`StoreError::Misconfigured`] for a duplicate name.
    pub fn from_config(config: &CacheConfig) -> Result<Self, StoreError> {
        let mut registry = Registry::new();
        for named in &config.stores {
            let store = named.store.build(&registry)?;
            registry.register(named.name.clone(), store)?;
            tracing::debug!(name = %named.name, "registered cache store");
        }
        Ok(registry)
    }

    /// # Errors
    ///
    /// [`StoreError::Misconfigured`] when `name` is already taken.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        store: Box<dyn Store>,
    ) -> Result<(), StoreError> {
        let name = name.into();
        if self.stores.contains_key(&name) {
            return Err(StoreError::misconfigured(format!("store `{name}` is registered twice")));
        }
        self.stores.insert(name, Arc::from(store));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&dyn Store> {
        self.stores.get(name).map(|store| &**store)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.stores.contains_key(name)
    }

    /// An owned copy of the store registered as `name`, for nesting into a strategy.
    ///
    /// # Errors
    ///
    /// [`StoreError::Misconfigured`] when no store has that name.
    pub fn resolve(&self, name: &str) -> Result<Box<dyn Store>, StoreError> {
        self.get(name)
            .map(|store| store.clone_box())
            .ok_or_else(|| StoreError::misconfigured(format!("no store named `{name}`")))
    }

    /// The registered instance itself, for callers sharing it across threads.
    ///
    /// # Errors
    ///
    /// [`StoreError::Misconfigured`] when no store has that name.
    pub fn shared(&self, name: &str) -> Result<Arc<dyn Store>, StoreError> {
        self.stores
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::misconfigured(format!("no store named `{name}`")))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.stores.keys().map(String::as_str)
    }
}
