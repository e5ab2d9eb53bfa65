use crate::error::{BackendError, StoreError};
use crate::key::{normalize, Conditions, Parameters};
use crate::store::Store;
use std::fmt::Debug;
use std::time::Duration;

/// A live handle to one storage service. Only backends perform real I/O.
///
/// Backends report their own failures through [`BackendError`]; [`FundamentalStore`] is the
/// boundary that turns them into misses and failed writes. Implementations must be safe to call
/// from many threads at once.
pub trait Backend: Debug + Clone + Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn get(&self, address: &str) -> Result<Option<Vec<u8>>, BackendError>;

    fn set(
        &self,
        address: &str,
        data: &[u8],
        expire_in: Option<Duration>,
    ) -> Result<(), BackendError>;

    /// Returns whether an entry was removed.
    fn delete(&self, address: &str) -> Result<bool, BackendError>;

    /// Backends without a dedicated existence check answer with a read.
    fn contains(&self, address: &str) -> Result<bool, BackendError> {
        Ok(self.get(address)?.is_some())
    }

    /// Removes every entry the backend holds.
    fn flush(&self) -> Result<(), BackendError>;

    /// Hard constraints the backend places on addresses.
    fn accepts(&self, _address: &str) -> bool {
        true
    }
}

/// Store performing the contract directly against a [`Backend`].
#[derive(Clone, Debug)]
pub struct FundamentalStore<B: Backend> {
    namespace: Option<String>,
    backend: B,
}

impl<B: Backend> FundamentalStore<B> {
    pub fn new(backend: B) -> Self {
        FundamentalStore {
            namespace: None,
            backend,
        }
    }

    /// Prefixes every address with `namespace`. An empty namespace is rejected.
    ///
    /// # Errors
    ///
    /// [`StoreError::Misconfigured`] for an empty namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Result<Self, StoreError> {
        let namespace = namespace.into();
        if namespace.is_empty() {
            return Err(StoreError::misconfigured("namespace must not be empty"));
        }
        self.namespace = Some(namespace);
        Ok(self)
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Backend address of the entry identified by `key` and `parameters`.
    pub fn address(&self, key: &str, parameters: &Parameters) -> String {
        let normalized = normalize(key, parameters);
        match &self.namespace {
            Some(namespace) => format!("{namespace}:{normalized}"),
            None => normalized,
        }
    }
}

impl<B: Backend> Store for FundamentalStore<B> {
    fn name(&self) -> &'static str {
        self.backend.name()
    }

    fn writable(&self, key: &str, parameters: &Parameters, _conditions: &Conditions) -> bool {
        self.backend.accepts(&self.address(key, parameters))
    }

    fn read(&self, key: &str, parameters: &Parameters) -> Option<Vec<u8>> {
        let address = self.address(key, parameters);
        match self.backend.get(&address) {
            Ok(data) => data,
            Err(error) => {
                tracing::warn!(store = self.name(), address, %error, "read failed");
                None
            }
        }
    }

    fn write(
        &self,
        key: &str,
        data: &[u8],
        parameters: &Parameters,
        conditions: &Conditions,
    ) -> bool {
        if !self.writable(key, parameters, conditions) {
            return false;
        }

        let address = self.address(key, parameters);
        match self.backend.set(&address, data, conditions.expire_in) {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(store = self.name(), address, %error, "write failed");
                false
            }
        }
    }

    fn exists(&self, key: &str, parameters: &Parameters) -> bool {
        let address = self.address(key, parameters);
        match self.backend.contains(&address) {
            Ok(found) => found,
            Err(error) => {
                tracing::warn!(store = self.name(), address, %error, "existence check failed");
                false
            }
        }
    }

    fn delete(&self, key: &str, parameters: &Parameters) -> bool {
        let address = self.address(key, parameters);
        match self.backend.delete(&address) {
            Ok(deleted) => deleted,
            Err(error) => {
                tracing::warn!(store = self.name(), address, %error, "delete failed");
                false
            }
        }
    }

    /// Flushes the whole backend, namespace or not.
    fn delete_all(&self) -> Result<bool, StoreError> {
        match self.backend.flush() {
            Ok(()) => Ok(true),
            Err(error) => {
                tracing::warn!(store = self.name(), %error, "flush failed");
                Ok(false)
            }
        }
    }

    fn clone_box(&self) -> Box<dyn Store> {
        Box::new(self.clone())
    }
}
