pub mod discrete_files;
pub mod fundamental;
#[cfg(feature = "memcached")]
pub mod memcached;
pub mod memory;
pub mod strategy;

use crate::error::{BoxError, StoreError};
use crate::key::{Conditions, Parameters};
use std::fmt::Debug;

/// Zero-argument callback producing the value `fetch` caches on a miss.
pub type Producer<'a> = dyn FnMut() -> Result<Vec<u8>, BoxError> + 'a;

/// The uniform key/value contract shared by every store, fundamental or strategy.
///
/// Stores are built once, shared behind an `Arc` and called concurrently, so every operation
/// takes `&self`. Misses and failed writes are ordinary results: `read` answers `None` for an
/// absent entry (a stored empty payload is `Some(vec![])`), `write` and `delete` answer `false`.
/// Backend failures never cross this boundary.
pub trait Store: Debug + Send + Sync {
    /// A name for logs and errors, e.g. "memory" or "fan_out".
    fn name(&self) -> &'static str;

    /// Whether this store is able to persist the entry. Never performs I/O.
    fn writable(&self, key: &str, parameters: &Parameters, conditions: &Conditions) -> bool;

    fn read(&self, key: &str, parameters: &Parameters) -> Option<Vec<u8>>;

    /// Persists `data`. Returns `false` when the entry is not writable or the backend failed.
    fn write(
        &self,
        key: &str,
        data: &[u8],
        parameters: &Parameters,
        conditions: &Conditions,
    ) -> bool;

    /// Persists `data` everywhere this store can. Identical to `write` for a single backend.
    fn write_all(
        &self,
        key: &str,
        data: &[u8],
        parameters: &Parameters,
        conditions: &Conditions,
    ) -> bool {
        self.write(key, data, parameters, conditions)
    }

    /// Read-through access: returns the stored value, or runs `producer` once, attempts to
    /// persist its value and returns it whether or not the write succeeded.
    ///
    /// There is no single-flight guarantee. Concurrent callers missing on the same key may all
    /// run their producers and write; the last write wins.
    ///
    /// # Errors
    ///
    /// [`StoreError::Producer`] when the producer fails. Nothing is written in that case.
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

        tracing::debug!(store = self.name(), key, "fetch miss");
        let data = producer().map_err(StoreError::Producer)?;
        if self.writable(key, parameters, conditions)
            && !self.write(key, &data, parameters, conditions)
        {
            tracing::debug!(store = self.name(), key, "fetched value was not cached");
        }

        Ok(data)
    }

    fn exists(&self, key: &str, parameters: &Parameters) -> bool;

    /// Removes the entry. Deleting an absent entry is not an error and returns `false`.
    fn delete(&self, key: &str, parameters: &Parameters) -> bool;

    /// Removes every entry belonging to this store.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotImplemented`] unless the store can tell its own entries apart, which
    /// strategy stores generally cannot.
    fn delete_all(&self) -> Result<bool, StoreError> {
        Err(StoreError::not_implemented(self.name(), "delete_all"))
    }

    /// Dangerous version of `delete_all`. Strategy stores forward it to their nested stores,
    /// which may erase entries written by other stores sharing the same backend.
    ///
    /// # Errors
    ///
    /// Whatever the nested `delete_all` reports.
    fn delete_all_unchecked(&self) -> Result<bool, StoreError> {
        self.delete_all()
    }

    fn clone_box(&self) -> Box<dyn Store>;
}

impl Clone for Box<dyn Store> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Closure-friendly entry points over the object-safe contract.
pub trait StoreExt: Store {
    /// [`Store::read`] with empty parameters.
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.read(key, &Parameters::default())
    }

    /// [`Store::write`] with empty parameters and conditions.
    fn put(&self, key: &str, data: &[u8]) -> bool {
        self.write(key, data, &Parameters::default(), &Conditions::default())
    }

    /// [`Store::fetch`] taking any closure; the producer error type only needs to box.
    ///
    /// # Errors
    ///
    /// [`StoreError::Producer`] when the producer fails.
    fn fetch_with<F, E>(
        &self,
        key: &str,
        parameters: &Parameters,
        conditions: &Conditions,
        producer: F,
    ) -> Result<Vec<u8>, StoreError>
    where
        F: FnOnce() -> Result<Vec<u8>, E>,
        E: Into<BoxError>,
    {
        let mut producer = Some(producer);
        self.fetch(key, parameters, conditions, &mut || match producer.take() {
            Some(produce) => produce().map_err(Into::into),
            None => Err("producer already consumed".into()),
        })
    }
}

impl<S: Store + ?Sized> StoreExt for S {}
