use crate::codec::{Codec, JsonCodec};
use crate::error::{BoxError, StoreError};
use crate::key::{Conditions, Parameters};
use crate::store::Store;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Serde-typed view over a byte-oriented [`Store`].
///
/// Stored bytes that do not decode as the requested type are treated as a miss.
pub struct TypedStore<C: Codec = JsonCodec> {
    store: Arc<dyn Store>,
    codec: PhantomData<fn() -> C>,
}

impl<C: Codec> TypedStore<C> {
    pub fn new(store: Arc<dyn Store>) -> Self {
        TypedStore {
            store,
            codec: PhantomData,
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn read<T: DeserializeOwned>(&self, key: &str, parameters: &Parameters) -> Option<T> {
        let data = self.store.read(key, parameters)?;
        match C::decode(&data) {
            Ok(value) => Some(value),
            Err(error) => {
                tracing::warn!(
                    store = self.store.name(),
                    key,
                    %error,
                    "cached value does not decode"
                );
                None
            }
        }
    }

    /// # Errors
    ///
    /// [`StoreError::Codec`] when `value` cannot be encoded.
    pub fn write<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        parameters: &Parameters,
        conditions: &Conditions,
    ) -> Result<bool, StoreError> {
        let data = C::encode(value)?;
        Ok(self.store.write(key, &data, parameters, conditions))
    }

    /// # Errors
    ///
    /// [`StoreError::Codec`] when `value` cannot be encoded.
    pub fn write_all<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        parameters: &Parameters,
        conditions: &Conditions,
    ) -> Result<bool, StoreError> {
        let data = C::encode(value)?;
        Ok(self.store.write_all(key, &data, parameters, conditions))
    }

    /// Typed [`Store::fetch`]. A freshly produced value is handed back as is, without a decode
    /// round trip.
    ///
    /// # Errors
    ///
    /// [`StoreError::Producer`] when the producer fails or its value cannot be encoded.
    pub fn fetch<T, F, E>(
        &self,
        key: &str,
        parameters: &Parameters,
        conditions: &Conditions,
        producer: F,
    ) -> Result<T, StoreError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T, E>,
        E: Into<BoxError>,
    {
        let mut producer = Some(producer);
        let mut produced = None;

        let data = self.store.fetch(key, parameters, conditions, &mut || {
            let produce = producer.take().ok_or("producer already consumed")?;
            let value = produce().map_err(Into::<BoxError>::into)?;
            let data = C::encode(&value)?;
            produced = Some(value);
            Ok(data)
        })?;

        match produced {
            Some(value) => Ok(value),
            None => match C::decode(&data) {
                Ok(value) => Ok(value),
                Err(error) => {
                    tracing::warn!(
                        store = self.store.name(),
                        key,
                        %error,
                        "cached value does not decode, producing"
                    );
                    let produce = producer
                        .take()
                        .ok_or_else(|| StoreError::Producer("producer already consumed".into()))?;
                    let value = produce().map_err(|error| StoreError::Producer(error.into()))?;
                    self.write(key, &value, parameters, conditions)?;
                    Ok(value)
                }
            },
        }
    }

    pub fn exists(&self, key: &str, parameters: &Parameters) -> bool {
        self.store.exists(key, parameters)
    }

    pub fn delete(&self, key: &str, parameters: &Parameters) -> bool {
        self.store.delete(key, parameters)
    }
}

impl<C: Codec> Clone for TypedStore<C> {
    fn clone(&self) -> Self {
        TypedStore::new(Arc::clone(&self.store))
    }
}

impl<C: Codec> fmt::Debug for TypedStore<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedStore").field("store", &self.store).finish()
    }
}
