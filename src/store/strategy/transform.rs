//! Strategy stores that rewrite addresses or payloads on their way to the nested stores.
//!
//! For example, to save memory on a memcached server wrap the memcached store in a
//! [`Compress`] store. Keys built from sensitive information can be hidden by wrapping that in
//! turn with a [`Digest`] store.

use crate::config::StoreDescriptor;
use crate::error::{StoreError, TransformError};
use crate::key::{normalize, Conditions, Parameters};
use crate::registry::Registry;
use crate::store::strategy::{NestedStores, StrategyStore};
use crate::store::Store;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use sha2::{Digest as _, Sha256};
use std::borrow::Cow;
use std::fmt::{self, Debug};

const NONCE_LENGTH: usize = 12;

/// The per-kind behaviour injected into a [`TransformStore`]. Every hook defaults to identity.
pub trait Transform: Debug + Clone + Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Address under which the nested stores see the entry.
    fn address<'a>(
        &self,
        key: &'a str,
        parameters: &'a Parameters,
    ) -> (Cow<'a, str>, Cow<'a, Parameters>) {
        (Cow::Borrowed(key), Cow::Borrowed(parameters))
    }

    /// Stored form of a payload.
    fn encode(&self, data: &[u8]) -> Result<Vec<u8>, TransformError> {
        Ok(data.to_vec())
    }

    /// Inverse of [`Transform::encode`].
    fn decode(&self, data: Vec<u8>) -> Result<Vec<u8>, TransformError> {
        Ok(data)
    }
}

/// Strategy store applying a [`Transform`] around first-success delegation to its nested stores.
#[derive(Clone, Debug)]
pub struct TransformStore<T: Transform> {
    transform: T,
    stores: NestedStores,
}

pub type CompressStore = TransformStore<Compress>;
pub type DigestStore = TransformStore<Digest>;
pub type EncryptStore = TransformStore<Encrypt>;

impl<T: Transform> TransformStore<T> {
    pub fn new(transform: T, stores: NestedStores) -> Self {
        TransformStore { transform, stores }
    }

    /// # Errors
    ///
    /// [`StoreError::Misconfigured`] when a descriptor cannot be resolved.
    pub fn from_descriptors(
        transform: T,
        descriptors: &[StoreDescriptor],
        registry: &Registry,
    ) -> Result<Self, StoreError> {
        Ok(Self::new(transform, NestedStores::resolve(descriptors, registry)?))
    }

    pub fn transform(&self) -> &T {
        &self.transform
    }

    fn encoded(&self, key: &str, data: &[u8]) -> Option<Vec<u8>> {
        match self.transform.encode(data) {
            Ok(encoded) => Some(encoded),
            Err(error) => {
                tracing::warn!(store = self.transform.name(), key, %error, "cannot encode payload");
                None
            }
        }
    }
}

impl<T: Transform> StrategyStore for TransformStore<T> {
    fn nested(&self) -> &NestedStores {
        &self.stores
    }
}

impl<T: Transform> Store for TransformStore<T> {
    fn name(&self) -> &'static str {
        self.transform.name()
    }

    fn writable(&self, key: &str, parameters: &Parameters, conditions: &Conditions) -> bool {
        let (key, parameters) = self.transform.address(key, parameters);
        self.stores
            .any_first(|store| store.writable(&key, &parameters, conditions))
    }

    /// Payloads that fail to decode count as misses.
    fn read(&self, key: &str, parameters: &Parameters) -> Option<Vec<u8>> {
        let (key, parameters) = self.transform.address(key, parameters);
        self.stores.capture_first(|store| {
            let data = store.read(&key, &parameters)?;
            match self.transform.decode(data) {
                Ok(decoded) => Some(decoded),
                Err(error) => {
                    tracing::warn!(
                        store = self.transform.name(),
                        key = %key,
                        %error,
                        "cannot decode payload"
                    );
                    None
                }
            }
        })
    }

    fn write(
        &self,
        key: &str,
        data: &[u8],
        parameters: &Parameters,
        conditions: &Conditions,
    ) -> bool {
        let Some(encoded) = self.encoded(key, data) else {
            return false;
        };
        let (key, parameters) = self.transform.address(key, parameters);
        self.stores
            .any_first(|store| store.write(&key, &encoded, &parameters, conditions))
    }

    fn write_all(
        &self,
        key: &str,
        data: &[u8],
        parameters: &Parameters,
        conditions: &Conditions,
    ) -> bool {
        let Some(encoded) = self.encoded(key, data) else {
            return false;
        };
        let (key, parameters) = self.transform.address(key, parameters);
        self.stores.write_all(&key, &encoded, &parameters, conditions)
    }

    fn exists(&self, key: &str, parameters: &Parameters) -> bool {
        let (key, parameters) = self.transform.address(key, parameters);
        self.stores.any_first(|store| store.exists(&key, &parameters))
    }

    fn delete(&self, key: &str, parameters: &Parameters) -> bool {
        let (key, parameters) = self.transform.address(key, parameters);
        self.stores.delete(&key, &parameters)
    }

    fn delete_all_unchecked(&self) -> Result<bool, StoreError> {
        self.stores.delete_all_unchecked()
    }

    fn clone_box(&self) -> Box<dyn Store> {
        Box::new(self.clone())
    }
}

/// zstd compression of payloads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Compress {
    level: i32,
}

impl Compress {
    pub fn new(level: i32) -> Self {
        Compress { level }
    }
}

impl Default for Compress {
    fn default() -> Self {
        Compress::new(zstd::DEFAULT_COMPRESSION_LEVEL)
    }
}

impl Transform for Compress {
    fn name(&self) -> &'static str {
        "compress"
    }

    fn encode(&self, data: &[u8]) -> Result<Vec<u8>, TransformError> {
        Ok(zstd::encode_all(data, self.level)?)
    }

    fn decode(&self, data: Vec<u8>) -> Result<Vec<u8>, TransformError> {
        Ok(zstd::decode_all(data.as_slice())?)
    }
}

/// Replaces the address with the SHA-256 digest of the normalized key, so nested stores never
/// see the original key or parameters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Digest;

impl Transform for Digest {
    fn name(&self) -> &'static str {
        "digest"
    }

    fn address<'a>(
        &self,
        key: &'a str,
        parameters: &'a Parameters,
    ) -> (Cow<'a, str>, Cow<'a, Parameters>) {
        let digest = hex::encode(Sha256::digest(normalize(key, parameters).as_bytes()));
        (Cow::Owned(digest), Cow::Owned(Parameters::default()))
    }
}

/// AES-256-GCM encryption of payloads. Each write draws a fresh nonce, stored in front of the
/// ciphertext.
#[derive(Clone)]
pub struct Encrypt {
    cipher: Aes256Gcm,
}

impl Encrypt {
    /// # Errors
    ///
    /// [`StoreError::Misconfigured`] unless `key` is 32 bytes long.
    pub fn new(key: &[u8]) -> Result<Self, StoreError> {
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|_| StoreError::misconfigured("encryption key must be 32 bytes"))?;
        Ok(Encrypt { cipher })
    }

    /// # Errors
    ///
    /// [`StoreError::Misconfigured`] unless `key` is 64 hex digits.
    pub fn from_hex(key: &str) -> Result<Self, StoreError> {
        let key = hex::decode(key).map_err(|error| {
            StoreError::misconfigured(format!("encryption key is not hex: {error}"))
        })?;
        Self::new(&key)
    }
}

impl Debug for Encrypt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Encrypt").finish_non_exhaustive()
    }
}

impl Transform for Encrypt {
    fn name(&self) -> &'static str {
        "encrypt"
    }

    fn encode(&self, data: &[u8]) -> Result<Vec<u8>, TransformError> {
        let mut nonce = [0_u8; NONCE_LENGTH];
        getrandom::getrandom(&mut nonce)
            .map_err(|error| TransformError::Randomness(error.to_string()))?;

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), data)
            .map_err(|_| TransformError::Cipher)?;

        let mut sealed = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    fn decode(&self, data: Vec<u8>) -> Result<Vec<u8>, TransformError> {
        if data.len() < NONCE_LENGTH {
            return Err(TransformError::Truncated);
        }
        let (nonce, ciphertext) = data.split_at(NONCE_LENGTH);

        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| TransformError::Cipher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fundamental::FundamentalStore;
    use crate::store::memory::{MemoryBackend, MemoryStore};
    use crate::store::strategy::fan_out::FanOutStore;
    use crate::store::fundamental::Backend;
    use crate::store::StoreExt;
    use sha2::Digest as _;

    const KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    fn over<T: Transform>(transform: T, backend: &MemoryBackend) -> TransformStore<T> {
        let nested: Box<dyn Store> = Box::new(FundamentalStore::new(backend.clone()));
        TransformStore::new(transform, NestedStores::new(vec![nested]).unwrap())
    }

    #[test]
    fn compressed_payloads_shrink_and_round_trip() {
        let backend = MemoryBackend::new();
        let store = over(Compress::default(), &backend);
        let page = "<li>row</li>".repeat(500);

        assert!(store.put("page", page.as_bytes()));

        let stored = backend.get("page").unwrap().unwrap();
        assert!(stored.len() < page.len() / 10);
        assert_eq!(store.get("page"), Some(page.into_bytes()));
    }

    #[test]
    fn digest_hides_key_and_parameters() {
        let backend = MemoryBackend::new();
        let store = over(Digest, &backend);
        let params = Parameters::new().with("ssn", "123-45-6789");

        assert!(store.write("customer", b"record", &params, &Conditions::default()));

        let expected = hex::encode(Sha256::digest(normalize("customer", &params).as_bytes()));
        assert_eq!(backend.get(&expected).unwrap(), Some(b"record".to_vec()));
        assert_eq!(store.read("customer", &params), Some(b"record".to_vec()));
        assert!(store.exists("customer", &params));
        assert!(store.delete("customer", &params));
        assert!(backend.is_empty());
    }

    #[test]
    fn encrypted_payloads_are_opaque() {
        let backend = MemoryBackend::new();
        let store = over(Encrypt::from_hex(KEY).unwrap(), &backend);

        assert!(store.put("secret", b"launch codes"));

        let stored = backend.get("secret").unwrap().unwrap();
        assert_ne!(stored, b"launch codes");
        assert_eq!(stored.len(), NONCE_LENGTH + b"launch codes".len() + 16);
        assert_eq!(store.get("secret"), Some(b"launch codes".to_vec()));
    }

    #[test]
    fn undecodable_payloads_are_misses() {
        let backend = MemoryBackend::new();
        let store = over(Encrypt::from_hex(KEY).unwrap(), &backend);
        backend.set("short", b"abc", None).unwrap();
        backend.set("forged", &[7; 40], None).unwrap();

        assert_eq!(store.get("short"), None);
        assert_eq!(store.get("forged"), None);
    }

    #[test]
    fn bad_keys_are_misconfigured() {
        assert!(matches!(Encrypt::new(&[0; 16]), Err(StoreError::Misconfigured(_))));
        assert!(matches!(Encrypt::from_hex("zz"), Err(StoreError::Misconfigured(_))));
    }

    #[test]
    fn transforms_stack_around_a_fan_out() {
        let near = MemoryStore::in_memory();
        let far = MemoryStore::in_memory();
        let fan_out: Box<dyn Store> = Box::new(FanOutStore::new(
            NestedStores::new(vec![
                Box::new(near.clone()) as Box<dyn Store>,
                Box::new(far.clone()),
            ])
            .unwrap(),
        ));
        let encrypted: Box<dyn Store> = Box::new(TransformStore::new(
            Encrypt::from_hex(KEY).unwrap(),
            NestedStores::new(vec![fan_out]).unwrap(),
        ));
        let store = TransformStore::new(
            Compress::new(1),
            NestedStores::new(vec![encrypted]).unwrap(),
        );
        let body = "hello ".repeat(100);

        assert!(store.write_all(
            "greeting",
            body.as_bytes(),
            &Parameters::default(),
            &Conditions::default()
        ));

        assert_eq!(store.get("greeting"), Some(body.clone().into_bytes()));
        assert!(near.get("greeting").is_some());
        assert!(far.get("greeting").is_some());
        assert_ne!(far.get("greeting"), Some(body.into_bytes()));
        assert!(matches!(store.delete_all(), Err(StoreError::NotImplemented { .. })));
        assert!(store.delete_all_unchecked().unwrap());
        assert!(near.get("greeting").is_none());
    }

    #[test]
    fn fetch_caches_the_encoded_form() {
        let backend = MemoryBackend::new();
        let store = over(Compress::default(), &backend);

        let value = store
            .fetch_with("k", &Parameters::default(), &Conditions::default(), || {
                Ok::<_, std::io::Error>(b"produced".to_vec())
            })
            .unwrap();

        assert_eq!(value, b"produced");
        assert_ne!(backend.get("k").unwrap(), Some(b"produced".to_vec()));
        assert_eq!(store.get("k"), Some(b"produced".to_vec()));
    }
}
