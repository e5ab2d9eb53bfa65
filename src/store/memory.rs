use crate::error::BackendError;
use crate::store::fundamental::{Backend, FundamentalStore};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct MemoryEntry {
    data: Vec<u8>,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }
}

/// In-process backend, standing in for a cache server.
///
/// Clones share the same map the way several connections share one server. Expired entries
/// are dropped lazily when touched.
#[derive(Clone, Debug, Default)]
pub struct MemoryBackend {
    data: Arc<RwLock<HashMap<String, MemoryEntry>>>,
    max_value_size: Option<usize>,
}

pub type MemoryStore = FundamentalStore<MemoryBackend>;

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuses values larger than `max_value_size` bytes.
    pub fn with_max_value_size(mut self, max_value_size: usize) -> Self {
        self.max_value_size = Some(max_value_size);
        self
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.data
            .read()
            .values()
            .filter(|entry| !entry.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MemoryStore {
    /// Store over a fresh, unshared in-process map.
    pub fn in_memory() -> Self {
        FundamentalStore::new(MemoryBackend::new())
    }
}

impl Backend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn get(&self, address: &str) -> Result<Option<Vec<u8>>, BackendError> {
        let now = Instant::now();
        {
            let data = self.data.read();
            match data.get(address) {
                None => return Ok(None),
                Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.data.clone())),
                Some(_) => {}
            }
        }

        let mut data = self.data.write();
        if data.get(address).is_some_and(|entry| entry.is_expired(now)) {
            data.remove(address);
        }
        Ok(None)
    }

    fn set(
        &self,
        address: &str,
        data: &[u8],
        expire_in: Option<Duration>,
    ) -> Result<(), BackendError> {
        if let Some(limit) = self.max_value_size {
            if data.len() > limit {
                return Err(BackendError::Rejected(format!(
                    "{} bytes exceeds the {limit} byte limit",
                    data.len()
                )));
            }
        }

        let entry = MemoryEntry {
            data: data.to_vec(),
            // A lifetime past what `Instant` can represent never expires.
            expires_at: expire_in.and_then(|ttl| Instant::now().checked_add(ttl)),
        };
        self.data.write().insert(address.to_owned(), entry);
        Ok(())
    }

    fn delete(&self, address: &str) -> Result<bool, BackendError> {
        let now = Instant::now();
        Ok(self
            .data
            .write()
            .remove(address)
            .is_some_and(|entry| !entry.is_expired(now)))
    }

    fn contains(&self, address: &str) -> Result<bool, BackendError> {
        let now = Instant::now();
        Ok(self
            .data
            .read()
            .get(address)
            .is_some_and(|entry| !entry.is_expired(now)))
    }

    fn flush(&self) -> Result<(), BackendError> {
        self.data.write().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{Conditions, Parameters};
    use crate::store::{Store, StoreExt};
    use std::thread;

    #[test]
    fn clones_share_entries() {
        let backend = MemoryBackend::new();
        let twin = backend.clone();

        backend.set("a", b"1", None).unwrap();

        assert_eq!(twin.get("a").unwrap(), Some(b"1".to_vec()));
        assert!(twin.delete("a").unwrap());
        assert!(backend.is_empty());
    }

    #[test]
    fn oversized_values_are_rejected() {
        let store = FundamentalStore::new(MemoryBackend::new().with_max_value_size(4));

        assert!(store.put("small", b"1234"));
        assert!(!store.put("large", b"12345"));
        assert_eq!(store.get("large"), None);
    }

    #[test]
    fn expired_entries_are_pruned_on_read() {
        let backend = MemoryBackend::new();
        backend.set("gone", b"x", Some(Duration::ZERO)).unwrap();
        backend.set("kept", b"y", Some(Duration::from_secs(60))).unwrap();

        assert_eq!(backend.get("gone").unwrap(), None);
        assert!(!backend.contains("gone").unwrap());
        assert!(!backend.delete("gone").unwrap());
        assert_eq!(backend.len(), 1);
    }

    #[test]
    fn unrepresentable_lifetimes_never_expire() {
        let store = MemoryStore::in_memory();
        let forever = Conditions::expire_in(Duration::from_secs(u64::MAX));

        assert!(store.write("k", b"v", &Parameters::default(), &forever));

        assert_eq!(store.get("k"), Some(b"v".to_vec()));
        assert!(store.exists("k", &Parameters::default()));
    }

    #[test]
    fn concurrent_writers_and_readers() {
        let store = MemoryStore::in_memory();

        thread::scope(|scope| {
            for worker in 0..8 {
                let store = &store;
                scope.spawn(move || {
                    for item in 0..100 {
                        let key = format!("{worker}:{item}");
                        assert!(store.put(&key, key.as_bytes()));
                        assert_eq!(store.get(&key), Some(key.clone().into_bytes()));
                    }
                });
            }
        });

        assert_eq!(store.backend().len(), 800);
        assert!(store.exists("7:99", &Parameters::default()));
    }
}
