//! Declarative store configuration.
//!
//! A [`CacheConfig`] lists named stores in declaration order. Strategy stores name their nested
//! stores either by reference to a store declared earlier or inline:
//!
//! ```json
//! { "stores": [
//!   { "name": "local",  "type": "memory", "namespace": "app" },
//!   { "name": "pages",  "type": "file", "directory": "/tmp/pages" },
//!   { "name": "main",   "type": "fan_out", "stores": ["local", "pages"] },
//!   { "name": "packed", "type": "compress", "stores": [{ "type": "memory" }] }
//! ] }
//! ```

use crate::codec::BincodeCodec;
use crate::error::StoreError;
use crate::registry::Registry;
use crate::store::discrete_files::DiscreteFileBackend;
use crate::store::fundamental::{Backend, FundamentalStore};
use crate::store::memory::MemoryBackend;
use crate::store::strategy::fan_out::FanOutStore;
use crate::store::strategy::transform::{Compress, Digest, Encrypt, TransformStore};
use crate::store::Store;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Every store a process uses, built in declaration order by [`Registry::from_config`].
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    #[serde(default)]
    pub stores: Vec<NamedStoreConfig>,
}

impl CacheConfig {
    /// # Errors
    ///
    /// [`StoreError::Misconfigured`] when the document is not a valid configuration.
    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        serde_json::from_str(json).map_err(|error| {
            StoreError::misconfigured(format!("invalid cache configuration: {error}"))
        })
    }

    /// # Errors
    ///
    /// [`StoreError::Misconfigured`] when the file cannot be read or parsed.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|error| {
            StoreError::misconfigured(format!("cannot read {}: {error}", path.display()))
        })?;
        Self::from_json(&json)
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct NamedStoreConfig {
    pub name: String,
    #[serde(flatten)]
    pub store: StoreConfig,
}

/// A store type plus its options.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    Memory {
        #[serde(default)]
        namespace: Option<String>,
        #[serde(default)]
        max_value_size: Option<usize>,
    },
    Memcached(MemcachedConfig),
    File {
        directory: PathBuf,
        #[serde(default)]
        namespace: Option<String>,
        #[serde(default = "volatile_by_default")]
        volatile: bool,
    },
    FanOut {
        stores: Vec<StoreDescriptor>,
    },
    Compress {
        #[serde(default)]
        level: Option<i32>,
        stores: Vec<StoreDescriptor>,
    },
    Digest {
        stores: Vec<StoreDescriptor>,
    },
    Encrypt {
        /// 64 hex digits.
        key: String,
        stores: Vec<StoreDescriptor>,
    },
}

fn volatile_by_default() -> bool {
    true
}

/// Where a strategy store gets one of its nested stores from.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum StoreDescriptor {
    /// A store registered under this name, cloned into the strategy.
    Named(String),
    /// A fresh store built from this configuration.
    Inline(Box<StoreConfig>),
}

impl From<&str> for StoreDescriptor {
    fn from(name: &str) -> Self {
        StoreDescriptor::Named(name.to_owned())
    }
}

impl From<StoreConfig> for StoreDescriptor {
    fn from(config: StoreConfig) -> Self {
        StoreDescriptor::Inline(Box::new(config))
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct MemcachedConfig {
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default = "default_servers")]
    pub servers: Vec<String>,
    #[serde(default)]
    pub tcp_nodelay: bool,
    #[serde(default)]
    pub timeout_secs: Option<f64>,
}

impl Default for MemcachedConfig {
    fn default() -> Self {
        MemcachedConfig {
            namespace: None,
            servers: default_servers(),
            tcp_nodelay: false,
            timeout_secs: None,
        }
    }
}

fn default_servers() -> Vec<String> {
    vec!["127.0.0.1:11211".to_owned()]
}

impl StoreConfig {
    /// Instantiates the store, resolving named nested stores through `registry`.
    ///
    /// # Errors
    ///
    /// [`StoreError::Misconfigured`] for invalid options or unresolvable descriptors,
    /// [`StoreError::BackendUnavailable`] when a backend cannot be opened.
    pub fn build(&self, registry: &Registry) -> Result<Box<dyn Store>, StoreError> {
        Ok(match self {
            StoreConfig::Memory {
                namespace,
                max_value_size,
            } => {
                let backend = match max_value_size {
                    Some(limit) => MemoryBackend::new().with_max_value_size(*limit),
                    None => MemoryBackend::new(),
                };
                Box::new(namespaced(backend, namespace.as_deref())?)
            }
            StoreConfig::Memcached(config) => build_memcached(config)?,
            StoreConfig::File {
                directory,
                namespace,
                volatile,
            } => {
                let backend = if *volatile {
                    DiscreteFileBackend::<BincodeCodec>::open_volatile(directory)?
                } else {
                    DiscreteFileBackend::<BincodeCodec>::open_persistent(directory)?
                };
                Box::new(namespaced(backend, namespace.as_deref())?)
            }
            StoreConfig::FanOut { stores } => {
                Box::new(FanOutStore::from_descriptors(stores, registry)?)
            }
            StoreConfig::Compress { level, stores } => {
                let compress = level.map_or_else(Compress::default, Compress::new);
                Box::new(TransformStore::from_descriptors(compress, stores, registry)?)
            }
            StoreConfig::Digest { stores } => {
                Box::new(TransformStore::from_descriptors(Digest, stores, registry)?)
            }
            StoreConfig::Encrypt { key, stores } => Box::new(TransformStore::from_descriptors(
                Encrypt::from_hex(key)?,
                stores,
                registry,
            )?),
        })
    }
}

fn namespaced<B: Backend>(
    backend: B,
    namespace: Option<&str>,
) -> Result<FundamentalStore<B>, StoreError> {
    let store = FundamentalStore::new(backend);
    match namespace {
        Some(namespace) => store.with_namespace(namespace),
        None => Ok(store),
    }
}

#[cfg(feature = "memcached")]
fn build_memcached(config: &MemcachedConfig) -> Result<Box<dyn Store>, StoreError> {
    Ok(Box::new(crate::store::memcached::MemcachedStore::from_config(config)?))
}

#[cfg(not(feature = "memcached"))]
fn build_memcached(_config: &MemcachedConfig) -> Result<Box<dyn Store>, StoreError> {
    Err(StoreError::misconfigured(
        "memcached stores need the `memcached` feature",
    ))
}
