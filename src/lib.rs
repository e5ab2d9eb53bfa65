//! Composable cache stores.
//!
//! Every store speaks the same [`Store`] contract. *Fundamental* stores perform the actual I/O
//! against a [`Backend`] (an in-process map, a directory of files, memcached servers).
//! *Strategy* stores wrap other stores: [`FanOutStore`] aggregates several under one logical
//! store, [`TransformStore`] compresses, encrypts or hashes what passes through. Strategies nest,
//! so a compressing store around an encrypting store around a fan-out over two backends is one
//! value implementing [`Store`].
//!
//! ```
//! use cache_stacks::{
//!     Conditions, FanOutStore, MemoryStore, NestedStores, Parameters, Store, StoreExt,
//! };
//!
//! let local = MemoryStore::in_memory();
//! let remote = MemoryStore::in_memory();
//! let cache = FanOutStore::new(
//!     NestedStores::new(vec![Box::new(local) as Box<dyn Store>, Box::new(remote)]).unwrap(),
//! );
//!
//! let page = cache
//!     .fetch_with("users", &Parameters::new().with("page", "2"), &Conditions::default(), || {
//!         Ok::<_, std::io::Error>(b"<ul>...</ul>".to_vec())
//!     })
//!     .unwrap();
//!
//! assert_eq!(page, b"<ul>...</ul>");
//! assert!(cache.exists("users", &Parameters::new().with("page", "2")));
//! ```
//!
//! Stores are configured once at startup, usually from a [`CacheConfig`] through a
//! [`Registry`], and then shared across threads.

mod codec;
mod config;
mod error;
mod key;
mod registry;
pub mod store;
mod typed;

pub use codec::{BincodeCodec, Codec, JsonCodec};
pub use config::{CacheConfig, MemcachedConfig, NamedStoreConfig, StoreConfig, StoreDescriptor};
pub use error::{BackendError, BoxError, CodecError, StoreError, TransformError};
pub use key::{normalize, Conditions, Parameters};
pub use registry::Registry;
pub use store::discrete_files::{DiscreteFileBackend, DiscreteFileBackendJson, DiscreteFileStore};
pub use store::fundamental::{Backend, FundamentalStore};
#[cfg(feature = "memcached")]
pub use store::memcached::{MemcachedBackend, MemcachedStore};
pub use store::memory::{MemoryBackend, MemoryStore};
pub use store::strategy::fan_out::FanOutStore;
pub use store::strategy::transform::{
    Compress, CompressStore, Digest, DigestStore, Encrypt, EncryptStore, Transform, TransformStore,
};
pub use store::strategy::{NestedStores, StrategyStore};
pub use store::{Producer, Store, StoreExt};
pub use typed::TypedStore;
