use thiserror::Error;

/// Boxed error returned by `fetch` producers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced across the store contract.
///
/// Ordinary misses and deletes of absent entries are not errors. Backend failures during an
/// operation are recovered locally as `false`/`None`; they only show up here when a store is
/// being constructed.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// The operation is intentionally unsupported by this kind of store.
    #[error("{store} store does not implement {operation}")]
    NotImplemented {
        store: &'static str,
        operation: &'static str,
    },

    /// The backend could not be reached while building the store.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(#[from] BackendError),

    /// Invalid construction parameters or store descriptors.
    #[error("misconfigured store: {0}")]
    Misconfigured(String),

    /// The producer passed to `fetch` failed; nothing was cached.
    #[error("fetch producer failed: {0}")]
    Producer(#[source] BoxError),

    /// A typed value could not be encoded.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl StoreError {
    pub(crate) fn not_implemented(store: &'static str, operation: &'static str) -> Self {
        StoreError::NotImplemented { store, operation }
    }

    pub(crate) fn misconfigured(message: impl Into<String>) -> Self {
        StoreError::Misconfigured(message.into())
    }
}

/// Errors raised by a backend connection. Never propagated out of a contract operation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BackendError {
    #[error("backend unreachable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The backend refused the entry (size or key constraints).
    #[error("entry rejected: {0}")]
    Rejected(String),

    #[error("corrupt entry: {0}")]
    Corrupt(String),
}

#[cfg(feature = "memcached")]
impl From<memcache::MemcacheError> for BackendError {
    fn from(error: memcache::MemcacheError) -> Self {
        BackendError::Unavailable(error.to_string())
    }
}

/// Serialization failures of the typed facade and of record encoding.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CodecError {
    #[error("json codec: {0}")]
    Json(#[from] serde_json::Error),

    #[error("bincode codec: {0}")]
    Bincode(#[from] bincode::Error),
}

/// Failures of a transform strategy turning payloads into their stored form and back.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransformError {
    #[error("compression: {0}")]
    Compression(#[from] std::io::Error),

    #[error("cipher operation failed")]
    Cipher,

    #[error("randomness unavailable: {0}")]
    Randomness(String),

    #[error("stored payload is truncated")]
    Truncated,
}

impl From<CodecError> for BackendError {
    fn from(error: CodecError) -> Self {
        BackendError::Corrupt(error.to_string())
    }
}
