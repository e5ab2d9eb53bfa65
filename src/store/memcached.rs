use crate::config::MemcachedConfig;
use crate::error::{BackendError, StoreError};
use crate::store::fundamental::{Backend, FundamentalStore};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Longest key memcached accepts, in bytes.
const MAX_KEY_LENGTH: usize = 250;

/// Expirations past this many seconds are read by memcached as absolute unix times.
const RELATIVE_EXPIRY_LIMIT: u64 = 60 * 60 * 24 * 30;

/// Backend talking to one or several memcached servers.
///
/// Clones share the client's connection pools, so concurrent use is left to the client.
#[derive(Clone)]
pub struct MemcachedBackend {
    servers: Vec<String>,
    client: memcache::Client,
}

pub type MemcachedStore = FundamentalStore<MemcachedBackend>;

impl MemcachedBackend {
    /// Connects to every configured server.
    ///
    /// # Errors
    ///
    /// [`StoreError::Misconfigured`] when no server is configured,
    /// [`StoreError::BackendUnavailable`] when the client cannot connect.
    pub fn connect(config: &MemcachedConfig) -> Result<Self, StoreError> {
        if config.servers.is_empty() {
            return Err(StoreError::misconfigured("memcached needs at least one server"));
        }
        if let Some(timeout) = config.timeout_secs {
            if !(timeout.is_finite() && timeout > 0.0) {
                return Err(StoreError::misconfigured(format!(
                    "memcached timeout must be a positive number of seconds, got {timeout}"
                )));
            }
        }

        let urls: Vec<String> = config
            .servers
            .iter()
            .map(|server| server_url(server, config))
            .collect();
        let client = memcache::Client::connect(urls).map_err(BackendError::from)?;
        tracing::debug!(servers = ?config.servers, "connected to memcached");

        Ok(MemcachedBackend {
            servers: config.servers.clone(),
            client,
        })
    }

    pub fn servers(&self) -> &[String] {
        &self.servers
    }
}

impl MemcachedStore {
    /// # Errors
    ///
    /// See [`MemcachedBackend::connect`] and [`FundamentalStore::with_namespace`].
    pub fn from_config(config: &MemcachedConfig) -> Result<Self, StoreError> {
        let store = FundamentalStore::new(MemcachedBackend::connect(config)?);
        match &config.namespace {
            Some(namespace) => store.with_namespace(namespace.clone()),
            None => Ok(store),
        }
    }
}

fn server_url(server: &str, config: &MemcachedConfig) -> String {
    let mut url = if server.contains("://") {
        server.to_owned()
    } else {
        format!("memcache://{server}")
    };

    let mut options = Vec::new();
    if config.tcp_nodelay {
        options.push("tcp_nodelay=true".to_owned());
    }
    if let Some(timeout) = config.timeout_secs {
        options.push(format!("timeout={timeout}"));
    }
    if !options.is_empty() {
        url.push(if url.contains('?') { '&' } else { '?' });
        url.push_str(&options.join("&"));
    }
    url
}

/// Memcached reads expirations longer than thirty days as unix timestamps.
fn expiration(expire_in: Option<Duration>) -> u32 {
    let Some(ttl) = expire_in else {
        return 0;
    };

    let seconds = ttl.as_secs().max(1);
    let seconds = if seconds > RELATIVE_EXPIRY_LIMIT {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |now| now.as_secs())
            .saturating_add(seconds)
    } else {
        seconds
    };
    u32::try_from(seconds).unwrap_or(u32::MAX)
}

impl fmt::Debug for MemcachedBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemcachedBackend")
            .field("servers", &self.servers)
            .finish_non_exhaustive()
    }
}

impl Backend for MemcachedBackend {
    fn name(&self) -> &'static str {
        "memcached"
    }

    fn get(&self, address: &str) -> Result<Option<Vec<u8>>, BackendError> {
        Ok(self.client.get::<Vec<u8>>(address)?)
    }

    fn set(
        &self,
        address: &str,
        data: &[u8],
        expire_in: Option<Duration>,
    ) -> Result<(), BackendError> {
        if expire_in == Some(Duration::ZERO) {
            // Already expired: make sure no older value survives.
            self.client.delete(address)?;
            return Ok(());
        }

        Ok(self.client.set(address, data, expiration(expire_in))?)
    }

    fn delete(&self, address: &str) -> Result<bool, BackendError> {
        Ok(self.client.delete(address)?)
    }

    fn flush(&self) -> Result<(), BackendError> {
        Ok(self.client.flush()?)
    }

    /// Keys are at most 250 bytes with no whitespace or control characters.
    fn accepts(&self, address: &str) -> bool {
        !address.is_empty()
            && address.len() <= MAX_KEY_LENGTH
            && !address.chars().any(|c| c.is_whitespace() || c.is_control())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn config() -> MemcachedConfig {
        MemcachedConfig {
            namespace: None,
            servers: vec!["127.0.0.1:11211".into()],
            tcp_nodelay: true,
            timeout_secs: Some(2.5),
        }
    }

    #[test]
    fn server_urls_carry_connection_flags() {
        assert_eq!(
            server_url("127.0.0.1:11211", &config()),
            "memcache://127.0.0.1:11211?tcp_nodelay=true&timeout=2.5"
        );
        assert_eq!(
            server_url("memcache://cache:11211?protocol=ascii", &config()),
            "memcache://cache:11211?protocol=ascii&tcp_nodelay=true&timeout=2.5"
        );
    }

    #[rstest]
    #[case::negative(-1.0)]
    #[case::zero(0.0)]
    #[case::not_a_number(f64::NAN)]
    #[case::infinite(f64::INFINITY)]
    fn unusable_timeouts_are_misconfigured(#[case] timeout: f64) {
        let config = MemcachedConfig {
            timeout_secs: Some(timeout),
            ..config()
        };

        assert!(matches!(
            MemcachedBackend::connect(&config),
            Err(StoreError::Misconfigured(_))
        ));
    }

    #[test]
    fn long_expirations_become_timestamps() {
        assert_eq!(expiration(None), 0);
        assert_eq!(expiration(Some(Duration::from_secs(60))), 60);
        let distant = expiration(Some(Duration::from_secs(RELATIVE_EXPIRY_LIMIT + 1)));
        assert!(u64::from(distant) > RELATIVE_EXPIRY_LIMIT * 2);
    }

    #[test]
    fn no_servers_is_misconfigured() {
        let config = MemcachedConfig {
            servers: Vec::new(),
            ..config()
        };

        assert!(matches!(MemcachedBackend::connect(&config), Err(StoreError::Misconfigured(_))));
    }
}
