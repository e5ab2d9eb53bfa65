//! Entry addressing: parameters, write conditions and key normalization.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::time::Duration;

/// Auxiliary discriminators that, together with the key, address an entry.
///
/// Backed by a sorted map so two parameter sets with the same pairs serialize identically no
/// matter the order they were inserted in.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Parameters(BTreeMap<String, String>);

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// SHA-256 hex digest of the canonical JSON form of the parameters.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for (index, (name, value)) in self.0.iter().enumerate() {
            if index > 0 {
                hasher.update(b",");
            }
            // Quoting each string keeps `{"a,b": ""}` and `{"a": "", "b": ""}` apart.
            hasher.update(quoted(name).as_bytes());
            hasher.update(b":");
            hasher.update(quoted(value).as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

fn quoted(text: &str) -> String {
    serde_json::Value::String(text.to_owned()).to_string()
}

impl<K, V> FromIterator<(K, V)> for Parameters
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Parameters(
            iter.into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        )
    }
}

/// Per-write directives. They shape how an entry is stored but never where.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conditions {
    /// Time to live of the written entry. `None` means the backend default (no expiry).
    #[serde(default, with = "optional_seconds")]
    pub expire_in: Option<Duration>,
}

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expire_in(expire_in: Duration) -> Self {
        Conditions {
            expire_in: Some(expire_in),
        }
    }
}

/// Storage address for `key` under `parameters`.
///
/// An empty parameter set leaves the key untouched; otherwise the parameter digest is appended
/// as `"{key}--{digest}"`.
pub fn normalize(key: &str, parameters: &Parameters) -> String {
    if parameters.is_empty() {
        key.to_owned()
    } else {
        format!("{key}--{}", parameters.digest())
    }
}

mod optional_seconds {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&duration.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_secs))
    }
}
