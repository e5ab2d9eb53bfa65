use crate::codec::{BincodeCodec, Codec, JsonCodec};
use crate::error::BackendError;
use crate::store::fundamental::{Backend, FundamentalStore};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Backend keeping one file per entry in a cache directory.
///
/// File names are random and carry no meaning; an in-memory index maps addresses to files.
/// Each file holds a [`Record`] encoded with `C`, which is what lets a persistent directory
/// rebuild its index on open.
///
/// Before using the persistent mode, strongly consider the volatile one. Do you really need
/// this cache to rehydrate without hitting the source of record? You are sacrificing reboot to
/// clear corruption and now must consider N vs N+1 schema issues when downgrading or upgrading
/// your application.
pub struct DiscreteFileBackend<C: Codec = BincodeCodec> {
    cache_directory: PathBuf,
    index: Arc<RwLock<HashMap<String, PathBuf>>>,
    codec: PhantomData<fn() -> C>,
}

pub type DiscreteFileStore<C = BincodeCodec> = FundamentalStore<DiscreteFileBackend<C>>;
pub type DiscreteFileBackendJson = DiscreteFileBackend<JsonCodec>;

#[derive(Serialize, Deserialize)]
struct Record {
    key: String,
    /// Unix seconds.
    expires_at: Option<u64>,
    data: Vec<u8>,
}

impl Record {
    fn is_expired(&self, now: u64) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }
}

impl<C: Codec> DiscreteFileBackend<C> {
    /// Opens `cache_directory`, wiping whatever a previous process left behind.
    ///
    /// # Errors
    ///
    /// I/O errors while clearing or creating the directory.
    pub fn open_volatile(cache_directory: impl Into<PathBuf>) -> Result<Self, BackendError> {
        let backend = Self::unindexed(cache_directory.into());
        clear_directory(&backend.cache_directory)?;
        Ok(backend)
    }

    /// Opens `cache_directory` and indexes the live records already in it. Expired records are
    /// removed and files that do not decode are skipped.
    ///
    /// # Errors
    ///
    /// I/O errors while creating or listing the directory.
    pub fn open_persistent(cache_directory: impl Into<PathBuf>) -> Result<Self, BackendError> {
        let backend = Self::unindexed(cache_directory.into());
        fs::create_dir_all(&backend.cache_directory)?;
        backend.rehydrate_index()?;
        Ok(backend)
    }

    pub fn cache_directory(&self) -> &Path {
        &self.cache_directory
    }

    /// Number of indexed entries, expired ones included until they are touched.
    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn unindexed(cache_directory: PathBuf) -> Self {
        DiscreteFileBackend {
            cache_directory,
            index: Arc::default(),
            codec: PhantomData,
        }
    }

    fn rehydrate_index(&self) -> Result<(), BackendError> {
        let now = unix_now();
        let mut index = self.index.write();

        let paths = fs::read_dir(&self.cache_directory)?
            .flatten()
            .map(|entry| entry.path());

        for path in paths {
            // Leftover of a write interrupted before its rename.
            if is_staging(&path) {
                remove_stale(&path);
                continue;
            }

            match read_record::<C>(&path) {
                Ok(Some(record)) if record.is_expired(now) => remove_stale(&path),
                Ok(Some(record)) => {
                    index.insert(record.key, path);
                }
                Ok(None) => {}
                Err(error) => {
                    tracing::warn!(
                        path = %path.display(),
                        %error,
                        "skipping unreadable cache file"
                    );
                }
            }
        }

        tracing::debug!(
            directory = %self.cache_directory.display(),
            entries = index.len(),
            "rehydrated file cache index"
        );
        Ok(())
    }
}

impl<C: Codec> Clone for DiscreteFileBackend<C> {
    fn clone(&self) -> Self {
        DiscreteFileBackend {
            cache_directory: self.cache_directory.clone(),
            index: Arc::clone(&self.index),
            codec: PhantomData,
        }
    }
}

impl<C: Codec> fmt::Debug for DiscreteFileBackend<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscreteFileBackend")
            .field("cache_directory", &self.cache_directory)
            .field("entries", &self.index.read().len())
            .finish()
    }
}

impl<C: Codec> Backend for DiscreteFileBackend<C> {
    fn name(&self) -> &'static str {
        "discrete_files"
    }

    fn get(&self, address: &str) -> Result<Option<Vec<u8>>, BackendError> {
        let record = {
            let index = self.index.read();
            let Some(path) = index.get(address) else {
                return Ok(None);
            };
            read_record::<C>(path)?
        };

        match record {
            Some(record) if !record.is_expired(unix_now()) => Ok(Some(record.data)),
            // Expired, or the file vanished underneath us.
            _ => {
                self.delete(address)?;
                Ok(None)
            }
        }
    }

    /// The record is written to a staging file and renamed over the entry's file, so a failed
    /// write leaves neither a truncated record nor an index entry behind.
    fn set(
        &self,
        address: &str,
        data: &[u8],
        expire_in: Option<Duration>,
    ) -> Result<(), BackendError> {
        let record = Record {
            key: address.to_owned(),
            expires_at: expire_in.map(|ttl| unix_now().saturating_add(ttl.as_secs())),
            data: data.to_vec(),
        };

        let mut index = self.index.write();
        let path = match index.get(address) {
            Some(path) => path.clone(),
            None => self.cache_directory.join(file_name()),
        };
        let staging = self
            .cache_directory
            .join(format!("{}.{STAGING_EXTENSION}", file_name()));

        let written = write_record::<C>(&staging, &record)
            .and_then(|()| fs::rename(&staging, &path).map_err(BackendError::from));
        if let Err(error) = written {
            remove_stale(&staging);
            return Err(error);
        }

        index.insert(address.to_owned(), path);
        Ok(())
    }

    fn delete(&self, address: &str) -> Result<bool, BackendError> {
        let Some(path) = self.index.write().remove(address) else {
            return Ok(false);
        };

        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(error) => Err(error.into()),
        }
    }

    fn flush(&self) -> Result<(), BackendError> {
        let mut index = self.index.write();
        clear_directory(&self.cache_directory)?;
        index.clear();
        Ok(())
    }
}

const STAGING_EXTENSION: &str = "partial";

fn file_name() -> String {
    Uuid::new_v4().hyphenated().to_string()
}

fn is_staging(path: &Path) -> bool {
    path.extension()
        .is_some_and(|extension| extension == STAGING_EXTENSION)
}

fn write_record<C: Codec>(path: &Path, record: &Record) -> Result<(), BackendError> {
    let mut writer = BufWriter::new(File::create(path)?);
    C::encode_into(&mut writer, record)?;
    writer.flush()?;
    Ok(())
}

/// Best effort removal of a file the index no longer points to.
fn remove_stale(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(error) if error.kind() == io::ErrorKind::NotFound => {}
        Err(error) => {
            tracing::debug!(path = %path.display(), %error, "cannot remove stale cache file");
        }
    }
}

/// `Ok(None)` when the file does not exist.
fn read_record<C: Codec>(path: &Path) -> Result<Option<Record>, BackendError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(error) => return Err(error.into()),
    };

    Ok(Some(C::decode_from(BufReader::new(file))?))
}

fn clear_directory(directory: &Path) -> Result<(), BackendError> {
    match fs::remove_dir_all(directory) {
        Ok(()) => {}
        Err(error) if error.kind() == io::ErrorKind::NotFound => {}
        Err(error) => return Err(error.into()),
    }
    fs::create_dir_all(directory)?;
    Ok(())
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}
