//! LMDB-backed persistent store.
//!
//! Uses the heed crate (Rust bindings for LMDB) to keep entries durable
//! across process restarts. One unnamed database holds `key -> JSON text`.
//!
//! # Quota
//!
//! The LMDB map size is the store's quota. A write that does not fit fails
//! with `MDB_MAP_FULL`, which is reported as `StoreError::QuotaExceeded`;
//! the aborted transaction leaves the previous value in place.
//!
//! # Keys
//!
//! LMDB rejects empty keys and keys longer than 511 bytes. Such keys are
//! reported as `StoreError::InvalidKey` before a transaction is opened.

use std::path::{Path, PathBuf};

use heed::types::Str;
use heed::{Database, Env, EnvOpenOptions, MdbError};
use superstore_core::{StoreError, StoreResult};

use crate::traits::PersistentStore;

/// Largest key LMDB accepts with its default build options.
const MAX_KEY_BYTES: usize = 511;

const STORE_NAME: &str = "lmdb";

/// Durable store on an LMDB environment.
pub struct LmdbStore {
    env: Env,
    db: Database<Str, Str>,
    path: PathBuf,
    map_size: usize,
}

impl LmdbStore {
    /// Open (or create) a store in `path`.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Map size in megabytes; acts as the quota
    pub fn open<P: AsRef<Path>>(path: P, max_size_mb: usize) -> StoreResult<Self> {
        std::fs::create_dir_all(&path).map_err(|e| StoreError::backend(STORE_NAME, e))?;

        let map_size = max_size_mb * 1024 * 1024;
        // The environment is opened once per store and closed through
        // `close`, never opened twice for the same path.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| StoreError::backend(STORE_NAME, e))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| StoreError::backend(STORE_NAME, e))?;
        let db: Database<Str, Str> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| StoreError::backend(STORE_NAME, e))?;
        wtxn.commit()
            .map_err(|e| StoreError::backend(STORE_NAME, e))?;

        tracing::debug!(path = %path.as_ref().display(), max_size_mb, "Opened LMDB store");

        Ok(Self {
            env,
            db,
            path: path.as_ref().to_path_buf(),
            map_size,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Map size in bytes.
    pub fn map_size(&self) -> usize {
        self.map_size
    }

    /// Close the environment so the same path can be reopened.
    pub fn close(self) {
        self.env.prepare_for_closing().wait();
    }

    fn check_key(key: &str) -> StoreResult<()> {
        if key.is_empty() {
            return Err(StoreError::InvalidKey {
                key: key.to_string(),
                reason: "LMDB does not accept empty keys".to_string(),
            });
        }
        if key.len() > MAX_KEY_BYTES {
            return Err(StoreError::InvalidKey {
                key: key.to_string(),
                reason: format!("longer than {} bytes", MAX_KEY_BYTES),
            });
        }
        Ok(())
    }

    /// Map a heed error raised while writing `key`.
    fn write_error(&self, key: &str, value: &str, err: heed::Error) -> StoreError {
        match err {
            heed::Error::Mdb(MdbError::MapFull) => StoreError::QuotaExceeded {
                key: key.to_string(),
                requested: key.len() + value.len(),
                limit: self.map_size,
            },
            other => StoreError::backend(STORE_NAME, other),
        }
    }
}

impl PersistentStore for LmdbStore {
    fn name(&self) -> &str {
        STORE_NAME
    }

    fn read(&self, key: &str) -> StoreResult<Option<String>> {
        if Self::check_key(key).is_err() {
            // Keys LMDB cannot hold are never present.
            return Ok(None);
        }
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| StoreError::backend(STORE_NAME, e))?;
        let value = self
            .db
            .get(&rtxn, key)
            .map_err(|e| StoreError::backend(STORE_NAME, e))?;
        Ok(value.map(str::to_string))
    }

    fn write(&self, key: &str, value: &str) -> StoreResult<()> {
        Self::check_key(key)?;
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| StoreError::backend(STORE_NAME, e))?;
        self.db
            .put(&mut wtxn, key, value)
            .map_err(|e| self.write_error(key, value, e))?;
        wtxn.commit().map_err(|e| self.write_error(key, value, e))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        if Self::check_key(key).is_err() {
            return Ok(());
        }
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| StoreError::backend(STORE_NAME, e))?;
        self.db
            .delete(&mut wtxn, key)
            .map_err(|e| StoreError::backend(STORE_NAME, e))?;
        wtxn.commit()
            .map_err(|e| StoreError::backend(STORE_NAME, e))?;
        Ok(())
    }

    fn len(&self) -> StoreResult<usize> {
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| StoreError::backend(STORE_NAME, e))?;
        let len = self
            .db
            .len(&rtxn)
            .map_err(|e| StoreError::backend(STORE_NAME, e))?;
        Ok(len as usize)
    }

    fn key_at(&self, index: usize) -> StoreResult<Option<String>> {
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| StoreError::backend(STORE_NAME, e))?;
        let mut iter = self
            .db
            .iter(&rtxn)
            .map_err(|e| StoreError::backend(STORE_NAME, e))?;
        match iter.nth(index) {
            Some(Ok((key, _))) => Ok(Some(key.to_string())),
            Some(Err(e)) => Err(StoreError::backend(STORE_NAME, e)),
            None => Ok(None),
        }
    }

    fn clear_all(&self) -> StoreResult<()> {
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| StoreError::backend(STORE_NAME, e))?;
        self.db
            .clear(&mut wtxn)
            .map_err(|e| StoreError::backend(STORE_NAME, e))?;
        wtxn.commit()
            .map_err(|e| StoreError::backend(STORE_NAME, e))?;
        Ok(())
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| StoreError::backend(STORE_NAME, e))?;
        let iter = self
            .db
            .iter(&rtxn)
            .map_err(|e| StoreError::backend(STORE_NAME, e))?;

        let mut keys = Vec::new();
        for result in iter {
            let (key, _) = result.map_err(|e| StoreError::backend(STORE_NAME, e))?;
            keys.push(key.to_string());
        }
        Ok(keys)
    }
}
