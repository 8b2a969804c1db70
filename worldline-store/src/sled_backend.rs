//! sled-backed key-value client.

use std::collections::BTreeSet;
use std::path::Path;

use tracing::info;

use crate::error::{Result, StoreError};
use crate::kv::KvBackend;

/// Embedded [`KvBackend`]. Values go in the `values` tree, sets are JSON
/// arrays in the `sets` tree.
pub struct SledBackend {
    db: sled::Db,
    values: sled::Tree,
    sets: sled::Tree,
}

impl SledBackend {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = sled::Config::new().path(path).open()?;
        let backend = Self::from_db(db)?;
        info!(path = %path.display(), "Sled snapshot backend opened");
        Ok(backend)
    }

    /// Throwaway database, removed on drop.
    pub fn temporary() -> Result<Self> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: sled::Db) -> Result<Self> {
        let values = db.open_tree("values")?;
        let sets = db.open_tree("sets")?;
        Ok(Self { db, values, sets })
    }

    pub async fn flush(&self) -> Result<()> {
        self.db.flush_async().await?;
        Ok(())
    }

    fn read_set(&self, key: &str) -> Result<BTreeSet<String>> {
        match self.sets.get(key.as_bytes())? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(BTreeSet::new()),
        }
    }

    /// Read-modify-write of one set.
    fn update_set(&self, key: &str, f: impl Fn(&mut BTreeSet<String>)) -> Result<()> {
        self.sets
            .fetch_and_update(key.as_bytes(), |old| {
                let mut set: BTreeSet<String> = old
                    .and_then(|bytes| serde_json::from_slice(bytes).ok())
                    .unwrap_or_default();
                f(&mut set);
                if set.is_empty() {
                    None
                } else {
                    serde_json::to_vec(&set).ok()
                }
            })
            .map_err(StoreError::from)?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl KvBackend for SledBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.values.get(key.as_bytes())?.map(|v| v.to_vec()))
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.values.insert(key.as_bytes(), value)?;
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<usize> {
        let mut removed = 0;
        for key in keys {
            if self.values.remove(key.as_bytes())?.is_some() {
                removed += 1;
            }
            if self.sets.remove(key.as_bytes())?.is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for tree in [&self.values, &self.sets] {
            for item in tree.scan_prefix(prefix.as_bytes()) {
                let (key, _) = item?;
                keys.push(String::from_utf8_lossy(&key).into_owned());
            }
        }
        Ok(keys)
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<()> {
        self.update_set(key, |set| {
            set.insert(member.to_string());
        })
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<()> {
        self.update_set(key, |set| {
            set.remove(member);
        })
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        Ok(self.read_set(key)?.into_iter().collect())
    }
}
