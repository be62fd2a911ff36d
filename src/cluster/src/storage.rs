//! Concurrency-safe KV storage used for task and cluster records.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::RwLock;
use tokio::fs;

use crate::error::{Error, Result};

/// Byte-value KV store under fixed prefixes. The only shared surface
/// between the provisioner and the tasks it runs.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn get(&self, prefix: &str, key: &str) -> Result<Option<Vec<u8>>>;
    async fn put(&self, prefix: &str, key: &str, value: Vec<u8>) -> Result<()>;
    async fn get_all(&self, prefix: &str) -> Result<Vec<Vec<u8>>>;
}

/// In-memory store for tests and single-process runs.
#[derive(Default)]
pub struct MemoryStorage {
    data: RwLock<HashMap<String, BTreeMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get(&self, prefix: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let data = self
            .data
            .read()
            .map_err(|_| Error::Internal("storage lock poisoned".to_string()))?;
        Ok(data.get(prefix).and_then(|m| m.get(key)).cloned())
    }

    async fn put(&self, prefix: &str, key: &str, value: Vec<u8>) -> Result<()> {
        let mut data = self
            .data
            .write()
            .map_err(|_| Error::Internal("storage lock poisoned".to_string()))?;
        data.entry(prefix.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn get_all(&self, prefix: &str) -> Result<Vec<Vec<u8>>> {
        let data = self
            .data
            .read()
            .map_err(|_| Error::Internal("storage lock poisoned".to_string()))?;
        Ok(data
            .get(prefix)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default())
    }
}

/// File-backed store: one directory per prefix, one JSON file per key.
pub struct FileStorage {
    base_dir: PathBuf,
}

impl FileStorage {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        FileStorage {
            base_dir: base_dir.into(),
        }
    }

    fn entry_path(&self, prefix: &str, key: &str) -> Result<PathBuf> {
        for part in [prefix, key] {
            if part.is_empty() || part.contains('/') || part.contains("..") {
                return Err(Error::InvalidArguments(format!(
                    "invalid storage path segment {:?}",
                    part
                )));
            }
        }
        Ok(self.base_dir.join(prefix).join(format!("{}.json", key)))
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn get(&self, prefix: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.entry_path(prefix, key)?;
        match fs::read(&path).await {
            Ok(data) => Ok(Some(data)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(Error::Internal(format!(
                "read {}: {}",
                path.display(),
                err
            ))),
        }
    }

    async fn put(&self, prefix: &str, key: &str, value: Vec<u8>) -> Result<()> {
        let path = self.entry_path(prefix, key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|err| {
                Error::Internal(format!("create {}: {}", parent.display(), err))
            })?;
        }
        fs::write(&path, value)
            .await
            .map_err(|err| Error::Internal(format!("write {}: {}", path.display(), err)))
    }

    async fn get_all(&self, prefix: &str) -> Result<Vec<Vec<u8>>> {
        let dir = self.base_dir.join(prefix);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Vec::new())
            }
            Err(err) => {
                return Err(Error::Internal(format!(
                    "read dir {}: {}",
                    dir.display(),
                    err
                )))
            }
        };

        let mut values = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| Error::Internal(format!("read dir {}: {}", dir.display(), err)))?
        {
            if entry.path().is_file() {
                values.push(fs::read(entry.path()).await.map_err(|err| {
                    Error::Internal(format!("read {}: {}", entry.path().display(), err))
                })?);
            }
        }
        Ok(values)
    }
}
