use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use yenwallet::external::Storage;

/// Key/value storage persisted as a single JSON object.
///
/// Values are served from memory. Every change rewrites the whole file,
/// writes are serialized so the file always ends with the latest state.
#[derive(Clone)]
pub struct FileStorage {
    inner: Arc<FileStorageInner>,
}

struct FileStorageInner {
    path: PathBuf,
    values: Mutex<HashMap<String, String>>,
    write_lock: tokio::sync::Mutex<()>,
}

impl FileStorage {
    pub async fn new<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let path = path.into();
        let values = match tokio::fs::read(&path).await {
            Ok(data) => serde_json::from_slice(&data)
                .with_context(|| format!("invalid storage file: {}", path.display()))?,
            Err(e) if e.kind() == ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to read storage file: {}", path.display()))
            }
        };

        Ok(Self {
            inner: Arc::new(FileStorageInner {
                path,
                values: Mutex::new(values),
                write_lock: Default::default(),
            }),
        })
    }
}

impl FileStorageInner {
    async fn flush(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let data = serde_json::to_vec_pretty(&*self.values.lock())?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let temp = self.path.with_extension("tmp");
        tokio::fs::write(&temp, data).await?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .with_context(|| format!("failed to replace {}", self.path.display()))
    }
}

#[async_trait::async_trait]
impl Storage for FileStorage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.inner.values.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.inner
            .values
            .lock()
            .insert(key.to_owned(), value.to_owned());
        self.inner.flush().await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.inner.values.lock().remove(key);
        self.inner.flush().await
    }
}

/// Non-persistent storage
#[derive(Default)]
pub struct MemoryStorage {
    values: Mutex<HashMap<String, String>>,
}

#[async_trait::async_trait]
impl Storage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values.lock().insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.values.lock().remove(key);
        Ok(())
    }
}
