use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

use anyhow::anyhow;
use log::warn;
use serde_json::Value;

use crate::prelude::*;

/// String keyed storage of JSON values that should outlive the process
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&self, key: &str, value: Value) -> Result;
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex.lock().map_err(|_| anyhow!("Store lock poisoned"))
}

#[derive(Debug, Default)]
/// Store that only lives as long as the process, shared through an [std::sync::Arc] it can
/// stand in for a device store across a simulated restart
pub struct MemoryStore(Mutex<HashMap<String, Value>>);

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        lock(&self.0).ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result {
        lock(&self.0)?.insert(key.to_string(), value);
        Ok(())
    }
}

#[derive(Debug)]
/// Store backed by a single JSON object on disk, every write rewrites the file
pub struct JsonFileStore {
    path: PathBuf,
    values: Mutex<serde_json::Map<String, Value>>,
}

impl JsonFileStore {
    /// Open the store at `path`, a missing file is an empty store
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let values = match fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(values) => values,
                Err(why) => {
                    warn!("Store at {} is corrupt, starting empty: {why}", path.display());
                    serde_json::Map::new()
                }
            },
            Err(why) if why.kind() == std::io::ErrorKind::NotFound => serde_json::Map::new(),
            Err(why) => {
                return Err(why).with_context(|| format!("Failed to read {}", path.display()));
            }
        };

        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_out(&self, values: &serde_json::Map<String, Value>) -> Result {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).context("Failed to create store directory")?;
        }
        let encoded = serde_json::to_vec_pretty(values).context("Failed to serialize store")?;
        // Write then rename so a crash never leaves a half written store
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, encoded).context("Failed to write store")?;
        fs::rename(&tmp, &self.path).context("Failed to replace store")?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<Value> {
        lock(&self.values).ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result {
        let mut values = lock(&self.values)?;
        values.insert(key.to_string(), value);
        self.write_out(&values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn temp_store_path() -> PathBuf {
        std::env::temp_dir().join(format!("qibla-store-{}.json", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_memory_store_overwrites() {
        let store = MemoryStore::default();
        assert!(store.get("a").is_none());
        store.set("a", json!(1.5)).expect("set");
        store.set("a", json!(2.5)).expect("set");
        assert_eq!(store.get("a"), Some(json!(2.5)));
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let path = temp_store_path();

        let store = JsonFileStore::open(&path).expect("Failed to open");
        assert_eq!(store.path(), path.as_path());
        assert!(store.get("last_lat").is_none());
        store.set("last_lat", json!(21.4225)).expect("set");
        store.set("last_city", json!("Mecca, Saudi Arabia")).expect("set");
        drop(store);

        let reopened = JsonFileStore::open(&path).expect("Failed to reopen");
        assert_eq!(reopened.get("last_lat"), Some(json!(21.4225)));
        assert_eq!(reopened.get("last_city"), Some(json!("Mecca, Saudi Arabia")));

        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_file_store_corrupt_starts_empty() {
        let path = temp_store_path();
        fs::write(&path, b"{ not json").expect("write");

        let store = JsonFileStore::open(&path).expect("Corrupt store should still open");
        assert!(store.get("anything").is_none());
        store.set("k", json!(true)).expect("set");
        assert_eq!(
            JsonFileStore::open(&path).expect("reopen").get("k"),
            Some(json!(true))
        );

        fs::remove_file(&path).ok();
    }
}
