//! Local durable store: namespaced key → JSON value persistence.
//!
//! `Disk` keeps one `{key}.json` file per key under `{root}/{namespace}`.
//! `Memory` keeps serialized values in a shared map and is used for tests
//! and ephemeral sessions. Both go through the same serialization path so
//! they fail the same way.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::StoreError;

/// Handle to the local durable store. Cheap to clone.
#[derive(Clone, Debug)]
pub enum LocalStore {
    Disk(PathBuf),
    Memory(Arc<Mutex<HashMap<String, String>>>),
}

impl LocalStore {
    /// Open a file-backed store rooted at `root`, scoped to `namespace`.
    pub fn open(root: &Path, namespace: &str) -> Result<Self, StoreError> {
        validate_key(namespace)?;
        let dir = root.join(namespace);
        std::fs::create_dir_all(&dir)?;
        Ok(Self::Disk(dir))
    }

    pub fn in_memory() -> Self {
        Self::Memory(Arc::new(Mutex::new(HashMap::new())))
    }

    // ------------------------------------------------------------------
    // Fallible API
    // ------------------------------------------------------------------

    pub fn set<V: Serialize + ?Sized>(&self, key: &str, value: &V) -> Result<(), StoreError> {
        validate_key(key)?;
        let raw = serde_json::to_string(value)?;
        match self {
            Self::Disk(dir) => {
                let path = dir.join(format!("{key}.json"));
                let tmp = dir.join(format!(".{key}.json.tmp"));
                std::fs::write(&tmp, raw.as_bytes())?;
                std::fs::rename(&tmp, &path)?;
            }
            Self::Memory(map) => {
                lock(map)?.insert(key.to_string(), raw);
            }
        }
        Ok(())
    }

    /// Read and deserialize `key`. `Ok(None)` when the key is absent.
    pub fn try_get<V: DeserializeOwned>(&self, key: &str) -> Result<Option<V>, StoreError> {
        validate_key(key)?;
        let raw = match self {
            Self::Disk(dir) => match std::fs::read_to_string(dir.join(format!("{key}.json"))) {
                Ok(raw) => raw,
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(e.into()),
            },
            Self::Memory(map) => match lock(map)?.get(key) {
                Some(raw) => raw.clone(),
                None => return Ok(None),
            },
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }

    pub fn try_remove(&self, key: &str) -> Result<(), StoreError> {
        validate_key(key)?;
        match self {
            Self::Disk(dir) => match std::fs::remove_file(dir.join(format!("{key}.json"))) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            },
            Self::Memory(map) => {
                lock(map)?.remove(key);
                Ok(())
            }
        }
    }

    pub fn try_clear(&self) -> Result<(), StoreError> {
        match self {
            Self::Disk(dir) => {
                for entry in std::fs::read_dir(dir)? {
                    let path = entry?.path();
                    if path.extension().is_some_and(|ext| ext == "json") {
                        std::fs::remove_file(path)?;
                    }
                }
                Ok(())
            }
            Self::Memory(map) => {
                lock(map)?.clear();
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------
    // Silent API: failures are logged, never returned
    // ------------------------------------------------------------------

    pub fn put<V: Serialize + ?Sized>(&self, key: &str, value: &V) {
        if let Err(e) = self.set(key, value) {
            warn!(key, error = %e, "local store write failed");
        }
    }

    /// Read `key`, returning `default` when absent or unreadable.
    pub fn get<V: DeserializeOwned>(&self, key: &str, default: V) -> V {
        match self.try_get(key) {
            Ok(Some(value)) => value,
            Ok(None) => default,
            Err(e) => {
                warn!(key, error = %e, "local store read failed, using default");
                default
            }
        }
    }

    pub fn remove(&self, key: &str) {
        if let Err(e) = self.try_remove(key) {
            warn!(key, error = %e, "local store remove failed");
        }
    }

    pub fn clear(&self) {
        match self.try_clear() {
            Ok(()) => debug!("local store cleared"),
            Err(e) => warn!(error = %e, "local store clear failed"),
        }
    }
}

fn validate_key(key: &str) -> Result<(), StoreError> {
    let valid = !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid {
        Ok(())
    } else {
        Err(StoreError::Local(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid local store key '{key}'"),
        )))
    }
}

fn lock(
    map: &Mutex<HashMap<String, String>>,
) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, StoreError> {
    map.lock()
        .map_err(|_| StoreError::Local(io::Error::other("local store mutex poisoned")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn disk_store() -> (LocalStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path(), "default").unwrap();
        (store, dir)
    }

    #[test]
    fn test_set_and_get_roundtrip_on_disk() {
        let (store, _dir) = disk_store();
        store.set("diet_records", &json!([{"id": "a"}])).unwrap();
        let value: Value = store.get("diet_records", Value::Null);
        assert_eq!(value, json!([{"id": "a"}]));
    }

    #[test]
    fn test_get_absent_returns_default() {
        let (store, _dir) = disk_store();
        let value: Vec<Value> = store.get("missing", vec![]);
        assert!(value.is_empty());
    }

    #[test]
    fn test_get_corrupt_returns_default() {
        let (store, dir) = disk_store();
        std::fs::write(dir.path().join("default").join("walk_records.json"), "{not json").unwrap();
        let value: Vec<Value> = store.get("walk_records", vec![json!("fallback")]);
        assert_eq!(value, vec![json!("fallback")]);
        assert!(store.try_get::<Vec<Value>>("walk_records").is_err());
    }

    #[test]
    fn test_set_overwrites() {
        let store = LocalStore::in_memory();
        store.set("k", &1).unwrap();
        store.set("k", &2).unwrap();
        assert_eq!(store.get("k", 0), 2);
    }

    #[test]
    fn test_remove_and_clear() {
        let (store, _dir) = disk_store();
        store.put("a", &1);
        store.put("b", &2);
        store.remove("a");
        assert_eq!(store.get("a", 0), 0);
        assert_eq!(store.get("b", 0), 2);

        store.clear();
        assert_eq!(store.get("b", 0), 0);
    }

    #[test]
    fn test_remove_missing_is_ok() {
        let (store, _dir) = disk_store();
        store.try_remove("never-written").unwrap();
    }

    #[test]
    fn test_rejects_path_like_keys() {
        let store = LocalStore::in_memory();
        assert!(matches!(
            store.set("../escape", &1),
            Err(StoreError::Local(_))
        ));
        assert!(store.set("a/b", &1).is_err());
        assert!(store.set("", &1).is_err());
    }

    #[test]
    fn test_namespaces_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let left = LocalStore::open(dir.path(), "left").unwrap();
        let right = LocalStore::open(dir.path(), "right").unwrap();
        left.put("photos", &json!(["x"]));
        let seen: Vec<Value> = right.get("photos", vec![]);
        assert!(seen.is_empty());
    }

    #[test]
    fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        LocalStore::open(dir.path(), "default")
            .unwrap()
            .put("contacts", &json!([{"id": "c1"}]));
        let reopened = LocalStore::open(dir.path(), "default").unwrap();
        let value: Value = reopened.get("contacts", Value::Null);
        assert_eq!(value[0]["id"], "c1");
    }
}
