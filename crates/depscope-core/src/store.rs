//! Persistent key-value caches for enrichment data
//!
//! Stores are unlocked: concurrent writes to different keys are independent,
//! concurrent writes to the same key are last-write-wins.

use crate::error::{Error, Result};
use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Cache directory relative to the project root.
pub const CACHE_DIR: &str = "node_modules/.cache/depscope";

/// Get the default cache directory for a project root.
pub fn cache_dir(root: &Path) -> PathBuf {
    root.join(CACHE_DIR)
}

/// Remove a cache directory and everything in it.
pub fn clear_cache(dir: &Path) -> Result<()> {
    if dir.exists() {
        std::fs::remove_dir_all(dir).map_err(|e| Error::io(dir, e))?;
    }
    Ok(())
}

/// A string-keyed store of JSON values.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>>;
    fn set(&self, key: &str, value: Value) -> Result<()>;
    fn keys(&self) -> Result<Vec<String>>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// Typed access on top of any [`KvStore`].
pub trait KvStoreExt: KvStore {
    /// Read and deserialize an entry. Entries that no longer deserialize are
    /// treated as absent.
    fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        Ok(self.get(key)?.and_then(|value| match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::debug!("Ignoring undecodable cache entry {}: {}", key, e);
                None
            }
        }))
    }

    fn set_as<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.set(key, serde_json::to_value(value)?)
    }
}

impl<S: KvStore + ?Sized> KvStoreExt for S {}

/// In-memory store, for tests and `--no-cache` runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.get(key).map(|r| r.value().clone()))
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self.entries.iter().map(|r| r.key().clone()).collect();
        keys.sort();
        Ok(keys)
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// One JSON file per key under a directory.
#[derive(Debug, Clone)]
pub struct FsStore {
    dir: PathBuf,
}

impl FsStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
        Ok(FsStore { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", encode_key(key)))
    }
}

impl KvStore for FsStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        let path = self.path_for(key);
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::io(path, e)),
        }
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        let path = self.path_for(key);
        let tmp = self.dir.join(format!(
            ".{}.{}.tmp",
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        std::fs::write(&tmp, serde_json::to_vec(&value)?).map_err(|e| Error::io(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| Error::io(&path, e))
    }

    fn keys(&self) -> Result<Vec<String>> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| Error::io(&self.dir, e))?;
        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::io(&self.dir, e))?;
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if let Some(stem) = file_name.strip_suffix(".json") {
                keys.push(decode_key(stem));
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io(path, e)),
        }
    }
}

/// Make a spec safe to use as a file name. Reversible via [`decode_key`].
fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for c in key.chars() {
        match c {
            '%' => out.push_str("%25"),
            '/' => out.push_str("%2F"),
            '\\' => out.push_str("%5C"),
            ':' => out.push_str("%3A"),
            '.' if out.is_empty() => out.push_str("%2E"),
            c => out.push(c),
        }
    }
    out
}

fn decode_key(encoded: &str) -> String {
    encoded
        .replace("%2F", "/")
        .replace("%5C", "\\")
        .replace("%3A", ":")
        .replace("%2E", ".")
        .replace("%25", "%")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn exercise(store: &dyn KvStore) {
        assert_eq!(store.get("@scope/pkg@1.0.0").unwrap(), None);
        store.set("@scope/pkg@1.0.0", json!({"bytes": 10})).unwrap();
        store.set("plain@2.0.0", json!("x")).unwrap();
        assert_eq!(store.get("@scope/pkg@1.0.0").unwrap(), Some(json!({"bytes": 10})));
        assert_eq!(store.keys().unwrap(), vec!["@scope/pkg@1.0.0", "plain@2.0.0"]);

        store.set("plain@2.0.0", json!("y")).unwrap();
        assert_eq!(store.get("plain@2.0.0").unwrap(), Some(json!("y")));

        store.remove("plain@2.0.0").unwrap();
        store.remove("never-existed@0.0.0").unwrap();
        assert_eq!(store.keys().unwrap(), vec!["@scope/pkg@1.0.0"]);
    }

    #[test]
    fn test_memory_store_contract() {
        exercise(&MemoryStore::new());
    }

    #[test]
    fn test_fs_store_contract() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::open(dir.path().join("nested/cache")).unwrap();
        exercise(&store);
        assert!(store.dir().join("@scope%2Fpkg@1.0.0.json").exists());
    }

    #[test]
    fn test_typed_access_skips_undecodable_entries() {
        let store = MemoryStore::new();
        store.set("a@1.0.0", json!("not a number")).unwrap();
        assert_eq!(store.get_as::<u64>("a@1.0.0").unwrap(), None);
        store.set_as("a@1.0.0", &42u64).unwrap();
        assert_eq!(store.get_as::<u64>("a@1.0.0").unwrap(), Some(42));
    }

    #[test]
    fn test_key_encoding_round_trips_awkward_keys() {
        for key in ["%weird%2F@1", "a/b:c\\d", ".hidden@1.0.0"] {
            assert_eq!(decode_key(&encode_key(key)), key);
        }
    }

    #[test]
    fn test_clear_cache_removes_directory() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_dir(dir.path());
        FsStore::open(cache.join("sizes")).unwrap();
        clear_cache(&cache).unwrap();
        assert!(!cache.exists());
        clear_cache(&cache).unwrap();
    }
}
