// ── Persistence ──
//
// The core only needs load/save of opaque JSON blobs by key. Keys are
// `/`-separated paths such as `entities/<server-id>`.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::CoreError;

pub const LEDGER_KEY: &str = "push/ledger";

pub fn entities_key(server_id: &str) -> String {
    format!("entities/{server_id}")
}

/// Key-value blob storage.
pub trait Persistence: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<Value>, CoreError>;
    fn save(&self, key: &str, value: &Value) -> Result<(), CoreError>;
    fn remove(&self, key: &str) -> Result<(), CoreError>;
}

/// Load and deserialize `key`, `None` when absent.
pub fn load_as<T: DeserializeOwned>(
    store: &dyn Persistence,
    key: &str,
) -> Result<Option<T>, CoreError> {
    store
        .load(key)?
        .map(serde_json::from_value)
        .transpose()
        .map_err(CoreError::from)
}

pub fn save_as<T: Serialize + ?Sized>(
    store: &dyn Persistence,
    key: &str,
    value: &T,
) -> Result<(), CoreError> {
    store.save(key, &serde_json::to_value(value)?)
}

// ── MemoryStore ──────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: DashMap<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

impl Persistence for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<Value>, CoreError> {
        Ok(self.blobs.get(key).map(|v| v.value().clone()))
    }

    fn save(&self, key: &str, value: &Value) -> Result<(), CoreError> {
        self.blobs.insert(key.to_owned(), value.clone());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CoreError> {
        self.blobs.remove(key);
        Ok(())
    }
}

// ── JsonFileStore ────────────────────────────────────────────────

/// One pretty-printed JSON file per key under a root directory.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let mut path = self.root.clone();
        let mut parts = key.split('/').filter(|p| !p.is_empty()).peekable();
        while let Some(part) = parts.next() {
            let part = sanitize(part);
            if parts.peek().is_some() {
                path.push(part);
            } else {
                path.push(format!("{part}.json"));
            }
        }
        path
    }
}

/// Keep key components inside the root: no separators, no dot-dirs.
fn sanitize(component: &str) -> String {
    let cleaned: String = component
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.chars().all(|c| c == '.') {
        "_".repeat(cleaned.len().max(1))
    } else {
        cleaned
    }
}

fn io_error(path: &Path, err: &std::io::Error) -> CoreError {
    CoreError::Persistence {
        message: format!("{}: {err}", path.display()),
    }
}

impl Persistence for JsonFileStore {
    fn load(&self, key: &str) -> Result<Option<Value>, CoreError> {
        let path = self.path_for(key);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&path, &e)),
        }
    }

    fn save(&self, key: &str, value: &Value) -> Result<(), CoreError> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| io_error(parent, &e))?;
        }
        let bytes = serde_json::to_vec_pretty(value)?;

        // Atomic replace.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, bytes).map_err(|e| io_error(&tmp, &e))?;
        fs::rename(&tmp, &path).map_err(|e| io_error(&path, &e))?;
        tracing::trace!(key, path = %path.display(), "saved blob");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CoreError> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&path, &e)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn memory_store_round_trips_blobs() {
        let store = MemoryStore::new();
        assert!(store.load("servers").unwrap().is_none());

        store.save("servers", &json!([{"id": "a"}])).unwrap();
        assert_eq!(store.load("servers").unwrap(), Some(json!([{"id": "a"}])));

        store.remove("servers").unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn file_store_nests_keys_under_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());

        store
            .save(&entities_key("10.0.0.2:28082"), &json!({"n": 1}))
            .unwrap();

        let expected = dir.path().join("entities").join("10.0.0.2_28082.json");
        assert!(expected.exists());
        assert_eq!(
            store.load("entities/10.0.0.2:28082").unwrap(),
            Some(json!({"n": 1}))
        );
    }

    #[test]
    fn file_store_cannot_escape_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("data"));
        store.save("../../etc/passwd", &json!(1)).unwrap();

        assert!(store.path_for("../../etc/passwd").starts_with(dir.path().join("data")));
        assert_eq!(store.load("../../etc/passwd").unwrap(), Some(json!(1)));
    }

    #[test]
    fn missing_file_is_none_and_remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        assert!(store.load(LEDGER_KEY).unwrap().is_none());
        store.remove(LEDGER_KEY).unwrap();
    }

    #[test]
    fn typed_helpers_use_serde() {
        #[derive(Debug, PartialEq, Serialize, serde::Deserialize)]
        struct Mark {
            last: i64,
        }

        let store = MemoryStore::new();
        save_as(&store, LEDGER_KEY, &Mark { last: 7 }).unwrap();
        let back: Option<Mark> = load_as(&store, LEDGER_KEY).unwrap();
        assert_eq!(back, Some(Mark { last: 7 }));
    }

    #[test]
    fn corrupt_file_is_a_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        fs::create_dir_all(dir.path().join("push")).unwrap();
        fs::write(dir.path().join("push/ledger.json"), b"{not json").unwrap();
        assert!(matches!(
            store.load(LEDGER_KEY),
            Err(CoreError::Persistence { .. })
        ));
    }
}
