use super::{StateStore, delete, insert, lookup};
use crate::error::StoreError;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// State store backed by a single JSON document.
///
/// The whole document is rewritten on every mutation through a temp file +
/// rename, so a crash mid-write leaves the previous document intact.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    doc: Mutex<Map<String, Value>>,
}

impl JsonFileStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let doc = if path.exists() {
            let raw = fs::read(&path)?;
            if raw.is_empty() {
                Map::new()
            } else {
                match serde_json::from_slice::<Value>(&raw)? {
                    Value::Object(map) => map,
                    _ => Map::new(),
                }
            }
        } else {
            Map::new()
        };
        Ok(Self {
            path,
            doc: Mutex::new(doc),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, doc: &Map<String, Value>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(doc)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, data)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl StateStore for JsonFileStore {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<Value>, StoreError> {
        let doc = self.doc.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(lookup(&doc, namespace, key))
    }

    fn set(&self, namespace: &str, key: &str, value: Value) -> Result<(), StoreError> {
        let mut doc = self.doc.lock().map_err(|_| StoreError::Poisoned)?;
        insert(&mut doc, namespace, key, value);
        self.flush(&doc)
    }

    fn remove(&self, namespace: &str, key: &str) -> Result<(), StoreError> {
        let mut doc = self.doc.lock().map_err(|_| StoreError::Poisoned)?;
        if delete(&mut doc, namespace, key) {
            self.flush(&doc)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn values_survive_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("state.json");

        let store = JsonFileStore::open(&path).unwrap();
        store.set("policy", "etag", json!("v1")).unwrap();
        drop(store);

        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(reopened.get("policy", "etag").unwrap(), Some(json!("v1")));
    }

    #[test]
    fn remove_is_persisted() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("state.json");

        let store = JsonFileStore::open(&path).unwrap();
        store.set("jobs", "retry", json!({"due_at": 1})).unwrap();
        store.remove("jobs", "retry").unwrap();

        let reopened = JsonFileStore::open(&path).unwrap();
        assert!(reopened.get("jobs", "retry").unwrap().is_none());
        assert!(!tmp.path().join("state.json.tmp").exists());
    }

    #[test]
    fn empty_file_opens_as_empty_document() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("state.json");
        fs::write(&path, b"").unwrap();

        let store = JsonFileStore::open(&path).unwrap();
        assert!(store.get("policy", "etag").unwrap().is_none());
    }

    #[test]
    fn corrupt_file_is_an_encoding_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("state.json");
        fs::write(&path, b"{not json").unwrap();

        let err = JsonFileStore::open(&path).unwrap_err();
        assert!(matches!(err, StoreError::Encoding(_)));
    }
}
