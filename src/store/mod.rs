//! Persistent key/value state shared across sync cycles and process restarts.
//!
//! Values are grouped by namespace (`policy`, `enrolment`, `push_token`,
//! `jobs`, ...) and stored as JSON. Typed records live in [`records`].

mod file;
pub mod records;

use crate::error::StoreError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::sync::Mutex;

pub use file::JsonFileStore;
pub use records::{EnrolmentIdentity, PolicySnapshot};

/// Get/set contract of the configuration and state store.
pub trait StateStore: Send + Sync {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<Value>, StoreError>;

    fn set(&self, namespace: &str, key: &str, value: Value) -> Result<(), StoreError>;

    fn remove(&self, namespace: &str, key: &str) -> Result<(), StoreError>;
}

/// Typed helpers over any [`StateStore`].
pub trait StateStoreExt: StateStore {
    fn load<T: DeserializeOwned>(&self, namespace: &str, key: &str) -> Result<Option<T>, StoreError> {
        match self.get(namespace, key)? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    fn save<T: Serialize>(&self, namespace: &str, key: &str, value: &T) -> Result<(), StoreError> {
        self.set(namespace, key, serde_json::to_value(value)?)
    }
}

impl<S: StateStore + ?Sized> StateStoreExt for S {}

/// Process-local store; state is lost on exit.
#[derive(Debug, Default)]
pub struct MemoryStore {
    doc: Mutex<Map<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStore {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<Value>, StoreError> {
        let doc = self.doc.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(lookup(&doc, namespace, key))
    }

    fn set(&self, namespace: &str, key: &str, value: Value) -> Result<(), StoreError> {
        let mut doc = self.doc.lock().map_err(|_| StoreError::Poisoned)?;
        insert(&mut doc, namespace, key, value);
        Ok(())
    }

    fn remove(&self, namespace: &str, key: &str) -> Result<(), StoreError> {
        let mut doc = self.doc.lock().map_err(|_| StoreError::Poisoned)?;
        delete(&mut doc, namespace, key);
        Ok(())
    }
}

pub(crate) fn lookup(doc: &Map<String, Value>, namespace: &str, key: &str) -> Option<Value> {
    doc.get(namespace)
        .and_then(Value::as_object)
        .and_then(|ns| ns.get(key))
        .cloned()
}

pub(crate) fn insert(doc: &mut Map<String, Value>, namespace: &str, key: &str, value: Value) {
    let entry = doc
        .entry(namespace.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !entry.is_object() {
        *entry = Value::Object(Map::new());
    }
    if let Value::Object(ns) = entry {
        ns.insert(key.to_string(), value);
    }
}

/// Returns whether anything was removed.
pub(crate) fn delete(doc: &mut Map<String, Value>, namespace: &str, key: &str) -> bool {
    doc.get_mut(namespace)
        .and_then(Value::as_object_mut)
        .is_some_and(|ns| ns.remove(key).is_some())
}
