//! [`MemoryStore`] – in-process [`SharedStore`].
//!
//! Keeps a flat map from normalised path to value and a log of every
//! operation so tests can assert on write ordering. Failure injection makes
//! every call return [`StoreError::Unavailable`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::store::{SharedStore, StoreError};

/// One recorded store operation.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOp {
    Get(String),
    Set(String, Value),
    Remove(String),
}

#[derive(Default)]
struct Inner {
    values: HashMap<String, Value>,
    log: Vec<StoreOp>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a value without recording it in the log.
    pub async fn seed(&self, path: &str, value: Value) {
        self.inner.lock().await.values.insert(normalise(path), value);
    }

    /// Current value at `path`, without recording a read.
    pub async fn peek(&self, path: &str) -> Option<Value> {
        self.inner.lock().await.values.get(&normalise(path)).cloned()
    }

    /// Every operation performed so far.
    pub async fn log(&self) -> Vec<StoreOp> {
        self.inner.lock().await.log.clone()
    }

    /// All values written to `path`, in order.
    pub async fn writes_to(&self, path: &str) -> Vec<Value> {
        let path = normalise(path);
        self.inner
            .lock()
            .await
            .log
            .iter()
            .filter_map(|op| match op {
                StoreOp::Set(p, v) if *p == path => Some(v.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of removals of `path`.
    pub async fn removals_of(&self, path: &str) -> usize {
        let path = normalise(path);
        self.inner
            .lock()
            .await
            .log
            .iter()
            .filter(|op| matches!(op, StoreOp::Remove(p) if *p == path))
            .count()
    }

    /// Make every subsequent call fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Release);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::Acquire) {
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        self.check()?;
        let path = normalise(path);
        let mut inner = self.inner.lock().await;
        inner.log.push(StoreOp::Get(path.clone()));
        Ok(inner.values.get(&path).cloned())
    }

    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError> {
        self.check()?;
        let path = normalise(path);
        let mut inner = self.inner.lock().await;
        inner.log.push(StoreOp::Set(path.clone(), value.clone()));
        inner.values.insert(path, value);
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<(), StoreError> {
        self.check()?;
        let path = normalise(path);
        let mut inner = self.inner.lock().await;
        inner.log.push(StoreOp::Remove(path.clone()));
        inner.values.remove(&path);
        Ok(())
    }
}

fn normalise(path: &str) -> String {
    path.trim_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn set_get_remove() -> Result<(), Box<dyn std::error::Error>> {
        let store = MemoryStore::new();
        store.set("/GasLevel", json!(120)).await?;
        assert_eq!(store.get("GasLevel").await?, Some(json!(120)));
        store.remove("GasLevel").await?;
        assert_eq!(store.get("GasLevel").await?, None);
        assert_eq!(store.removals_of("GasLevel").await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn failing_store_rejects_everything() {
        let store = MemoryStore::new();
        store.set_failing(true);
        assert!(store.get("WasteLevel").await.is_err());
        assert!(store.set("WasteLevel", json!(1)).await.is_err());
        store.set_failing(false);
        assert!(store.get("WasteLevel").await.is_ok());
    }

    #[tokio::test]
    async fn seed_and_peek_do_not_touch_the_log() {
        let store = MemoryStore::new();
        store.seed("ManualControl", json!("OpenLid")).await;
        assert_eq!(store.peek("ManualControl").await, Some(json!("OpenLid")));
        assert!(store.log().await.is_empty());
    }
}
