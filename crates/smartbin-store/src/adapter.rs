//! [`StateAdapter`] – typed accessors that absorb store failures.
//!
//! Read failures are logged and read as absent. Write failures are logged and
//! reported as `false` so callers can decide whether a follow-up step (e.g.
//! clearing a request flag) should be skipped. Nothing here returns an error.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::store::SharedStore;

#[derive(Clone)]
pub struct StateAdapter {
    store: Arc<dyn SharedStore>,
}

impl StateAdapter {
    pub fn new(store: Arc<dyn SharedStore>) -> Self {
        Self { store }
    }

    /// Raw JSON value at `path`.
    pub async fn get(&self, path: &str) -> Option<Value> {
        match self.store.get(path).await {
            Ok(value) => value,
            Err(e) => {
                warn!(%path, error = %e, "store read failed; treating as absent");
                None
            }
        }
    }

    /// Value at `path` rendered as text. Strings come back verbatim; numbers
    /// and booleans are formatted; maps, arrays and empty strings are absent.
    pub async fn get_text(&self, path: &str) -> Option<String> {
        match self.get(path).await? {
            Value::String(s) if !s.is_empty() => Some(s),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Write any serialisable value.
    pub async fn set<T: Serialize + ?Sized>(&self, path: &str, value: &T) -> bool {
        let value = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(e) => {
                warn!(%path, error = %e, "value could not be serialised");
                return false;
            }
        };
        match self.store.set(path, value).await {
            Ok(()) => true,
            Err(e) => {
                warn!(%path, error = %e, "store write failed");
                false
            }
        }
    }

    pub async fn remove(&self, path: &str) -> bool {
        match self.store.remove(path).await {
            Ok(()) => true,
            Err(e) => {
                warn!(%path, error = %e, "store remove failed");
                false
            }
        }
    }
}
