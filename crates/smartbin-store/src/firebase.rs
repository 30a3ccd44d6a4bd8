//! [`FirebaseStore`] – Realtime Database REST backend.
//!
//! Each path maps onto `{database_url}/{path}.json`: `GET` reads, `PUT`
//! replaces, `DELETE` removes. A JSON `null` body means the path is absent.
//! When a database secret or ID token is configured it is sent as the `auth`
//! query parameter.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::store::{SharedStore, StoreError};

/// Per-request timeout applied by the HTTP client.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct FirebaseStore {
    base_url: String,
    auth: Option<String>,
    client: reqwest::Client,
}

impl FirebaseStore {
    /// Create a store for `base_url` (e.g.
    /// `"https://my-bin-default-rtdb.firebaseio.com"`).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Http`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, auth: Option<String>) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            base_url: base_url.into(),
            auth: auth.filter(|a| !a.is_empty()),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}.json",
            self.base_url.trim_end_matches('/'),
            path.trim_matches('/')
        )
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, self.url(path));
        match &self.auth {
            Some(auth) => builder.query(&[("auth", auth)]),
            None => builder,
        }
    }
}

#[async_trait]
impl SharedStore for FirebaseStore {
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let body = self
            .request(reqwest::Method::GET, path)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let value = parse_body(&body)?;
        debug!(%path, value = ?value, "store read");
        Ok(value)
    }

    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError> {
        debug!(%path, %value, "store write");
        self.request(reqwest::Method::PUT, path)
            .json(&value)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<(), StoreError> {
        debug!(%path, "store remove");
        self.request(reqwest::Method::DELETE, path)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Decode a REST body; `null` (or an empty body) is an absent value.
fn parse_body(body: &str) -> Result<Option<Value>, StoreError> {
    if body.trim().is_empty() {
        return Ok(None);
    }
    match serde_json::from_str(body) {
        Ok(Value::Null) => Ok(None),
        Ok(value) => Ok(Some(value)),
        Err(e) => Err(StoreError::BadResponse(format!("{e}: {body}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn url_joins_base_and_path() {
        let store = FirebaseStore::new("https://bin.firebaseio.com/", None).unwrap();
        assert_eq!(
            store.url("Dustbin/Status"),
            "https://bin.firebaseio.com/Dustbin/Status.json"
        );
        assert_eq!(store.url("/users/7/"), "https://bin.firebaseio.com/users/7.json");
    }

    #[test]
    fn empty_auth_is_ignored() {
        let store = FirebaseStore::new("https://bin.firebaseio.com", Some(String::new())).unwrap();
        assert!(store.auth.is_none());
    }

    #[test]
    fn null_body_is_absent() {
        assert_eq!(parse_body("null").unwrap(), None);
        assert_eq!(parse_body("").unwrap(), None);
    }

    #[test]
    fn scalar_and_map_bodies_parse() {
        assert_eq!(parse_body("\"True\"").unwrap(), Some(json!("True")));
        assert_eq!(parse_body("42").unwrap(), Some(json!(42)));
        assert_eq!(
            parse_body(r#"{"name":"Ada","voted":false}"#).unwrap(),
            Some(json!({"name": "Ada", "voted": false}))
        );
    }

    #[test]
    fn malformed_body_is_bad_response() {
        assert!(matches!(
            parse_body("<html>"),
            Err(StoreError::BadResponse(_))
        ));
    }
}
