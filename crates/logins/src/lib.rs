/*!
 * pwm logins - Test-account records for the login helper
 *
 * This crate holds the pure core of the helper: the login data model,
 * the search/category filter engine, the category index used to build
 * filter options, validation of untrusted login JSON, and a trait-based
 * key-value storage layer that can be swapped between backends.
 */

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

mod filter;
mod import;
mod index;
pub mod storage;

pub use filter::{all_logins, matches_filters, matches_search, visible_logins};
pub use import::{logins_from_value, parse_logins, ImportReport};
pub use index::CategoryIndex;
pub use storage::{FileStorage, InMemoryStorage, StorageArea};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoginError {
    #[error("Invalid JSON: {0}")]
    Parse(String),

    #[error("Expected a JSON array of logins")]
    NotAnArray,

    #[error("Invalid login record at index {index}: {reason}")]
    InvalidRecord { index: usize, reason: String },

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Quota exceeded for '{key}': {bytes} bytes (limit {quota})")]
    QuotaExceeded {
        key: String,
        bytes: usize,
        quota: usize,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, LoginError>;

// ============================================================================
// Data Types
// ============================================================================

/// Category tags of a login, e.g. `accountType -> singleAccount`.
pub type Categories = BTreeMap<String, String>;

/// A stored test-account record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Login {
    pub username: String,
    pub password: String,

    /// Free-text description shown next to the username
    #[serde(default)]
    pub description: String,

    /// Facets used by the category filter
    #[serde(default)]
    pub categories: Categories,
}

impl Login {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            description: description.into(),
            categories: Categories::new(),
        }
    }

    /// Builder-style helper to attach a category tag
    pub fn with_category(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.categories.insert(key.into(), value.into());
        self
    }
}

/// User options of the popup, persisted on every change
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Options {
    /// Click the page's submit button after filling the form
    pub auto_login: bool,

    /// URL of the remote login list, empty when unset
    pub remote_url: String,
}

/// Selected category constraints, key -> required value.
///
/// An empty set of filters matches every login.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct ActiveFilters(BTreeMap<String, String>);

impl ActiveFilters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a category select change. An empty value clears the key.
    pub fn select(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if value.is_empty() {
            self.0.remove(&key);
        } else {
            self.0.insert(key, value);
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ActiveFilters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_defaults_missing_fields() {
        let login: Login =
            serde_json::from_str(r#"{"username": "a@x.com", "password": "pw"}"#).unwrap();
        assert_eq!(login.description, "");
        assert!(login.categories.is_empty());
    }

    #[test]
    fn test_options_camel_case() {
        let options = Options {
            auto_login: true,
            remote_url: "https://example.com/logins.json".to_string(),
        };
        let json = serde_json::to_value(&options).unwrap();
        assert_eq!(json["autoLogin"], true);
        assert_eq!(json["remoteUrl"], "https://example.com/logins.json");

        let partial: Options = serde_json::from_str(r#"{"autoLogin": true}"#).unwrap();
        assert!(partial.auto_login);
        assert_eq!(partial.remote_url, "");
    }

    #[test]
    fn test_select_empty_value_clears_key() {
        let mut filters = ActiveFilters::new();
        filters.select("type", "single");
        filters.select("env", "staging");
        assert_eq!(filters.len(), 2);

        filters.select("type", "");
        assert_eq!(filters.get("type"), None);
        assert_eq!(filters.get("env"), Some("staging"));
    }

    #[test]
    fn test_active_filters_serialize_as_object() {
        let filters: ActiveFilters = [("type", "single")].into_iter().collect();
        let json = serde_json::to_string(&filters).unwrap();
        assert_eq!(json, r#"{"type":"single"}"#);

        let back: ActiveFilters = serde_json::from_str(&json).unwrap();
        assert_eq!(back, filters);
    }
}
