use serde::Serialize;
use std::collections::BTreeMap;

use crate::Login;

/// Distinct category values per category key, used to populate the
/// filter selects.
///
/// Values keep the order in which they were first seen. Comparison is
/// exact, so `Single` and `single` are two values.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct CategoryIndex {
    entries: BTreeMap<String, Vec<String>>,
}

impl CategoryIndex {
    pub fn build<'a, I>(logins: I) -> Self
    where
        I: IntoIterator<Item = &'a Login>,
    {
        let mut entries: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for login in logins {
            for (key, value) in &login.categories {
                let values = entries.entry(key.clone()).or_default();
                if !values.contains(value) {
                    values.push(value.clone());
                }
            }
        }

        Self { entries }
    }

    /// Values observed for `key`, empty when the key is unknown
    pub fn values(&self, key: &str) -> &[String] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, key: &str, value: &str) -> bool {
        self.values(key).iter().any(|v| v == value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
