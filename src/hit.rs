//! Search hits produced by backends.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One matching item reported by a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    /// Location of the matching item (`file:///...`, `mailbox://...`).
    pub uri: String,
    /// Name of the backend that produced the hit. Filled in by the worker.
    #[serde(default)]
    pub source: String,
    /// Backend-specific relevance; only comparable within one backend.
    pub score: f64,
    /// Free-form metadata (title, mime type, snippet).
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl Hit {
    pub fn new(uri: impl Into<String>, score: f64) -> Self {
        Self {
            uri: uri.into(),
            source: String::new(),
            score,
            properties: BTreeMap::new(),
        }
    }

    /// Builder-style property setter.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}
