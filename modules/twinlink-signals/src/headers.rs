//! Envelope headers. Keys are case-insensitive and stored lowercased.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::CorrelationId;

pub const CORRELATION_ID: &str = "correlation-id";
pub const IF_MATCH: &str = "if-match";
pub const IF_NONE_MATCH: &str = "if-none-match";
pub const RESPONSE_REQUIRED: &str = "response-required";
pub const TIMEOUT: &str = "timeout";
pub const CHANNEL: &str = "channel";
pub const CONTENT_TYPE: &str = "content-type";

/// Wildcard entity tag used by the conditional headers.
pub const ANY_ETAG: &str = "*";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(BTreeMap<String, String>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.0.insert(key.to_ascii_lowercase(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(&key.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(&key.to_ascii_lowercase())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(&key.to_ascii_lowercase())
    }

    pub fn correlation_id(&self) -> Option<CorrelationId> {
        self.get(CORRELATION_ID)
            .filter(|v| !v.is_empty())
            .map(CorrelationId::from_raw)
    }

    /// Whether either conditional-existence header is present.
    pub fn has_conditional(&self) -> bool {
        self.contains(IF_MATCH) || self.contains(IF_NONE_MATCH)
    }

    /// `response-required` defaults to true when absent or unparseable.
    pub fn response_required(&self) -> bool {
        self.get(RESPONSE_REQUIRED)
            .map(|v| !v.eq_ignore_ascii_case("false"))
            .unwrap_or(true)
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
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (k, v) in iter {
            headers.insert(k.as_ref(), v);
        }
        headers
    }
}
