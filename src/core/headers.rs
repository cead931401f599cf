//! Case-insensitive header map

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::constants::headers as names;

/// Response/request headers keyed by lowercase name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Headers(BTreeMap<String, String>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a header, replacing any existing value.
    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.0.insert(name.to_ascii_lowercase(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(&name.to_ascii_lowercase())
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.0.remove(&name.to_ascii_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Request units charged, 0 when absent or unparsable.
    pub fn request_charge(&self) -> f64 {
        self.get(names::REQUEST_CHARGE)
            .and_then(|v| v.trim().parse::<f64>().ok())
            .unwrap_or(0.0)
    }

    pub fn set_request_charge(&mut self, charge: f64) {
        self.insert(names::REQUEST_CHARGE, charge.to_string());
    }

    /// Continuation token; empty strings count as absent.
    pub fn continuation(&self) -> Option<&str> {
        self.get(names::CONTINUATION).filter(|c| !c.is_empty())
    }

    pub fn session_token(&self) -> Option<&str> {
        self.get(names::SESSION_TOKEN).filter(|t| !t.is_empty())
    }

    pub fn substatus(&self) -> Option<u32> {
        self.get(names::SUB_STATUS)
            .and_then(|v| v.trim().parse().ok())
    }

    pub fn retry_after(&self) -> Option<Duration> {
        self.get(names::RETRY_AFTER_MS)
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|ms| *ms >= 0.0)
            .map(|ms| Duration::from_millis(ms as u64))
    }

    /// Fold another page's headers into an accumulated set.
    ///
    /// Request charges are summed; index utilization is last-wins.
    pub fn merge_from(&mut self, other: &Headers) {
        let total = self.request_charge() + other.request_charge();
        self.set_request_charge(total);
        if let Some(value) = other.get(names::INDEX_UTILIZATION) {
            self.insert(names::INDEX_UTILIZATION, value);
        }
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
