//! # Request Fingerprints
//!
//! Derives a stable cache/task key from a request's identity. Parameters are
//! filtered against the dynamic set, sorted by key, rendered as `key=value`
//! pairs with no separator and appended to the url before hashing with MD5.
//!
//! The exact byte layout must not change: persisted cache entries from earlier
//! runs are addressed by it.

use std::collections::HashMap;
use std::fmt;

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::KeyError;

/// Hex-encoded MD5 fingerprint of a request identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wrap an already computed fingerprint (e.g. one read back from disk)
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Request parameters keyed by name.
///
/// Values are stored as [`serde_json::Value`] so that anything serializable can
/// take part in a fingerprint. Conversion happens on insertion, which is where
/// a value that cannot be represented is rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestParams(HashMap<String, Value>);

impl RequestParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a serializable value, returning the previous value for `key`
    pub fn insert<T>(&mut self, key: impl Into<String>, value: T) -> Result<Option<Value>, KeyError>
    where
        T: Serialize,
    {
        let key = key.into();
        let value = serde_json::to_value(value).map_err(|source| KeyError::Serialization {
            key: key.clone(),
            source,
        })?;
        Ok(self.0.insert(key, value))
    }

    /// Builder form of [`RequestParams::insert`]
    pub fn with<T>(mut self, key: impl Into<String>, value: T) -> Result<Self, KeyError>
    where
        T: Serialize,
    {
        self.insert(key, value)?;
        Ok(self)
    }

    /// Insert an already converted value
    pub fn insert_value(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Entries sorted by key, the order used for fingerprinting and form fields
    pub fn sorted(&self) -> Vec<(&String, &Value)> {
        let mut entries: Vec<_> = self.0.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }
}

impl From<HashMap<String, Value>> for RequestParams {
    fn from(map: HashMap<String, Value>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for RequestParams {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Render a parameter value the way it appears inside a fingerprint.
///
/// Strings are used verbatim, `null` renders empty and composite values fall
/// back to compact JSON. Number formatting comes from serde_json and is not
/// locale dependent.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// Serialize parameters as sorted `key=value` pairs, skipping dynamic keys
fn serialize_params(params: &RequestParams, dynamic: Option<&RequestParams>) -> String {
    params
        .sorted()
        .into_iter()
        .filter(|(k, _)| !dynamic.is_some_and(|d| d.contains_key(k)))
        .fold(String::new(), |mut acc, (k, v)| {
            acc.push_str(k);
            acc.push('=');
            acc.push_str(&render_value(v));
            acc
        })
}

/// Derive the fingerprint for `url` with `params`, ignoring every key present
/// in `dynamic`. Without parameters the url alone is hashed.
pub fn derive_key(
    url: &str,
    params: Option<&RequestParams>,
    dynamic: Option<&RequestParams>,
) -> Fingerprint {
    let mut hasher = Md5::new();
    hasher.update(url.as_bytes());
    if let Some(params) = params {
        hasher.update(serialize_params(params, dynamic).as_bytes());
    }
    let digest = hasher.finalize();
    Fingerprint(format!("{digest:x}"))
}

/// Everything needed to recompute a request's fingerprint
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestIdentity {
    pub url: String,
    pub params: Option<RequestParams>,
    pub dynamic_params: Option<RequestParams>,
}

impl RequestIdentity {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            params: None,
            dynamic_params: None,
        }
    }

    pub fn with_params(mut self, params: RequestParams) -> Self {
        self.params = Some(params);
        self
    }

    pub fn with_dynamic_params(mut self, dynamic: RequestParams) -> Self {
        self.dynamic_params = Some(dynamic);
        self
    }

    pub fn fingerprint(&self) -> Fingerprint {
        derive_key(
            &self.url,
            self.params.as_ref(),
            self.dynamic_params.as_ref(),
        )
    }
}
