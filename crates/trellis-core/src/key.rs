//! Primary-key tuples and row records.

use crate::error::CoreResult;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One row of a table: attribute name -> value.
pub type Record = BTreeMap<String, Value>;

/// A primary-key tuple: attribute name -> value.
///
/// Attributes are kept in lexicographic order, which makes the JSON
/// rendering canonical; the canonical string is the stored identity of a
/// key in provenance and reservation tables. Keys are immutable once a
/// record is committed; a `Key` value may also act as a partial
/// restriction (a subset of attributes) when querying.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Key(BTreeMap<String, Value>);

impl Key {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion.
    pub fn with(mut self, attr: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(attr.into(), value.into());
        self
    }

    pub fn set(&mut self, attr: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(attr.into(), value.into());
    }

    pub fn get(&self, attr: &str) -> Option<&Value> {
        self.0.get(attr)
    }

    pub fn contains(&self, attr: &str) -> bool {
        self.0.contains_key(attr)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Attribute names, lexicographically ordered.
    pub fn attrs(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// The sub-key consisting of `attrs` only; attributes the key does not
    /// carry are omitted.
    pub fn project(&self, attrs: &[&str]) -> Key {
        let mut out = Key::new();
        for attr in attrs {
            if let Some(v) = self.0.get(*attr) {
                out.set(*attr, v.clone());
            }
        }
        out
    }

    /// Canonical JSON rendering, deterministic across insertion orders.
    pub fn canonical(&self) -> CoreResult<String> {
        Ok(serde_json::to_string(&self.0)?)
    }

    /// Parse a key back from its canonical rendering.
    pub fn from_canonical(text: &str) -> CoreResult<Key> {
        Ok(serde_json::from_str(text)?)
    }

    /// The key's values viewed as a [`Record`], e.g. to seed an output row.
    pub fn to_record(&self) -> Record {
        self.0.clone()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, (attr, value)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{attr}={value}")?;
        }
        write!(f, ")")
    }
}

impl FromIterator<(String, Value)> for Key {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
#[path = "key_test.rs"]
mod tests;
