//! Parsed identity/authorization context derived from a signed token.

use serde_json::Value;
use std::collections::BTreeMap;

/// Claims snapshot attached to a subscription. Cheap to clone so that a
/// subscription can swap in a fresh snapshot on an `access_token` frame
/// without taking a lock any broadcast path also needs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Claims(BTreeMap<String, Value>);

impl Claims {
    pub fn new(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn uid(&self) -> Option<&str> {
        self.0.get("sub").and_then(|v| v.as_str())
    }

    pub fn role(&self) -> Option<&str> {
        self.0.get("role").and_then(|v| v.as_str())
    }

    pub fn as_map(&self) -> &BTreeMap<String, Value> {
        &self.0
    }
}

impl From<BTreeMap<String, Value>> for Claims {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}
