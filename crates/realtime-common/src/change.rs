//! Database change events and the filter specs subscriptions register
//! against them.

use crate::predicate::{Predicate, PredicateError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeEventType {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for ChangeEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        };
        write!(f, "{s}")
    }
}

/// A committed row mutation, as reported by the REST layer after its
/// transaction commits. `schema`/`table` are whatever the REST layer
/// reports; `*` matching in a filter spec is not second-guessed here (see
/// the Open Question resolution in SPEC_FULL.md §9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub schema: String,
    pub table: String,
    pub commit_timestamp: DateTime<Utc>,
    pub event_type: ChangeEventType,
    pub new_row: Option<Value>,
    pub old_row: Option<Value>,
}

impl ChangeEvent {
    /// The row used for filter-matching and RLS authorization: `new_row`
    /// for INSERT/UPDATE, `old_row` for DELETE.
    pub fn authorization_row(&self) -> Option<&Value> {
        match self.event_type {
            ChangeEventType::Delete => self.old_row.as_ref(),
            ChangeEventType::Insert | ChangeEventType::Update => self.new_row.as_ref(),
        }
    }
}

/// A filter spec a subscriber registered under `config.postgres_changes`.
///
/// `event`/`schema`/`table` of `None` mean the wildcard `*`.
#[derive(Debug, Clone)]
pub struct ChangeFilterSpec {
    pub event: Option<ChangeEventType>,
    pub schema: Option<String>,
    pub table: Option<String>,
    pub predicate: Predicate,
}

impl ChangeFilterSpec {
    pub fn parse(raw: &RawChangeFilterSpec) -> Result<Self, PredicateError> {
        let predicate = match &raw.filter {
            Some(text) => Predicate::parse(text)?,
            None => Predicate::default(),
        };
        Ok(Self {
            event: parse_wildcard_event(&raw.event)?,
            schema: parse_wildcard(&raw.schema),
            table: parse_wildcard(&raw.table),
            predicate,
        })
    }

    /// Short-circuit event/schema/table match, then evaluate the predicate
    /// against the row used for authorization (new row for INSERT/UPDATE,
    /// old row for DELETE). Matching never consults RLS — that happens
    /// separately so it can't be short-circuited around (spec.md §4.5).
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        if let Some(expected) = self.event {
            if expected != event.event_type {
                return false;
            }
        }
        if let Some(schema) = &self.schema {
            if schema != &event.schema {
                return false;
            }
        }
        if let Some(table) = &self.table {
            if table != &event.table {
                return false;
            }
        }
        match event.authorization_row() {
            Some(row) => self.predicate.evaluate(row, &BTreeMap::new()),
            None => false,
        }
    }
}

fn parse_wildcard(raw: &str) -> Option<String> {
    if raw == "*" {
        None
    } else {
        Some(raw.to_string())
    }
}

fn parse_wildcard_event(raw: &str) -> Result<Option<ChangeEventType>, PredicateError> {
    match raw {
        "*" => Ok(None),
        "INSERT" => Ok(Some(ChangeEventType::Insert)),
        "UPDATE" => Ok(Some(ChangeEventType::Update)),
        "DELETE" => Ok(Some(ChangeEventType::Delete)),
        other => Err(PredicateError::UnknownEventType(other.to_string())),
    }
}

/// Wire shape of a filter spec as received in `config.postgres_changes`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawChangeFilterSpec {
    #[serde(default = "default_wildcard")]
    pub event: String,
    #[serde(default = "default_wildcard")]
    pub schema: String,
    #[serde(default = "default_wildcard")]
    pub table: String,
    #[serde(default)]
    pub filter: Option<String>,
}

fn default_wildcard() -> String {
    "*".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn insert_event(table: &str, row: Value) -> ChangeEvent {
        ChangeEvent {
            schema: "public".to_string(),
            table: table.to_string(),
            commit_timestamp: Utc::now(),
            event_type: ChangeEventType::Insert,
            new_row: Some(row),
            old_row: None,
        }
    }

    #[test]
    fn wildcard_table_matches_any_table() {
        let raw = RawChangeFilterSpec {
            event: "INSERT".to_string(),
            schema: "*".to_string(),
            table: "*".to_string(),
            filter: None,
        };
        let spec = ChangeFilterSpec::parse(&raw).unwrap();
        assert!(spec.matches(&insert_event("notes", json!({"id": 1}))));
        assert!(spec.matches(&insert_event("todos", json!({"id": 1}))));
    }

    #[test]
    fn filter_predicate_applies_to_authorization_row() {
        let raw = RawChangeFilterSpec {
            event: "INSERT".to_string(),
            schema: "public".to_string(),
            table: "notes".to_string(),
            filter: Some("owner_id=eq.U1".to_string()),
        };
        let spec = ChangeFilterSpec::parse(&raw).unwrap();
        assert!(spec.matches(&insert_event("notes", json!({"id": 1, "owner_id": "U1"}))));
        assert!(!spec.matches(&insert_event("notes", json!({"id": 2, "owner_id": "U2"}))));
    }

    #[test]
    fn delete_event_matches_against_old_row() {
        let spec = ChangeFilterSpec::parse(&RawChangeFilterSpec {
            event: "DELETE".to_string(),
            schema: "*".to_string(),
            table: "*".to_string(),
            filter: Some("id=eq.7".to_string()),
        })
        .unwrap();
        let event = ChangeEvent {
            schema: "public".to_string(),
            table: "notes".to_string(),
            commit_timestamp: Utc::now(),
            event_type: ChangeEventType::Delete,
            new_row: None,
            old_row: Some(json!({"id": 7})),
        };
        assert!(spec.matches(&event));
    }
}
