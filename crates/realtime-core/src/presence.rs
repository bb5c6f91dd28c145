//! C4 — per-channel, additive-only-with-explicit-leave presence state
//! (spec.md §4.4). Owned by `Channel`, operated under `Channel`'s own
//! mutex; this module holds no locks or I/O of its own.

use realtime_common::ConnectionId;
use serde_json::{json, Value};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Meta {
    pub track_ref: Uuid,
    pub connection_id: ConnectionId,
    pub payload: Value,
}

impl Meta {
    fn to_wire(&self) -> Value {
        let mut out = self.payload.clone();
        if let Value::Object(map) = &mut out {
            map.insert("phx_ref".to_string(), json!(self.track_ref.to_string()));
        }
        out
    }
}

/// `presenceKey -> list of metas`. Multiple metas can share a key (one
/// user, several tabs); each is independently trackable and leaves
/// independently.
#[derive(Debug, Default)]
pub struct Presence {
    entries: HashMap<String, Vec<Meta>>,
}

impl Presence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a new meta for `key` and returns it for the caller to wrap
    /// into a `presence_diff{joins}` push.
    pub fn track(&mut self, connection_id: ConnectionId, key: &str, payload: Value) -> Meta {
        let meta = Meta {
            track_ref: Uuid::new_v4(),
            connection_id,
            payload,
        };
        self.entries.entry(key.to_string()).or_default().push(meta.clone());
        meta
    }

    /// Removes every meta for `key` owned by `connection_id`, returning
    /// the removed metas for a `presence_diff{leaves}` push. Drops the
    /// key entirely once its meta list is empty.
    pub fn untrack(&mut self, connection_id: ConnectionId, key: &str) -> Vec<Meta> {
        let Some(metas) = self.entries.get_mut(key) else {
            return Vec::new();
        };
        let mut removed = Vec::new();
        metas.retain(|m| {
            if m.connection_id == connection_id {
                removed.push(m.clone());
                false
            } else {
                true
            }
        });
        if metas.is_empty() {
            self.entries.remove(key);
        }
        removed
    }

    /// Removes every meta owned by `connection_id` across all keys, for
    /// a single aggregated diff on disconnect (spec.md §4.4).
    pub fn purge_connection(&mut self, connection_id: ConnectionId) -> Vec<(String, Meta)> {
        let mut removed = Vec::new();
        self.entries.retain(|key, metas| {
            let mut kept = Vec::with_capacity(metas.len());
            for meta in metas.drain(..) {
                if meta.connection_id == connection_id {
                    removed.push((key.clone(), meta));
                } else {
                    kept.push(meta);
                }
            }
            *metas = kept;
            !metas.is_empty()
        });
        removed
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Full snapshot, sent as `presence_state` to a newly joined
    /// subscriber who configured presence.
    pub fn snapshot(&self) -> Value {
        let mut map = serde_json::Map::new();
        for (key, metas) in &self.entries {
            map.insert(
                key.clone(),
                Value::Array(metas.iter().map(Meta::to_wire).collect()),
            );
        }
        Value::Object(map)
    }

    pub fn diff_payload(joins: &[(&str, &Meta)], leaves: &[(&str, &Meta)]) -> Value {
        json!({
            "joins": group_by_key(joins),
            "leaves": group_by_key(leaves),
        })
    }
}

fn group_by_key(pairs: &[(&str, &Meta)]) -> Value {
    let mut map = serde_json::Map::new();
    for (key, meta) in pairs {
        map.entry(key.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Some(Value::Array(arr)) = map.get_mut(*key) {
            arr.push(meta.to_wire());
        }
    }
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> ConnectionId {
        ConnectionId::new()
    }

    #[test]
    fn multiple_metas_share_a_key() {
        let mut presence = Presence::new();
        let c1 = conn();
        let c2 = conn();
        presence.track(c1, "user-42", json!({"tab": 1}));
        presence.track(c2, "user-42", json!({"tab": 2}));
        let snapshot = presence.snapshot();
        assert_eq!(snapshot["user-42"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn untrack_removes_only_that_connections_metas() {
        let mut presence = Presence::new();
        let c1 = conn();
        let c2 = conn();
        presence.track(c1, "user-42", json!({"tab": 1}));
        presence.track(c2, "user-42", json!({"tab": 2}));
        let removed = presence.untrack(c1, "user-42");
        assert_eq!(removed.len(), 1);
        assert_eq!(presence.snapshot()["user-42"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn purge_connection_aggregates_across_keys() {
        let mut presence = Presence::new();
        let c1 = conn();
        presence.track(c1, "user-1", json!({}));
        presence.track(c1, "user-2", json!({}));
        let removed = presence.purge_connection(c1);
        assert_eq!(removed.len(), 2);
        assert!(presence.is_empty());
    }

    #[test]
    fn key_is_dropped_once_its_last_meta_leaves() {
        let mut presence = Presence::new();
        let c1 = conn();
        presence.track(c1, "user-1", json!({}));
        presence.untrack(c1, "user-1");
        assert!(presence.is_empty());
    }
}
