//! The row-level-security engine, modeled as the narrow external
//! collaborator contract spec.md §6 describes: a pure evaluator of
//! `(policy set, claims, row) -> bool`. This crate owns only the trait
//! and a reference in-memory implementation; the real engine (and its
//! policy storage, SQL planning, etc.) lives outside this subsystem.

use async_trait::async_trait;
use realtime_common::{Claims, Predicate};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;

/// `SELECT` authorization for a concrete row, and for the synthetic
/// `realtime.messages` join check used by private-channel joins.
#[async_trait]
pub trait RlsEngine: Send + Sync {
    async fn can_select_row(&self, schema: &str, table: &str, row: &Value, claims: &Claims) -> bool;

    async fn can_select_object(&self, object: &str, claims: &Claims) -> bool;
}

/// One `SELECT` policy: a disjunction would be expressed as multiple
/// policies registered for the same table, matching Postgres RLS's
/// "permissive policies OR together" semantics.
#[derive(Debug, Clone)]
pub struct Policy {
    pub using: Predicate,
}

/// Reference implementation: policies are registered in memory per
/// `(schema, table)` or per logical object name, and evaluated using the
/// predicate grammar shared with change filters (claims substitution via
/// `claims.<key>`).
#[derive(Default)]
pub struct PolicyRlsEngine {
    table_policies: RwLock<HashMap<(String, String), Vec<Policy>>>,
    object_policies: RwLock<HashMap<String, Vec<Policy>>>,
}

impl PolicyRlsEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table_policy(&self, schema: &str, table: &str, using: &str) {
        let predicate = Predicate::parse(using).unwrap_or_else(|e| {
            tracing::error!(schema, table, error = %e, "failed to parse RLS policy; denying by default");
            // A predicate with one clause on a column that can never exist
            // denies everything, which is the safe default on parse failure.
            Predicate::parse("__unparseable_policy__=eq.never").unwrap()
        });
        self.table_policies
            .write()
            .unwrap()
            .entry((schema.to_string(), table.to_string()))
            .or_default()
            .push(Policy { using: predicate });
    }

    pub fn add_object_policy(&self, object: &str, using: &str) {
        let predicate = Predicate::parse(using).unwrap_or_else(|e| {
            tracing::error!(object, error = %e, "failed to parse RLS policy; denying by default");
            Predicate::parse("__unparseable_policy__=eq.never").unwrap()
        });
        self.object_policies
            .write()
            .unwrap()
            .entry(object.to_string())
            .or_default()
            .push(Policy { using: predicate });
    }
}

#[async_trait]
impl RlsEngine for PolicyRlsEngine {
    async fn can_select_row(&self, schema: &str, table: &str, row: &Value, claims: &Claims) -> bool {
        let policies = self.table_policies.read().unwrap();
        match policies.get(&(schema.to_string(), table.to_string())) {
            // No policy registered for the table: default-deny, matching
            // Postgres RLS's behavior once RLS is enabled on a table.
            None => false,
            Some(policies) => policies
                .iter()
                .any(|p| p.using.evaluate(row, claims.as_map())),
        }
    }

    async fn can_select_object(&self, object: &str, claims: &Claims) -> bool {
        let policies = self.object_policies.read().unwrap();
        match policies.get(object) {
            None => false,
            // There is no row for a logical object, so the claims map
            // itself stands in as the row: a policy column name is read
            // straight off the claims (`org_id=eq.99`), rather than
            // through the `claims.<key>` indirection rows use.
            Some(policies) => {
                let claims_as_row = Value::Object(claims.as_map().clone().into_iter().collect());
                policies
                    .iter()
                    .any(|p| p.using.evaluate(&claims_as_row, claims.as_map()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn row_is_visible_only_to_its_owner() {
        let engine = PolicyRlsEngine::new();
        engine.add_table_policy("public", "notes", "owner_id=eq.claims.uid");

        let mut map = BTreeMap::new();
        map.insert("uid".to_string(), json!("U1"));
        let claims = Claims::new(map);

        assert!(
            engine
                .can_select_row("public", "notes", &json!({"id": 1, "owner_id": "U1"}), &claims)
                .await
        );
        assert!(
            !engine
                .can_select_row("public", "notes", &json!({"id": 2, "owner_id": "U2"}), &claims)
                .await
        );
    }

    #[tokio::test]
    async fn table_without_a_policy_denies_by_default() {
        let engine = PolicyRlsEngine::new();
        let claims = Claims::anonymous();
        assert!(
            !engine
                .can_select_row("public", "notes", &json!({"id": 1}), &claims)
                .await
        );
    }

    #[tokio::test]
    async fn object_level_policy_gates_private_channel_join() {
        // An object-level check has no row to evaluate against; policies
        // authored against it compare claims to literals, with the empty
        // object standing in for the row.
        let engine = PolicyRlsEngine::new();
        engine.add_object_policy("realtime.messages", "org_id=eq.99");

        let mut allowed = BTreeMap::new();
        allowed.insert("org_id".to_string(), json!(99));
        let mut denied = BTreeMap::new();
        denied.insert("org_id".to_string(), json!(7));

        assert!(
            engine
                .can_select_object("realtime.messages", &Claims::new(allowed))
                .await
        );
        assert!(
            !engine
                .can_select_object("realtime.messages", &Claims::new(denied))
                .await
        );
    }
}
