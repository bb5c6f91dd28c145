//! C5 — accepts committed mutation events from the REST layer, matches
//! them against every subscriber's filters, authorizes each candidate
//! delivery with the RLS engine, and hands the frame to the matching
//! connection. Never blocks the caller (spec.md §4.5).
//!
//! A single background worker drains an unbounded queue in arrival
//! order, the same "background task that never blocks the caller"
//! pattern `execution_manager.rs` uses for query execution — here it
//! also gives per-table (indeed global) delivery ordering for free,
//! which is stronger than spec.md §4.5 requires but never violates it.

use crate::channel::Channel;
use crate::metrics::{Metrics, DROP_RLS_DENIED};
use realtime_common::{ChangeEvent, ChannelTopic};
use realtime_rls::RlsEngine;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

pub struct ChangePipeline {
    tx: mpsc::UnboundedSender<ChangeEvent>,
}

impl ChangePipeline {
    pub fn spawn(
        channels: Arc<RwLock<HashMap<ChannelTopic, Arc<Channel>>>>,
        rls: Arc<dyn RlsEngine>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<ChangeEvent>();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                dispatch(&channels, &rls, &metrics, event).await;
            }
            tracing::info!("change pipeline worker exiting: sender dropped");
        });
        Self { tx }
    }

    /// Copies the event onto the internal queue and returns immediately;
    /// the REST handler that calls this must never observe backpressure
    /// from slow subscribers (spec.md §4.5 ingress contract).
    pub fn notify(&self, event: ChangeEvent) {
        if self.tx.send(event).is_err() {
            tracing::error!("change pipeline worker is not running; dropping change event");
        }
    }
}

async fn dispatch(
    channels: &RwLock<HashMap<ChannelTopic, Arc<Channel>>>,
    rls: &Arc<dyn RlsEngine>,
    metrics: &Metrics,
    event: ChangeEvent,
) {
    let snapshot: Vec<Arc<Channel>> = channels.read().await.values().cloned().collect();
    let Some(row) = event.authorization_row() else {
        return;
    };

    for channel in snapshot {
        for candidate in channel.matching_subscriptions(&event) {
            let allowed = rls
                .can_select_row(&event.schema, &event.table, row, &candidate.claims)
                .await;
            if !allowed {
                // Silent drop: matching must never leak whether a row
                // would have matched a denied subscriber's filter.
                metrics.increment(DROP_RLS_DENIED);
                continue;
            }
            let payload = json!({
                "schema": event.schema,
                "table": event.table,
                "commit_timestamp": event.commit_timestamp,
                "eventType": event.event_type.to_string(),
                "new": event.new_row,
                "old": event.old_row,
                "errors": [],
            });
            let message = realtime_common::Message::push(
                channel.topic.as_str(),
                realtime_common::message::EVENT_POSTGRES_CHANGES,
                payload,
                candidate.join_ref.clone(),
            );
            let _ = candidate.connection.enqueue(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Connection;
    use async_trait::async_trait;
    use realtime_common::{ChangeEventType, ChangeFilterSpec, RawChangeFilterSpec};
    use serde_json::json;
    use std::sync::Arc;
    use tokio::sync::RwLock;

    struct AllowIfOwnerMatches;

    #[async_trait]
    impl RlsEngine for AllowIfOwnerMatches {
        async fn can_select_row(
            &self,
            _schema: &str,
            _table: &str,
            row: &serde_json::Value,
            claims: &realtime_common::Claims,
        ) -> bool {
            row.get("owner_id").and_then(|v| v.as_str()) == claims.uid()
        }

        async fn can_select_object(&self, _object: &str, _claims: &realtime_common::Claims) -> bool {
            false
        }
    }

    fn claims_for(uid: &str) -> realtime_common::Claims {
        let mut map = std::collections::BTreeMap::new();
        map.insert("sub".to_string(), json!(uid));
        realtime_common::Claims::new(map)
    }

    #[tokio::test]
    async fn rls_denial_drops_even_when_filter_matches() {
        let channels: Arc<RwLock<HashMap<ChannelTopic, Arc<Channel>>>> = Arc::new(RwLock::new(HashMap::new()));
        let channel = Arc::new(Channel::new(ChannelTopic::new("realtime:notes"), false, 0));
        let (conn, mut rx) = Connection::new(8, claims_for("U1"));
        let conn = Arc::new(conn);

        let filter = ChangeFilterSpec::parse(&RawChangeFilterSpec {
            event: "INSERT".to_string(),
            schema: "*".to_string(),
            table: "*".to_string(),
            filter: None,
        })
        .unwrap();
        channel.join(conn.clone(), None, false, false, None, vec![filter], claims_for("U1"));
        channels.write().await.insert(channel.topic.clone(), channel.clone());

        let metrics = Arc::new(Metrics::new());
        let pipeline = ChangePipeline::spawn(channels.clone(), Arc::new(AllowIfOwnerMatches), metrics.clone());

        pipeline.notify(ChangeEvent {
            schema: "public".to_string(),
            table: "notes".to_string(),
            commit_timestamp: chrono::Utc::now(),
            event_type: ChangeEventType::Insert,
            new_row: Some(json!({"id": 1, "owner_id": "U2"})),
            old_row: None,
        });
        pipeline.notify(ChangeEvent {
            schema: "public".to_string(),
            table: "notes".to_string(),
            commit_timestamp: chrono::Utc::now(),
            event_type: ChangeEventType::Insert,
            new_row: Some(json!({"id": 2, "owner_id": "U1"})),
            old_row: None,
        });

        let first = tokio::time::timeout(std::time::Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.payload["new"]["id"], 2);
        assert_eq!(metrics.get(DROP_RLS_DENIED), 1);
    }
}
