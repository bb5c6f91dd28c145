//! C1 — the single source of truth for live connections and channels.
//!
//! Grounded on `execution_manager.rs`'s `ExecutionManager` (an
//! `RwLock<HashMap<..>>` registry with `#[instrument]`ed lifecycle
//! methods and `tracing::info!`/`warn!` on register/unregister),
//! generalized from "subscriptions keyed by id" to "connections +
//! channels keyed by id/topic", with the locking discipline spec.md §5
//! makes explicit: hub locks are read-locked for lookups, briefly
//! write-locked for structural changes, and never held across I/O.

use crate::change_pipeline::ChangePipeline;
use crate::channel::Channel;
use crate::connection::Connection;
use crate::error::{JoinError, RegisterError};
use crate::join_config::JoinConfig;
use crate::metrics::Metrics;
use realtime_common::{ChangeEvent, ChannelTopic, Claims, ConnectionId, JoinRef};
use realtime_rls::RlsEngine;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, serde::Serialize)]
pub struct ChannelStats {
    pub topic: String,
    pub subscribers: usize,
    pub has_presence: bool,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Stats {
    pub connections: usize,
    pub channels: usize,
    pub per_channel: Vec<ChannelStats>,
}

pub struct JoinOutcome {
    pub presence_enabled: bool,
    pub presence_snapshot: Option<serde_json::Value>,
    pub accepted_filters: usize,
}

pub struct Hub {
    connections: RwLock<HashMap<ConnectionId, Arc<Connection>>>,
    channels: Arc<RwLock<HashMap<ChannelTopic, Arc<Channel>>>>,
    rls: Arc<dyn RlsEngine>,
    replay_capacity: usize,
    authz_timeout: Duration,
    change_pipeline: ChangePipeline,
    metrics: Arc<Metrics>,
}

impl Hub {
    pub fn new(rls: Arc<dyn RlsEngine>, replay_capacity: usize, authz_timeout: Duration) -> Self {
        let channels = Arc::new(RwLock::new(HashMap::new()));
        let metrics = Arc::new(Metrics::new());
        let change_pipeline = ChangePipeline::spawn(channels.clone(), rls.clone(), metrics.clone());
        Self {
            connections: RwLock::new(HashMap::new()),
            channels,
            rls,
            replay_capacity,
            authz_timeout,
            change_pipeline,
            metrics,
        }
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }

    #[instrument(skip(self, connection), fields(connection_id = %connection.id()))]
    pub async fn register_connection(&self, connection: Arc<Connection>) -> Result<(), RegisterError> {
        let mut connections = self.connections.write().await;
        if connections.contains_key(&connection.id()) {
            return Err(RegisterError::AlreadyRegistered);
        }
        connections.insert(connection.id(), connection);
        info!("connection registered");
        Ok(())
    }

    /// Removes the connection, detaches it from every channel it
    /// subscribed to (purging its presence metas along the way), and
    /// cleans up any channel left empty. Idempotent: unregistering an
    /// unknown id is a no-op.
    #[instrument(skip(self))]
    pub async fn unregister_connection(&self, id: ConnectionId) {
        let connection = {
            let mut connections = self.connections.write().await;
            connections.remove(&id)
        };
        let Some(connection) = connection else {
            return;
        };

        for topic in connection.joined_topics_snapshot() {
            self.leave_channel(id, &topic).await;
        }
        info!("connection unregistered");
    }

    /// Creates the channel if absent, authorizes the join, installs the
    /// subscription, and reports what the caller should push back:
    /// whether to include a `presence_state` frame and how many
    /// `postgres_changes` filters the `system` event should enumerate.
    #[instrument(skip(self, connection, claims), fields(connection_id = %connection.id(), topic = %topic))]
    pub async fn join_channel(
        &self,
        connection: Arc<Connection>,
        topic: ChannelTopic,
        join_ref: JoinRef,
        config: JoinConfig,
        claims: Claims,
    ) -> Result<JoinOutcome, JoinError> {
        let (channel, newly_created) = self.get_or_create_channel(&topic, config.private).await?;

        let authorized = if config.private {
            match tokio::time::timeout(self.authz_timeout, self.rls.can_select_object("realtime.messages", &claims)).await {
                Ok(allowed) => allowed,
                Err(_) => {
                    warn!(topic = %topic, "join authorization exceeded soft deadline");
                    false
                }
            }
        } else {
            true
        };

        if !authorized {
            if newly_created {
                self.remove_if_empty(&topic).await;
            }
            return Err(JoinError::Unauthorized);
        }

        let info = channel.join(
            connection.clone(),
            join_ref,
            config.broadcast_self,
            config.broadcast_ack,
            config.presence_key,
            config.filters,
            claims,
        );
        connection.mark_joined(topic);

        Ok(JoinOutcome {
            presence_enabled: info.presence_enabled,
            presence_snapshot: info.presence_snapshot,
            accepted_filters: info.accepted_filters,
        })
    }

    #[instrument(skip(self))]
    pub async fn leave_channel(&self, connection_id: ConnectionId, topic: &ChannelTopic) {
        let channel = self.channels.read().await.get(topic).cloned();
        let Some(channel) = channel else {
            return;
        };
        channel.leave(connection_id);
        if let Some(connection) = self.connections.read().await.get(&connection_id) {
            connection.mark_left(topic);
        }
        if channel.is_empty() {
            self.channels.write().await.remove(topic);
        }
    }

    pub async fn refresh_claims(&self, connection_id: ConnectionId, topic: &ChannelTopic, claims: Claims) {
        if let Some(channel) = self.channels.read().await.get(topic) {
            channel.refresh_claims(connection_id, claims);
        }
    }

    pub async fn channel(&self, topic: &ChannelTopic) -> Option<Arc<Channel>> {
        self.channels.read().await.get(topic).cloned()
    }

    /// Fire-and-forget ingress for a committed row mutation. Never
    /// blocks: the event is copied onto the change pipeline's internal
    /// queue and this returns immediately (spec.md §4.1, §4.5).
    pub fn notify_change(&self, event: ChangeEvent) {
        self.change_pipeline.notify(event);
    }

    pub async fn stats(&self) -> Stats {
        let connections = self.connections.read().await.len();
        let channels_snapshot: Vec<Arc<Channel>> = self.channels.read().await.values().cloned().collect();
        let per_channel = channels_snapshot
            .iter()
            .map(|c| ChannelStats {
                topic: c.topic.to_string(),
                subscribers: c.subscriber_count(),
                has_presence: c.has_presence(),
            })
            .collect();
        Stats {
            connections,
            channels: channels_snapshot.len(),
            per_channel,
        }
    }

    async fn get_or_create_channel(&self, topic: &ChannelTopic, private: bool) -> Result<(Arc<Channel>, bool), JoinError> {
        {
            let channels = self.channels.read().await;
            if let Some(existing) = channels.get(topic) {
                if existing.private != private {
                    return Err(JoinError::ConflictingVisibility(topic.to_string()));
                }
                return Ok((existing.clone(), false));
            }
        }
        let mut channels = self.channels.write().await;
        // Re-check under the write lock: another joiner may have created
        // it between the read-unlock above and taking the write lock.
        if let Some(existing) = channels.get(topic) {
            if existing.private != private {
                return Err(JoinError::ConflictingVisibility(topic.to_string()));
            }
            return Ok((existing.clone(), false));
        }
        let channel = Arc::new(Channel::new(topic.clone(), private, self.replay_capacity));
        channels.insert(topic.clone(), channel.clone());
        Ok((channel, true))
    }

    async fn remove_if_empty(&self, topic: &ChannelTopic) {
        let mut channels = self.channels.write().await;
        if let Some(channel) = channels.get(topic) {
            if channel.is_empty() {
                channels.remove(topic);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::join_config::JoinConfig;
    use async_trait::async_trait;
    use serde_json::json;

    struct DenyAll;

    #[async_trait]
    impl RlsEngine for DenyAll {
        async fn can_select_row(&self, _: &str, _: &str, _: &serde_json::Value, _: &Claims) -> bool {
            false
        }
        async fn can_select_object(&self, _: &str, _: &Claims) -> bool {
            false
        }
    }

    struct AllowAll;

    #[async_trait]
    impl RlsEngine for AllowAll {
        async fn can_select_row(&self, _: &str, _: &str, _: &serde_json::Value, _: &Claims) -> bool {
            true
        }
        async fn can_select_object(&self, _: &str, _: &Claims) -> bool {
            true
        }
    }

    fn new_connection() -> Arc<Connection> {
        let (conn, _rx) = Connection::new(16, Claims::anonymous());
        Arc::new(conn)
    }

    #[tokio::test]
    async fn register_twice_fails() {
        let hub = Hub::new(Arc::new(AllowAll), 0, Duration::from_secs(1));
        let conn = new_connection();
        hub.register_connection(conn.clone()).await.unwrap();
        assert_eq!(hub.register_connection(conn).await, Err(RegisterError::AlreadyRegistered));
    }

    #[tokio::test]
    async fn unregister_detaches_all_subscriptions_and_empties_channels() {
        let hub = Hub::new(Arc::new(AllowAll), 0, Duration::from_secs(1));
        let conn = new_connection();
        hub.register_connection(conn.clone()).await.unwrap();
        hub.join_channel(
            conn.clone(),
            ChannelTopic::new("realtime:room1"),
            None,
            JoinConfig::parse(&json!({})).unwrap(),
            Claims::anonymous(),
        )
        .await
        .unwrap();
        assert_eq!(hub.stats().await.channels, 1);

        hub.unregister_connection(conn.id()).await;
        let stats = hub.stats().await;
        assert_eq!(stats.connections, 0);
        assert_eq!(stats.channels, 0, "channel must be cleaned up once empty");
    }

    #[tokio::test]
    async fn private_channel_denies_unauthorized_joiner() {
        let hub = Hub::new(Arc::new(DenyAll), 0, Duration::from_secs(1));
        let conn = new_connection();
        hub.register_connection(conn.clone()).await.unwrap();
        let result = hub
            .join_channel(
                conn,
                ChannelTopic::new("realtime:org:99"),
                None,
                JoinConfig::parse(&json!({"config": {"private": true}})).unwrap(),
                Claims::anonymous(),
            )
            .await;
        assert_eq!(result.err(), Some(JoinError::Unauthorized));
        assert_eq!(hub.stats().await.channels, 0, "denied join must not leave a dangling channel");
    }

    #[tokio::test]
    async fn conflicting_visibility_is_first_writer_wins() {
        let hub = Hub::new(Arc::new(AllowAll), 0, Duration::from_secs(1));
        let first = new_connection();
        hub.register_connection(first.clone()).await.unwrap();
        hub.join_channel(
            first,
            ChannelTopic::new("realtime:room1"),
            None,
            JoinConfig::parse(&json!({})).unwrap(), // private: false
            Claims::anonymous(),
        )
        .await
        .unwrap();

        let second = new_connection();
        hub.register_connection(second.clone()).await.unwrap();
        let result = hub
            .join_channel(
                second,
                ChannelTopic::new("realtime:room1"),
                None,
                JoinConfig::parse(&json!({"config": {"private": true}})).unwrap(),
                Claims::anonymous(),
            )
            .await;
        assert!(matches!(result, Err(JoinError::ConflictingVisibility(_))));
    }
}
