//! C3 — shared state for one topic across all its subscribers. Exposes
//! no I/O of its own; every outbound frame goes through a subscriber's
//! `Connection::enqueue`, which is non-blocking (spec.md §4.3).
//!
//! Grounded on the get-or-create `ChannelManager`/`Channel` shape of the
//! `supabase-compat` reference server, generalized with the broadcast
//! fan-out, replay buffer, and presence slot spec.md §3/§4.3 describe.

use crate::connection::Connection;
use crate::presence::{Meta, Presence};
use realtime_common::{ChangeEvent, ChangeFilterSpec, ChannelTopic, Claims, ConnectionId, JoinRef, Message};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::sync::Arc;

/// One (connection, channel) binding. Owned by the channel's subscriber
/// map; referenced by connection id from `Connection::joined_topics`,
/// never the reverse (spec.md §9).
struct Subscription {
    connection: Arc<Connection>,
    join_ref: JoinRef,
    broadcast_self: bool,
    broadcast_ack: bool,
    presence_key: Option<String>,
    filters: Vec<ChangeFilterSpec>,
    claims: Claims,
}

struct ChannelState {
    subscribers: HashMap<ConnectionId, Subscription>,
    presence: Presence,
    replay: VecDeque<Message>,
}

/// A candidate delivery the change pipeline still has to authorize with
/// the RLS engine before enqueueing — collected under the channel lock,
/// then released so the (potentially async) RLS call never runs while
/// holding it.
pub struct MatchCandidate {
    pub connection: Arc<Connection>,
    pub claims: Claims,
    pub join_ref: JoinRef,
}

pub struct Channel {
    pub topic: ChannelTopic,
    pub private: bool,
    replay_capacity: usize,
    state: Mutex<ChannelState>,
    subscriber_count: AtomicUsize,
    presence_subscriber_count: AtomicUsize,
    has_replay: AtomicBool,
}

pub struct JoinedSubscriptionInfo {
    pub presence_enabled: bool,
    pub presence_snapshot: Option<Value>,
    pub accepted_filters: usize,
}

impl Channel {
    pub fn new(topic: ChannelTopic, private: bool, replay_capacity: usize) -> Self {
        Self {
            topic,
            private,
            replay_capacity,
            state: Mutex::new(ChannelState {
                subscribers: HashMap::new(),
                presence: Presence::new(),
                replay: VecDeque::new(),
            }),
            subscriber_count: AtomicUsize::new(0),
            presence_subscriber_count: AtomicUsize::new(0),
            has_replay: AtomicBool::new(replay_capacity > 0),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriber_count.load(Ordering::Relaxed)
    }

    pub fn has_presence(&self) -> bool {
        self.presence_subscriber_count.load(Ordering::Relaxed) > 0
    }

    pub fn is_empty(&self) -> bool {
        self.subscriber_count() == 0
    }

    /// Installs a subscription. Returns the `presence_state` snapshot to
    /// push immediately after the `phx_reply{status:ok}`, iff this
    /// subscriber configured presence (spec.md §4.4: sent only once, on
    /// join).
    pub fn join(
        &self,
        connection: Arc<Connection>,
        join_ref: JoinRef,
        broadcast_self: bool,
        broadcast_ack: bool,
        presence_key: Option<String>,
        filters: Vec<ChangeFilterSpec>,
        claims: Claims,
    ) -> JoinedSubscriptionInfo {
        let mut state = self.state.lock().unwrap();
        let presence_enabled = presence_key.is_some();
        let accepted_filters = filters.len();
        let connection_id = connection.id();
        state.subscribers.insert(
            connection_id,
            Subscription {
                connection,
                join_ref,
                broadcast_self,
                broadcast_ack,
                presence_key,
                filters,
                claims,
            },
        );
        self.subscriber_count.fetch_add(1, Ordering::Relaxed);
        if presence_enabled {
            self.presence_subscriber_count.fetch_add(1, Ordering::Relaxed);
        }
        let presence_snapshot = presence_enabled.then(|| state.presence.snapshot());
        JoinedSubscriptionInfo {
            presence_enabled,
            presence_snapshot,
            accepted_filters,
        }
    }

    /// Removes a subscription and purges any presence metas it owned,
    /// returning a `presence_diff` push for the remaining subscribers if
    /// anything was purged.
    pub fn leave(&self, connection_id: ConnectionId) -> Option<Message> {
        let mut state = self.state.lock().unwrap();
        let Some(sub) = state.subscribers.remove(&connection_id) else {
            return None;
        };
        self.subscriber_count.fetch_sub(1, Ordering::Relaxed);
        if sub.presence_key.is_some() {
            self.presence_subscriber_count.fetch_sub(1, Ordering::Relaxed);
        }
        let removed = state.presence.purge_connection(connection_id);
        if removed.is_empty() {
            return None;
        }
        let leaves: Vec<(&str, &Meta)> = removed.iter().map(|(k, m)| (k.as_str(), m)).collect();
        let payload = Presence::diff_payload(&[], &leaves);
        let message = Message::push(self.topic.as_str(), realtime_common::message::EVENT_PRESENCE_DIFF, payload, None);
        self.fan_out_to_presence_subscribers(&state, &message);
        Some(message)
    }

    /// Re-evaluates authorization for future deliveries on an
    /// `access_token` refresh (spec.md §4.2, §9 "Claims refresh").
    pub fn refresh_claims(&self, connection_id: ConnectionId, claims: Claims) {
        let mut state = self.state.lock().unwrap();
        if let Some(sub) = state.subscribers.get_mut(&connection_id) {
            sub.claims = claims;
        }
    }

    /// Broadcast fan-out (spec.md §4.3). Builds the frame once, enqueues
    /// on every subscriber per the `self` rule, appends to the replay
    /// ring if configured, and reports whether the author wants an ack
    /// reply (sent by the caller after this returns, since this method
    /// never does I/O beyond the non-blocking enqueue).
    pub fn broadcast(&self, from: ConnectionId, event: &str, payload: Value) -> bool {
        let frame_payload = json!({ "type": "broadcast", "event": event, "payload": payload });
        let message = Message::push(self.topic.as_str(), realtime_common::message::EVENT_BROADCAST, frame_payload, None);

        let mut state = self.state.lock().unwrap();
        let mut wants_ack = false;
        for (connection_id, sub) in state.subscribers.iter() {
            if *connection_id == from {
                wants_ack = sub.broadcast_ack;
                if !sub.broadcast_self {
                    continue;
                }
            }
            let _ = sub.connection.enqueue(message.clone());
        }
        if self.has_replay.load(Ordering::Relaxed) {
            if state.replay.len() == self.replay_capacity {
                state.replay.pop_front();
            }
            state.replay.push_back(message);
        }
        wants_ack
    }

    pub fn track_presence(&self, connection_id: ConnectionId, key: &str, payload: Value) {
        let mut state = self.state.lock().unwrap();
        let meta = state.presence.track(connection_id, key, payload);
        let joins = [(key, &meta)];
        let message = Message::push(
            self.topic.as_str(),
            realtime_common::message::EVENT_PRESENCE_DIFF,
            Presence::diff_payload(&joins, &[]),
            None,
        );
        self.fan_out_to_presence_subscribers(&state, &message);
    }

    /// The presence key a subscriber registered at join time, if any —
    /// the transport layer looks this up rather than trusting a key
    /// resupplied on a `presence` frame.
    pub fn presence_key_of(&self, connection_id: ConnectionId) -> Option<String> {
        self.state.lock().unwrap().subscribers.get(&connection_id).and_then(|s| s.presence_key.clone())
    }

    pub fn untrack_presence(&self, connection_id: ConnectionId, key: &str) {
        let mut state = self.state.lock().unwrap();
        let removed = state.presence.untrack(connection_id, key);
        if removed.is_empty() {
            return;
        }
        let leaves: Vec<(&str, &Meta)> = removed.iter().map(|m| (key, m)).collect();
        let message = Message::push(
            self.topic.as_str(),
            realtime_common::message::EVENT_PRESENCE_DIFF,
            Presence::diff_payload(&[], &leaves),
            None,
        );
        self.fan_out_to_presence_subscribers(&state, &message);
    }

    fn fan_out_to_presence_subscribers(&self, state: &ChannelState, message: &Message) {
        for sub in state.subscribers.values() {
            if sub.presence_key.is_some() {
                let _ = sub.connection.enqueue(message.clone());
            }
        }
    }

    /// Candidates whose registered filters match `event` — RLS
    /// authorization happens separately so matching can never
    /// short-circuit around it (spec.md §4.5).
    pub fn matching_subscriptions(&self, event: &ChangeEvent) -> Vec<MatchCandidate> {
        let state = self.state.lock().unwrap();
        state
            .subscribers
            .values()
            .filter(|sub| sub.filters.iter().any(|f| f.matches(event)))
            .map(|sub| MatchCandidate {
                connection: sub.connection.clone(),
                claims: sub.claims.clone(),
                join_ref: sub.join_ref.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use realtime_common::Claims as RtClaims;

    fn new_connection() -> (Arc<Connection>, tokio::sync::mpsc::Receiver<Message>) {
        let (conn, rx) = Connection::new(16, RtClaims::anonymous());
        (Arc::new(conn), rx)
    }

    #[tokio::test]
    async fn broadcast_respects_self_flag() {
        let channel = Channel::new(ChannelTopic::new("realtime:room1"), false, 0);
        let (x, mut x_rx) = new_connection();
        let (y, mut y_rx) = new_connection();
        channel.join(x.clone(), None, true, false, None, vec![], RtClaims::anonymous());
        channel.join(y.clone(), None, false, false, None, vec![], RtClaims::anonymous());

        channel.broadcast(x.id(), "msg", json!({"n": 1}));

        assert!(x_rx.try_recv().is_ok(), "X opted into self and should receive its own broadcast");
        assert!(y_rx.try_recv().is_ok(), "Y should receive X's broadcast");
        assert!(y_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn broadcast_ack_flag_is_reported_to_caller() {
        let channel = Channel::new(ChannelTopic::new("realtime:room1"), false, 0);
        let (x, _rx) = new_connection();
        channel.join(x.clone(), None, false, true, None, vec![], RtClaims::anonymous());
        let wants_ack = channel.broadcast(x.id(), "msg", json!({}));
        assert!(wants_ack);
    }

    #[tokio::test]
    async fn leave_purges_presence_and_emits_diff() {
        let channel = Channel::new(ChannelTopic::new("realtime:chat"), false, 0);
        let (actor, _actor_rx) = new_connection();
        let (observer, mut observer_rx) = new_connection();
        channel.join(actor.clone(), None, false, false, Some("user-42".to_string()), vec![], RtClaims::anonymous());
        channel.join(observer.clone(), None, false, false, Some("user-42".to_string()), vec![], RtClaims::anonymous());
        channel.track_presence(actor.id(), "user-42", json!({"tab": 1}));
        observer_rx.try_recv().unwrap(); // drain the join diff

        let diff = channel.leave(actor.id());
        assert!(diff.is_some());
        assert!(observer_rx.try_recv().is_ok());
    }
}
