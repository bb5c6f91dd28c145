//! C2 — one client's framed transport. This crate is transport-agnostic:
//! `Connection` owns the bookkeeping (outbound queue, claims, heartbeat
//! deadline, shutdown signal) that spec.md §4.2 assigns to the
//! connection; the actual socket read/write loops live in `realtime-api`,
//! the way `jtjenkins-Together`'s `handle_socket` splits a raw
//! `WebSocket` into `ws_sender`/`ws_receiver` and drives them with an
//! `mpsc` pair — here that pair is this struct's outbound queue, and the
//! split is across a crate boundary instead of two spawned tasks in the
//! same function.

use realtime_common::{ChannelTopic, ConnectionId, Message};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

/// Snapshot of a connection's traffic counters, fed into `Hub::Stats()`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConnectionStats {
    pub messages_in: u64,
    pub messages_out: u64,
    pub drops: u64,
}

pub struct Connection {
    id: ConnectionId,
    outbound_tx: mpsc::Sender<Message>,
    claims: RwLock<realtime_common::Claims>,
    /// Topics this connection currently holds a subscription on — the
    /// "subscription set owned by the connection" that unregister walks
    /// to call back into channels (spec.md §9 "Cyclic references").
    joined_topics: StdMutex<HashSet<ChannelTopic>>,
    last_heard: StdMutex<Instant>,
    cancel: CancellationToken,
    shutdown_reason: StdMutex<Option<realtime_common::ShutdownReason>>,
    messages_in: AtomicU64,
    messages_out: AtomicU64,
    drops: AtomicU64,
}

impl Connection {
    /// Creates a connection with a bounded outbound queue of `capacity`
    /// frames, returning the owning handle and the receiver the write
    /// loop drains. Enqueue is non-blocking by contract (spec.md §4.2):
    /// producers must never block on a slow client.
    pub fn new(capacity: usize, claims: realtime_common::Claims) -> (Self, mpsc::Receiver<Message>) {
        let (outbound_tx, outbound_rx) = mpsc::channel(capacity.max(1));
        let conn = Self {
            id: ConnectionId::new(),
            outbound_tx,
            claims: RwLock::new(claims),
            joined_topics: StdMutex::new(HashSet::new()),
            last_heard: StdMutex::new(Instant::now()),
            cancel: CancellationToken::new(),
            shutdown_reason: StdMutex::new(None),
            messages_in: AtomicU64::new(0),
            messages_out: AtomicU64::new(0),
            drops: AtomicU64::new(0),
        };
        (conn, outbound_rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Enqueue a frame for delivery. Never blocks: a full queue marks
    /// this connection a slow consumer and schedules it for shutdown
    /// rather than waiting for room (spec.md §4.2, §7).
    pub fn enqueue(&self, message: Message) -> Result<(), SlowConsumer> {
        match self.outbound_tx.try_send(message) {
            Ok(()) => {
                self.messages_out.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.drops.fetch_add(1, Ordering::Relaxed);
                self.initiate_shutdown(realtime_common::ShutdownReason::SlowConsumer);
                Err(SlowConsumer)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.drops.fetch_add(1, Ordering::Relaxed);
                Err(SlowConsumer)
            }
        }
    }

    pub fn record_inbound(&self) {
        self.messages_in.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> ConnectionStats {
        ConnectionStats {
            messages_in: self.messages_in.load(Ordering::Relaxed),
            messages_out: self.messages_out.load(Ordering::Relaxed),
            drops: self.drops.load(Ordering::Relaxed),
        }
    }

    pub async fn claims(&self) -> realtime_common::Claims {
        self.claims.read().await.clone()
    }

    pub async fn set_claims(&self, claims: realtime_common::Claims) {
        *self.claims.write().await = claims;
    }

    pub fn touch_heartbeat(&self) {
        *self.last_heard.lock().unwrap() = Instant::now();
    }

    pub fn is_heartbeat_timed_out(&self, timeout: Duration) -> bool {
        self.last_heard.lock().unwrap().elapsed() > timeout
    }

    pub fn mark_joined(&self, topic: ChannelTopic) {
        self.joined_topics.lock().unwrap().insert(topic);
    }

    pub fn mark_left(&self, topic: &ChannelTopic) {
        self.joined_topics.lock().unwrap().remove(topic);
    }

    /// The topics this connection must be detached from on unregister.
    pub fn joined_topics_snapshot(&self) -> Vec<ChannelTopic> {
        self.joined_topics.lock().unwrap().iter().cloned().collect()
    }

    /// Idempotent: returns `true` only for the call that actually
    /// transitioned the connection into shutdown. Safe to call
    /// concurrently from the read path, the write path, the heartbeat
    /// sweep, and hub-initiated unregister alike (spec.md §4.2).
    pub fn initiate_shutdown(&self, reason: realtime_common::ShutdownReason) -> bool {
        let mut slot = self.shutdown_reason.lock().unwrap();
        if slot.is_some() {
            return false;
        }
        *slot = Some(reason);
        drop(slot);
        self.cancel.cancel();
        true
    }

    pub fn shutdown_reason(&self) -> Option<realtime_common::ShutdownReason> {
        *self.shutdown_reason.lock().unwrap()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once this connection has been told to shut down, for
    /// either read or write loop to select on alongside their own I/O.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlowConsumer;

#[cfg(test)]
mod tests {
    use super::*;
    use realtime_common::Claims;
    use serde_json::json;

    #[tokio::test]
    async fn enqueue_beyond_capacity_marks_slow_consumer() {
        let (conn, mut rx) = Connection::new(2, Claims::anonymous());
        assert!(conn.enqueue(Message::push("realtime:r1", "broadcast", json!({}), None)).is_ok());
        assert!(conn.enqueue(Message::push("realtime:r1", "broadcast", json!({}), None)).is_ok());
        // Third enqueue overflows the capacity-2 bound.
        assert!(conn.enqueue(Message::push("realtime:r1", "broadcast", json!({}), None)).is_err());
        assert_eq!(conn.shutdown_reason(), Some(realtime_common::ShutdownReason::SlowConsumer));
        rx.close();
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let (conn, _rx) = Connection::new(8, Claims::anonymous());
        assert!(conn.initiate_shutdown(realtime_common::ShutdownReason::Transport));
        assert!(!conn.initiate_shutdown(realtime_common::ShutdownReason::HeartbeatTimeout));
        assert_eq!(conn.shutdown_reason(), Some(realtime_common::ShutdownReason::Transport));
    }

    #[tokio::test]
    async fn heartbeat_timeout_detection() {
        let (conn, _rx) = Connection::new(8, Claims::anonymous());
        assert!(!conn.is_heartbeat_timed_out(Duration::from_secs(30)));
        assert!(conn.is_heartbeat_timed_out(Duration::from_millis(0)));
    }
}
