//! Lightweight counters for downstream-collaborator failures and dropped
//! deliveries (spec.md §7: "per-event drop with metric increment; never
//! propagate to unrelated subscribers"). A `DashMap` keeps increments
//! lock-free under concurrent fan-out, the way the rest of this workspace
//! reaches for `dashmap` instead of another `RwLock<HashMap<_>>` layer
//! when entries are independent counters rather than structural state.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct Metrics {
    counters: DashMap<&'static str, AtomicU64>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self, reason: &'static str) {
        self.counters
            .entry(reason)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self, reason: &'static str) -> u64 {
        self.counters
            .get(reason)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}

pub const DROP_RLS_DENIED: &str = "rls_denied";
