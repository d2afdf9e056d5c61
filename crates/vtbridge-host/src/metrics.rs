//! Per-bridge call counters.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub(crate) struct BridgeMetrics {
    create: AtomicU64,
    connect: AtomicU64,
    best_index: AtomicU64,
    cache_hit: AtomicU64,
    cache_miss: AtomicU64,
    open: AtomicU64,
    filter: AtomicU64,
    next: AtomicU64,
    update: AtomicU64,
    error: AtomicU64,
}

/// Which counter a call increments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Counter {
    Create,
    Connect,
    BestIndex,
    CacheHit,
    CacheMiss,
    Open,
    Filter,
    Next,
    Update,
    Error,
}

/// Point-in-time copy of a bridge's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BridgeMetricsSnapshot {
    pub create: u64,
    pub connect: u64,
    pub best_index: u64,
    pub cache_hit: u64,
    pub cache_miss: u64,
    pub open: u64,
    pub filter: u64,
    pub next: u64,
    pub update: u64,
    pub error: u64,
}

impl BridgeMetricsSnapshot {
    pub fn total(&self) -> u64 {
        self.create
            + self.connect
            + self.best_index
            + self.cache_hit
            + self.cache_miss
            + self.open
            + self.filter
            + self.next
            + self.update
            + self.error
    }
}

impl BridgeMetrics {
    fn counter(&self, counter: Counter) -> &AtomicU64 {
        match counter {
            Counter::Create => &self.create,
            Counter::Connect => &self.connect,
            Counter::BestIndex => &self.best_index,
            Counter::CacheHit => &self.cache_hit,
            Counter::CacheMiss => &self.cache_miss,
            Counter::Open => &self.open,
            Counter::Filter => &self.filter,
            Counter::Next => &self.next,
            Counter::Update => &self.update,
            Counter::Error => &self.error,
        }
    }

    pub(crate) fn bump(&self, counter: Counter) {
        self.counter(counter).fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> BridgeMetricsSnapshot {
        BridgeMetricsSnapshot {
            create: self.create.load(Ordering::Relaxed),
            connect: self.connect.load(Ordering::Relaxed),
            best_index: self.best_index.load(Ordering::Relaxed),
            cache_hit: self.cache_hit.load(Ordering::Relaxed),
            cache_miss: self.cache_miss.load(Ordering::Relaxed),
            open: self.open.load(Ordering::Relaxed),
            filter: self.filter.load(Ordering::Relaxed),
            next: self.next.load(Ordering::Relaxed),
            update: self.update.load(Ordering::Relaxed),
            error: self.error.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn reset(&self) {
        for counter in [
            Counter::Create,
            Counter::Connect,
            Counter::BestIndex,
            Counter::CacheHit,
            Counter::CacheMiss,
            Counter::Open,
            Counter::Filter,
            Counter::Next,
            Counter::Update,
            Counter::Error,
        ] {
            self.counter(counter).store(0, Ordering::Relaxed);
        }
    }
}
