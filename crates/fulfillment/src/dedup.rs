//! In-process set of orders already handed to the event channel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use common::OrderId;

/// Remembers which orders this process has published.
///
/// Entries are added before the publish and removed again if it fails, so
/// two overlapping feed ticks never publish the same order twice. The set is
/// not durable; the durable marker is `Order::published_at`.
///
/// Cloning shares the underlying set.
#[derive(Debug, Clone, Default)]
pub struct PublishDeduplicator {
    marks: Arc<Mutex<HashMap<OrderId, Instant>>>,
    ttl: Option<Duration>,
}

impl PublishDeduplicator {
    /// Creates a set whose entries live for the whole process.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a set whose entries expire after `ttl`.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            marks: Arc::default(),
            ttl: Some(ttl),
        }
    }

    /// Marks an order. Returns true if it was not marked yet.
    pub fn mark_if_absent(&self, id: &OrderId) -> bool {
        let mut marks = self.lock();
        if marks.contains_key(id) {
            return false;
        }
        marks.insert(id.clone(), Instant::now());
        true
    }

    /// Removes a mark so a later tick may publish the order again.
    pub fn unmark(&self, id: &OrderId) {
        self.lock().remove(id);
    }

    pub fn contains(&self, id: &OrderId) -> bool {
        self.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drops entries older than the TTL and returns how many went.
    ///
    /// A no-op without a TTL.
    pub fn evict_expired(&self) -> usize {
        let Some(ttl) = self.ttl else {
            return 0;
        };
        let mut marks = self.lock();
        let before = marks.len();
        marks.retain(|_, marked_at| marked_at.elapsed() < ttl);
        before - marks.len()
    }

    // A panic while holding the lock cannot leave the map half-updated.
    fn lock(&self) -> MutexGuard<'_, HashMap<OrderId, Instant>> {
        self.marks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
