//! Context Store — bounded, append-only episode memory shared by every call.
//!
//! A ring buffer behind an `RwLock`. Appends hold the write lock for one
//! push (plus at most one eviction), which gives a total order across
//! concurrent orchestration calls. Readers clone the `Arc`s under the read
//! lock and do all scoring after releasing it.

use std::collections::VecDeque;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use super::episode::Episode;
use super::retrieval;
use crate::telemetry::STORE_TARGET;

/// Shared handle to the store.
pub type SharedContextStore = Arc<ContextStore>;

#[derive(Debug, Default)]
struct Buffer {
    episodes: VecDeque<Arc<Episode>>,
    next_seq: u64,
    evicted: u64,
}

/// Bounded episode memory with oldest-first eviction.
#[derive(Debug)]
pub struct ContextStore {
    capacity: usize,
    buffer: RwLock<Buffer>,
}

impl ContextStore {
    /// Create a store holding at most `capacity` episodes (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            buffer: RwLock::new(Buffer {
                episodes: VecDeque::with_capacity(capacity),
                next_seq: 1,
                evicted: 0,
            }),
        }
    }

    // The buffer is never left half-mutated, so a poisoned lock is safe to reuse.
    fn read(&self) -> RwLockReadGuard<'_, Buffer> {
        self.buffer.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Buffer> {
        self.buffer.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an episode, evicting the oldest one if the store is full.
    ///
    /// Assigns and returns the episode's `seq`. Confidence is clamped to
    /// [0, 1] and an episode without a selected provider is stored as a
    /// failure.
    pub fn append(&self, mut episode: Episode) -> u64 {
        episode.normalize();

        let mut buffer = self.write();
        let seq = buffer.next_seq;
        buffer.next_seq += 1;
        episode.seq = seq;

        if buffer.episodes.len() >= self.capacity {
            if let Some(evicted) = buffer.episodes.pop_front() {
                buffer.evicted += 1;
                debug!(
                    target: STORE_TARGET,
                    evicted_seq = evicted.seq,
                    evicted_id = %evicted.id,
                    capacity = self.capacity,
                    "StoreCapacityEviction"
                );
            }
        }
        buffer.episodes.push_back(Arc::new(episode));
        seq
    }

    /// All episodes, oldest first.
    pub fn snapshot(&self) -> Vec<Arc<Episode>> {
        self.read().episodes.iter().cloned().collect()
    }

    /// The `limit` most recent episodes, newest first.
    pub fn recent_assessments(&self, limit: usize) -> Vec<Arc<Episode>> {
        self.read().episodes.iter().rev().take(limit).cloned().collect()
    }

    /// Relevance-ranked episodes for `query`; see [`retrieval`].
    pub fn retrieve(&self, query: &str, limit: usize) -> Vec<Arc<Episode>> {
        let snapshot = self.snapshot();
        retrieval::rank(&snapshot, query, limit)
    }

    /// Look up an episode by id.
    pub fn get(&self, id: &str) -> Option<Arc<Episode>> {
        self.read().episodes.iter().find(|e| e.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().episodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().episodes.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Episodes evicted by rotation since creation.
    pub fn evicted_count(&self) -> u64 {
        self.read().evicted
    }

    /// Drop every episode. Sequence numbers keep increasing afterwards.
    pub fn reset(&self) {
        let mut buffer = self.write();
        let cleared = buffer.episodes.len();
        buffer.episodes.clear();
        debug!(target: STORE_TARGET, cleared, "Context store reset");
    }
}

impl Default for ContextStore {
    fn default() -> Self {
        Self::new(1_000)
    }
}
