//! Bucket storage for fixed-window counters.
//!
//! [`BucketStore`] is the only shared mutable state in the gate. The limiter
//! talks to it exclusively through [`BucketStore::hit`], which performs the
//! whole reset-or-increment step atomically for one key. Swapping the
//! in-memory store for a shared external counter store only requires another
//! implementation of this trait.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt::Debug;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use super::key::BucketKey;

/// Counter state for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketEntry {
    /// Requests observed in the current window
    pub count: u64,
    /// Instant at which the window resets (exclusive)
    pub window_end: Instant,
}

impl BucketEntry {
    /// A window opened by a single request at `now`.
    pub fn opened_at(now: Instant, window: Duration) -> Self {
        Self {
            count: 1,
            window_end: now + window,
        }
    }

    /// Windows are half-open: a request at exactly `window_end` belongs to
    /// the next window.
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.window_end
    }
}

/// Result of one [`BucketStore::hit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketHit {
    /// Entry state right after this hit was recorded
    pub entry: BucketEntry,
    /// Whether this hit opened a new window
    pub opened_window: bool,
}

/// Storage port for bucket entries.
pub trait BucketStore: Send + Sync + Debug {
    /// Record one request for `key` at `now`.
    ///
    /// If the key is absent or its window has expired, the entry is replaced
    /// with a fresh window holding only this request. Otherwise the count is
    /// incremented in place, but never beyond `cap`. The read and the write
    /// must form one critical section per key.
    fn hit(&self, key: &BucketKey, window: Duration, cap: u64, now: Instant) -> BucketHit;

    /// Current entry for a key, expired or not.
    fn get(&self, key: &BucketKey) -> Option<BucketEntry>;

    /// Remove every entry whose window has ended by `now`.
    ///
    /// Returns the number of entries removed.
    fn sweep(&self, now: Instant) -> usize;

    /// Number of stored entries.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all entries.
    fn clear(&self);
}

/// Process-local store backed by a sharded concurrent map.
///
/// `DashMap::entry` holds the shard's write lock for the lifetime of the
/// entry guard, which is what makes [`BucketStore::hit`] atomic per key.
#[derive(Debug, Default)]
pub struct InMemoryBucketStore {
    buckets: DashMap<BucketKey, BucketEntry>,
}

impl InMemoryBucketStore {
    pub fn new() -> Self {
        Self {
            buckets: DashMap::new(),
        }
    }
}

impl BucketStore for InMemoryBucketStore {
    fn hit(&self, key: &BucketKey, window: Duration, cap: u64, now: Instant) -> BucketHit {
        match self.buckets.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if entry.is_expired(now) {
                    trace!(
                        key = %key,
                        stale_count = entry.count,
                        "Window expired, opening a new one"
                    );
                    *entry = BucketEntry::opened_at(now, window);
                    BucketHit {
                        entry: *entry,
                        opened_window: true,
                    }
                } else {
                    if entry.count < cap {
                        entry.count += 1;
                    }
                    BucketHit {
                        entry: *entry,
                        opened_window: false,
                    }
                }
            }
            Entry::Vacant(vacant) => {
                debug!(key = %key, window_secs = window.as_secs_f64(), "Creating new bucket");
                let entry = *vacant.insert(BucketEntry::opened_at(now, window));
                BucketHit {
                    entry,
                    opened_window: true,
                }
            }
        }
    }

    fn get(&self, key: &BucketKey) -> Option<BucketEntry> {
        self.buckets.get(key).map(|entry| *entry)
    }

    fn sweep(&self, now: Instant) -> usize {
        let mut removed = 0;
        self.buckets.retain(|_, entry| {
            if entry.is_expired(now) {
                removed += 1;
                false
            } else {
                true
            }
        });
        removed
    }

    fn len(&self) -> usize {
        self.buckets.len()
    }

    fn clear(&self) {
        self.buckets.clear();
    }
}
