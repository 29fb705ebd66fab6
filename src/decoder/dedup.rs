//! Short-lived duplicate frame suppression.
//!
//! Mirrored capture points often deliver the same frame twice within a few
//! hundred milliseconds. Entries live for a fixed TTL of capture time from
//! insertion and the cache is bounded by the total bytes of stored
//! fingerprints.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

pub const DEFAULT_TTL: Duration = Duration::from_millis(400);
pub const DEFAULT_CAPACITY_BYTES: usize = 20 * 1024 * 1024;

/// Capture time elapsed since `earlier`. Out-of-order timestamps count as no
/// time at all.
fn age(now: SystemTime, earlier: SystemTime) -> Duration {
    now.duration_since(earlier).unwrap_or(Duration::ZERO)
}

#[derive(Debug, Default)]
struct DedupState {
    entries: HashMap<Arc<[u8]>, SystemTime>,
    /// Insertion order, oldest first. An entry whose timestamp no longer
    /// matches `entries` was refreshed or removed and is skipped.
    order: VecDeque<(Arc<[u8]>, SystemTime)>,
    bytes: usize,
}

impl DedupState {
    fn pop_oldest(&mut self) -> bool {
        while let Some((key, inserted)) = self.order.pop_front() {
            if self.entries.get(&key) == Some(&inserted) {
                self.entries.remove(&key);
                self.bytes -= key.len();
                return true;
            }
        }
        false
    }

    fn expire(&mut self, now: SystemTime, ttl: Duration) {
        while let Some((key, inserted)) = self.order.front() {
            if age(now, *inserted) < ttl {
                break;
            }
            if self.entries.get(key) == Some(inserted) {
                self.bytes -= key.len();
                self.entries.remove(key);
            }
            self.order.pop_front();
        }
    }
}

/// Fingerprint cache keyed on frame bytes. Every call takes the capture
/// timestamp of the frame at hand, so replayed traffic expires the same way
/// live traffic does.
#[derive(Debug)]
pub struct DedupCache {
    state: Mutex<DedupState>,
    ttl: Duration,
    capacity_bytes: usize,
}

impl DedupCache {
    pub fn new(ttl: Duration, capacity_bytes: usize) -> Self {
        Self {
            state: Mutex::new(DedupState::default()),
            ttl,
            capacity_bytes,
        }
    }

    pub fn seen(&self, fingerprint: &[u8], now: SystemTime) -> bool {
        let state = self.state.lock();
        state
            .entries
            .get(fingerprint)
            .is_some_and(|inserted| age(now, *inserted) < self.ttl)
    }

    pub fn remember(&self, fingerprint: &[u8], now: SystemTime) {
        let mut state = self.state.lock();
        self.insert_locked(&mut state, fingerprint, now);
    }

    /// True when the fingerprint was already present; otherwise stores it.
    pub fn check_and_remember(&self, fingerprint: &[u8], now: SystemTime) -> bool {
        let mut state = self.state.lock();
        state.expire(now, self.ttl);
        if state.entries.contains_key(fingerprint) {
            return true;
        }
        self.insert_locked(&mut state, fingerprint, now);
        false
    }

    /// Drop entries older than the TTL as of capture time `now`
    pub fn purge_expired(&self, now: SystemTime) {
        self.state.lock().expire(now, self.ttl);
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes currently held by fingerprints
    pub fn bytes(&self) -> usize {
        self.state.lock().bytes
    }

    fn insert_locked(&self, state: &mut DedupState, fingerprint: &[u8], now: SystemTime) {
        if fingerprint.len() > self.capacity_bytes {
            return;
        }
        state.expire(now, self.ttl);

        let key: Arc<[u8]> = Arc::from(fingerprint);
        // On refresh the previous order slot goes stale
        if state.entries.insert(key.clone(), now).is_none() {
            state.bytes += key.len();
        }
        state.order.push_back((key, now));

        while state.bytes > self.capacity_bytes {
            if !state.pop_oldest() {
                break;
            }
        }
    }
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_CAPACITY_BYTES)
    }
}
