//! A small TTL cache for read-mostly values.
//!
//! Constructed once at process start and passed explicitly to whoever needs
//! it; there are no module-level singletons. The server uses it to avoid
//! hitting the settings row on every status poll.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Single-value cache with a time-to-live.
pub struct TtlCache<T> {
    ttl: Duration,
    slot: Mutex<Option<(Instant, T)>>,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: Mutex::new(None),
        }
    }

    /// Returns the cached value if it is still fresh.
    pub fn get(&self) -> Option<T> {
        let slot = self.slot.lock().unwrap();
        match slot.as_ref() {
            Some((stored_at, value)) if stored_at.elapsed() < self.ttl => Some(value.clone()),
            _ => None,
        }
    }

    pub fn put(&self, value: T) {
        let mut slot = self.slot.lock().unwrap();
        *slot = Some((Instant::now(), value));
    }

    /// Drops the cached value so the next read goes to the source.
    pub fn invalidate(&self) {
        let mut slot = self.slot.lock().unwrap();
        *slot = None;
    }
}
