//! C2: process-local hot cache. Collapses duplicate fetches within a
//! single request's fan-out without touching disk (spec.md §4.2).
//!
//! Grounded in the pack's `invest-iq` analysis-orchestrator caches
//! (`DashMap<String, CacheEntry<T>>` with a `cached_at` timestamp) — the
//! teacher crate has no process-cache equivalent of its own.

use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

struct CacheEntry<T> {
    data: T,
    cached_at: DateTime<Utc>,
}

pub struct ProcessCache<T: Clone> {
    entries: DashMap<String, CacheEntry<T>>,
    ttl: Duration,
}

impl<T: Clone> ProcessCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self { entries: DashMap::new(), ttl }
    }

    pub fn get(&self, key: &str) -> Option<T> {
        let entry = self.entries.get(key)?;
        let age = Utc::now().signed_duration_since(entry.cached_at);
        if age.num_milliseconds() as u128 > self.ttl.as_millis() {
            return None;
        }
        Some(entry.data.clone())
    }

    pub fn set(&self, key: impl Into<String>, value: T) {
        self.entries.insert(key.into(), CacheEntry { data: value, cached_at: Utc::now() });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_within_ttl() {
        let cache: ProcessCache<i32> = ProcessCache::new(Duration::from_secs(30));
        cache.set("fh_quote_AAPL_2025-11-08", 42);
        assert_eq!(cache.get("fh_quote_AAPL_2025-11-08"), Some(42));
    }

    #[test]
    fn miss_when_absent() {
        let cache: ProcessCache<i32> = ProcessCache::new(Duration::from_secs(30));
        assert_eq!(cache.get("missing"), None);
    }

    #[test]
    fn expires_after_ttl() {
        let cache: ProcessCache<i32> = ProcessCache::new(Duration::from_millis(0));
        cache.set("k", 1);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get("k"), None);
    }
}
