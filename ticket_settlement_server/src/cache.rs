//! TTL cache for checkout links.
//!
//! Checkout links are short-lived and purely derivable (session id → signed token → URL), so
//! they live in a process-local cache behind a small trait rather than in the database. The
//! trait seam exists so a multi-instance deployment can drop in a shared store without touching
//! the routes.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use chrono::{DateTime, Duration, Utc};
use log::*;

pub trait CacheStore: Clone + Send + Sync {
    /// Store `value` under `key` for `ttl`. Overwrites any existing entry.
    fn put(&self, key: &str, value: &str, ttl: Duration);
    /// Fetch a live entry. Expired entries are never returned.
    fn get(&self, key: &str) -> Option<String>;
    fn remove(&self, key: &str) -> Option<String>;
    /// Drop every expired entry, returning how many were dropped.
    fn sweep(&self, now: DateTime<Utc>) -> usize;
}

#[derive(Clone, Default)]
pub struct MemoryCache {
    entries: Arc<Mutex<HashMap<String, (String, DateTime<Utc>)>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, (String, DateTime<Utc>)>> {
        // a poisoned cache mutex means a panic mid-insert; the map itself is still consistent
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl CacheStore for MemoryCache {
    fn put(&self, key: &str, value: &str, ttl: Duration) {
        self.lock().insert(key.to_string(), (value.to_string(), Utc::now() + ttl));
    }

    fn get(&self, key: &str) -> Option<String> {
        let guard = self.lock();
        match guard.get(key) {
            Some((value, expires_at)) if *expires_at > Utc::now() => Some(value.clone()),
            _ => None,
        }
    }

    fn remove(&self, key: &str) -> Option<String> {
        self.lock().remove(key).map(|(value, _)| value)
    }

    fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut guard = self.lock();
        let before = guard.len();
        guard.retain(|_, (_, expires_at)| *expires_at > now);
        before - guard.len()
    }
}

//---------------------------------------  CheckoutLinkStore  ---------------------------------------------------------

/// The checkout-link cache: order session id → checkout URL (with its signed token).
#[derive(Clone)]
pub struct CheckoutLinkStore<C: CacheStore> {
    cache: C,
    ttl: Duration,
}

impl<C: CacheStore> CheckoutLinkStore<C> {
    pub fn new(cache: C, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    fn key(order_session_id: &str) -> String {
        format!("checkout_link:{order_session_id}")
    }

    pub fn put_link(&self, order_session_id: &str, url: &str) {
        self.cache.put(&Self::key(order_session_id), url, self.ttl);
    }

    pub fn link_for(&self, order_session_id: &str) -> Option<String> {
        self.cache.get(&Self::key(order_session_id))
    }

    pub fn remove_link(&self, order_session_id: &str) {
        self.cache.remove(&Self::key(order_session_id));
    }

    pub fn sweep(&self, now: DateTime<Utc>) {
        let dropped = self.cache.sweep(now);
        if dropped > 0 {
            debug!("🗂️ Dropped {dropped} expired checkout links from the cache");
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn entries_live_until_their_ttl() {
        let cache = MemoryCache::new();
        cache.put("k", "v", Duration::minutes(5));
        assert_eq!(cache.get("k"), Some("v".to_string()));
        assert_eq!(cache.remove("k"), Some("v".to_string()));
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn expired_entries_are_invisible() {
        let cache = MemoryCache::new();
        cache.put("k", "v", Duration::seconds(-1));
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn sweep_drops_only_expired_entries() {
        let cache = MemoryCache::new();
        cache.put("dead", "v", Duration::seconds(-1));
        cache.put("live", "v", Duration::minutes(5));
        assert_eq!(cache.sweep(Utc::now()), 1);
        assert_eq!(cache.get("live"), Some("v".to_string()));
    }

    #[test]
    fn link_store_keys_by_session() {
        let store = CheckoutLinkStore::new(MemoryCache::new(), Duration::minutes(5));
        store.put_link("os-1", "https://pay.example/t1");
        store.put_link("os-2", "https://pay.example/t2");
        assert_eq!(store.link_for("os-1"), Some("https://pay.example/t1".to_string()));
        store.remove_link("os-1");
        assert_eq!(store.link_for("os-1"), None);
        assert_eq!(store.link_for("os-2"), Some("https://pay.example/t2".to_string()));
    }
}
