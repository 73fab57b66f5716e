//! Response cache (§5): an optional, small in-memory TTL map guarding the
//! `GET /agents` read path. Grounded in the gateway's `RateLimiter`, which
//! holds its mutable state behind a single `std::sync::Mutex<HashMap<..>>`
//! guarded by short, synchronous critical sections — the same shape here,
//! without the persistence layer a rate limiter needs and a response cache
//! does not.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Entry {
    value: serde_json::Value,
    expires_at: Instant,
}

/// Keyed by the raw query string of a `GET /agents` request. Disabled
/// entirely (`enabled: false`) reduces every operation to a no-op so callers
/// never need to branch on whether caching is on.
pub struct ResponseCache {
    enabled: bool,
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl ResponseCache {
    pub fn new(enabled: bool, ttl_secs: u64) -> Self {
        Self {
            enabled,
            ttl: Duration::from_secs(ttl_secs),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn disabled() -> Self {
        Self::new(false, 0)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        if !self.enabled {
            return None;
        }
        let mut entries = self.entries.lock().expect("cache mutex poisoned");
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, key: String, value: serde_json::Value) {
        if !self.enabled {
            return;
        }
        let mut entries = self.entries.lock().expect("cache mutex poisoned");
        entries.insert(
            key,
            Entry {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Every registration mutates the set of agents/capabilities a listing
    /// could reflect, so the whole cache is dropped rather than tracking
    /// per-key dependencies (§5: "registrations invalidate all cache
    /// entries").
    pub fn invalidate_all(&self) {
        if !self.enabled {
            return;
        }
        self.entries.lock().expect("cache mutex poisoned").clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_cache_never_returns_a_hit() {
        let cache = ResponseCache::new(false, 60);
        cache.put("k".to_string(), serde_json::json!({"a": 1}));
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn enabled_cache_returns_a_hit_until_invalidated() {
        let cache = ResponseCache::new(true, 60);
        cache.put("k".to_string(), serde_json::json!({"a": 1}));
        assert!(cache.get("k").is_some());

        cache.invalidate_all();
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn expired_entry_is_treated_as_a_miss() {
        let cache = ResponseCache::new(true, 0);
        cache.put("k".to_string(), serde_json::json!({"a": 1}));
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("k").is_none());
    }
}
