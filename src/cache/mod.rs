pub mod keys;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Serialize;

const TTL_JITTER_RATIO: f64 = 0.1;

struct CacheEntry {
    payload: serde_json::Value,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

/// In-process keyed cache with per-entry TTL. Entries are stored as JSON
/// values so callers stay decoupled from each other's concrete types, the
/// same contract the service layer would get from an external cache.
///
/// An explicitly constructed instance is injected through `AppState`; there
/// is no global. A zero TTL means "no expiry" and the entry lives until it
/// is deleted.
#[derive(Clone)]
pub struct MemoryCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn get<T>(&self, key: &str) -> Option<T>
    where
        T: DeserializeOwned,
    {
        let now = Instant::now();
        {
            let entries = self.entries.read();
            match entries.get(key) {
                Some(entry) if !entry.is_expired(now) => {
                    return serde_json::from_value(entry.payload.clone()).ok();
                }
                Some(_) => {}
                None => return None,
            }
        }
        // Expired entry: drop it so the map does not accumulate dead keys.
        self.entries.write().remove(key);
        None
    }

    pub fn set<T>(&self, key: &str, value: &T, ttl: Duration)
    where
        T: Serialize,
    {
        let payload = match serde_json::to_value(value) {
            Ok(p) => p,
            Err(_) => return,
        };

        let expires_at = if ttl.is_zero() {
            None
        } else {
            Some(Instant::now() + apply_ttl_jitter(ttl))
        };

        self.entries
            .write()
            .insert(key.to_string(), CacheEntry { payload, expires_at });
    }

    pub fn delete(&self, key: &str) {
        self.entries.write().remove(key);
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .values()
            .filter(|entry| !entry.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

fn apply_ttl_jitter(ttl: Duration) -> Duration {
    let base_ms = ttl.as_millis() as f64;
    let mut rng = rand::rng();
    let factor = rng.random_range(1.0 - TTL_JITTER_RATIO..=1.0 + TTL_JITTER_RATIO);
    let jittered_ms = (base_ms * factor).round().max(1.0);
    Duration::from_millis(jittered_ms as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_round_trip() {
        let cache = MemoryCache::new();
        cache.set("k", &vec![1, 2, 3], Duration::from_secs(60));
        let value: Option<Vec<i32>> = cache.get("k");
        assert_eq!(value, Some(vec![1, 2, 3]));
    }

    #[test]
    fn zero_ttl_never_expires() {
        let cache = MemoryCache::new();
        cache.set("plan", &"payload", Duration::ZERO);
        assert_eq!(cache.get::<String>("plan").as_deref(), Some("payload"));
    }

    #[test]
    fn expired_entries_are_misses() {
        let cache = MemoryCache::new();
        cache.set("k", &1_i64, Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(cache.get::<i64>("k"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn delete_removes_entry() {
        let cache = MemoryCache::new();
        cache.set("k", &1_i64, Duration::ZERO);
        cache.delete("k");
        assert_eq!(cache.get::<i64>("k"), None);
    }

    #[test]
    fn mismatched_type_is_a_miss() {
        let cache = MemoryCache::new();
        cache.set("k", &"text", Duration::ZERO);
        assert_eq!(cache.get::<i64>("k"), None);
    }
}
