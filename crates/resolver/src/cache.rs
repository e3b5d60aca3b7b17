use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Bounded in-memory TTL cache.
///
/// Purely advisory: entries expire after the configured TTL, expired entries
/// are dropped on read, and the whole map is lost on restart. Correctness is
/// carried by the persistent store, never by this cache.
pub struct TtlCache<K, V> {
    inner: Mutex<HashMap<K, Entry<V>>>,
    ttl: Duration,
    max_entries: usize,
}

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            ttl,
            max_entries,
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock().unwrap();
        match inner.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                inner.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: K, value: V) {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();

        if inner.len() >= self.max_entries && !inner.contains_key(&key) {
            inner.retain(|_, e| e.expires_at > now);
            // Still full after dropping expired entries: evict whatever dies soonest
            if inner.len() >= self.max_entries {
                if let Some(oldest) = inner
                    .iter()
                    .min_by_key(|(_, e)| e.expires_at)
                    .map(|(k, _)| k.clone())
                {
                    inner.remove(&oldest);
                }
            }
        }

        inner.insert(
            key,
            Entry {
                value,
                expires_at: now + self.ttl,
            },
        );
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }
}
