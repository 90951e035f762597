use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

use super::CacheEntry;

/// Bounded TTL+LRU cache keyed by origin host.
///
/// The map and the recency sequence always hold exactly the same keys;
/// the front of the sequence is the most recently used entry and the
/// back is the eviction candidate. Every operation runs inside one
/// critical section, which is never held across I/O, so operations are
/// linearizable with respect to one another. Keys are compared byte-wise.
pub struct HttpCache {
    inner: Mutex<CacheInner>,
    hits: AtomicU64,
    misses: AtomicU64,
}

struct CacheInner {
    map: HashMap<String, CacheEntry>,
    recency: VecDeque<String>,
    total_bytes: u64,
    max_entries: usize,
    max_bytes: u64,
    default_ttl: Duration,
}

impl CacheInner {
    /// Drop `key` from the map, the recency sequence, and the byte total.
    /// Idempotent.
    fn remove_entry(&mut self, key: &str) {
        if let Some(entry) = self.map.remove(key) {
            if let Some(pos) = self.recency.iter().position(|k| k == key) {
                self.recency.remove(pos);
            }
            self.total_bytes -= entry.size as u64;
        }
    }

    /// Evict the least recently used entry.
    fn evict_back(&mut self) {
        if let Some(key) = self.recency.pop_back() {
            if let Some(entry) = self.map.remove(&key) {
                self.total_bytes -= entry.size as u64;
                debug!("Evicted cache entry: {} ({} bytes)", key, entry.size);
            }
        }
    }

    /// Evict from the back until both caps can hold an incoming entry of
    /// `incoming` bytes. An entry larger than the byte cap arriving into
    /// an empty cache is not blocked here; it is inserted anyway and the
    /// next put evicts it.
    fn evict_to_fit(&mut self, incoming: u64) {
        while (self.map.len() >= self.max_entries
            || self.total_bytes + incoming > self.max_bytes)
            && !self.recency.is_empty()
        {
            self.evict_back();
        }
    }

    /// Move `key` to the front of the recency sequence.
    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.recency.iter().position(|k| k == key) {
            self.recency.remove(pos);
        }
        self.recency.push_front(key.to_string());
    }
}

impl HttpCache {
    pub fn new(max_entries: usize, default_ttl: Duration, max_bytes: u64) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                map: HashMap::new(),
                recency: VecDeque::new(),
                total_bytes: 0,
                max_entries,
                max_bytes,
                default_ttl,
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Look up `key`, returning a copy of the payload on a fresh hit.
    ///
    /// A stale entry is removed and counted as a miss; a hit moves the
    /// key to the front of the recency sequence.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let mut inner = self.inner.lock().unwrap();

        let expired = match inner.map.get(key) {
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            Some(entry) => entry.is_expired(),
        };

        if expired {
            inner.remove_entry(key);
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let payload = inner.map.get(key).map(|entry| entry.payload.clone());
        inner.touch(key);
        self.hits.fetch_add(1, Ordering::Relaxed);
        payload
    }

    /// Insert `payload` under `key`, evicting from the back as needed.
    ///
    /// An existing entry under the same key is replaced. Without a TTL
    /// override the current default TTL applies.
    pub fn put(&self, key: &str, payload: Vec<u8>, ttl: Option<Duration>) {
        let mut inner = self.inner.lock().unwrap();
        let entry = CacheEntry::new(payload, ttl.unwrap_or(inner.default_ttl));

        inner.remove_entry(key);
        inner.evict_to_fit(entry.size as u64);

        if inner.max_entries == 0 {
            debug!("Cache entry limit is zero, discarding entry for {}", key);
            return;
        }

        inner.recency.push_front(key.to_string());
        inner.total_bytes += entry.size as u64;
        debug!("Stored cache entry for {} ({} bytes)", key, entry.size);
        inner.map.insert(key.to_string(), entry);
    }

    /// Delete `key` if present. Idempotent.
    pub fn remove(&self, key: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.remove_entry(key);
    }

    /// Drop every entry and reset the byte total.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.map.clear();
        inner.recency.clear();
        inner.total_bytes = 0;
        info!("Cache cleared");
    }

    /// Update the entry-count cap, evicting from the back until it holds.
    pub fn set_max_entries(&self, max_entries: usize) {
        let mut inner = self.inner.lock().unwrap();
        inner.max_entries = max_entries;
        while inner.map.len() > max_entries && !inner.recency.is_empty() {
            inner.evict_back();
        }
    }

    /// Update the byte cap, evicting from the back until it holds.
    pub fn set_max_size(&self, max_bytes: u64) {
        let mut inner = self.inner.lock().unwrap();
        inner.max_bytes = max_bytes;
        while inner.total_bytes > max_bytes && !inner.recency.is_empty() {
            inner.evict_back();
        }
    }

    /// Update the TTL applied to inserts without an override.
    pub fn set_default_ttl(&self, ttl: Duration) {
        let mut inner = self.inner.lock().unwrap();
        inner.default_ttl = ttl;
    }

    /// Remove every entry whose TTL has elapsed.
    pub fn cleanup_expired(&self) {
        let mut inner = self.inner.lock().unwrap();
        let expired: Vec<String> = inner
            .map
            .iter()
            .filter(|(_, entry)| entry.is_expired())
            .map(|(key, _)| key.clone())
            .collect();

        let count = expired.len();
        for key in expired {
            inner.remove_entry(&key);
        }
        if count > 0 {
            debug!("Cleaned up {} expired cache entries", count);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_bytes(&self) -> u64 {
        self.inner.lock().unwrap().total_bytes
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Hit rate as a percentage; zero when nothing has been looked up.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits();
        let total = hits + self.misses();
        if total == 0 {
            return 0.0;
        }
        hits as f64 / total as f64 * 100.0
    }

    /// Snapshot of the cache state for observability.
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().unwrap();
        CacheStats {
            entry_count: inner.map.len(),
            total_bytes: inner.total_bytes,
            max_entries: inner.max_entries,
            max_bytes: inner.max_bytes,
            hits: self.hits(),
            misses: self.misses(),
        }
    }
}

/// Cache counters and occupancy at one instant.
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub entry_count: usize,
    pub total_bytes: u64,
    pub max_entries: usize,
    pub max_bytes: u64,
    pub hits: u64,
    pub misses: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    const MB: u64 = 1024 * 1024;

    fn test_cache() -> HttpCache {
        HttpCache::new(10, Duration::from_secs(60), MB)
    }

    /// Map and recency must always hold the same keys, and the byte
    /// total must equal the sum of entry sizes.
    fn assert_consistent(cache: &HttpCache) {
        let inner = cache.inner.lock().unwrap();
        assert_eq!(inner.map.len(), inner.recency.len());
        for key in &inner.recency {
            assert!(inner.map.contains_key(key), "recency key {} not in map", key);
        }
        let byte_sum: u64 = inner.map.values().map(|e| e.size as u64).sum();
        assert_eq!(byte_sum, inner.total_bytes);
    }

    #[test]
    fn test_put_and_get() {
        let cache = test_cache();
        cache.put("example.test", b"response-bytes".to_vec(), None);

        assert_eq!(cache.get("example.test"), Some(b"response-bytes".to_vec()));
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 0);
        assert_eq!(cache.total_bytes(), 14);
        assert_consistent(&cache);
    }

    #[test]
    fn test_miss_on_absent_key() {
        let cache = test_cache();
        assert_eq!(cache.get("nope.test"), None);
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn test_expired_entry_is_removed_and_counted_as_miss() {
        let cache = test_cache();
        cache.put("short.test", b"data".to_vec(), Some(Duration::ZERO));
        sleep(Duration::from_millis(10));

        assert_eq!(cache.get("short.test"), None);
        assert_eq!(cache.misses(), 1);
        assert_eq!(cache.hits(), 0);
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.total_bytes(), 0);
        assert_consistent(&cache);
    }

    #[test]
    fn test_put_replaces_existing_entry() {
        let cache = test_cache();
        cache.put("k.test", b"first".to_vec(), None);
        cache.put("k.test", b"second-longer".to_vec(), None);

        assert_eq!(cache.get("k.test"), Some(b"second-longer".to_vec()));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.total_bytes(), 13);
        assert_consistent(&cache);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let cache = test_cache();
        cache.put("k.test", b"data".to_vec(), None);
        cache.remove("k.test");
        cache.remove("k.test");

        assert_eq!(cache.get("k.test"), None);
        assert_eq!(cache.total_bytes(), 0);
        assert_consistent(&cache);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let cache = test_cache();
        cache.put("a.test", b"1".to_vec(), None);
        cache.put("b.test", b"2".to_vec(), None);

        cache.clear();
        cache.clear();
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.total_bytes(), 0);
        assert_consistent(&cache);
    }

    #[test]
    fn test_lru_eviction_by_entry_count() {
        let cache = HttpCache::new(2, Duration::from_secs(3600), MB);
        cache.put("a.test", b"aa".to_vec(), None);
        cache.put("b.test", b"bb".to_vec(), None);
        cache.put("c.test", b"cc".to_vec(), None);

        // a was least recently used and got evicted.
        assert_eq!(cache.get("a.test"), None);
        assert!(cache.get("b.test").is_some());
        assert!(cache.get("c.test").is_some());
        assert_consistent(&cache);

        // Touch b so c becomes the eviction candidate.
        cache.get("b.test");
        cache.put("d.test", b"dd".to_vec(), None);
        assert_eq!(cache.get("c.test"), None);
        assert!(cache.get("b.test").is_some());
        assert!(cache.get("d.test").is_some());
        assert_consistent(&cache);
    }

    #[test]
    fn test_eviction_by_byte_cap() {
        let cache = HttpCache::new(10, Duration::from_secs(3600), 1000);
        cache.put("a.test", vec![0u8; 400], None);
        cache.put("b.test", vec![0u8; 400], None);
        // 400 + 400 + 400 > 1000, so a (the back) must go.
        cache.put("c.test", vec![0u8; 400], None);

        assert_eq!(cache.get("a.test"), None);
        assert!(cache.get("b.test").is_some());
        assert!(cache.total_bytes() <= 1000);
        assert_consistent(&cache);
    }

    #[test]
    fn test_eviction_never_removes_fresh_insert() {
        let cache = HttpCache::new(1, Duration::from_secs(3600), MB);
        cache.put("a.test", b"aa".to_vec(), None);
        cache.put("b.test", b"bb".to_vec(), None);

        assert!(cache.get("b.test").is_some());
        assert_eq!(cache.get("a.test"), None);
    }

    #[test]
    fn test_oversized_entry_into_empty_cache_is_inserted() {
        let cache = HttpCache::new(10, Duration::from_secs(3600), 100);
        cache.put("big.test", vec![0u8; 500], None);

        // Inserted despite exceeding the byte cap.
        assert!(cache.get("big.test").is_some());
        assert_eq!(cache.total_bytes(), 500);

        // The next put evicts it.
        cache.put("small.test", vec![0u8; 10], None);
        assert_eq!(cache.get("big.test"), None);
        assert!(cache.get("small.test").is_some());
        assert_consistent(&cache);
    }

    #[test]
    fn test_zero_entry_limit_discards_every_put() {
        let cache = HttpCache::new(0, Duration::from_secs(3600), MB);
        cache.put("k.test", b"data".to_vec(), None);

        assert_eq!(cache.get("k.test"), None);
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.total_bytes(), 0);
        assert_consistent(&cache);
    }

    #[test]
    fn test_set_max_entries_shrinks_from_the_back() {
        let cache = test_cache();
        for host in ["a.test", "b.test", "c.test", "d.test"] {
            cache.put(host, b"xx".to_vec(), None);
        }

        cache.set_max_entries(2);
        assert_eq!(cache.len(), 2);
        // The two most recently inserted survive.
        assert!(cache.get("c.test").is_some());
        assert!(cache.get("d.test").is_some());
        assert_eq!(cache.get("a.test"), None);
        assert_consistent(&cache);
    }

    #[test]
    fn test_set_max_size_shrinks_from_the_back() {
        let cache = test_cache();
        cache.put("a.test", vec![0u8; 300], None);
        cache.put("b.test", vec![0u8; 300], None);
        cache.put("c.test", vec![0u8; 300], None);

        cache.set_max_size(650);
        assert!(cache.total_bytes() <= 650);
        assert_eq!(cache.get("a.test"), None);
        assert!(cache.get("c.test").is_some());
        assert_consistent(&cache);
    }

    #[test]
    fn test_cleanup_expired_removes_only_stale_entries() {
        let cache = test_cache();
        cache.put("stale.test", b"old".to_vec(), Some(Duration::ZERO));
        cache.put("fresh.test", b"new".to_vec(), Some(Duration::from_secs(60)));
        sleep(Duration::from_millis(10));

        cache.cleanup_expired();
        assert_eq!(cache.len(), 1);
        assert!(cache.get("fresh.test").is_some());
        assert_consistent(&cache);
    }

    #[test]
    fn test_default_ttl_applies_without_override() {
        let cache = HttpCache::new(10, Duration::ZERO, MB);
        cache.put("k.test", b"data".to_vec(), None);
        sleep(Duration::from_millis(10));
        assert_eq!(cache.get("k.test"), None);

        cache.set_default_ttl(Duration::from_secs(60));
        cache.put("k.test", b"data".to_vec(), None);
        assert!(cache.get("k.test").is_some());
    }

    #[test]
    fn test_hit_rate() {
        let cache = test_cache();
        assert_eq!(cache.hit_rate(), 0.0);

        cache.put("k.test", b"data".to_vec(), None);
        cache.get("k.test");
        cache.get("k.test");
        cache.get("absent.test");

        assert_eq!(cache.hits(), 2);
        assert_eq!(cache.misses(), 1);
        assert!((cache.hit_rate() - 66.66).abs() < 1.0);
    }

    #[test]
    fn test_stats_snapshot() {
        let cache = test_cache();
        cache.put("k.test", vec![0u8; 42], None);
        cache.get("k.test");

        let stats = cache.stats();
        assert_eq!(stats.entry_count, 1);
        assert_eq!(stats.total_bytes, 42);
        assert_eq!(stats.max_entries, 10);
        assert_eq!(stats.hits, 1);
    }
}
