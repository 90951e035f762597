use cachet::cache::HttpCache;
use std::sync::Arc;
use std::time::Duration;

const MB: u64 = 1024 * 1024;

/// Cache edge cases and boundary conditions exercised through the
/// public API.
mod cache_edge_tests {
    use super::*;

    #[test]
    fn test_put_remove_get_misses() {
        let cache = HttpCache::new(10, Duration::from_secs(60), MB);
        cache.put("k.test", b"payload".to_vec(), None);
        cache.remove("k.test");
        assert_eq!(cache.get("k.test"), None);
    }

    #[test]
    fn test_put_twice_keeps_only_latest() {
        let cache = HttpCache::new(10, Duration::from_secs(60), MB);
        cache.put("k.test", b"v1".to_vec(), None);
        cache.put("k.test", b"v2-longer".to_vec(), None);

        assert_eq!(cache.get("k.test"), Some(b"v2-longer".to_vec()));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.total_bytes(), 9);
    }

    #[test]
    fn test_zero_byte_cap_inserts_then_evicts() {
        // Every entry exceeds a zero byte cap, so each put lands in an
        // empty cache and is inserted; the next put evicts it.
        let cache = HttpCache::new(10, Duration::from_secs(60), 0);
        cache.put("a.test", b"aa".to_vec(), None);
        assert!(cache.get("a.test").is_some());

        cache.put("b.test", b"bb".to_vec(), None);
        assert_eq!(cache.get("a.test"), None);
        assert!(cache.get("b.test").is_some());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_zero_entry_cap_discards_everything() {
        let cache = HttpCache::new(0, Duration::from_secs(60), MB);
        cache.put("a.test", b"aa".to_vec(), None);
        cache.put("b.test", b"bb".to_vec(), None);

        assert_eq!(cache.get("a.test"), None);
        assert_eq!(cache.get("b.test"), None);
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.total_bytes(), 0);
    }

    #[test]
    fn test_single_entry_cache_churns() {
        let cache = HttpCache::new(1, Duration::from_secs(60), MB);
        for host in ["a.test", "b.test", "c.test"] {
            cache.put(host, host.as_bytes().to_vec(), None);
            assert_eq!(cache.get(host), Some(host.as_bytes().to_vec()));
            assert_eq!(cache.len(), 1);
        }
    }

    #[test]
    fn test_eviction_follows_recency_not_insertion() {
        let cache = HttpCache::new(3, Duration::from_secs(60), MB);
        cache.put("a.test", b"a".to_vec(), None);
        cache.put("b.test", b"b".to_vec(), None);
        cache.put("c.test", b"c".to_vec(), None);

        // Touch the oldest entry so the middle one becomes LRU.
        cache.get("a.test");
        cache.put("d.test", b"d".to_vec(), None);

        assert!(cache.get("a.test").is_some());
        assert_eq!(cache.get("b.test"), None);
        assert!(cache.get("c.test").is_some());
        assert!(cache.get("d.test").is_some());
    }

    #[test]
    fn test_ttl_override_beats_default() {
        let cache = HttpCache::new(10, Duration::from_secs(3600), MB);
        cache.put("short.test", b"x".to_vec(), Some(Duration::ZERO));
        cache.put("long.test", b"y".to_vec(), None);
        std::thread::sleep(Duration::from_millis(10));

        assert_eq!(cache.get("short.test"), None);
        assert!(cache.get("long.test").is_some());
    }

    #[test]
    fn test_cleanup_expired_is_safe_on_empty_cache() {
        let cache = HttpCache::new(10, Duration::from_secs(60), MB);
        cache.cleanup_expired();
        cache.clear();
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_counters_survive_clear() {
        let cache = HttpCache::new(10, Duration::from_secs(60), MB);
        cache.put("k.test", b"x".to_vec(), None);
        cache.get("k.test");
        cache.get("missing.test");
        cache.clear();

        // Hit/miss counters are monotonic; clear only drops entries.
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_concurrent_readers_and_writers() {
        let cache = Arc::new(HttpCache::new(8, Duration::from_secs(60), 4096));
        let mut handles = Vec::new();

        for worker in 0..4 {
            let cache = Arc::clone(&cache);
            handles.push(std::thread::spawn(move || {
                for i in 0..200 {
                    let key = format!("host-{}.test", (worker * 7 + i) % 12);
                    match i % 3 {
                        0 => cache.put(&key, vec![0u8; 64], None),
                        1 => {
                            let _ = cache.get(&key);
                        }
                        _ => cache.remove(&key),
                    }
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        // Caps still hold after arbitrary interleaving.
        let stats = cache.stats();
        assert!(stats.entry_count <= 8);
        assert!(stats.total_bytes <= 4096);
        assert_eq!(stats.total_bytes, cache.total_bytes());
    }
}
