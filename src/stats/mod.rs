//! Statistics sink: monotonic counters and per-host/per-client tallies.
//!
//! Scalar counters are atomics; the tally maps sit behind one mutex with
//! O(1) updates inside the critical section, so recording never blocks
//! request flow for long. When stats are disabled the sink is constructed
//! as a no-op: callers record unconditionally and never branch.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

/// Per-host request tallies.
#[derive(Debug, Default, Clone)]
pub struct HostStats {
    pub requests: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub total_time_ms: u64,
    /// Insertion sequence, used to break ties in `top_hosts`
    seq: u64,
}

#[derive(Debug)]
struct Tallies {
    per_host: HashMap<String, HostStats>,
    per_client: HashMap<String, u64>,
    next_seq: u64,
    started_at: Instant,
}

impl Tallies {
    fn new() -> Self {
        Self {
            per_host: HashMap::new(),
            per_client: HashMap::new(),
            next_seq: 0,
            started_at: Instant::now(),
        }
    }
}

/// The `/stats` admin document.
#[derive(Debug, Serialize)]
struct StatsDocument {
    uptime_seconds: f64,
    total_requests: u64,
    cached_requests: u64,
    blocked_requests: u64,
    errors: u64,
    bytes_sent: u64,
    bytes_received: u64,
}

/// Monotonic counters plus per-host and per-client tallies.
pub struct Statistics {
    enabled: bool,
    total_requests: AtomicU64,
    cached: AtomicU64,
    blocked: AtomicU64,
    errors: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    tallies: Mutex<Tallies>,
}

impl Statistics {
    pub fn new() -> Self {
        Self::with_enabled(true)
    }

    /// A sink whose `record_*` operations are no-ops.
    pub fn disabled() -> Self {
        Self::with_enabled(false)
    }

    fn with_enabled(enabled: bool) -> Self {
        Self {
            enabled,
            total_requests: AtomicU64::new(0),
            cached: AtomicU64::new(0),
            blocked: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            tallies: Mutex::new(Tallies::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn record_request(&self, host: &str, client_ip: &str) {
        if !self.enabled {
            return;
        }
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        let mut guard = self.tallies.lock().unwrap();
        let Tallies {
            per_host,
            per_client,
            next_seq,
            ..
        } = &mut *guard;
        let entry = per_host.entry(host.to_string()).or_insert_with(|| {
            let stats = HostStats {
                seq: *next_seq,
                ..HostStats::default()
            };
            *next_seq += 1;
            stats
        });
        entry.requests += 1;
        *per_client.entry(client_ip.to_string()).or_insert(0) += 1;
    }

    pub fn record_cached(&self) {
        if !self.enabled {
            return;
        }
        self.cached.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_blocked(&self) {
        if !self.enabled {
            return;
        }
        self.blocked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        if !self.enabled {
            return;
        }
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bytes(&self, host: &str, sent: u64, received: u64) {
        if !self.enabled {
            return;
        }
        self.bytes_sent.fetch_add(sent, Ordering::Relaxed);
        self.bytes_received.fetch_add(received, Ordering::Relaxed);

        let mut tallies = self.tallies.lock().unwrap();
        let entry = tallies.per_host.entry(host.to_string()).or_default();
        entry.bytes_sent += sent;
        entry.bytes_received += received;
    }

    pub fn record_time(&self, host: &str, elapsed_ms: u64) {
        if !self.enabled {
            return;
        }
        let mut tallies = self.tallies.lock().unwrap();
        let entry = tallies.per_host.entry(host.to_string()).or_default();
        entry.total_time_ms += elapsed_ms;
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn cached_requests(&self) -> u64 {
        self.cached.load(Ordering::Relaxed)
    }

    pub fn blocked_requests(&self) -> u64 {
        self.blocked.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    pub fn uptime_seconds(&self) -> f64 {
        self.tallies.lock().unwrap().started_at.elapsed().as_secs_f64()
    }

    /// The `/stats` JSON document.
    pub fn json(&self) -> String {
        let document = StatsDocument {
            uptime_seconds: self.uptime_seconds(),
            total_requests: self.total_requests(),
            cached_requests: self.cached_requests(),
            blocked_requests: self.blocked_requests(),
            errors: self.errors(),
            bytes_sent: self.bytes_sent(),
            bytes_received: self.bytes_received(),
        };
        // Serialization of a plain struct of numbers cannot fail.
        serde_json::to_string_pretty(&document).unwrap_or_else(|_| "{}".to_string())
    }

    /// Human-readable summary, printed at shutdown.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let total = self.total_requests();

        out.push_str("\n========== PROXY SERVER STATISTICS ==========\n");
        let _ = writeln!(out, "Uptime: {:.2} seconds", self.uptime_seconds());
        let _ = writeln!(out, "Total Requests: {}", total);
        let _ = writeln!(out, "  - Cached: {}", self.cached_requests());
        let _ = writeln!(out, "  - Blocked: {}", self.blocked_requests());
        let _ = writeln!(out, "  - Errors: {}", self.errors());
        let _ = writeln!(out, "Bytes Sent: {} bytes", self.bytes_sent());
        let _ = writeln!(out, "Bytes Received: {} bytes", self.bytes_received());
        if total > 0 {
            let rate = self.cached_requests() as f64 / total as f64 * 100.0;
            let _ = writeln!(out, "Cache Hit Rate: {:.2}%", rate);
        }
        out.push_str("============================================\n");
        out
    }

    /// The `limit` busiest hosts, descending by request count; ties keep
    /// first-seen order.
    pub fn top_hosts(&self, limit: usize) -> String {
        let tallies = self.tallies.lock().unwrap();
        let mut hosts: Vec<(&String, &HostStats)> = tallies.per_host.iter().collect();
        hosts.sort_by(|a, b| {
            b.1.requests
                .cmp(&a.1.requests)
                .then(a.1.seq.cmp(&b.1.seq))
        });

        let mut out = String::new();
        let shown = limit.min(hosts.len());
        let _ = writeln!(out, "\nTop {} Hosts by Request Count:", shown);
        out.push_str("----------------------------------------\n");
        for (rank, (host, stats)) in hosts.iter().take(limit).enumerate() {
            let _ = writeln!(out, "{}. {}: {} requests", rank + 1, host, stats.requests);
        }
        out
    }

    /// Per-client-IP request counts.
    pub fn client_stats(&self) -> String {
        let tallies = self.tallies.lock().unwrap();
        let mut out = String::new();
        out.push_str("\nClient IP Statistics:\n");
        out.push_str("----------------------------------------\n");
        for (ip, count) in tallies.per_client.iter() {
            let _ = writeln!(out, "{}: {} requests", ip, count);
        }
        out
    }

    /// Zero every counter and tally and restart the uptime clock.
    pub fn reset(&self) {
        self.total_requests.store(0, Ordering::Relaxed);
        self.cached.store(0, Ordering::Relaxed);
        self.blocked.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
        self.bytes_sent.store(0, Ordering::Relaxed);
        self.bytes_received.store(0, Ordering::Relaxed);

        let mut tallies = self.tallies.lock().unwrap();
        tallies.per_host.clear();
        tallies.per_client.clear();
        tallies.next_seq = 0;
        tallies.started_at = Instant::now();
    }
}

impl Default for Statistics {
    fn default() -> Self {
        Self::new()
    }
}
