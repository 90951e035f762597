//! Policy configuration for the proxy.
//!
//! The backing file is line-oriented `KEY=VALUE` text: `#` begins a
//! comment, blank lines are ignored, surrounding whitespace is trimmed.
//! `BLOCK=` and `WHITELIST=` may repeat. A parsed file becomes an
//! immutable [`PolicySnapshot`] which the [`PolicyStore`] publishes
//! atomically, so readers never observe half of a reload.

pub mod store;
pub mod watcher;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

pub use store::PolicyStore;
pub use watcher::spawn_watcher;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Diagnostics log threshold, `LOG_LEVEL` in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Filter directive understood by the tracing subscriber.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

impl FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" => Ok(LogLevel::Warn),
            "ERROR" => Ok(LogLevel::Error),
            _ => Err(()),
        }
    }
}

/// Immutable point-in-time view of the proxy configuration.
///
/// Host matching is byte-wise: `example.com` and `EXAMPLE.COM` are
/// distinct blocklist entries, exactly as they are distinct cache keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicySnapshot {
    /// Listen port
    pub port: u16,
    /// Maximum number of cache entries
    pub cache_limit: usize,
    /// Default TTL applied on cache insert, seconds
    pub cache_ttl_secs: u64,
    /// Cache byte cap, megabytes
    pub max_cache_size_mb: u64,
    /// Tunnel idle timeout, seconds
    pub connection_timeout_secs: u64,
    /// Maximum concurrently served connections
    pub max_connections: usize,
    /// Diagnostics log threshold
    pub log_level: LogLevel,
    /// Whether the statistics sink records anything
    pub stats_enabled: bool,
    /// Directory the access logger writes into
    pub log_dir: String,
    /// Hosts denied service
    pub blocked: HashSet<String>,
    /// Hosts exempt from the blocklist; non-empty list overrides it
    pub whitelisted: HashSet<String>,
}

impl Default for PolicySnapshot {
    fn default() -> Self {
        Self {
            port: 8080,
            cache_limit: 100,
            cache_ttl_secs: 3600,
            max_cache_size_mb: 100,
            connection_timeout_secs: 30,
            max_connections: 100,
            log_level: LogLevel::Info,
            stats_enabled: true,
            log_dir: "logs".to_string(),
            blocked: HashSet::new(),
            whitelisted: HashSet::new(),
        }
    }
}

impl PolicySnapshot {
    /// Default TTL as a duration.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Tunnel idle timeout as a duration.
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    /// Cache byte cap.
    pub fn max_cache_size_bytes(&self) -> u64 {
        self.max_cache_size_mb * BYTES_PER_MB
    }

    /// Whether `host` is denied service under this snapshot.
    ///
    /// A non-empty whitelist overrides the blocklist for matched hosts.
    pub fn is_blocked(&self, host: &str) -> bool {
        if !self.whitelisted.is_empty() && self.whitelisted.contains(host) {
            return false;
        }
        self.blocked.contains(host)
    }

    /// Parse config file content into a new snapshot.
    ///
    /// Numeric values that fail to parse or fall outside their valid
    /// range produce a warning and retain the value from `prior`. The
    /// blocklist and whitelist are rebuilt from scratch on every parse.
    pub fn parse(content: &str, prior: &PolicySnapshot) -> PolicySnapshot {
        let mut next = prior.clone();
        next.blocked = HashSet::new();
        next.whitelisted = HashSet::new();

        for raw_line in content.lines() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                warn!("Ignoring config line without '=': {}", line);
                continue;
            };

            match key {
                "PORT" => {
                    parse_number(value, key, &mut next.port, |p| *p >= 1);
                }
                "CACHE_LIMIT" => {
                    parse_number(value, key, &mut next.cache_limit, |_| true);
                }
                "CACHE_TTL" => {
                    parse_number(value, key, &mut next.cache_ttl_secs, |_| true);
                }
                "MAX_CACHE_SIZE_MB" => {
                    parse_number(value, key, &mut next.max_cache_size_mb, |_| true);
                }
                "CONNECTION_TIMEOUT" => {
                    parse_number(value, key, &mut next.connection_timeout_secs, |t| *t >= 1);
                }
                "MAX_CONNECTIONS" => {
                    parse_number(value, key, &mut next.max_connections, |n| *n >= 1);
                }
                "LOG_LEVEL" => match value.parse::<LogLevel>() {
                    Ok(level) => next.log_level = level,
                    Err(()) => warn!(
                        "Invalid LOG_LEVEL '{}', keeping {}",
                        value, next.log_level
                    ),
                },
                "ENABLE_STATS" => {
                    next.stats_enabled = matches!(value, "true" | "1" | "yes");
                }
                "LOG_DIR" => {
                    next.log_dir = value.to_string();
                }
                "BLOCK" => {
                    next.blocked.insert(value.to_string());
                }
                "WHITELIST" => {
                    next.whitelisted.insert(value.to_string());
                }
                _ => warn!("Ignoring unrecognized config key: {}", key),
            }
        }

        next
    }
}

/// Parse an integer directive, retaining the prior value on failure.
fn parse_number<T>(value: &str, key: &str, slot: &mut T, valid: impl Fn(&T) -> bool)
where
    T: FromStr + fmt::Display,
{
    match value.parse::<T>() {
        Ok(parsed) if valid(&parsed) => *slot = parsed,
        Ok(parsed) => warn!(
            "{}={} is out of range, keeping {}",
            key, parsed, slot
        ),
        Err(_) => warn!("Invalid {} value '{}', keeping {}", key, value, slot),
    }
}
