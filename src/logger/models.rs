use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of one client request, as recorded in the access log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    /// CONNECT accepted, bytes relayed opaquely
    HttpsTunnel,
    /// HTTP response served from the cache
    Cached,
    /// HTTP response fetched from the origin
    Fetched,
    /// HTTP request denied by the blocklist
    BlockedHttp,
    /// CONNECT denied by the blocklist
    BlockedHttps,
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestStatus::HttpsTunnel => write!(f, "HTTPS_TUNNEL"),
            RequestStatus::Cached => write!(f, "CACHED"),
            RequestStatus::Fetched => write!(f, "FETCHED"),
            RequestStatus::BlockedHttp => write!(f, "BLOCKED_HTTP"),
            RequestStatus::BlockedHttps => write!(f, "BLOCKED_HTTPS"),
        }
    }
}

/// One access-log line; serialized as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessRecord {
    /// Request id
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub client_ip: String,
    pub host: String,
    pub status: RequestStatus,
    /// Payload bytes sent to the client, where the outcome has one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
}
