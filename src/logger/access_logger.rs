use chrono::Utc;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::file_logger::FileLogger;
use super::models::{AccessRecord, RequestStatus};
use crate::error::ProxyResult;

/// Access logger shared by all request workers.
///
/// Every request that reaches classification terminates in exactly one
/// `log_request` call with its outcome status. Write failures are
/// reported and swallowed; logging never disturbs request flow.
#[derive(Clone)]
pub struct AccessLogger {
    sink: Arc<FileLogger>,
}

impl AccessLogger {
    pub fn new(directory: &str) -> Self {
        Self {
            sink: Arc::new(FileLogger::new(directory)),
        }
    }

    /// Create the log directory.
    pub async fn initialize(&self) -> ProxyResult<()> {
        self.sink.initialize().await
    }

    /// Record the outcome of one request.
    pub async fn log_request(
        &self,
        client_ip: IpAddr,
        host: &str,
        status: RequestStatus,
        bytes: Option<u64>,
    ) {
        let record = AccessRecord {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            client_ip: client_ip.to_string(),
            host: host.to_string(),
            status,
            bytes,
        };

        match bytes {
            Some(n) => info!("{} -> {} [{}] ({} bytes)", client_ip, host, status, n),
            None => info!("{} -> {} [{}]", client_ip, host, status),
        }

        if let Err(e) = self.sink.write_record(&record).await {
            warn!("Failed to write access log record: {}", e);
        }
    }
}
