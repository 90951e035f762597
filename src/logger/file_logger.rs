use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::info;

use super::models::AccessRecord;
use crate::error::ProxyResult;

/// Appends access records as JSON lines to a file in the log directory.
pub struct FileLogger {
    directory: String,
}

impl FileLogger {
    pub fn new(directory: &str) -> Self {
        Self {
            directory: directory.to_string(),
        }
    }

    /// Create the log directory if it does not exist.
    pub async fn initialize(&self) -> ProxyResult<()> {
        tokio::fs::create_dir_all(&self.directory).await?;
        info!("Access log directory created: {}", self.directory);
        Ok(())
    }

    /// Append one record and flush.
    pub async fn write_record(&self, record: &AccessRecord) -> ProxyResult<()> {
        let line = serde_json::to_string(record)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_file_path())
            .await?;

        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;
        Ok(())
    }

    fn log_file_path(&self) -> String {
        format!("{}/access.log", self.directory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::models::RequestStatus;
    use chrono::Utc;

    #[tokio::test]
    async fn test_write_record_appends_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let logger = FileLogger::new(dir.path().to_str().unwrap());
        logger.initialize().await.unwrap();

        let record = AccessRecord {
            id: "abc".to_string(),
            timestamp: Utc::now(),
            client_ip: "127.0.0.1".to_string(),
            host: "example.test".to_string(),
            status: RequestStatus::Fetched,
            bytes: Some(42),
        };
        logger.write_record(&record).await.unwrap();
        logger.write_record(&record).await.unwrap();

        let content = std::fs::read_to_string(dir.path().join("access.log")).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: AccessRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed.host, "example.test");
        assert_eq!(parsed.status, RequestStatus::Fetched);
        assert_eq!(parsed.bytes, Some(42));
    }
}
