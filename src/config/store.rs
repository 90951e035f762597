use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::SystemTime;
use tracing::{debug, info};

use super::PolicySnapshot;
use crate::error::{ProxyError, ProxyResult};

/// Holds the current policy snapshot and reloads it from the backing file.
///
/// Readers call [`current`](Self::current) and get a cheap `Arc` clone of
/// one consistent snapshot; a reload replaces the pointer in a single
/// publication, so no reader ever sees the new blocklist with the old
/// numeric limits or vice versa.
pub struct PolicyStore {
    config_path: PathBuf,
    snapshot: RwLock<Arc<PolicySnapshot>>,
    last_mtime: Mutex<Option<SystemTime>>,
}

impl PolicyStore {
    /// Create a store over `path` with default values; call
    /// [`load`](Self::load) to read the file.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            config_path: path.as_ref().to_path_buf(),
            snapshot: RwLock::new(Arc::new(PolicySnapshot::default())),
            last_mtime: Mutex::new(None),
        }
    }

    /// Read and parse the backing file, then publish the new snapshot.
    ///
    /// Malformed directives inside the file warn and retain prior values;
    /// only a missing/unreadable file is an error, in which case the
    /// current snapshot stays in effect.
    pub async fn load(&self) -> ProxyResult<Arc<PolicySnapshot>> {
        let content = tokio::fs::read_to_string(&self.config_path)
            .await
            .map_err(|e| {
                ProxyError::config(format!(
                    "could not open config file {}: {}",
                    self.config_path.display(),
                    e
                ))
            })?;

        if let Ok(metadata) = tokio::fs::metadata(&self.config_path).await {
            if let Ok(modified) = metadata.modified() {
                *self.last_mtime.lock().unwrap() = Some(modified);
            }
        }

        let prior = self.current();
        let next = Arc::new(PolicySnapshot::parse(&content, &prior));
        *self.snapshot.write().unwrap() = Arc::clone(&next);

        info!(
            "Config loaded: PORT={}, CACHE_LIMIT={}, TTL={}s, BLOCKED={}",
            next.port,
            next.cache_limit,
            next.cache_ttl_secs,
            next.blocked.len()
        );
        Ok(next)
    }

    /// The active snapshot.
    pub fn current(&self) -> Arc<PolicySnapshot> {
        Arc::clone(&self.snapshot.read().unwrap())
    }

    /// Whether `host` is denied service under the current snapshot.
    pub fn is_blocked(&self, host: &str) -> bool {
        self.current().is_blocked(host)
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Check the backing file's mtime against the last one seen,
    /// recording the new value. Used by the watcher task.
    pub(crate) async fn poll_changed(&self) -> bool {
        let modified = match tokio::fs::metadata(&self.config_path).await {
            Ok(metadata) => match metadata.modified() {
                Ok(modified) => modified,
                Err(_) => return false,
            },
            Err(e) => {
                debug!(
                    "Could not stat config file {}: {}",
                    self.config_path.display(),
                    e
                );
                return false;
            }
        };

        let mut last = self.last_mtime.lock().unwrap();
        if *last != Some(modified) {
            *last = Some(modified);
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[tokio::test]
    async fn test_load_publishes_snapshot() {
        let file = write_config("PORT=18081\nBLOCK=evil.test");
        let store = PolicyStore::new(file.path());

        // Before load, defaults are in effect.
        assert_eq!(store.current().port, 8080);
        assert!(!store.is_blocked("evil.test"));

        store.load().await.unwrap();
        assert_eq!(store.current().port, 18081);
        assert!(store.is_blocked("evil.test"));
    }

    #[tokio::test]
    async fn test_load_missing_file_keeps_current() {
        let store = PolicyStore::new("/nonexistent/cachet-config.txt");
        let err = store.load().await.unwrap_err();
        assert!(matches!(err, ProxyError::Config { .. }));
        assert_eq!(store.current().port, 8080);
    }

    #[tokio::test]
    async fn test_reload_replaces_whole_snapshot() {
        let file = write_config("BLOCK=old.test");
        let store = PolicyStore::new(file.path());
        store.load().await.unwrap();
        assert!(store.is_blocked("old.test"));

        std::fs::write(file.path(), "BLOCK=new.test\nPORT=9001").unwrap();
        store.load().await.unwrap();

        let snapshot = store.current();
        assert!(!snapshot.is_blocked("old.test"));
        assert!(snapshot.is_blocked("new.test"));
        assert_eq!(snapshot.port, 9001);
    }

    #[tokio::test]
    async fn test_snapshot_is_stable_across_reload() {
        let file = write_config("BLOCK=evil.test");
        let store = PolicyStore::new(file.path());
        store.load().await.unwrap();

        let held = store.current();
        std::fs::write(file.path(), "").unwrap();
        store.load().await.unwrap();

        // The snapshot taken before the reload is unchanged.
        assert!(held.is_blocked("evil.test"));
        assert!(!store.is_blocked("evil.test"));
    }

    #[tokio::test]
    async fn test_poll_changed_tracks_mtime() {
        let file = write_config("PORT=8082");
        let store = PolicyStore::new(file.path());
        store.load().await.unwrap();

        // load() recorded the mtime, so nothing changed yet.
        assert!(!store.poll_changed().await);

        // Rewrite with an mtime clearly in the future of the original.
        std::fs::write(file.path(), "PORT=8083").unwrap();
        let future = SystemTime::now() + std::time::Duration::from_secs(5);
        file.as_file().set_modified(future).unwrap();

        assert!(store.poll_changed().await);
        // A second poll without further writes sees no change.
        assert!(!store.poll_changed().await);
    }
}
