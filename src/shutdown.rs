use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

/// Cooperative shutdown signal shared by the accept loop and the
/// background tasks. Receivers observe the signal at their next wake;
/// in-flight workers are never cancelled.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
    initiated: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self {
            tx,
            initiated: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Signal shutdown. Idempotent; only the first call broadcasts.
    pub fn initiate(&self) {
        if self.initiated.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Shutdown initiated");
        // Send fails only when there are no subscribers, which is fine:
        // they will see `is_initiated` before their next blocking wait.
        let _ = self.tx.send(());
    }

    /// Whether shutdown has been requested.
    pub fn is_initiated(&self) -> bool {
        self.initiated.load(Ordering::SeqCst)
    }

    /// Get a receiver to select on in loops.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_shutdown_broadcast() {
        let shutdown = Shutdown::new();
        let mut rx = shutdown.subscribe();

        assert!(!shutdown.is_initiated());
        shutdown.initiate();
        assert!(shutdown.is_initiated());

        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("receiver should wake")
            .expect("signal should arrive");
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let shutdown = Shutdown::new();
        shutdown.initiate();
        shutdown.initiate();
        assert!(shutdown.is_initiated());

        // A late subscriber can still observe the flag.
        let clone = shutdown.clone();
        assert!(clone.is_initiated());
    }
}
