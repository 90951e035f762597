use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::cache::HttpCache;
use crate::config::{spawn_watcher, PolicyStore};
use crate::error::{ProxyError, ProxyResult};
use crate::logger::AccessLogger;
use crate::shutdown::Shutdown;
use crate::stats::Statistics;

use super::handler::RequestHandler;
use super::resolver::HostResolver;

const LISTEN_BACKLOG: u32 = 128;
const CACHE_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Accepts connections, enforces the concurrency cap, dispatches request
/// workers, and coordinates the background tasks.
pub struct ProxyServer {
    policy: Arc<PolicyStore>,
    cache: Arc<HttpCache>,
    stats: Arc<Statistics>,
    access_log: AccessLogger,
    resolver: Arc<dyn HostResolver>,
    shutdown: Shutdown,
}

impl ProxyServer {
    /// Build the shared components from the currently loaded policy.
    pub fn new(policy: Arc<PolicyStore>, resolver: Arc<dyn HostResolver>) -> Self {
        let snapshot = policy.current();

        let cache = Arc::new(HttpCache::new(
            snapshot.cache_limit,
            snapshot.cache_ttl(),
            snapshot.max_cache_size_bytes(),
        ));
        let stats = Arc::new(if snapshot.stats_enabled {
            Statistics::new()
        } else {
            Statistics::disabled()
        });
        let access_log = AccessLogger::new(&snapshot.log_dir);

        Self {
            policy,
            cache,
            stats,
            access_log,
            resolver,
            shutdown: Shutdown::new(),
        }
    }

    pub fn stats(&self) -> Arc<Statistics> {
        Arc::clone(&self.stats)
    }

    pub fn cache(&self) -> Arc<HttpCache> {
        Arc::clone(&self.cache)
    }

    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Run the accept loop until shutdown is initiated.
    ///
    /// A semaphore with `max_connections` permits gates worker dispatch:
    /// the loop takes a permit before accepting, and the worker releases
    /// it on exit, so no more than `max_connections` workers are ever
    /// live. Background tasks (policy watcher, cache sweeper) stop at
    /// their next wake after shutdown and are joined before returning.
    pub async fn run(&self) -> ProxyResult<()> {
        let snapshot = self.policy.current();
        self.access_log.initialize().await?;

        let listener = bind_listener(SocketAddr::from(([0, 0, 0, 0], snapshot.port)))?;
        info!("Proxy server started on port {}", snapshot.port);
        info!(
            "Cache limit: {} entries, TTL: {}s",
            snapshot.cache_limit, snapshot.cache_ttl_secs
        );

        // On reload, push the new caps into the cache.
        let watcher = spawn_watcher(Arc::clone(&self.policy), self.shutdown.clone(), {
            let cache = Arc::clone(&self.cache);
            move |snapshot| {
                cache.set_max_entries(snapshot.cache_limit);
                cache.set_default_ttl(snapshot.cache_ttl());
                cache.set_max_size(snapshot.max_cache_size_bytes());
            }
        });
        let sweeper = self.spawn_cache_sweeper();

        let semaphore = Arc::new(Semaphore::new(snapshot.max_connections));
        let handler = Arc::new(RequestHandler::new(
            Arc::clone(&self.policy),
            Arc::clone(&self.cache),
            Arc::clone(&self.stats),
            self.access_log.clone(),
            Arc::clone(&self.resolver),
        ));
        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            let permit = tokio::select! {
                _ = shutdown_rx.recv() => break,
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            tokio::select! {
                _ = shutdown_rx.recv() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let handler = Arc::clone(&handler);
                        tokio::spawn(async move {
                            handler.handle_client(stream, peer).await;
                            drop(permit);
                        });
                    }
                    Err(e) => {
                        if !self.shutdown.is_initiated() {
                            error!("Failed to accept connection: {}", e);
                        }
                    }
                }
            }
        }

        drop(listener);
        let _ = watcher.await;
        let _ = sweeper.await;
        info!("Proxy server stopped");
        Ok(())
    }

    /// Sweep expired cache entries every five minutes.
    fn spawn_cache_sweeper(&self) -> JoinHandle<()> {
        let cache = Arc::clone(&self.cache);
        let mut rx = self.shutdown.subscribe();
        tokio::spawn(async move {
            let mut tick = interval(CACHE_SWEEP_INTERVAL);
            tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick fires immediately; sweep only after a full
            // interval has passed.
            tick.tick().await;
            loop {
                tokio::select! {
                    _ = rx.recv() => break,
                    _ = tick.tick() => {
                        cache.cleanup_expired();
                        debug!("Cache cleanup completed");
                    }
                }
            }
            debug!("Cache sweeper stopped");
        })
    }
}

/// Open the listening socket with address reuse.
fn bind_listener(addr: SocketAddr) -> ProxyResult<TcpListener> {
    let socket = TcpSocket::new_v4()?;
    socket.set_reuseaddr(true)?;
    socket
        .bind(addr)
        .map_err(|e| ProxyError::config(format!("Failed to bind to port {}: {}", addr.port(), e)))?;
    socket
        .listen(LISTEN_BACKLOG)
        .map_err(|e| ProxyError::io(format!("Failed to listen on socket: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_listener_rejects_taken_port() {
        // Bind a port, then try to bind it again without reuseport.
        let first = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let taken = first.local_addr().unwrap();

        let result = bind_listener(taken);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_bind_listener_succeeds_on_free_port() {
        let listener = bind_listener("0.0.0.0:0".parse().unwrap()).unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }
}
