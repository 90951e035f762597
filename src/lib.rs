pub mod cache;
pub mod config;
pub mod error;
pub mod logger;
pub mod proxy;
pub mod shutdown;
pub mod stats;

// Re-export commonly used types
pub use cache::{CacheEntry, CacheStats, HttpCache};
pub use config::{LogLevel, PolicySnapshot, PolicyStore};
pub use error::{ProxyError, ProxyResult};
pub use logger::{AccessLogger, RequestStatus};
pub use proxy::{HostResolver, ProxyServer, RequestHandler, StaticResolver, SystemResolver};
pub use shutdown::Shutdown;
pub use stats::Statistics;
