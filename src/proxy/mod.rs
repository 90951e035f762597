pub mod handler;
pub mod resolver;
pub mod server;
pub mod tunnel;

pub use handler::RequestHandler;
pub use resolver::{HostResolver, StaticResolver, SystemResolver};
pub use server::ProxyServer;
