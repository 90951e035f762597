pub mod access_logger;
pub mod file_logger;
pub mod models;

pub use access_logger::AccessLogger;
pub use models::{AccessRecord, RequestStatus};
