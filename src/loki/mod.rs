pub mod loki_client;
pub mod loki_error;

pub use loki_client::{LokiClient, LokiEntry};
pub use loki_error::LokiError;
