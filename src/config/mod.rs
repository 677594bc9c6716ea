pub mod config_error;
pub mod exporter_config;
pub mod logger;
pub mod sid_slot;

pub use exporter_config::{CliArgs, ExporterConfig};
pub use sid_slot::SidSlot;
