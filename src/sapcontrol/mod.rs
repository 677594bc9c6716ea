pub mod instance_cache;
pub mod process_cache;
pub mod sap_control;
pub mod sap_error;
pub mod scrape_context;
pub mod soap_envelope;
pub mod soap_types;
pub mod web_service;

#[cfg(test)]
pub mod fake_web_service;

pub use sap_control::SapControl;
pub use sap_error::SapError;
pub use scrape_context::ScrapeContext;
