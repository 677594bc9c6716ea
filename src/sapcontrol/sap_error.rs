
use reqwest::StatusCode;

#[derive(thiserror::Error, Debug)]
pub enum SapError {
    #[error("HTTP error ({0}): {1}")]
    HttpError(StatusCode, String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("XML parse error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Response parse error: {0}")]
    Parse(String),

    #[error("SOAP fault ({code}): {message}")]
    SoapFault { code: String, message: String },

    #[error("Deadline exceeded: {0}")]
    Timeout(String),

    #[error("No instances found: {0}")]
    NoInstances(String),

    #[error("Cache retrieval error: {0}")]
    CacheRetrieval(String),

    #[error("Invalid STATECOLOR value: {0:?}")]
    InvalidStateColor(String),

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<SapError>,
    },
}

impl SapError {
    /// Prefixes the error with the operation that failed.
    pub fn context(self, context: impl Into<String>) -> SapError {
        SapError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }
}
