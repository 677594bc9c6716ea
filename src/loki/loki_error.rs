use reqwest::StatusCode;
use serde_json::Error as JsonError;

#[derive(thiserror::Error, Debug)]
pub enum LokiError {
    #[error("HTTP error ({0}): {1}")]
    HttpError(StatusCode, String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("JSON encode error: {0}")]
    JsonError(#[from] JsonError),
}
