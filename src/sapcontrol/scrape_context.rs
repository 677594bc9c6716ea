// scrape_context.rs
use super::sap_error::SapError;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Deadline shared by every remote call made on behalf of one scrape.
#[derive(Debug, Clone, Copy)]
pub struct ScrapeContext {
    deadline: Instant,
}

impl ScrapeContext {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now() + timeout,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }

    /// Runs `fut` until it completes or the deadline elapses.
    pub async fn run<T, F>(&self, operation: &str, fut: F) -> Result<T, SapError>
    where
        F: Future<Output = Result<T, SapError>>,
    {
        match tokio::time::timeout_at(self.deadline, fut).await {
            Ok(result) => result,
            Err(_) => Err(SapError::Timeout(format!(
                "{} did not complete before the scrape deadline",
                operation
            ))),
        }
    }
}
