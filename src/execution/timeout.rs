//! Execution Timeout Management
//!
//! Every call to the execution service carries its own deadline.

use std::time::Duration;
use tokio::time;

use super::ExecutionError;

/// Default per-call timeout
pub const DEFAULT_EXECUTION_TIMEOUT_SECS: u64 = 10;

/// Per-call execution timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionTimeout {
    /// The timeout duration
    duration: Duration,
}

impl Default for ExecutionTimeout {
    fn default() -> Self {
        Self::from_secs(DEFAULT_EXECUTION_TIMEOUT_SECS)
    }
}

impl ExecutionTimeout {
    /// Create a new execution timeout
    ///
    /// # Example
    ///
    /// ```
    /// use std::time::Duration;
    /// use gradeguard::execution::ExecutionTimeout;
    ///
    /// let timeout = ExecutionTimeout::new(Duration::from_secs(5));
    /// assert_eq!(timeout.duration(), Duration::from_secs(5));
    /// ```
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }

    /// Create a timeout from seconds
    pub fn from_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    /// Get the timeout duration
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Execute a future with a timeout
    ///
    /// Returns the future's own result if it completes in time, otherwise
    /// [`ExecutionError::Timeout`].
    pub async fn run<F, T>(&self, future: F) -> Result<T, ExecutionError>
    where
        F: std::future::Future<Output = Result<T, ExecutionError>>,
    {
        match time::timeout(self.duration, future).await {
            Ok(result) => result,
            Err(_) => Err(ExecutionError::Timeout(self.duration)),
        }
    }
}
