//! Code Execution Collaborator
//!
//! The grading core talks to the external, metered execution service only
//! through [`ExecutionClient`]. One call runs one program against one stdin
//! and returns its stdout.
//!
//! # Architecture
//!
//! - `ExecutionClient`: the trait the orchestrator depends on
//! - `http_client.rs`: reqwest implementation for a JDoodle-style HTTP API
//! - `timeout.rs`: per-call timeout enforcement

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub mod http_client;
pub mod timeout;

pub use http_client::HttpExecutionClient;
pub use timeout::ExecutionTimeout;

/// One unit of work for the execution service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    /// Program source
    pub script: String,

    /// Language identifier
    pub language: String,

    /// Language version index
    pub version_index: String,

    /// Program stdin
    pub stdin: String,
}

/// Output of a single execution
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExecutionOutput {
    /// Program stdout, untrimmed
    pub output: String,
}

impl ExecutionOutput {
    pub fn new(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
        }
    }
}

/// Errors returned by an execution client
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExecutionError {
    /// The service is throttling us (HTTP 429 or equivalent)
    #[error("Execution service rate limit exceeded")]
    RateLimited,

    /// The call did not complete in time
    #[error("Execution timed out after {0:?}")]
    Timeout(Duration),

    /// The service answered with a non-success status
    #[error("Execution service returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// Transport-level failure
    #[error("Execution request failed: {0}")]
    Request(String),

    /// The response body could not be understood
    #[error("Malformed execution response: {0}")]
    Decode(String),
}

impl ExecutionError {
    /// Whether this error is the service's throttling signal
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ExecutionError::RateLimited)
    }
}

/// Runs submitted programs
#[async_trait]
pub trait ExecutionClient: Send + Sync {
    /// Execute one program against one stdin
    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionOutput, ExecutionError>;

    /// Short name used in logs and metrics
    fn name(&self) -> &str;
}
