//! HTTP Execution Client
//!
//! Talks to a JDoodle-style execution API: one JSON POST per run, carrying
//! client credentials, the program and its stdin. The response body has an
//! `output` field holding the program's stdout.
//!
//! # Example
//!
//! ```ignore
//! use gradeguard::config::ExecutionConfig;
//! use gradeguard::execution::{ExecutionClient, ExecutionRequest, HttpExecutionClient};
//!
//! let client = HttpExecutionClient::new(&ExecutionConfig::default())?;
//! let output = client.execute(&request).await?;
//! ```

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{ExecutionClient, ExecutionError, ExecutionOutput, ExecutionRequest};
use crate::config::ExecutionConfig;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExecuteBody<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    script: &'a str,
    language: &'a str,
    version_index: &'a str,
    stdin: &'a str,
}

#[derive(Deserialize)]
struct ExecuteResponse {
    #[serde(default)]
    output: Option<String>,
}

/// HTTP client for the execution service
#[derive(Clone)]
pub struct HttpExecutionClient {
    /// Reqwest HTTP client
    client: reqwest::Client,

    /// Execution endpoint URL
    url: String,

    client_id: String,
    client_secret: String,

    /// Transport-level request timeout
    timeout: Duration,
}

impl HttpExecutionClient {
    /// Create a client from configuration
    pub fn new(config: &ExecutionConfig) -> anyhow::Result<Self> {
        let timeout = config.timeout();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            client,
            url: config.url.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            timeout,
        })
    }

    /// Get the endpoint URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Get the transport timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl std::fmt::Debug for HttpExecutionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpExecutionClient")
            .field("url", &self.url)
            .field("client_id", &self.client_id)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ExecutionClient for HttpExecutionClient {
    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionOutput, ExecutionError> {
        let body = ExecuteBody {
            client_id: &self.client_id,
            client_secret: &self.client_secret,
            script: &request.script,
            language: &request.language,
            version_index: &request.version_index,
            stdin: &request.stdin,
        };

        tracing::debug!(
            "Sending execution request to {} (language={}, version={})",
            self.url,
            request.language,
            request.version_index
        );

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ExecutionError::Timeout(self.timeout)
                } else {
                    ExecutionError::Request(e.to_string())
                }
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ExecutionError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExecutionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ExecuteResponse = response
            .json()
            .await
            .map_err(|e| ExecutionError::Decode(e.to_string()))?;

        Ok(ExecutionOutput::new(parsed.output.unwrap_or_default()))
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode as AxumStatus, routing::post, Json, Router};
    use serde_json::{json, Value};

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/v1/execute", addr)
    }

    fn client_for(url: String) -> HttpExecutionClient {
        let config = ExecutionConfig {
            url,
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            ..ExecutionConfig::default()
        };
        HttpExecutionClient::new(&config).unwrap()
    }

    fn request(stdin: &str) -> ExecutionRequest {
        ExecutionRequest {
            script: "print(input())".to_string(),
            language: "python3".to_string(),
            version_index: "4".to_string(),
            stdin: stdin.to_string(),
        }
    }

    #[tokio::test]
    async fn test_execute_echoes_output_and_sends_credentials() {
        let app = Router::new().route(
            "/v1/execute",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["clientId"], "id");
                assert_eq!(body["clientSecret"], "secret");
                assert_eq!(body["versionIndex"], "4");
                Json(json!({ "output": format!("{}\n", body["stdin"].as_str().unwrap()) }))
            }),
        );
        let client = client_for(serve(app).await);

        let output = client.execute(&request("hello")).await.unwrap();
        assert_eq!(output.output, "hello\n");
    }

    #[tokio::test]
    async fn test_missing_output_is_empty() {
        let app = Router::new().route(
            "/v1/execute",
            post(|| async { Json(json!({ "statusCode": 200 })) }),
        );
        let client = client_for(serve(app).await);

        let output = client.execute(&request("")).await.unwrap();
        assert_eq!(output.output, "");
    }

    #[tokio::test]
    async fn test_429_maps_to_rate_limited() {
        let app = Router::new().route(
            "/v1/execute",
            post(|| async { AxumStatus::TOO_MANY_REQUESTS }),
        );
        let client = client_for(serve(app).await);

        let err = client.execute(&request("")).await.unwrap_err();
        assert_eq!(err, ExecutionError::RateLimited);
    }

    #[tokio::test]
    async fn test_server_error_maps_to_status() {
        let app = Router::new().route(
            "/v1/execute",
            post(|| async { (AxumStatus::INTERNAL_SERVER_ERROR, "boom") }),
        );
        let client = client_for(serve(app).await);

        let err = client.execute(&request("")).await.unwrap_err();
        assert_eq!(
            err,
            ExecutionError::Status {
                status: 500,
                body: "boom".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_malformed_body_maps_to_decode() {
        let app = Router::new().route("/v1/execute", post(|| async { "not json" }));
        let client = client_for(serve(app).await);

        let err = client.execute(&request("")).await.unwrap_err();
        assert!(matches!(err, ExecutionError::Decode(_)));
    }

    #[tokio::test]
    async fn test_connection_refused_maps_to_request() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let client = client_for(format!("http://{}/v1/execute", addr));

        let err = client.execute(&request("")).await.unwrap_err();
        assert!(matches!(err, ExecutionError::Request(_)));
    }
}
