// HTTP API for the grading service
//
// Routes:
//   POST /grade          grade a submission (bearer auth)
//   GET  /admin/stats    usage and cache snapshot (admin)
//   POST /admin/reset    clear usage and cache (admin)
//   GET  /health         liveness
//   GET  /metrics        Prometheus scrape endpoint

use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::admin::{AdminControl, AdminStats, ResetResponse};
use crate::auth::{bearer_token, Caller, IdentityProvider, StaticIdentityProvider};
use crate::cache::ResultCache;
use crate::config::Config;
use crate::execution::{ExecutionClient, ExecutionTimeout, HttpExecutionClient};
use crate::grading::{CacheHitPolicy, GradeError, GradeRequest, GradeResult, GradingOrchestrator};
use crate::metrics;
use crate::rate_limit::UsageTracker;

/// Error body returned for every failed call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable code
    pub error: String,

    /// Human-readable message
    pub message: String,
}

impl GradeError {
    /// HTTP status for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            GradeError::Unauthenticated => StatusCode::UNAUTHORIZED,
            GradeError::PermissionDenied => StatusCode::FORBIDDEN,
            GradeError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            GradeError::AdmissionDenied => StatusCode::TOO_MANY_REQUESTS,
            GradeError::UpstreamRateLimited => StatusCode::SERVICE_UNAVAILABLE,
            GradeError::UpstreamError(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for GradeError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.code().to_string(),
            message: self.to_string(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

/// Shared state behind every route
#[derive(Clone)]
pub struct AppState {
    orchestrator: GradingOrchestrator,
    admin: AdminControl,
    identity: Arc<dyn IdentityProvider>,
}

impl AppState {
    /// Wire the components around an execution client and identity directory.
    /// The orchestrator and admin surface share one tracker and one cache.
    pub fn new(
        config: &Config,
        client: Arc<dyn ExecutionClient>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        let tracker = UsageTracker::new(config.rate_limit.clone());
        let cache = ResultCache::new(&config.cache);

        let orchestrator = GradingOrchestrator::new(tracker.clone(), cache.clone(), client)
            .with_timeout(ExecutionTimeout::new(config.execution.timeout()))
            .with_cache_hit_policy(CacheHitPolicy::from_count_flag(
                config.grading.count_cache_hits,
            ));
        let admin = AdminControl::new(tracker, cache);

        Self {
            orchestrator,
            admin,
            identity,
        }
    }

    /// Build the production state: HTTP execution client and the token
    /// table from the `[auth]` section
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = HttpExecutionClient::new(&config.execution)
            .context("Failed to create execution client")?;
        let identity = StaticIdentityProvider::from_config(&config.auth);
        Ok(Self::new(config, Arc::new(client), Arc::new(identity)))
    }

    pub fn orchestrator(&self) -> &GradingOrchestrator {
        &self.orchestrator
    }

    async fn caller(&self, headers: &HeaderMap) -> Option<Caller> {
        let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
        let token = bearer_token(value)?;
        self.identity.resolve(token).await
    }
}

/// Build the router
pub fn router(state: AppState, metrics_enabled: bool) -> Router {
    let mut app = Router::new()
        .route("/grade", post(grade_handler))
        .route("/admin/stats", get(stats_handler))
        .route("/admin/reset", post(reset_handler))
        .route("/health", get(health_handler));

    if metrics_enabled {
        app = app.route("/metrics", get(metrics_handler));
    }

    app.layer(TraceLayer::new_for_http()).with_state(state)
}

/// Start the HTTP server and run until it fails
pub async fn start_server(config: &Config) -> Result<()> {
    if config.metrics.enabled {
        // Already registered when the server is restarted in-process
        if let Err(e) = metrics::init() {
            tracing::debug!("Metrics registry already initialized: {}", e);
        }
    }

    if !config.execution.has_credentials() {
        tracing::warn!("Execution service credentials are not configured");
    }

    let state = AppState::from_config(config)?;
    let app = router(state, config.metrics.enabled);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid listen address {}:{}",
                config.server.host, config.server.port
            )
        })?;

    info!("Starting grading server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind grading server")?;

    axum::serve(listener, app)
        .await
        .context("Grading server error")?;

    Ok(())
}

async fn grade_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<GradeRequest>, JsonRejection>,
) -> Result<Json<GradeResult>, GradeError> {
    let caller = state.caller(&headers).await;
    if caller.is_none() {
        return Err(GradeError::Unauthenticated);
    }

    let Json(request) = body.map_err(|e| GradeError::InvalidInput(e.body_text()))?;
    let result = state.orchestrator.grade(caller.as_ref(), &request).await?;
    Ok(Json(result))
}

async fn stats_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<AdminStats>, GradeError> {
    let caller = state.caller(&headers).await;
    Ok(Json(state.admin.stats(caller.as_ref()).await?))
}

async fn reset_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ResetResponse>, GradeError> {
    let caller = state.caller(&headers).await;
    Ok(Json(state.admin.reset_all(caller.as_ref()).await?))
}

async fn metrics_handler() -> Response {
    match metrics::gather_metrics() {
        Ok(metrics_text) => (StatusCode::OK, metrics_text).into_response(),
        Err(e) => {
            error!("Failed to gather metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error gathering metrics: {}", e),
            )
                .into_response()
        }
    }
}

async fn health_handler() -> impl IntoResponse {
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::{ExecutionError, ExecutionOutput, ExecutionRequest};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    struct EchoClient;

    #[async_trait]
    impl ExecutionClient for EchoClient {
        async fn execute(
            &self,
            request: &ExecutionRequest,
        ) -> Result<ExecutionOutput, ExecutionError> {
            Ok(ExecutionOutput::new(request.stdin.clone()))
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    struct ThrottledClient;

    #[async_trait]
    impl ExecutionClient for ThrottledClient {
        async fn execute(&self, _: &ExecutionRequest) -> Result<ExecutionOutput, ExecutionError> {
            Err(ExecutionError::RateLimited)
        }

        fn name(&self) -> &str {
            "throttled"
        }
    }

    fn app_with(client: Arc<dyn ExecutionClient>) -> Router {
        let mut config = Config::default();
        config.rate_limit.max_requests_per_minute = 2;
        let identity = StaticIdentityProvider::new()
            .with_token("student-token", "student")
            .with_token("ops-token", "ops")
            .with_admin("ops");
        router(AppState::new(&config, client, Arc::new(identity)), true)
    }

    fn app() -> Router {
        app_with(Arc::new(EchoClient))
    }

    fn grade_body() -> String {
        serde_json::json!({
            "code": "print(input())",
            "language": "python3",
            "versionIndex": "3",
            "testCases": [
                {"input": "1", "expectedOutput": "1"},
                {"input": "2", "expectedOutput": "3"}
            ]
        })
        .to_string()
    }

    fn post_grade(token: Option<&str>, body: String) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/grade")
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        builder.body(Body::from(body)).unwrap()
    }

    async fn json_of(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_grade_success() {
        let response = app()
            .oneshot(post_grade(Some("student-token"), grade_body()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = json_of(response).await;
        assert_eq!(json["score"], 50.0);
        assert_eq!(json["passed"], 1);
        assert_eq!(json["total"], 2);
    }

    #[tokio::test]
    async fn test_grade_requires_token() {
        for token in [None, Some("bogus")] {
            let response = app().oneshot(post_grade(token, grade_body())).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            assert_eq!(json_of(response).await["error"], "unauthenticated");
        }
    }

    #[tokio::test]
    async fn test_grade_malformed_body() {
        let response = app()
            .oneshot(post_grade(Some("student-token"), "{not json".to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_of(response).await["error"], "invalid-argument");
    }

    #[tokio::test]
    async fn test_grade_rate_limited() {
        let app = app();
        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(post_grade(Some("student-token"), grade_body()))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app
            .oneshot(post_grade(Some("student-token"), grade_body()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let json = json_of(response).await;
        assert_eq!(json["error"], "resource-exhausted");
        assert_eq!(json["message"], "Rate limit exceeded. Please try again later.");
    }

    #[tokio::test]
    async fn test_upstream_throttling_maps_to_503() {
        let response = app_with(Arc::new(ThrottledClient))
            .oneshot(post_grade(Some("student-token"), grade_body()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json_of(response).await["error"], "upstream-rate-limited");
    }

    #[tokio::test]
    async fn test_admin_routes_require_admin() {
        let request = Request::get("/admin/stats")
            .header("authorization", "Bearer student-token")
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let request = Request::post("/admin/reset").body(Body::empty()).unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_admin_stats_and_reset() {
        let app = app();
        app.clone()
            .oneshot(post_grade(Some("student-token"), grade_body()))
            .await
            .unwrap();

        let request = Request::get("/admin/stats")
            .header("authorization", "Bearer ops-token")
            .body(Body::empty())
            .unwrap();
        let stats = json_of(app.clone().oneshot(request).await.unwrap()).await;
        assert_eq!(stats["cacheSize"], 1);
        assert_eq!(stats["dailyUsage"]["student"]["count"], 1);
        assert_eq!(stats["limits"]["minute"], 2);

        let request = Request::post("/admin/reset")
            .header("authorization", "Bearer ops-token")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_of(response).await["success"], true);

        let request = Request::get("/admin/stats")
            .header("authorization", "Bearer ops-token")
            .body(Body::empty())
            .unwrap();
        let stats = json_of(app.oneshot(request).await.unwrap()).await;
        assert_eq!(stats["cacheSize"], 0);
        assert!(stats["dailyUsage"].as_object().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_metrics_route_toggle() {
        let _ = metrics::init();
        let config = Config::default();
        let state = AppState::new(
            &config,
            Arc::new(EchoClient),
            Arc::new(StaticIdentityProvider::new()),
        );

        let response = router(state.clone(), true)
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router(state, false)
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
