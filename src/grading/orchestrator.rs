//! Grading Orchestrator
//!
//! Answers a grading request by composing admission control, the result
//! cache and the execution service:
//!
//! ```text
//! caller ─► authenticated? ─► test cases? ─► can_proceed? ─► cache hit? ──► result
//!                                                              │ miss
//!                                                              ▼
//!                                     record usage ─► run cases in order ─► cache ─► result
//! ```
//!
//! Test cases run one after another. This bounds instantaneous load on the
//! metered service and keeps total wall time under
//! `test cases × per-call timeout`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::error::GradeError;
use super::types::{GradeRequest, GradeResult, TestCase};
use crate::auth::Caller;
use crate::cache::{request_key, ResultCache};
use crate::execution::{ExecutionClient, ExecutionRequest, ExecutionTimeout};
use crate::metrics;
use crate::rate_limit::{Admission, UsageTracker};

/// Whether a cache hit consumes a unit of the caller's quota
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheHitPolicy {
    /// A hit is recorded as a request like any other
    #[default]
    Count,
    /// Hits are free; only executions consume quota
    Free,
}

impl CacheHitPolicy {
    pub fn from_count_flag(count_cache_hits: bool) -> Self {
        if count_cache_hits {
            CacheHitPolicy::Count
        } else {
            CacheHitPolicy::Free
        }
    }
}

/// Grades submissions against the execution service
#[derive(Clone)]
pub struct GradingOrchestrator {
    tracker: UsageTracker,
    cache: ResultCache,
    client: Arc<dyn ExecutionClient>,
    timeout: ExecutionTimeout,
    cache_hit_policy: CacheHitPolicy,
}

impl GradingOrchestrator {
    /// Create an orchestrator with the default timeout and cache-hit policy
    pub fn new(
        tracker: UsageTracker,
        cache: ResultCache,
        client: Arc<dyn ExecutionClient>,
    ) -> Self {
        Self {
            tracker,
            cache,
            client,
            timeout: ExecutionTimeout::default(),
            cache_hit_policy: CacheHitPolicy::default(),
        }
    }

    /// Set the per-call execution timeout
    pub fn with_timeout(mut self, timeout: ExecutionTimeout) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the cache-hit policy
    pub fn with_cache_hit_policy(mut self, policy: CacheHitPolicy) -> Self {
        self.cache_hit_policy = policy;
        self
    }

    pub fn tracker(&self) -> &UsageTracker {
        &self.tracker
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn cache_hit_policy(&self) -> CacheHitPolicy {
        self.cache_hit_policy
    }

    /// Grade a submission on behalf of `caller`
    pub async fn grade(
        &self,
        caller: Option<&Caller>,
        request: &GradeRequest,
    ) -> Result<GradeResult, GradeError> {
        self.grade_at(caller, request, Utc::now()).await
    }

    /// Grade a submission with admission and cache expiry evaluated at `now`
    pub async fn grade_at(
        &self,
        caller: Option<&Caller>,
        request: &GradeRequest,
        now: DateTime<Utc>,
    ) -> Result<GradeResult, GradeError> {
        let request_id = Uuid::new_v4();
        let user = caller.map(|c| c.user_id.as_str()).unwrap_or("-");
        let span = info_span!("grade", %request_id, user);

        let result = self.grade_inner(caller, request, now).instrument(span).await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.code(),
        };
        metrics::GRADING_REQUESTS_TOTAL
            .with_label_values(&[outcome])
            .inc();

        result
    }

    async fn grade_inner(
        &self,
        caller: Option<&Caller>,
        request: &GradeRequest,
        now: DateTime<Utc>,
    ) -> Result<GradeResult, GradeError> {
        let caller = caller.ok_or(GradeError::Unauthenticated)?;

        if request.test_cases.is_empty() {
            return Err(GradeError::InvalidInput(
                "testCases must contain at least one case".to_string(),
            ));
        }
        let total = u32::try_from(request.test_cases.len())
            .map_err(|_| GradeError::InvalidInput("too many test cases".to_string()))?;

        if !self.tracker.can_proceed_at(&caller.user_id, now).await {
            warn!("Rate limit exceeded for user {}", caller.user_id);
            metrics::ADMISSION_DENIALS_TOTAL
                .with_label_values(&["check"])
                .inc();
            return Err(GradeError::AdmissionDenied);
        }

        let key = request_key(request);

        if let Some(cached) = self.cache.get_at(&key, now).await {
            metrics::CACHE_LOOKUPS_TOTAL.with_label_values(&["hit"]).inc();
            if self.cache_hit_policy == CacheHitPolicy::Count {
                self.commit_usage(&caller.user_id, now).await?;
            }
            info!("Returning cached result for code execution");
            return Ok(cached);
        }
        metrics::CACHE_LOOKUPS_TOTAL.with_label_values(&["miss"]).inc();

        // Quota is committed before any upstream call and is not refunded
        // when execution fails.
        self.commit_usage(&caller.user_id, now).await?;

        let passed = self.run_cases(request).await?;
        let result = GradeResult::from_counts(passed, total);

        self.cache.put_at(&key, result, now).await;
        info!(
            "Graded submission: {}/{} passed (score {:.1})",
            result.passed, result.total, result.score
        );

        Ok(result)
    }

    /// Record one request against the caller's quota, re-checking limits
    /// under the tracker's lock.
    async fn commit_usage(&self, user_id: &str, now: DateTime<Utc>) -> Result<(), GradeError> {
        match self.tracker.try_record_at(user_id, now).await {
            Admission::Allowed => Ok(()),
            denied => {
                warn!("Rate limit exceeded for user {} at commit: {:?}", user_id, denied);
                metrics::ADMISSION_DENIALS_TOTAL
                    .with_label_values(&["commit"])
                    .inc();
                Err(GradeError::AdmissionDenied)
            }
        }
    }

    /// Run every case in order, stopping at the first failure
    async fn run_cases(&self, request: &GradeRequest) -> Result<u32, GradeError> {
        let mut passed = 0;

        for (index, case) in request.test_cases.iter().enumerate() {
            if self.run_case(request, case, index).await? {
                passed += 1;
            }
        }

        Ok(passed)
    }

    async fn run_case(
        &self,
        request: &GradeRequest,
        case: &TestCase,
        index: usize,
    ) -> Result<bool, GradeError> {
        let execution = ExecutionRequest {
            script: request.code.clone(),
            language: request.language.clone(),
            version_index: request.version_index.clone(),
            stdin: case.input.clone(),
        };

        let started = Instant::now();
        let outcome = self.timeout.run(self.client.execute(&execution)).await;
        metrics::EXECUTION_CALL_DURATION_SECONDS.observe(started.elapsed().as_secs_f64());

        match outcome {
            Ok(output) => {
                metrics::EXECUTION_CALLS_TOTAL.with_label_values(&["ok"]).inc();
                let matched = case.matches(&output.output);
                debug!("Test case {} via {}: matched={}", index, self.client.name(), matched);
                Ok(matched)
            }
            Err(e) => {
                let status = if e.is_rate_limited() { "rate_limited" } else { "error" };
                metrics::EXECUTION_CALLS_TOTAL.with_label_values(&[status]).inc();
                warn!("Execution failed on test case {}: {}", index, e);
                Err(e.into())
            }
        }
    }
}

impl std::fmt::Debug for GradingOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GradingOrchestrator")
            .field("client", &self.client.name())
            .field("timeout", &self.timeout)
            .field("cache_hit_policy", &self.cache_hit_policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::{ExecutionError, ExecutionOutput};
    use crate::rate_limit::RateLimitConfig;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Scripted execution client: answers with queued outcomes in order,
    /// falling back to echoing stdin.
    #[derive(Default)]
    struct ScriptedClient {
        calls: AtomicUsize,
        script: Mutex<Vec<Result<ExecutionOutput, ExecutionError>>>,
    }

    impl ScriptedClient {
        fn with_script(script: Vec<Result<ExecutionOutput, ExecutionError>>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                script: Mutex::new(script.into_iter().rev().collect()),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ExecutionClient for ScriptedClient {
        async fn execute(
            &self,
            request: &ExecutionRequest,
        ) -> Result<ExecutionOutput, ExecutionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop();
            next.unwrap_or_else(|| Ok(ExecutionOutput::new(request.stdin.clone())))
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    struct SlowClient;

    #[async_trait]
    impl ExecutionClient for SlowClient {
        async fn execute(&self, _: &ExecutionRequest) -> Result<ExecutionOutput, ExecutionError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(ExecutionOutput::default())
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    fn orchestrator(client: Arc<dyn ExecutionClient>) -> GradingOrchestrator {
        GradingOrchestrator::new(UsageTracker::default_config(), ResultCache::default(), client)
    }

    fn request(cases: Vec<TestCase>) -> GradeRequest {
        GradeRequest {
            code: "a, b = map(int, input().split()); print(a + b)".to_string(),
            language: "python3".to_string(),
            version_index: "4".to_string(),
            test_cases: cases,
        }
    }

    #[tokio::test]
    async fn test_single_case_full_score() {
        let client = Arc::new(ScriptedClient::with_script(vec![Ok(ExecutionOutput::new("3\n"))]));
        let grader = orchestrator(client.clone());

        let result = grader
            .grade(Some(&Caller::user("u1")), &request(vec![TestCase::new("1 2", "3")]))
            .await
            .unwrap();

        assert_eq!(result, GradeResult { score: 100.0, passed: 1, total: 1 });
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn test_partial_score() {
        let client = Arc::new(ScriptedClient::with_script(vec![
            Ok(ExecutionOutput::new("  3  \n")),
            Ok(ExecutionOutput::new("5\n")),
        ]));
        let grader = orchestrator(client);

        let result = grader
            .grade(
                Some(&Caller::user("u1")),
                &request(vec![TestCase::new("1 2", "3"), TestCase::new("2 2", "4")]),
            )
            .await
            .unwrap();

        assert_eq!(result, GradeResult { score: 50.0, passed: 1, total: 2 });
    }

    #[tokio::test]
    async fn test_unauthenticated() {
        let client = Arc::new(ScriptedClient::default());
        let grader = orchestrator(client.clone());

        let err = grader
            .grade(None, &request(vec![TestCase::new("", "")]))
            .await
            .unwrap_err();

        assert_eq!(err, GradeError::Unauthenticated);
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_cases_rejected_before_quota() {
        let client = Arc::new(ScriptedClient::default());
        let grader = orchestrator(client.clone());

        let err = grader
            .grade(Some(&Caller::user("u1")), &request(vec![]))
            .await
            .unwrap_err();

        assert!(matches!(err, GradeError::InvalidInput(_)));
        assert_eq!(client.calls(), 0);
        assert!(grader.tracker().usage_for("u1").await.is_none());
    }

    #[tokio::test]
    async fn test_cache_hit_skips_execution_and_counts_quota() {
        let client = Arc::new(ScriptedClient::default());
        let grader = orchestrator(client.clone());
        let caller = Caller::user("u1");
        let req = request(vec![TestCase::new("x", "x"), TestCase::new("y", "z")]);

        let first = grader.grade(Some(&caller), &req).await.unwrap();
        let second = grader.grade(Some(&caller), &req).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(client.calls(), 2);
        let usage = grader.tracker().usage_for("u1").await.unwrap();
        assert_eq!(usage.daily_count, 2);
    }

    #[tokio::test]
    async fn test_free_cache_hits_do_not_count() {
        let client = Arc::new(ScriptedClient::default());
        let grader = orchestrator(client).with_cache_hit_policy(CacheHitPolicy::Free);
        let caller = Caller::user("u1");
        let req = request(vec![TestCase::new("x", "x")]);

        grader.grade(Some(&caller), &req).await.unwrap();
        grader.grade(Some(&caller), &req).await.unwrap();

        let usage = grader.tracker().usage_for("u1").await.unwrap();
        assert_eq!(usage.daily_count, 1);
    }

    #[tokio::test]
    async fn test_admission_denied_does_no_work() {
        let client = Arc::new(ScriptedClient::default());
        let grader = GradingOrchestrator::new(
            UsageTracker::new(RateLimitConfig::with_limits(200, 1)),
            ResultCache::default(),
            client.clone(),
        );
        let caller = Caller::user("u1");

        grader
            .grade(Some(&caller), &request(vec![TestCase::new("a", "a")]))
            .await
            .unwrap();
        let err = grader
            .grade(Some(&caller), &request(vec![TestCase::new("b", "b")]))
            .await
            .unwrap_err();

        assert_eq!(err, GradeError::AdmissionDenied);
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn test_upstream_rate_limit_aborts_and_caches_nothing() {
        let client = Arc::new(ScriptedClient::with_script(vec![
            Ok(ExecutionOutput::new("a")),
            Err(ExecutionError::RateLimited),
            Ok(ExecutionOutput::new("c")),
        ]));
        let grader = orchestrator(client.clone());
        let req = request(vec![
            TestCase::new("a", "a"),
            TestCase::new("b", "b"),
            TestCase::new("c", "c"),
        ]);

        let err = grader.grade(Some(&Caller::user("u1")), &req).await.unwrap_err();

        assert_eq!(err, GradeError::UpstreamRateLimited);
        assert_eq!(client.calls(), 2);
        assert_eq!(grader.cache().size().await, 0);
        // Quota was still consumed
        assert_eq!(grader.tracker().usage_for("u1").await.unwrap().daily_count, 1);
    }

    #[tokio::test]
    async fn test_other_upstream_failure_carries_message() {
        let client = Arc::new(ScriptedClient::with_script(vec![Err(ExecutionError::Request(
            "connection reset".to_string(),
        ))]));
        let grader = orchestrator(client);

        let err = grader
            .grade(Some(&Caller::user("u1")), &request(vec![TestCase::new("a", "a")]))
            .await
            .unwrap_err();

        match err {
            GradeError::UpstreamError(message) => assert!(message.contains("connection reset")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_upstream_error() {
        let grader =
            orchestrator(Arc::new(SlowClient)).with_timeout(ExecutionTimeout::from_secs(10));

        let err = grader
            .grade(Some(&Caller::user("u1")), &request(vec![TestCase::new("a", "a")]))
            .await
            .unwrap_err();

        assert!(matches!(err, GradeError::UpstreamError(_)));
        assert_eq!(grader.cache().size().await, 0);
    }

    #[test]
    fn test_cache_hit_policy_flag() {
        assert_eq!(CacheHitPolicy::from_count_flag(true), CacheHitPolicy::Count);
        assert_eq!(CacheHitPolicy::from_count_flag(false), CacheHitPolicy::Free);
        assert_eq!(CacheHitPolicy::default(), CacheHitPolicy::Count);
    }
}
