//! GradeGuard Library
//!
//! Grades code submissions against a metered remote execution service.
//! The library provides per-user admission control, a bounded TTL cache of
//! grading results, multi-test-case orchestration, the admin surface over
//! usage and cache state, and the HTTP API that exposes them.

pub mod admin;
pub mod auth;
pub mod cache;
pub mod config;
pub mod execution;
pub mod grading;
pub mod metrics;
pub mod rate_limit;
pub mod server;

pub use admin::{AdminControl, AdminStats};
pub use auth::{Caller, IdentityProvider, StaticIdentityProvider};
pub use cache::ResultCache;
pub use config::Config;
pub use execution::{ExecutionClient, ExecutionError, HttpExecutionClient};
pub use grading::{GradeError, GradeRequest, GradeResult, GradingOrchestrator, TestCase};
pub use rate_limit::{RateLimitConfig, UsageTracker};
