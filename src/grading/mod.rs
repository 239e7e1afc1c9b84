//! Grading
//!
//! Request/result types, the error taxonomy, and the orchestrator that ties
//! admission control, caching and execution together.

pub mod error;
pub mod orchestrator;
pub mod types;

pub use error::GradeError;
pub use orchestrator::{CacheHitPolicy, GradingOrchestrator};
pub use types::{GradeRequest, GradeResult, TestCase};
