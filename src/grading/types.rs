//! Grading request and result types.

use serde::{Deserialize, Serialize};

/// A single stdin/expected-stdout pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    /// Data fed to the program on stdin
    #[serde(default)]
    pub input: String,

    /// Expected program output, compared after trimming
    #[serde(default)]
    pub expected_output: String,
}

impl TestCase {
    pub fn new(input: impl Into<String>, expected_output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            expected_output: expected_output.into(),
        }
    }

    /// Whether `output` matches this case's expected output. Leading and
    /// trailing whitespace is ignored on both sides.
    pub fn matches(&self, output: &str) -> bool {
        output.trim() == self.expected_output.trim()
    }
}

/// A submission to grade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeRequest {
    /// Source code
    pub code: String,

    /// Language identifier understood by the execution service
    pub language: String,

    /// Language version index understood by the execution service
    pub version_index: String,

    /// Cases to run, in order
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
}

/// Aggregate outcome of a grading run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GradeResult {
    /// Percentage of passed cases, 0 to 100
    pub score: f64,

    /// Number of passed cases
    pub passed: u32,

    /// Number of cases run
    pub total: u32,
}

impl GradeResult {
    /// Build a result from pass/total counts
    pub fn from_counts(passed: u32, total: u32) -> Self {
        let score = if total > 0 {
            (passed as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        Self {
            score,
            passed,
            total,
        }
    }
}
