//! Cache key derivation.
//!
//! Keys are the SHA-256 of a canonical JSON encoding of the submission
//! tuple. Field order is fixed by the struct below and test cases keep
//! their submitted order, so reordering cases yields a different key.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::grading::types::{GradeRequest, TestCase};

#[derive(Serialize)]
struct KeyMaterial<'a> {
    code: &'a str,
    language: &'a str,
    version_index: &'a str,
    test_cases: &'a [TestCase],
}

/// Deterministic identity of a submission, lowercase hex
pub fn cache_key(
    code: &str,
    language: &str,
    version_index: &str,
    test_cases: &[TestCase],
) -> String {
    let material = KeyMaterial {
        code,
        language,
        version_index,
        test_cases,
    };
    // Serializing borrowed strings into a Vec cannot fail
    let encoded = serde_json::to_vec(&material).unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(&encoded);
    format!("{:x}", hasher.finalize())
}

/// Cache key for a whole request
pub fn request_key(request: &GradeRequest) -> String {
    cache_key(
        &request.code,
        &request.language,
        &request.version_index,
        &request.test_cases,
    )
}
