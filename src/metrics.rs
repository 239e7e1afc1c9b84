// Prometheus metrics for the grading service
//
// Exposed on the /metrics endpoint:
// - Grading outcomes (counter)
// - Cache lookups (counter)
// - Admission denials (counter)
// - Execution calls and their latency (counter, histogram)

use lazy_static::lazy_static;
use prometheus::{Encoder, Histogram, IntCounterVec, Registry, TextEncoder};
use std::sync::Arc;

lazy_static! {
    pub static ref REGISTRY: Arc<Registry> = Arc::new(Registry::new());

    pub static ref GRADING_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("grading_requests_total", "Grading requests by outcome"),
        &["outcome"]
    ).expect("Failed to create grading requests metric");

    pub static ref CACHE_LOOKUPS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("grading_cache_lookups_total", "Result cache lookups by result"),
        &["result"]
    ).expect("Failed to create cache lookups metric");

    pub static ref ADMISSION_DENIALS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("admission_denials_total", "Requests denied by the usage tracker"),
        &["stage"]
    ).expect("Failed to create admission denials metric");

    pub static ref EXECUTION_CALLS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("execution_calls_total", "Calls to the execution service by status"),
        &["status"]
    ).expect("Failed to create execution calls metric");

    pub static ref EXECUTION_CALL_DURATION_SECONDS: Histogram = Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "execution_call_duration_seconds",
            "Duration of calls to the execution service"
        ),
    ).expect("Failed to create execution call duration metric");
}

/// Initialize metrics registry. Registering twice returns an error, which
/// callers that may run more than once can ignore.
pub fn init() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(GRADING_REQUESTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CACHE_LOOKUPS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ADMISSION_DENIALS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(EXECUTION_CALLS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(EXECUTION_CALL_DURATION_SECONDS.clone()))?;
    Ok(())
}

/// Gather all metrics in Prometheus text format
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {}", e))?;
    String::from_utf8(buffer).map_err(|e| anyhow::anyhow!("Invalid UTF-8 in metrics: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_after_init() {
        let _ = init();

        GRADING_REQUESTS_TOTAL.with_label_values(&["success"]).inc();
        let text = gather_metrics().unwrap();
        assert!(text.contains("grading_requests_total"));
    }

    #[test]
    fn test_double_init_is_an_error() {
        let _ = init();
        assert!(init().is_err());
    }
}
