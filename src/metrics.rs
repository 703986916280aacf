//! Prometheus metrics for the Vote Processor.
//!
//! All three series are registered against a private `Registry`, not the process-global default
//! registry, so `/metrics` exposes exactly the series this crate owns.

use prometheus::{HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};

const NAMESPACE: &str = "voting_system";
const SUBSYSTEM: &str = "consumer";

pub struct ProcessorMetrics {
    pub votes_processed: IntCounterVec,
    pub votes_duplicate: IntCounterVec,
    pub processing_time: HistogramVec,
    registry: Registry,
}

impl ProcessorMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let votes_processed = IntCounterVec::new(
            Opts::new("votes_processed_total", "Total number of unique accepted votes")
                .namespace(NAMESPACE)
                .subsystem(SUBSYSTEM),
            &["poll_id"],
        )
        .expect("valid counter opts");

        let votes_duplicate = IntCounterVec::new(
            Opts::new("votes_duplicate_total", "Total number of duplicate votes detected")
                .namespace(NAMESPACE)
                .subsystem(SUBSYSTEM),
            &["poll_id"],
        )
        .expect("valid counter opts");

        // 10 linear buckets, 1ms-10ms.
        let buckets: Vec<f64> = (1..=10).map(|i| i as f64 * 0.001).collect();
        let processing_time = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "vote_processing_time_seconds",
                "Histogram of vote processing times",
            )
            .namespace(NAMESPACE)
            .subsystem(SUBSYSTEM)
            .buckets(buckets),
            &["poll_id"],
        )
        .expect("valid histogram opts");

        registry
            .register(Box::new(votes_processed.clone()))
            .expect("unique metric name");
        registry
            .register(Box::new(votes_duplicate.clone()))
            .expect("unique metric name");
        registry
            .register(Box::new(processing_time.clone()))
            .expect("unique metric name");

        Self {
            votes_processed,
            votes_duplicate,
            processing_time,
            registry,
        }
    }

    /// Render the Prometheus text exposition format for `/metrics`.
    pub fn encode(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder
            .encode_to_string(&metric_families)
            .unwrap_or_default()
    }
}

impl Default for ProcessorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_all_three_series_after_observation() {
        let metrics = ProcessorMetrics::new();
        metrics.votes_processed.with_label_values(&["p1"]).inc();
        metrics.votes_duplicate.with_label_values(&["p1"]).inc();
        metrics
            .processing_time
            .with_label_values(&["p1"])
            .observe(0.002);

        let text = metrics.encode();
        assert!(text.contains("voting_system_consumer_votes_processed_total"));
        assert!(text.contains("voting_system_consumer_votes_duplicate_total"));
        assert!(text.contains("voting_system_consumer_vote_processing_time_seconds"));
    }
}
