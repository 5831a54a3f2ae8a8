//! Prometheus metrics for the ingestion core
//!
//! Exposed on the operator API's /metrics endpoint.

use prometheus::{IntCounterVec, IntGaugeVec, Opts, Registry};

use crate::types::ChainId;

pub struct Metrics {
    pub events_accepted_total: IntCounterVec,
    pub nonce_errors_total: IntCounterVec,
    pub provider_quarantines_total: IntCounterVec,
    pub chain_pauses_total: IntCounterVec,
    pub transport_failures_total: IntCounterVec,
    pub endpoint_exhausted_total: IntCounterVec,
    pub forward_failures_total: IntCounterVec,
    pub redeliveries_skipped_total: IntCounterVec,
    pub last_nonce: IntGaugeVec,
    pub selectable_endpoints: IntGaugeVec,
    pub registry: Registry,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn counter_vec(name: &str, help: &str, labels: &[&str]) -> IntCounterVec {
    IntCounterVec::new(Opts::new(name, help), labels).expect("constant metric name is valid")
}

fn gauge_vec(name: &str, help: &str, labels: &[&str]) -> IntGaugeVec {
    IntGaugeVec::new(Opts::new(name, help), labels).expect("constant metric name is valid")
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let events_accepted_total = counter_vec(
            "ingest_events_accepted_total",
            "Events whose nonce continued the chain sequence",
            &["chain"],
        );
        let nonce_errors_total = counter_vec(
            "ingest_nonce_errors_total",
            "Events rejected by nonce validation",
            &["chain", "kind"],
        );
        let provider_quarantines_total = counter_vec(
            "ingest_provider_quarantines_total",
            "RPC endpoints quarantined after serving a nonce gap",
            &["chain"],
        );
        let chain_pauses_total = counter_vec(
            "ingest_chain_pauses_total",
            "Chains paused after a duplicated nonce",
            &["chain"],
        );
        let transport_failures_total = counter_vec(
            "ingest_transport_failures_total",
            "Scan cycles that failed to fetch events",
            &["chain", "kind"],
        );
        let endpoint_exhausted_total = counter_vec(
            "ingest_endpoint_exhausted_total",
            "Scan cycles skipped because no RPC endpoint was selectable",
            &["chain"],
        );
        let forward_failures_total = counter_vec(
            "ingest_forward_failures_total",
            "Accepted events that could not be forwarded downstream",
            &["chain"],
        );
        let redeliveries_skipped_total = counter_vec(
            "ingest_redeliveries_skipped_total",
            "Already accepted events delivered again by an endpoint",
            &["chain"],
        );
        let last_nonce = gauge_vec(
            "ingest_last_nonce",
            "Last accepted nonce",
            &["chain"],
        );
        let selectable_endpoints = gauge_vec(
            "ingest_selectable_endpoints",
            "RPC endpoints that are both valid and active",
            &["chain"],
        );

        // Names are unique constants and each registry is fresh
        registry
            .register(Box::new(events_accepted_total.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(nonce_errors_total.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(provider_quarantines_total.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(chain_pauses_total.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(transport_failures_total.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(endpoint_exhausted_total.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(forward_failures_total.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(redeliveries_skipped_total.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(last_nonce.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(selectable_endpoints.clone()))
            .expect("metric registration must not be called twice");

        Self {
            events_accepted_total,
            nonce_errors_total,
            provider_quarantines_total,
            chain_pauses_total,
            transport_failures_total,
            endpoint_exhausted_total,
            forward_failures_total,
            redeliveries_skipped_total,
            last_nonce,
            selectable_endpoints,
            registry,
        }
    }

    pub fn record_accepted(&self, chain_id: ChainId, nonce: u64) {
        let chain = chain_id.to_string();
        self.events_accepted_total.with_label_values(&[&chain]).inc();
        self.last_nonce
            .with_label_values(&[&chain])
            .set(i64::try_from(nonce).unwrap_or(i64::MAX));
    }

    pub fn record_nonce_error(&self, chain_id: ChainId, kind: &str) {
        self.nonce_errors_total
            .with_label_values(&[&chain_id.to_string(), kind])
            .inc();
    }

    pub fn record_quarantine(&self, chain_id: ChainId, selectable: usize) {
        let chain = chain_id.to_string();
        self.provider_quarantines_total
            .with_label_values(&[&chain])
            .inc();
        self.set_selectable_endpoints(chain_id, selectable);
    }

    pub fn record_pause(&self, chain_id: ChainId) {
        self.chain_pauses_total
            .with_label_values(&[&chain_id.to_string()])
            .inc();
    }

    pub fn record_transport_failure(&self, chain_id: ChainId, kind: &str) {
        self.transport_failures_total
            .with_label_values(&[&chain_id.to_string(), kind])
            .inc();
    }

    pub fn record_endpoint_exhausted(&self, chain_id: ChainId) {
        self.endpoint_exhausted_total
            .with_label_values(&[&chain_id.to_string()])
            .inc();
        self.set_selectable_endpoints(chain_id, 0);
    }

    pub fn record_forward_failure(&self, chain_id: ChainId) {
        self.forward_failures_total
            .with_label_values(&[&chain_id.to_string()])
            .inc();
    }

    pub fn record_redelivery(&self, chain_id: ChainId) {
        self.redeliveries_skipped_total
            .with_label_values(&[&chain_id.to_string()])
            .inc();
    }

    pub fn set_selectable_endpoints(&self, chain_id: ChainId, count: usize) {
        self.selectable_endpoints
            .with_label_values(&[&chain_id.to_string()])
            .set(count as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_independent_registries() {
        // Each instance owns its registry, so tests never collide on names
        let a = Metrics::new();
        let b = Metrics::new();
        a.record_accepted(97, 5);
        assert_eq!(a.events_accepted_total.with_label_values(&["97"]).get(), 1);
        assert_eq!(b.events_accepted_total.with_label_values(&["97"]).get(), 0);
    }

    #[test]
    fn test_record_accepted_sets_last_nonce() {
        let metrics = Metrics::new();
        metrics.record_accepted(97, 0);
        metrics.record_accepted(97, 1);
        assert_eq!(metrics.events_accepted_total.with_label_values(&["97"]).get(), 2);
        assert_eq!(metrics.last_nonce.with_label_values(&["97"]).get(), 1);
    }

    #[test]
    fn test_record_nonce_error_by_kind() {
        let metrics = Metrics::new();
        metrics.record_nonce_error(1, "missed_nonce");
        metrics.record_nonce_error(1, "missed_nonce");
        metrics.record_nonce_error(1, "duplicated_nonce");
        assert_eq!(
            metrics
                .nonce_errors_total
                .with_label_values(&["1", "missed_nonce"])
                .get(),
            2
        );
        assert_eq!(
            metrics
                .nonce_errors_total
                .with_label_values(&["1", "duplicated_nonce"])
                .get(),
            1
        );
    }

    #[test]
    fn test_gather_exposes_names() {
        let metrics = Metrics::new();
        metrics.record_pause(56);
        let names: Vec<String> = metrics
            .registry
            .gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();
        assert!(names.contains(&"ingest_chain_pauses_total".to_string()));
    }
}
