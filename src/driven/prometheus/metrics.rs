use anyhow::Result as AnyhowResult;
use prometheus::{opts, IntCounterVec, Registry};

use crate::domain::error::Error;

pub struct MetricsDriven {
    registry: Registry,
    pub queries: IntCounterVec,
    pub query_errors: IntCounterVec,
}

impl MetricsDriven {
    pub fn new() -> AnyhowResult<Self> {
        let registry = Registry::default();

        let queries = IntCounterVec::new(
            opts!("mesh_metrics_queries_total", "proxied prometheus queries",),
            &["source", "status"],
        )?;
        registry.register(Box::new(queries.clone()))?;

        let query_errors = IntCounterVec::new(
            opts!(
                "mesh_metrics_query_errors_total",
                "failed proxied prometheus queries",
            ),
            &["source", "kind"],
        )?;
        registry.register(Box::new(query_errors.clone()))?;

        Ok(Self {
            registry,
            queries,
            query_errors,
        })
    }

    pub fn metrics_collected(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }

    /// `status` is the status reported by prometheus, not the http one.
    pub fn query(&self, source: &str, status: &str) {
        self.queries.with_label_values(&[source, status]).inc()
    }

    pub fn query_error(&self, source: &str, error: &Error) {
        self.query_errors
            .with_label_values(&[source, error.kind()])
            .inc()
    }
}
