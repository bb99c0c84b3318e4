use std::{sync::Arc, time::Duration};

use anyhow::{bail, Result};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tokio::try_join;
use tracing::{info, warn};

use crate::{
    domain::{
        error::Error,
        query::{self, MetricQueryDriven, ProxyEndpoint},
    },
    driven::prometheus::{metrics::MetricsDriven, PrometheusDriven},
    drivers,
};

const SOURCE: &str = "proxy";

pub async fn server(config: ProxyConfig) -> Result<()> {
    let endpoint = ProxyEndpoint::new(&config.prometheus_url)?;
    let prometheus_driven = Arc::new(PrometheusDriven::with_timeout(config.timeout)?);
    let metrics = Arc::new(MetricsDriven::new()?);

    let state = Arc::new(ProxyState {
        driven: prometheus_driven,
        endpoint: endpoint.clone(),
        metrics: metrics.clone(),
    });

    let listener = tokio::net::TcpListener::bind(&config.addr).await?;

    let proxy = async {
        info!(
            address = config.addr,
            prometheus = endpoint.to_string(),
            "Proxy server running"
        );
        if let Err(err) = axum::serve(listener, router(state)).await {
            bail!(err);
        }
        Ok(())
    };
    let metrics_server = drivers::metrics::server(&config.metrics_addr, metrics);

    try_join!(proxy, metrics_server)?;

    Ok(())
}

pub struct ProxyState {
    pub driven: Arc<dyn MetricQueryDriven>,
    pub endpoint: ProxyEndpoint,
    pub metrics: Arc<MetricsDriven>,
}

pub fn router(state: Arc<ProxyState>) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/api/v1/prometheus/:namespace/:name", get(proxy_query))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct ProxyQueryParams {
    pub query: Option<String>,
}

async fn proxy_query(
    State(state): State<Arc<ProxyState>>,
    Path((namespace, name)): Path<(String, String)>,
    Query(params): Query<ProxyQueryParams>,
) -> Response {
    let result = match params.query {
        Some(expression) => {
            query::proxy_query(
                state.driven.clone(),
                &state.endpoint,
                &namespace,
                &name,
                &expression,
            )
            .await
        }
        None => Err(Error::InvalidUrl {
            url: format!("/api/v1/prometheus/{namespace}/{name}"),
            reason: "missing query parameter".into(),
        }),
    };

    match result {
        Ok(info) => {
            state.metrics.query(SOURCE, &info.status);
            Json(info).into_response()
        }
        Err(err) => {
            warn!(
                namespace,
                name,
                kind = err.kind(),
                error = err.to_string(),
                "proxy query failed"
            );
            state.metrics.query_error(SOURCE, &err);
            ProxyError(err).into_response()
        }
    }
}

struct ProxyError(Error);
impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            Error::InvalidUrl { .. } => StatusCode::BAD_REQUEST,
            Error::ConnectionFailed { .. } | Error::DecodeFailed { .. } => StatusCode::BAD_GATEWAY,
            Error::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

pub struct ProxyConfig {
    pub addr: String,
    pub metrics_addr: String,
    pub prometheus_url: String,
    pub timeout: Duration,
}
