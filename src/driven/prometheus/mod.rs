use std::time::Duration;

use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, error};

use crate::domain::{
    error::Error,
    query::{MetricQueryDriven, QueryInfo},
    Result,
};

pub mod metrics;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const QUERY_PATH: &str = "/api/v1/query?query=";
const BODY_SNIPPET_LEN: usize = 512;

pub struct PrometheusDriven {
    client: Client,
}
impl PrometheusDriven {
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self { client })
    }

    /// GET `url` and decode the whole body as `T`.
    pub async fn fetch_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let connection_failed = |source| Error::ConnectionFailed {
            url: url.to_string(),
            source,
        };

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(connection_failed)?;

        let status = response.status();
        debug!(url = url.as_str(), status = status.as_u16(), "prometheus response");

        // consuming the body releases the connection on every path
        let body = response.bytes().await.map_err(connection_failed)?;

        serde_json::from_slice(&body).map_err(|source| {
            let body = snippet(&body);
            error!(
                url = url.as_str(),
                status = status.as_u16(),
                body,
                error = source.to_string(),
                "fail to decode prometheus response"
            );
            Error::DecodeFailed {
                url: url.to_string(),
                status: status.as_u16(),
                body,
                source,
            }
        })
    }
}

#[async_trait::async_trait]
impl MetricQueryDriven for PrometheusDriven {
    async fn query_metric(&self, endpoint: &str, expression: &str) -> Result<QueryInfo> {
        let url = query_url(endpoint, expression)?;
        self.fetch_json(url).await
    }
}

/// Instant query url before any encoding is applied.
pub fn raw_query_url(endpoint: &str, expression: &str) -> String {
    format!("{endpoint}{QUERY_PATH}{expression}")
}

/// Parses the raw instant query url and re-encodes its query component.
pub fn query_url(endpoint: &str, expression: &str) -> Result<Url> {
    let raw = raw_query_url(endpoint, expression);

    let mut url = Url::parse(&raw).map_err(|err| Error::InvalidUrl {
        url: raw.clone(),
        reason: err.to_string(),
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::InvalidUrl {
            url: raw,
            reason: format!("unsupported scheme {}", url.scheme()),
        });
    }

    let mut pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    // stable: values of a repeated key keep their order
    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    url.query_pairs_mut().clear().extend_pairs(pairs);

    Ok(url)
}

fn snippet(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    match text.char_indices().nth(BODY_SNIPPET_LEN) {
        Some((index, _)) => format!("{}...", &text[..index]),
        None => text.into_owned(),
    }
}
