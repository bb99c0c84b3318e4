use std::{fmt, sync::Arc};

use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use tracing::info;

use crate::domain::{error::Error, Result};

pub const NAMESPACE_PLACEHOLDER: &str = "{namespace}";
pub const STATUS_SUCCESS: &str = "success";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueryInfo {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub data: QueryData,
    #[serde(
        rename = "errorType",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub error_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}
impl QueryInfo {
    pub fn is_success(&self) -> bool {
        self.status == STATUS_SUCCESS
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryData {
    pub result_type: String,
    pub result: Vec<ResultType>,
}

/// One sample series. Instant vectors carry `value`, range vectors `values`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResultType {
    #[serde(default)]
    pub metric: MetricLabels,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<SampleValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<SampleValue>,
}
impl ResultType {
    /// Most recent sample of the series, if the server sent any.
    pub fn latest(&self) -> Option<&SampleValue> {
        self.value.as_ref().or_else(|| self.values.last())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct MetricLabels {
    #[serde(default)]
    pub node_name: String,
}

/// Prometheus encodes a sample as `[<unix seconds>, "<value>"]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleValue {
    pub timestamp: f64,
    pub value: String,
}
impl SampleValue {
    pub fn as_f64(&self) -> std::result::Result<f64, std::num::ParseFloatError> {
        self.value.parse()
    }

    pub fn observed_at(&self) -> Option<DateTime<Utc>> {
        if !self.timestamp.is_finite() {
            return None;
        }
        DateTime::from_timestamp_millis((self.timestamp * 1000.0).round() as i64)
    }
}

impl Serialize for SampleValue {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (self.timestamp, &self.value).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SampleValue {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value: Vec<serde_json::Value> = Deserialize::deserialize(deserializer)?;
        let [timestamp, sample]: [serde_json::Value; 2] = value.try_into().map_err(
            |value: Vec<serde_json::Value>| {
                <D::Error as de::Error>::invalid_length(value.len(), &"a [timestamp, value] pair")
            },
        )?;

        let timestamp = match &timestamp {
            serde_json::Value::Number(number) => number.as_f64(),
            serde_json::Value::String(raw) => raw.parse::<f64>().ok(),
            _ => None,
        }
        .ok_or_else(|| {
            <D::Error as de::Error>::invalid_value(
                de::Unexpected::Other(&timestamp.to_string()),
                &"a numeric timestamp",
            )
        })?;

        let value = match sample {
            serde_json::Value::String(value) => value,
            other => {
                return Err(<D::Error as de::Error>::invalid_type(
                    de::Unexpected::Other(&other.to_string()),
                    &"a string encoded sample value",
                ))
            }
        };

        Ok(Self { timestamp, value })
    }
}

/// Base url of the Prometheus API. `{namespace}` is replaced by the namespace
/// of the proxied mesh, e.g. `http://osm-prometheus.{namespace}.svc:7070`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyEndpoint(String);
impl ProxyEndpoint {
    pub fn new(template: &str) -> Result<Self> {
        let template = template.trim().trim_end_matches('/');
        if template.is_empty() {
            return Err(Error::InvalidUrl {
                url: template.into(),
                reason: "prometheus url must be configured".into(),
            });
        }

        Ok(Self(template.into()))
    }

    pub fn resolve(&self, namespace: &str) -> Result<String> {
        if !self.0.contains(NAMESPACE_PLACEHOLDER) {
            return Ok(self.0.clone());
        }

        if !is_dns_label(namespace) {
            return Err(Error::InvalidUrl {
                url: self.0.clone(),
                reason: format!("namespace {namespace:?} is not a valid dns label"),
            });
        }

        Ok(self.0.replace(NAMESPACE_PLACEHOLDER, namespace))
    }
}
impl fmt::Display for ProxyEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_dns_label(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= 63
        && value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !value.starts_with('-')
        && !value.ends_with('-')
}

#[async_trait::async_trait]
pub trait MetricQueryDriven: Send + Sync {
    async fn query_metric(&self, endpoint: &str, expression: &str) -> Result<QueryInfo>;
}

pub async fn proxy_query(
    driven: Arc<dyn MetricQueryDriven>,
    endpoint: &ProxyEndpoint,
    namespace: &str,
    name: &str,
    query: &str,
) -> Result<QueryInfo> {
    info!(namespace, name, "getting details of proxy prometheus");

    let url = endpoint.resolve(namespace)?;
    driven.query_metric(&url, query).await
}

#[cfg(test)]
mod tests {
    use mockall::{mock, predicate::eq};

    use super::*;

    const VECTOR_RESPONSE: &str = r#"{
        "status": "success",
        "data": {
            "resultType": "vector",
            "result": [
                {"metric": {"node_name": "node-1", "job": "envoy"}, "value": [1700000000, "1"]},
                {"metric": {"node_name": "node-2"}, "value": [1700000000.5, "NaN"]}
            ]
        }
    }"#;

    mock! {
        pub FakeMetricQueryDriven { }

        #[async_trait::async_trait]
        impl MetricQueryDriven for FakeMetricQueryDriven {
            async fn query_metric(&self, endpoint: &str, expression: &str) -> Result<QueryInfo>;
        }
    }

    fn empty_vector() -> QueryInfo {
        QueryInfo {
            status: STATUS_SUCCESS.into(),
            data: QueryData {
                result_type: "vector".into(),
                result: Vec::new(),
            },
            error_type: None,
            error: None,
            warnings: Vec::new(),
        }
    }

    #[test]
    fn it_should_decode_vector_response() {
        let info: QueryInfo = serde_json::from_str(VECTOR_RESPONSE).unwrap();

        assert!(info.is_success());
        assert_eq!(info.data.result_type, "vector");
        assert_eq!(info.data.result.len(), 2);
        assert_eq!(info.data.result[0].metric.node_name, "node-1");
        let sample = info.data.result[0].value.as_ref().unwrap();
        assert_eq!(sample.timestamp, 1700000000.0);
        assert_eq!(sample.value, "1");
        assert_eq!(info.data.result[1].metric.node_name, "node-2");
        assert!(info.data.result[1].latest().unwrap().as_f64().unwrap().is_nan());
    }

    #[test]
    fn it_should_keep_status_and_result_type_on_reencode() {
        let info: QueryInfo = serde_json::from_str(VECTOR_RESPONSE).unwrap();
        let encoded = serde_json::to_string(&info).unwrap();
        let decoded: QueryInfo = serde_json::from_str(&encoded).unwrap();

        assert_eq!(decoded.status, info.status);
        assert_eq!(decoded.data.result_type, info.data.result_type);
        assert_eq!(decoded.data.result[1].value, info.data.result[1].value);
    }

    #[test]
    fn it_should_ignore_unknown_fields() {
        let info: QueryInfo = serde_json::from_str(
            r#"{"status":"success","extra":true,"data":{"resultType":"scalar","result":[],"stats":{}}}"#,
        )
        .unwrap();

        assert_eq!(info.data.result_type, "scalar");
        assert!(info.data.result.is_empty());
    }

    #[test]
    fn it_should_decode_error_envelope_as_value() {
        let info: QueryInfo = serde_json::from_str(
            r#"{"status":"error","data":{"resultType":"","result":[]}}"#,
        )
        .unwrap();
        assert_eq!(info.status, "error");
        assert!(!info.is_success());

        let info: QueryInfo = serde_json::from_str(
            r#"{"status":"error","errorType":"bad_data","error":"parse error at char 4"}"#,
        )
        .unwrap();
        assert_eq!(info.error_type.as_deref(), Some("bad_data"));
        assert_eq!(info.error.as_deref(), Some("parse error at char 4"));
        assert!(info.data.result.is_empty());
    }

    #[test]
    fn it_should_fail_when_status_is_not_a_string() {
        let result = serde_json::from_str::<QueryInfo>(r#"{"status":1,"data":{"resultType":"","result":[]}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn it_should_default_missing_node_name() {
        let series: ResultType =
            serde_json::from_str(r#"{"metric":{"job":"x"},"value":[1,"2"]}"#).unwrap();
        assert_eq!(series.metric, MetricLabels::default());
    }

    #[test]
    fn it_should_default_missing_status() {
        let info: QueryInfo =
            serde_json::from_str(r#"{"data":{"resultType":"vector","result":[]}}"#).unwrap();

        assert_eq!(info.status, "");
        assert!(!info.is_success());
        assert_eq!(info.data.result_type, "vector");
    }

    #[test]
    fn it_should_default_missing_metric_and_value() {
        let info: QueryInfo = serde_json::from_str(
            r#"{"status":"success","data":{"resultType":"vector","result":[{"value":[1,"1"]},{"metric":{"node_name":"node-1"}}]}}"#,
        )
        .unwrap();

        assert_eq!(info.data.result[0].metric, MetricLabels::default());
        assert_eq!(info.data.result[0].latest().unwrap().value, "1");
        assert_eq!(info.data.result[1].metric.node_name, "node-1");
        assert!(info.data.result[1].value.is_none());
        assert!(info.data.result[1].latest().is_none());

        let data: QueryData = serde_json::from_str(r#"{"result":[{"value":[1,"1"]}]}"#).unwrap();
        assert_eq!(data.result_type, "");
        assert_eq!(data.result.len(), 1);
    }

    #[test]
    fn it_should_decode_matrix_response() {
        let info: QueryInfo = serde_json::from_str(
            r#"{"status":"success","data":{"resultType":"matrix","result":[
                {"metric":{"node_name":"node-1"},"values":[[1700000000,"1"],[1700000015,"3"]]}
            ]}}"#,
        )
        .unwrap();

        let series = &info.data.result[0];
        assert_eq!(info.data.result_type, "matrix");
        assert!(series.value.is_none());
        assert_eq!(series.values.len(), 2);
        assert_eq!(series.latest().unwrap().timestamp, 1700000015.0);
        assert_eq!(series.latest().unwrap().value, "3");
    }

    #[test]
    fn it_should_fail_malformed_sample_in_matrix() {
        let result = serde_json::from_str::<ResultType>(r#"{"metric":{},"values":[[1700000000]]}"#);
        assert!(result.is_err());
    }

    #[test]
    fn it_should_reject_malformed_sample_pair() {
        for raw in [
            r#"[1700000000]"#,
            r#"[1700000000, "1", "2"]"#,
            r#"["yesterday", "1"]"#,
            r#"[1700000000, 1]"#,
            r#"{"timestamp": 1, "value": "1"}"#,
        ] {
            assert!(
                serde_json::from_str::<SampleValue>(raw).is_err(),
                "{raw} should not decode"
            );
        }
    }

    #[test]
    fn it_should_accept_string_timestamp() {
        let sample: SampleValue = serde_json::from_str(r#"["1700000000.25", "+Inf"]"#).unwrap();
        assert_eq!(sample.timestamp, 1700000000.25);
        assert_eq!(sample.as_f64().unwrap(), f64::INFINITY);
        assert_eq!(
            sample.observed_at().unwrap().timestamp_millis(),
            1700000000250
        );
    }

    #[test]
    fn it_should_resolve_namespace_placeholder() {
        let endpoint = ProxyEndpoint::new("http://osm-prometheus.{namespace}.svc:7070/").unwrap();
        assert_eq!(
            endpoint.resolve("osm-system").unwrap(),
            "http://osm-prometheus.osm-system.svc:7070"
        );
        assert!(matches!(
            endpoint.resolve("evil.com/"),
            Err(Error::InvalidUrl { .. })
        ));

        let fixed = ProxyEndpoint::new("http://192.168.10.35:31001").unwrap();
        assert_eq!(fixed.resolve("anything").unwrap(), "http://192.168.10.35:31001");
    }

    #[test]
    fn it_should_fail_empty_endpoint() {
        assert!(matches!(
            ProxyEndpoint::new("  "),
            Err(Error::InvalidUrl { .. })
        ));
    }

    #[tokio::test]
    async fn it_should_proxy_query_to_resolved_endpoint() {
        let mut driven = MockFakeMetricQueryDriven::new();
        driven
            .expect_query_metric()
            .with(
                eq("http://osm-prometheus.osm-system.svc:7070"),
                eq("envoy_cluster_upstream_rq"),
            )
            .return_once(|_, _| Ok(empty_vector()));

        let endpoint = ProxyEndpoint::new("http://osm-prometheus.{namespace}.svc:7070").unwrap();
        let result = proxy_query(
            Arc::new(driven),
            &endpoint,
            "osm-system",
            "osm-mesh-config",
            "envoy_cluster_upstream_rq",
        )
        .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn it_should_not_query_with_invalid_namespace() {
        let mut driven = MockFakeMetricQueryDriven::new();
        driven.expect_query_metric().never();

        let endpoint = ProxyEndpoint::new("http://osm-prometheus.{namespace}.svc:7070").unwrap();
        let result = proxy_query(Arc::new(driven), &endpoint, "Bad_NS", "mesh", "up").await;

        assert!(matches!(result, Err(Error::InvalidUrl { .. })));
    }

    #[tokio::test]
    async fn it_should_propagate_driven_error() {
        let mut driven = MockFakeMetricQueryDriven::new();
        driven
            .expect_query_metric()
            .return_once(|_, _| Err(Error::Unexpected("boom".into())));

        let endpoint = ProxyEndpoint::new("http://192.168.10.35:31001").unwrap();
        let result = proxy_query(Arc::new(driven), &endpoint, "osm-system", "mesh", "up").await;

        assert!(matches!(result, Err(Error::Unexpected(_))));
    }
}
