use std::{sync::Arc, time::Duration};

use anyhow::Result;
use comfy_table::Table;
use tracing::info;

use crate::{
    domain::query::{self, ProxyEndpoint, QueryInfo},
    driven::prometheus::PrometheusDriven,
};

pub async fn run(
    config: QueryConfig,
    namespace: &str,
    name: &str,
    expression: &str,
    output: OutputFormat,
) -> Result<()> {
    let endpoint = ProxyEndpoint::new(&config.prometheus_url)?;
    let prometheus_driven = Arc::new(PrometheusDriven::with_timeout(config.timeout)?);

    let info =
        query::proxy_query(prometheus_driven, &endpoint, namespace, name, expression).await?;
    info!(
        status = info.status,
        series = info.data.result.len(),
        "query finished"
    );

    match output {
        OutputFormat::Table => println!("{}", render_table(&info)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&info)?),
    }

    Ok(())
}

pub fn render_table(info: &QueryInfo) -> Table {
    let mut table = Table::new();

    if !info.is_success() {
        table.set_header(vec!["status", "error_type", "error"]);
        table.add_row(vec![
            info.status.as_str(),
            info.error_type.as_deref().unwrap_or_default(),
            info.error.as_deref().unwrap_or_default(),
        ]);
        return table;
    }

    table.set_header(vec!["node_name", "timestamp", "value"]);
    for series in info.data.result.iter() {
        let (timestamp, value) = match series.latest() {
            Some(sample) => (
                sample
                    .observed_at()
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| sample.timestamp.to_string()),
                sample.value.clone(),
            ),
            None => (String::new(), String::new()),
        };

        table.add_row(vec![series.metric.node_name.clone(), timestamp, value]);
    }

    table
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Table,
    Json,
}

pub struct QueryConfig {
    pub prometheus_url: String,
    pub timeout: Duration,
}
