use std::{env, time::Duration};

use anyhow::Result;
use dotenv::dotenv;
use mesh_metrics::{driven::prometheus::DEFAULT_TIMEOUT, drivers::proxy::ProxyConfig};
use serde::Deserialize;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .with_env_var("RUST_LOG")
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(env_filter)
        .init();

    let config = Config::new()?;

    mesh_metrics::drivers::proxy::server(config.into()).await
}

#[derive(Debug, Deserialize)]
struct Config {
    addr: String,
    metrics_addr: String,
    prometheus_url: String,
    timeout_secs: Option<u64>,
}
impl Config {
    pub fn new() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(
                config::File::with_name(&env::var("PROXY_CONFIG").unwrap_or("proxy.toml".into()))
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix("proxy")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }
}

impl From<Config> for ProxyConfig {
    fn from(value: Config) -> Self {
        Self {
            addr: value.addr,
            metrics_addr: value.metrics_addr,
            prometheus_url: value.prometheus_url,
            timeout: value
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_TIMEOUT),
        }
    }
}
