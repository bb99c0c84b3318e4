use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use mesh_metrics::{
    driven::prometheus::DEFAULT_TIMEOUT,
    drivers::query::{OutputFormat, QueryConfig},
};
use serde::Deserialize;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[arg(short, long, help = "Cli config path file", env = "CLI_CONFIG")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Parser, Clone)]
pub struct QueryArgs {
    /// Mesh namespace, replaces {namespace} in the prometheus url
    pub namespace: String,

    /// Mesh config name, only used for logging
    pub name: String,

    /// PromQL expression e.g 'sum(envoy_cluster_upstream_rq) by (node_name)'
    pub expression: String,

    /// format that will be returned table(log in terminal), json(log in terminal)
    #[arg(short, long, default_value = "table")]
    pub output: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an instant query against the mesh prometheus
    Query(QueryArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .with_env_var("RUST_LOG")
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();

    let cli = Cli::parse();
    let config = Config::new(&cli.config)?;

    match cli.command {
        Commands::Query(args) => {
            let output = match args.output.as_str() {
                "table" => OutputFormat::Table,
                "json" => OutputFormat::Json,
                _ => bail!("invalid output format"),
            };

            mesh_metrics::drivers::query::run(
                config.into(),
                &args.namespace,
                &args.name,
                &args.expression,
                output,
            )
            .await?;
        }
    }

    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
struct Config {
    prometheus_url: String,
    timeout_secs: Option<u64>,
}
impl Config {
    pub fn new(path: &str) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path).required(true))
            .build()?
            .try_deserialize()?;

        Ok(config)
    }
}

impl From<Config> for QueryConfig {
    fn from(value: Config) -> Self {
        Self {
            prometheus_url: value.prometheus_url,
            timeout: value
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_TIMEOUT),
        }
    }
}
