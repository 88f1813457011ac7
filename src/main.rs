use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use quickgraph::demo::Demo;
use quickgraph::server::{self, BearerToken};
use quickgraph::{EngineConfig, ExecutionContext};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

const DEFAULT_PORT: u16 = 8080;

/// Serves the demo schema over HTTP, or runs a single query and exits.
#[derive(Debug, Parser)]
#[command(name = "quickgraph", version, about)]
struct Args {
    /// YAML engine configuration.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listening port, overriding the configuration file.
    #[arg(long)]
    port: Option<u16>,

    /// Run this query once, print the response and exit.
    #[arg(long)]
    query: Option<String>,

    /// JSON variables for --query.
    #[arg(long, default_value = "{}")]
    variables: String,

    /// Bearer token for --query, e.g. `admin-token`.
    #[arg(long)]
    token: Option<String>,

    /// Print the schema in SDL form and exit.
    #[arg(long)]
    print_schema: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let port = args.port.or(config.port).unwrap_or(DEFAULT_PORT);

    let demo = Demo::new(config.subscriptions.buffer_size);
    let engine = Arc::new(demo.build_engine(config)?);

    if args.print_schema {
        println!("{}", engine.schema_definition());
        return Ok(());
    }

    if let Some(query) = &args.query {
        let ctx = match args.token.clone() {
            Some(token) => ExecutionContext::new().with_value(BearerToken(token)),
            None => ExecutionContext::new(),
        };
        let body = engine.process_request(&ctx, query, &args.variables).await?;
        let value: serde_json::Value = serde_json::from_str(&body)?;
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "GraphQL endpoint at http://{addr}/graphql");

    let result = server::serve(listener, engine).await;
    demo.feeds.close();
    Ok(result?)
}
