use clap::Parser;
use tracing_subscriber::EnvFilter;
use truckroute_cli::TruckRouteCli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_from_env("TRUCKROUTE_LOG"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    truckroute_cli::run(TruckRouteCli::parse()).await
}
