use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use audiorelay_lib::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    audiorelay_lib::run(Cli::parse()).await
}
