use anyhow::Result;
use desk_api::run as run_api;
use desk_core::{Config, DeskContext};
use tracing;
use tracing_subscriber;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting Desk support backend");

    let config = Config::from_env();
    let ctx = DeskContext::new(config).await?;

    tracing::info!("Desk context initialized");

    run_api(ctx).await?;

    Ok(())
}
