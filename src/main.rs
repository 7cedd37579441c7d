//! Agent Chain - HTTP Server Entry Point
//!
//! Starts the HTTP server that exposes the pipeline API.

use agent_chain::{api, config::Config};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agent_chain=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!(
        "Loaded configuration: model={}, search={}, max_tool_turns={}",
        config.model,
        match (config.search.enabled, config.search.has_credential()) {
            (false, _) => "disabled",
            (true, true) => "tavily",
            (true, false) => "unavailable",
        },
        config.max_tool_turns
    );

    info!("Starting server on {}:{}", config.host, config.port);
    api::serve(config).await?;

    Ok(())
}
