use anyhow::Result;
use std::sync::Arc;

use sales_insights::{build_router, config, logging, services::llm_agent::LlmAgent, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    logging::init_logging()?;

    // Load configuration
    let config = config::load_config()?;
    if config::api_key_from_env().is_err() {
        tracing::warn!(
            "{} is not set; analysis requests will fail until it is added",
            config::API_KEY_VAR
        );
    }

    // Build our application state
    let transport = Arc::new(LlmAgent::new(&config)?);
    let addr = config.bind_addr;
    let state = Arc::new(AppState::new(config, transport));

    let app = build_router(state);

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
