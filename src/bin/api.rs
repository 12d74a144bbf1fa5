use financial_command_gateway::{
    agent::Orchestrator,
    api::{start_server, ApiState},
    config::GatewayConfig,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables first so RUST_LOG from .env applies
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = GatewayConfig::from_env()?;

    info!("Financial Command Gateway - API Server");
    info!(port = config.port, organization = ?config.current_organization_id, "Configuration loaded");

    if config.default_credential.is_empty() {
        warn!("FINANCIAL_API_KEY not set; callers must send an Authorization header");
    }

    let orchestrator = Arc::new(Orchestrator::from_config(&config)?);

    if let Some(ttl) = config.conversation_idle_ttl {
        let orchestrator = Arc::clone(&orchestrator);
        let period = ttl.min(Duration::from_secs(60)).max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                orchestrator.store().evict_idle().await;
            }
        });
        info!(ttl_secs = ttl.as_secs(), "Idle conversation eviction enabled");
    }

    let state = ApiState::new(orchestrator, config.default_credential.clone());

    start_server(state, config.port).await?;

    Ok(())
}
