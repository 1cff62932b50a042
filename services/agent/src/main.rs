//! Digital Signature Agent - localhost PKCS#11 signing bridge

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dsc_agent::config::AgentConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dsc_agent=info,dsc=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Digital Signature Agent");

    let config = AgentConfig::from_env()?;

    // Localhost only; the agent is a local bridge, never a network service.
    let addr = std::net::SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    dsc_agent::server::run(listener, config).await?;

    Ok(())
}
