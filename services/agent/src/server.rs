//! Agent HTTP Server

use std::{net::SocketAddr, sync::Arc};
use tracing::{error, info};

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::AgentConfig;
use crate::fetch::DocumentFetcher;
use crate::handlers::{self, AppState};

/// Create and configure the Axum router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/status", get(handlers::status).post(handlers::status))
        .route(
            "/cert-info",
            get(handlers::cert_info_query).post(handlers::cert_info_json),
        )
        .route("/sign-pdf", post(handlers::sign_pdf))
        // The browser front-end runs on a different localhost origin.
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP server
pub async fn run(
    listener: tokio::net::TcpListener,
    config: AgentConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all(&config.signed_docs_dir)
        .map_err(|e| format!("Failed to create signed documents directory: {e}"))?;

    let fetcher = DocumentFetcher::new(&config.document_base_url)
        .map_err(|e| format!("Failed to build document fetcher: {e}"))?;

    info!("Using PKCS#11 module at {}", config.pkcs11_library);
    let device = Arc::new(dsc::TokenDevice::new(config.pkcs11_library.clone()));

    let state = Arc::new(AppState {
        device,
        fetcher,
        config,
    });

    let app = create_router(state);

    info!(
        "Signature agent listening on {}",
        listener
            .local_addr()
            .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 0)))
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Wait for SIGTERM or SIGINT signal
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C signal"),
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                info!("Received SIGTERM signal");
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                // Wait forever since we can't receive SIGTERM
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Starting graceful shutdown...");
}
