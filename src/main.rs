use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ad_provisioning_api::config::Config;
use ad_provisioning_api::graph_client::GraphApiClient;
use ad_provisioning_api::handlers::AppState;
use ad_provisioning_api::pipeline::ProvisioningPipeline;

/// Main entry point for the application.
///
/// Initializes logging, loads and validates configuration (refusing to start
/// on a malformed account id or missing token), builds the Graph API client
/// and provisioning pipeline, then starts the Axum server.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ad_provisioning_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration; any error here stops the process before it takes traffic
    let config = Arc::new(Config::from_env()?);

    let client = GraphApiClient::new(&config)?;
    tracing::info!(
        "✓ Graph API client initialized: {} ({})",
        config.graph_root(),
        config.ad_account_id
    );

    let pipeline = ProvisioningPipeline::from_config(Arc::new(client), &config)?;

    let app_state = Arc::new(AppState {
        config: config.clone(),
        pipeline,
    });

    let app = ad_provisioning_api::create_router(app_state, true)?;

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
