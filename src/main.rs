use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use conta_explicada_api::api;
use conta_explicada_api::config::Config;
use conta_explicada_api::handlers::AppState;

/// Main entry point for the application.
///
/// Initializes tracing, loads configuration, wires the Gemini, ViaCEP and
/// webhook clients into the application state, and serves the router with
/// CORS, tracing and per-IP rate limiting.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "conta_explicada_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    let port = config.port;
    let max_upload_bytes = config.max_upload_bytes;

    let app_state = Arc::new(AppState::from_config(config));
    tracing::info!("Session store initialized");

    // Configure rate limiter: 10 requests/second per IP, burst of 20
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Invalid rate limiter configuration"))?,
    );

    // Health check stays outside the rate limiter
    let protected_routes = api::api_routes(max_upload_bytes).layer(
        ServiceBuilder::new().layer(GovernorLayer {
            config: governor_conf,
        }),
    );
    let app = api::app(app_state, protected_routes);

    // Start server
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
