//! HTTP routing and API documentation endpoints.

use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::handlers::{self, AppState};

/// Room for multipart boundaries and headers on top of the file itself.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Serves the OpenAPI specification YAML file.
///
/// Reads `openapi.yml` from the working directory; 404 when it is missing.
pub async fn serve_openapi_spec() -> impl IntoResponse {
    match tokio::fs::read_to_string("openapi.yml").await {
        Ok(content) => (
            StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "text/yaml")],
            content,
        )
            .into_response(),
        Err(_) => (StatusCode::NOT_FOUND, "OpenAPI spec not found").into_response(),
    }
}

/// Serves the Swagger UI HTML page pointed at `/api-docs/openapi.yml`.
pub async fn serve_swagger_ui() -> impl IntoResponse {
    let html = r#"
<!DOCTYPE html>
<html lang="pt-BR">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Conta Explicada API - Swagger UI</title>
    <link rel="stylesheet" type="text/css" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css">
    <style>
        body { margin: 0; padding: 0; }
    </style>
</head>
<body>
    <div id="swagger-ui"></div>
    <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
    <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-standalone-preset.js"></script>
    <script>
        window.onload = function() {
            window.ui = SwaggerUIBundle({
                url: "/api-docs/openapi.yml",
                dom_id: '#swagger-ui',
                deepLinking: true,
                presets: [
                    SwaggerUIBundle.presets.apis,
                    SwaggerUIStandalonePreset
                ],
                layout: "StandaloneLayout"
            });
        };
    </script>
</body>
</html>
"#;
    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "text/html; charset=utf-8")],
        html,
    )
}

/// Documentation and `/api/v1` routes, with the upload size limit applied.
///
/// Rate limiting is layered on top by the binary.
pub fn api_routes(max_upload_bytes: usize) -> Router<Arc<AppState>> {
    let body_limit = max_upload_bytes + MULTIPART_OVERHEAD_BYTES;

    Router::new()
        // API Documentation
        .route("/docs", get(serve_swagger_ui))
        .route("/api-docs/openapi.yml", get(serve_openapi_spec))
        // Stateless estimator
        .route("/api/v1/estimate", post(handlers::estimate))
        // Session flow
        .route("/api/v1/sessions", post(handlers::create_session))
        .route("/api/v1/sessions/:id", get(handlers::get_session))
        .route("/api/v1/sessions/:id/bill", post(handlers::upload_bill))
        .route("/api/v1/sessions/:id/offer", post(handlers::answer_offer))
        .route(
            "/api/v1/sessions/:id/lead-capture",
            post(handlers::open_lead_capture),
        )
        .route("/api/v1/sessions/:id/lead", patch(handlers::update_lead))
        .route(
            "/api/v1/sessions/:id/lead/submit",
            post(handlers::submit_lead),
        )
        .route("/api/v1/sessions/:id/reset", post(handlers::reset_session))
        .layer(
            ServiceBuilder::new()
                .layer(DefaultBodyLimit::max(body_limit))
                .layer(RequestBodyLimitLayer::new(body_limit)),
        )
}

/// Final app: health check merged with `api`, state attached, tracing and CORS on top.
pub fn app(state: Arc<AppState>, api: Router<Arc<AppState>>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .merge(api)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Full router without rate limiting.
pub fn router(state: Arc<AppState>) -> Router {
    let api = api_routes(state.config.max_upload_bytes);
    app(state, api)
}
