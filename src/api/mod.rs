//! HTTP surface: routes, middleware and the documentation endpoints.

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

use crate::handlers::{self as h, AppState};

// Thin namespace wrapper for API-layer components
pub mod handlers {
    pub use crate::handlers::*;
}

/// Largest accepted request body, bulk uploads included.
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

const OPENAPI_SPEC: &str = include_str!("../../openapi.yml");

/// Serves the OpenAPI specification YAML bundled with the binary.
async fn serve_openapi_spec() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/yaml")],
        OPENAPI_SPEC,
    )
}

/// Serves the Swagger UI HTML page, pointed at `serve_openapi_spec`.
async fn serve_swagger_ui() -> impl IntoResponse {
    let html = r#"
<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Contribuinte API - Swagger UI</title>
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
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        html,
    )
}

/// CORS restricted to the configured origins, credentials allowed.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

/// Builds the full application router.
pub fn create_router(state: Arc<AppState>) -> Router {
    let contribuinte_routes = Router::new()
        .route(
            "/contribuinte",
            get(h::list_contribuintes).post(h::create_contribuinte),
        )
        .route(
            "/contribuinte/",
            get(h::list_contribuintes).post(h::create_contribuinte),
        )
        .route(
            "/contribuinte/by-date/:dat_proce",
            get(h::get_contribuintes_by_date),
        )
        .route(
            "/contribuinte/by-client/:cliente",
            get(h::get_contribuintes_by_client),
        )
        .route("/contribuinte/cpf/:cpf_cnpj", get(h::get_contribuinte_by_cpf))
        .route(
            "/contribuinte/bulk-upload",
            axum::routing::post(h::bulk_upload),
        )
        .route(
            "/contribuinte/:ref_id",
            get(h::get_contribuinte)
                .put(h::update_contribuinte)
                .delete(h::delete_contribuinte),
        )
        .layer(
            ServiceBuilder::new()
                // Request size limit (bulk uploads are the largest bodies)
                .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
                .layer(DefaultBodyLimit::max(MAX_BODY_BYTES)),
        );

    let cors = cors_layer(&state.config.cors_origins);

    // Root, health and docs never touch a database
    Router::new()
        .route("/", get(h::root))
        .route("/health", get(h::health))
        .route("/docs", get(serve_swagger_ui))
        .route("/api-docs/openapi.yml", get(serve_openapi_spec))
        .merge(contribuinte_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
