use std::sync::Arc;

use contribuinte_api::api::create_router;
use contribuinte_api::config::Config;
use contribuinte_api::db::ensure_schema;
use contribuinte_api::handlers::AppState;
use contribuinte_api::module_router::{Databases, Module};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the application.
///
/// Loads configuration, initializes logging, builds one lazily-connected
/// pool per module database, bootstraps the schema in each of them and
/// starts the Axum server.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Configuration comes first so DEBUG can pick the default log filter
    let config = Config::from_env()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    config.log_summary();

    // Pools connect on first use; one unreachable database leaves the others serving
    let databases = Databases::from_config(&config)?;
    tracing::info!("Database pools created for modules A, B and legacy");

    for module in Module::ALL {
        match ensure_schema(databases.pool(module)).await {
            Ok(()) => tracing::info!("✓ Schema ready in module {} database", module),
            Err(e) => tracing::warn!(
                "Could not bootstrap schema in module {} database: {}",
                module,
                e
            ),
        }
    }

    let port = config.port;
    let app_state = Arc::new(AppState { databases, config });
    let app = create_router(app_state);

    // Start server
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
