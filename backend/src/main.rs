use axum::{
    Router,
    routing::{delete, get, post},
};
use linkup::store::PgStore;
use linkup::{Config, get_db_pool, handlers, utils};
use tower_http::cors::{Any, CorsLayer};
use axum::http::{HeaderValue, Method};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    utils::init_logging();

    let config = Config::from_env()?;
    let db_config = linkup::db::DatabaseConfig::from_env()?;
    let pool = get_db_pool(&db_config).await?;

    // Run migrations
    linkup::db::run_migrations(&pool).await?;

    let port = config.port;
    let store = PgStore::new(pool);
    let app = create_router(store, config);

    let listener = tokio::net::TcpListener::bind(&format!("0.0.0.0:{}", port)).await?;
    tracing::info!("Server running on port {}", port);

    axum::serve(listener, app).await?;

    Ok(())
}

fn create_router(store: PgStore, config: Config) -> Router {
    let cors_layer = create_cors_layer(&config);
    let app_state = (store, config);

    Router::new()
        .route("/health", get(health_check))
        // Connect flow
        .route("/api/connect/request", post(handlers::create_request))
        .route(
            "/api/connect/request/{request_id}",
            delete(handlers::cancel_request),
        )
        .route("/api/connect/status/{user_id}", get(handlers::get_status))
        .route(
            "/api/connect/end/{connection_id}",
            post(handlers::end_connection),
        )
        .route(
            "/api/connect/messages/{connection_id}",
            get(handlers::list_messages),
        )
        .route("/api/connect/messages", post(handlers::send_message))
        .layer(cors_layer)
        .with_state(app_state)
}

fn create_cors_layer(_config: &Config) -> CorsLayer {
    let mut cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any)
        .allow_credentials(false);

    // Check if ALLOWED_ORIGINS environment variable is set for multiple domains
    if let Ok(cors_origins) = std::env::var("ALLOWED_ORIGINS") {
        let origins: Vec<HeaderValue> = cors_origins
            .split(',')
            .filter_map(|origin| {
                let trimmed = origin.trim();
                if !trimmed.is_empty() {
                    trimmed.parse().ok()
                } else {
                    None
                }
            })
            .collect();

        if !origins.is_empty() {
            cors = cors.allow_origin(origins);
        } else {
            // Fallback to permissive if parsing fails
            cors = cors.allow_origin(Any);
        }
    } else {
        // Default to permissive for development
        cors = cors.allow_origin(Any);
    }

    cors
}

async fn health_check() -> &'static str {
    "OK"
}
